//! Backup recommendations for commands that destroy or rewrite data.

use std::path::Path;

use crate::risk::paths::Target;
use crate::risk::{CommandContext, Finding, RiskClassifier};
use crate::rules::Category;

use super::alternatives::{join, quote};

/// Recommend a backup step for `command`, if it mutates something on disk.
pub fn recommend(classifier: &RiskClassifier, command: &str, cwd: Option<&Path>) -> Option<String> {
    for_findings(&classifier.assess(command, cwd).findings)
}

/// Backup step for already-computed findings: the most severe one that has one.
pub fn for_findings(findings: &[Finding]) -> Option<String> {
    let mut ordered: Vec<&Finding> = findings.iter().collect();
    ordered.sort_by(|a, b| b.level.cmp(&a.level));
    ordered.into_iter().find_map(|f| {
        let ctx = f.context.as_ref()?;
        let step = match f.category {
            Category::Deletion => deletion(ctx),
            Category::Permissions => permissions(ctx),
            Category::Disk => disk(ctx),
            _ => None,
        }?;
        Some(format!("Back up first: {step}"))
    })
}

/// A file-name-safe stem for an archive named after `target`.
fn archive_name(target: &Target) -> String {
    let stem: String = target
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect();
    let stem = stem.trim_matches('.');
    if stem.is_empty() {
        "backup".to_string()
    } else {
        stem.to_string()
    }
}

fn archive(targets: &[Target]) -> Option<String> {
    let first = targets.first()?;
    let name = format!("{}.backup.tar.gz", archive_name(first));
    let mut words = vec!["tar", "-czf", name.as_str()];
    words.extend(targets.iter().map(|t| t.word.as_str()));
    Some(join(words))
}

fn copies(words: &[&str]) -> Option<String> {
    if words.is_empty() {
        return None;
    }
    let steps: Vec<String> = words
        .iter()
        .map(|&w| {
            let bak = format!("{w}.bak");
            join(["cp", "-a", w, bak.as_str()])
        })
        .collect();
    Some(steps.join(" && "))
}

fn deletion(ctx: &CommandContext) -> Option<String> {
    let targets = ctx.targets();
    match ctx.base_command.as_str() {
        "git" => Some("git stash --include-untracked".into()),
        "find" => archive(&targets[..targets.len().min(1)]),
        "rm" | "shred" | "srm" | "rmdir" | "unlink" => {
            let recursive = ctx.has_short_flag('r') || ctx.has_flag("--recursive");
            if recursive || targets.iter().any(|t| t.glob) {
                archive(&targets)
            } else {
                copies(&ctx.operands())
            }
        }
        _ => {
            let clobbered: Vec<&str> = ctx
                .redirects
                .iter()
                .filter(|r| r.truncates())
                .map(|r| r.target.as_str())
                .collect();
            copies(&clobbered)
        }
    }
}

fn permissions(ctx: &CommandContext) -> Option<String> {
    let operands = ctx.operands();
    // The mode or owner comes first
    let paths = operands.get(1..).filter(|p| !p.is_empty())?;
    let recursive = ctx.has_short_flag('r') || ctx.has_flag("--recursive");
    let mut words = vec!["getfacl"];
    if recursive {
        words.push("-R");
    }
    words.extend(paths.iter().copied());
    Some(format!("{} > permissions.acl", join(words)))
}

fn disk(ctx: &CommandContext) -> Option<String> {
    let device = ctx
        .operands()
        .into_iter()
        .chain(ctx.args().iter().filter_map(|a| a.strip_prefix("of=")))
        .find(|w| w.starts_with("/dev/"))?;
    let name = device.rsplit('/').next().unwrap_or("disk");
    Some(format!("dd if={} of={}.img bs=4M", quote(device), quote(name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn backup(command: &str) -> Option<String> {
        let classifier = RiskClassifier::from_config(&Config::default_config());
        recommend(&classifier, command, None)
    }

    #[test]
    fn recursive_delete_archives() {
        assert_eq!(
            backup("rm -rf build").as_deref(),
            Some("Back up first: tar -czf build.backup.tar.gz build")
        );
    }

    #[test]
    fn file_delete_copies() {
        assert_eq!(
            backup("rm a.txt b.txt").as_deref(),
            Some("Back up first: cp -a a.txt a.txt.bak && cp -a b.txt b.txt.bak")
        );
    }

    #[test]
    fn root_archive_gets_generic_name() {
        let step = backup("rm -rf /").unwrap();
        assert!(step.contains("backup.backup.tar.gz"), "{step}");
    }

    #[test]
    fn git_stash() {
        assert_eq!(
            backup("git reset --hard").as_deref(),
            Some("Back up first: git stash --include-untracked")
        );
    }

    #[test]
    fn redirect_copies_target() {
        assert_eq!(
            backup("echo x > notes.txt").as_deref(),
            Some("Back up first: cp -a notes.txt notes.txt.bak")
        );
    }

    #[test]
    fn permissions_saved() {
        assert_eq!(
            backup("chmod -R 777 shared").as_deref(),
            Some("Back up first: getfacl -R shared > permissions.acl")
        );
    }

    #[test]
    fn device_imaged() {
        assert_eq!(
            backup("mkfs.ext4 /dev/sdb1").as_deref(),
            Some("Back up first: dd if=/dev/sdb1 of=sdb1.img bs=4M")
        );
    }

    #[test]
    fn nothing_for_read_only() {
        assert_eq!(backup("ls -la"), None);
        assert_eq!(backup("kill -9 42"), None);
    }
}
