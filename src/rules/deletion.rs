use crate::config::Config;
use crate::parse::base_name;
use crate::risk::paths::GuardedPaths;
use crate::risk::{CommandContext, RiskLevel, RuleHit};

use super::{Category, RiskRule, operand_list, strongest};

/// Redirect targets that are never a file being clobbered.
const HARMLESS_TARGETS: &[&str] = &["/dev/null", "/dev/stdout", "/dev/stderr", "/dev/tty", "-"];

pub struct DeletionRule {
    commands: Vec<String>,
    guarded: GuardedPaths,
}

impl DeletionRule {
    pub fn from_config(config: &Config) -> Self {
        Self {
            commands: config.rules.deletion.clone(),
            guarded: GuardedPaths::from_config(&config.paths),
        }
    }

    fn check_remove(&self, ctx: &CommandContext) -> Option<RuleHit> {
        let operands = operand_list(ctx);
        match ctx.base_command.as_str() {
            "shred" | "srm" => {
                return Some(RuleHit::new(
                    RiskLevel::High,
                    format!("irrecoverable overwrite of {operands}"),
                ));
            }
            "rmdir" | "unlink" => {
                return Some(RuleHit::new(
                    RiskLevel::Low,
                    format!("{} {operands}", ctx.base_command),
                ));
            }
            _ => {}
        }

        let recursive = ctx.has_short_flag('r') || ctx.has_flag("--recursive");
        let forced = ctx.has_short_flag('f') || ctx.has_flag("--force");
        let targets = ctx.targets();

        if ctx.has_flag("--no-preserve-root") {
            return Some(RuleHit::new(
                RiskLevel::Critical,
                "deletion with --no-preserve-root",
            ));
        }

        let mut hit = if recursive {
            match targets.iter().find(|t| self.guarded.reaches(&t.path)) {
                Some(t) => RuleHit::new(
                    RiskLevel::Critical,
                    format!("recursive deletion of protected path {}", t.word),
                ),
                None => RuleHit::new(
                    RiskLevel::High,
                    format!("recursive deletion of {operands}"),
                ),
            }
        } else if let Some(t) = targets.iter().find(|t| self.guarded.sensitive.covers(&t.path)) {
            RuleHit::new(
                RiskLevel::High,
                format!("deletion of sensitive file {}", t.word),
            )
        } else {
            RuleHit::new(RiskLevel::Medium, format!("file deletion: {operands}"))
        };

        if forced {
            hit = hit.with_warning("forced deletion skips confirmation prompts");
        }
        if targets.iter().any(|t| t.glob) {
            hit = hit.with_warning("wildcard expands to an unknown set of files");
        }
        Some(hit)
    }

    fn check_find(&self, ctx: &CommandContext) -> Option<RuleHit> {
        if ctx.has_flag("-delete") {
            return Some(RuleHit::new(RiskLevel::High, "find -delete removes every match"));
        }
        let args = ctx.args();
        let exec_rm = args.windows(2).any(|pair| {
            matches!(pair[0].as_str(), "-exec" | "-execdir" | "-ok" | "-okdir")
                && self.commands.contains(&base_name(&pair[1]))
        });
        exec_rm.then(|| RuleHit::new(RiskLevel::High, "find -exec deletes every match"))
    }

    fn check_git(&self, ctx: &CommandContext) -> Option<RuleHit> {
        match ctx.first_operand().as_deref() {
            Some("clean") if ctx.has_short_flag('f') || ctx.has_flag("--force") => Some(
                RuleHit::new(RiskLevel::Medium, "git clean -f deletes untracked files"),
            ),
            Some("reset") if ctx.has_flag("--hard") => Some(RuleHit::new(
                RiskLevel::Medium,
                "git reset --hard discards uncommitted changes",
            )),
            _ => None,
        }
    }

    fn check_redirects(&self, ctx: &CommandContext) -> Option<RuleHit> {
        strongest(ctx.redirects.iter().filter(|r| r.truncates()).map(|r| {
            if HARMLESS_TARGETS.contains(&r.target.as_str()) || r.target.starts_with("/dev/") {
                return None;
            }
            let target = ctx.resolve(&r.target);
            if self.guarded.guards_file(&target.path) {
                Some(RuleHit::new(
                    RiskLevel::Critical,
                    format!("redirection overwrites protected file {}", r.target),
                ))
            } else {
                Some(RuleHit::new(
                    RiskLevel::Low,
                    format!("redirection overwrites {}", r.target),
                ))
            }
        }))
    }
}

impl RiskRule for DeletionRule {
    fn category(&self) -> Category {
        Category::Deletion
    }

    fn check(&self, ctx: &CommandContext) -> Option<RuleHit> {
        let command = if ctx.is_one_of(&self.commands) {
            self.check_remove(ctx)
        } else {
            match ctx.base_command.as_str() {
                "find" => self.check_find(ctx),
                "git" => self.check_git(ctx),
                _ => None,
            }
        };
        strongest([command, self.check_redirects(ctx)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::testing::level;

    fn rule() -> DeletionRule {
        DeletionRule::from_config(&Config::default_config())
    }

    #[test]
    fn recursive_root() {
        assert_eq!(level(&rule(), "rm -rf /"), Some(RiskLevel::Critical));
        assert_eq!(level(&rule(), "rm -rf /*"), Some(RiskLevel::Critical));
        assert_eq!(level(&rule(), "rm -r --force /etc"), Some(RiskLevel::Critical));
        assert_eq!(level(&rule(), "rm -rf ~"), Some(RiskLevel::Critical));
    }

    #[test]
    fn no_preserve_root() {
        assert_eq!(
            level(&rule(), "rm --no-preserve-root -rf /tmp/x"),
            Some(RiskLevel::Critical)
        );
    }

    #[test]
    fn recursive_sensitive() {
        assert_eq!(level(&rule(), "rm -rf ~/.ssh"), Some(RiskLevel::Critical));
    }

    #[test]
    fn recursive_elsewhere() {
        assert_eq!(level(&rule(), "rm -rf build/"), Some(RiskLevel::High));
        assert_eq!(level(&rule(), "rm -R /tmp/cache"), Some(RiskLevel::High));
    }

    #[test]
    fn plain_and_forced() {
        assert_eq!(level(&rule(), "rm notes.txt"), Some(RiskLevel::Medium));
        assert_eq!(level(&rule(), "rm -f notes.txt"), Some(RiskLevel::Medium));
    }

    #[test]
    fn forced_adds_warning() {
        let wrappers = Config::default_config().wrappers;
        let seg = crate::parse::Segment::new("rm -f a");
        let hit = rule().check(&CommandContext::new(&seg, None, &wrappers)).unwrap();
        assert_eq!(hit.warnings.len(), 1);
    }

    #[test]
    fn secure_delete() {
        assert_eq!(level(&rule(), "shred -u secrets.txt"), Some(RiskLevel::High));
    }

    #[test]
    fn rmdir_low() {
        assert_eq!(level(&rule(), "rmdir empty"), Some(RiskLevel::Low));
    }

    #[test]
    fn find_delete() {
        assert_eq!(level(&rule(), "find . -name '*.o' -delete"), Some(RiskLevel::High));
        assert_eq!(level(&rule(), "find /tmp -exec rm {} \\;"), Some(RiskLevel::High));
        assert_eq!(level(&rule(), "find . -name '*.o'"), None);
    }

    #[test]
    fn git_destructive() {
        assert_eq!(level(&rule(), "git clean -fdx"), Some(RiskLevel::Medium));
        assert_eq!(level(&rule(), "git reset --hard HEAD~1"), Some(RiskLevel::Medium));
        assert_eq!(level(&rule(), "git status"), None);
        assert_eq!(level(&rule(), "git clean -n"), None);
    }

    #[test]
    fn truncating_redirects() {
        assert_eq!(level(&rule(), "echo x > /etc/passwd"), Some(RiskLevel::Critical));
        assert_eq!(level(&rule(), "echo x > ~/.ssh/authorized_keys"), Some(RiskLevel::Critical));
        assert_eq!(level(&rule(), "echo x > out.txt"), Some(RiskLevel::Low));
        assert_eq!(level(&rule(), "echo x >> /etc/passwd"), None);
        assert_eq!(level(&rule(), "make > /dev/null 2>&1"), None);
    }

    #[test]
    fn unrelated() {
        assert_eq!(level(&rule(), "ls -la /"), None);
        assert_eq!(level(&rule(), "cat /etc/hosts"), None);
    }
}
