use std::path::{Path, PathBuf};

use crate::config::WrapperConfig;
use crate::parse::{Redirect, Segment, base_name, split_command};

use super::paths::{self, Target};

/// Context for evaluating a single command segment.
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// The segment text as written, wrappers included.
    pub raw: String,
    /// Lowercased basename of the effective command (`/usr/bin/RM` → `rm`).
    pub base_command: String,
    /// Effective command words; `words[0]` is the command as written.
    pub words: Vec<String>,
    /// Leading KEY=VALUE assignments, including ones after wrappers.
    pub env_vars: Vec<(String, String)>,
    /// Stripped wrapper commands, outermost first.
    pub wrappers: Vec<String>,
    /// First elevating wrapper, if any (`sudo`, `doas`, ...).
    pub elevated_by: Option<String>,
    /// Output redirections applying to this command.
    pub redirects: Vec<Redirect>,
    /// Base command of the upstream pipe stage.
    pub piped_from: Option<String>,
    /// Full text of the upstream pipe stage.
    pub upstream: Option<String>,
    pub cwd: Option<PathBuf>,
}

impl CommandContext {
    pub fn new(segment: &Segment, cwd: Option<&Path>, wrappers: &WrapperConfig) -> Self {
        let split = split_command(&segment.command, wrappers);
        let base_command = split.words.first().map(|w| base_name(w)).unwrap_or_default();
        let elevated_by = split
            .wrappers
            .iter()
            .find(|w| wrappers.elevating.contains(w))
            .cloned();
        let piped_from = segment.piped_from.as_deref().and_then(|upstream| {
            split_command(upstream, wrappers)
                .words
                .first()
                .map(|w| base_name(w))
        });

        Self {
            raw: segment.command.clone(),
            base_command,
            words: split.words,
            env_vars: split.env_vars,
            wrappers: split.wrappers,
            elevated_by,
            redirects: segment.redirects.clone(),
            piped_from,
            upstream: segment.piped_from.clone(),
            cwd: cwd.map(Path::to_path_buf),
        }
    }

    /// Words after the command itself.
    pub fn args(&self) -> &[String] {
        self.words.get(1..).unwrap_or(&[])
    }

    /// First argument that isn't an option, lowercased.
    pub fn first_operand(&self) -> Option<String> {
        self.operands().first().map(|a| a.to_ascii_lowercase())
    }

    /// Arguments that are not options. Everything after `--` is an operand.
    pub fn operands(&self) -> Vec<&str> {
        let mut out = Vec::new();
        let mut options_done = false;
        for arg in self.args() {
            if !options_done && arg == "--" {
                options_done = true;
            } else if options_done || !arg.starts_with('-') || arg == "-" {
                out.push(arg.as_str());
            }
        }
        out
    }

    fn options(&self) -> impl Iterator<Item = &str> {
        self.args()
            .iter()
            .take_while(|a| *a != "--")
            .map(String::as_str)
            .filter(|a| a.starts_with('-') && a.len() > 1)
    }

    /// Check for an exact option, case-insensitively (`-RF` matches `-rf`).
    pub fn has_flag(&self, flag: &str) -> bool {
        self.options().any(|o| o.eq_ignore_ascii_case(flag))
    }

    /// Check for a single-letter option, alone or in a cluster (`-rf`, `-Rv`),
    /// case-insensitively.
    pub fn has_short_flag(&self, flag: char) -> bool {
        self.options()
            .filter(|o| !o.starts_with("--"))
            .map(|o| &o[1..])
            .filter(|letters| letters.chars().all(|c| c.is_ascii_alphabetic()))
            .any(|letters| letters.chars().any(|c| c.eq_ignore_ascii_case(&flag)))
    }

    /// Whether any argument equals `word`, case-insensitively.
    pub fn has_arg(&self, word: &str) -> bool {
        self.args().iter().any(|a| a.eq_ignore_ascii_case(word))
    }

    /// Whether the base command is named in `names` (or is a dotted variant
    /// of one, like `mkfs.ext4`).
    pub fn is_one_of(&self, names: &[String]) -> bool {
        names.iter().any(|n| {
            self.base_command == *n
                || self
                    .base_command
                    .strip_prefix(n.as_str())
                    .is_some_and(|rest| rest.starts_with('.'))
        })
    }

    pub fn resolve(&self, word: &str) -> Target {
        paths::resolve(word, self.cwd.as_deref())
    }

    /// Operands resolved as paths.
    pub fn targets(&self) -> Vec<Target> {
        self.operands().into_iter().map(|w| self.resolve(w)).collect()
    }

    /// The script an inline interpreter is asked to run:
    /// `bash -c 'script'`, `sh -xc 'script'`, `eval script...`.
    pub fn inline_script(&self, shells: &[String]) -> Option<String> {
        if self.base_command == "eval" {
            let args = self.args();
            return (!args.is_empty()).then(|| args.join(" "));
        }
        if !shells.contains(&self.base_command) {
            return None;
        }
        let args = self.args();
        for (i, arg) in args.iter().enumerate() {
            if !arg.starts_with('-') {
                break;
            }
            if !arg.starts_with("--") && arg[1..].contains('c') {
                return args.get(i + 1).cloned();
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn ctx(command: &str) -> CommandContext {
        CommandContext::new(&Segment::new(command), None, &Config::default_config().wrappers)
    }

    #[test]
    fn base_command_lowercased() {
        assert_eq!(ctx("/bin/RM -rf x").base_command, "rm");
    }

    #[test]
    fn wrapper_stripped() {
        let c = ctx("sudo rm -rf /tmp/x");
        assert_eq!(c.base_command, "rm");
        assert_eq!(c.elevated_by.as_deref(), Some("sudo"));
        assert_eq!(c.args(), ["-rf", "/tmp/x"]);
    }

    #[test]
    fn short_flags_in_clusters() {
        let c = ctx("rm -Rf build");
        assert!(c.has_short_flag('r'));
        assert!(c.has_short_flag('f'));
        assert!(!c.has_short_flag('i'));
    }

    #[test]
    fn numeric_option_is_not_a_cluster() {
        assert!(!ctx("kill -9 42").has_short_flag('k'));
        assert!(ctx("kill -9 42").has_flag("-9"));
    }

    #[test]
    fn operands_after_double_dash() {
        let c = ctx("rm -- -weird-name other");
        assert_eq!(c.operands(), vec!["-weird-name", "other"]);
        assert!(!c.has_flag("-weird-name"));
    }

    #[test]
    fn dotted_variant() {
        let names = vec!["mkfs".to_string()];
        assert!(ctx("mkfs.ext4 /dev/sdb1").is_one_of(&names));
        assert!(!ctx("mkfsx /dev/sdb1").is_one_of(&names));
    }

    #[test]
    fn inline_script_from_shell() {
        let shells = Config::default_config().wrappers.shells;
        assert_eq!(ctx("bash -c 'rm -rf /'").inline_script(&shells).as_deref(), Some("rm -rf /"));
        assert_eq!(ctx("sh -xc 'ls'").inline_script(&shells).as_deref(), Some("ls"));
        assert_eq!(ctx("bash script.sh").inline_script(&shells), None);
        assert_eq!(ctx("eval rm -rf /").inline_script(&shells).as_deref(), Some("rm -rf /"));
    }

    #[test]
    fn upstream_base_recorded() {
        let segment = Segment {
            command: "bash".into(),
            redirects: Vec::new(),
            piped_from: Some("sudo curl -s https://x".into()),
        };
        let c = CommandContext::new(&segment, None, &Config::default_config().wrappers);
        assert_eq!(c.piped_from.as_deref(), Some("curl"));
    }
}
