use crate::config::Config;
use crate::risk::{CommandContext, RiskLevel, RuleHit};

use super::{Category, RiskRule};

const KILL_SIGNALS: &[&str] = &["9", "kill", "sigkill"];

pub struct ProcessRule {
    commands: Vec<String>,
}

impl ProcessRule {
    pub fn from_config(config: &Config) -> Self {
        Self {
            commands: config.rules.process.clone(),
        }
    }
}

/// Detect `name(){ name|name& };name` in a script, whitespace ignored.
pub fn is_fork_bomb(script: &str) -> bool {
    let compact: String = script.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.contains("%0|%0") {
        return true;
    }
    compact.match_indices("(){").any(|(at, _)| {
        let head = &compact[..at];
        let name_start = head
            .rfind(|c: char| !(c.is_alphanumeric() || matches!(c, '_' | ':' | '.')))
            .map_or(0, |i| i + 1);
        let name = &head[name_start..];
        !name.is_empty() && compact[at + 3..].starts_with(&format!("{name}|{name}&"))
    })
}

/// Split kill arguments into (signal, pids).
fn kill_args(args: &[String]) -> (Option<String>, Vec<&str>) {
    let mut signal = None;
    let mut pids = Vec::new();
    let mut i = 0;
    while i < args.len() {
        let arg = args[i].as_str();
        if arg == "--" {
            pids.extend(args[i + 1..].iter().map(String::as_str));
            break;
        }
        if matches!(arg, "-s" | "-n" | "--signal") {
            signal = args.get(i + 1).cloned();
            i += 2;
            continue;
        }
        if i == 0 && arg.starts_with('-') && args.len() > 1 {
            signal = Some(arg.trim_start_matches('-').to_string());
        } else if !(arg.starts_with('-') && arg != "-1") {
            pids.push(arg);
        }
        i += 1;
    }
    (signal, pids)
}

impl RiskRule for ProcessRule {
    fn category(&self) -> Category {
        Category::Process
    }

    fn check_script(&self, script: &str) -> Option<RuleHit> {
        is_fork_bomb(script).then(|| {
            RuleHit::new(
                RiskLevel::Critical,
                "fork bomb exhausts the process table",
            )
        })
    }

    fn check(&self, ctx: &CommandContext) -> Option<RuleHit> {
        if !ctx.is_one_of(&self.commands) {
            return None;
        }
        if ctx.base_command != "kill" {
            return Some(RuleHit::new(
                RiskLevel::High,
                format!("{} signals processes by name", ctx.base_command),
            ));
        }

        let (signal, pids) = kill_args(ctx.args());
        if let Some(pid) = pids.iter().find(|p| matches!(**p, "1" | "-1")) {
            let what = if *pid == "1" { "init (pid 1)" } else { "every process" };
            return Some(RuleHit::new(RiskLevel::Critical, format!("kill targets {what}")));
        }
        let forced = signal.is_some_and(|s| {
            let s = s.to_ascii_lowercase();
            KILL_SIGNALS.contains(&s.as_str())
        });
        if forced {
            return Some(
                RuleHit::new(RiskLevel::Medium, "forced kill (SIGKILL)")
                    .with_warning("the process gets no chance to clean up"),
            );
        }
        Some(RuleHit::new(RiskLevel::Low, format!("kill {}", pids.join(" "))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::testing::level;

    fn rule() -> ProcessRule {
        ProcessRule::from_config(&Config::default_config())
    }

    #[test]
    fn fork_bombs() {
        assert!(is_fork_bomb(":(){ :|:& };:"));
        assert!(is_fork_bomb("bomb() { bomb | bomb & }; bomb"));
        assert!(!is_fork_bomb("f() { echo hi; }; f"));
        assert_eq!(level(&rule(), ":(){ :|:& };:"), Some(RiskLevel::Critical));
    }

    #[test]
    fn kill_init_or_everything() {
        assert_eq!(level(&rule(), "kill 1"), Some(RiskLevel::Critical));
        assert_eq!(level(&rule(), "kill -9 -1"), Some(RiskLevel::Critical));
        assert_eq!(level(&rule(), "sudo kill -s KILL 1"), Some(RiskLevel::Critical));
    }

    #[test]
    fn by_name_high() {
        assert_eq!(level(&rule(), "killall firefox"), Some(RiskLevel::High));
        assert_eq!(level(&rule(), "pkill -f node"), Some(RiskLevel::High));
    }

    #[test]
    fn forced_medium() {
        assert_eq!(level(&rule(), "kill -9 4242"), Some(RiskLevel::Medium));
        assert_eq!(level(&rule(), "kill -KILL 4242"), Some(RiskLevel::Medium));
        assert_eq!(level(&rule(), "kill -s SIGKILL 4242"), Some(RiskLevel::Medium));
    }

    #[test]
    fn plain_kill_low() {
        assert_eq!(level(&rule(), "kill 4242"), Some(RiskLevel::Low));
        assert_eq!(level(&rule(), "kill -TERM 4242"), Some(RiskLevel::Low));
    }

    #[test]
    fn signal_one_is_not_pid_one() {
        assert_eq!(level(&rule(), "kill -1 4242"), Some(RiskLevel::Low));
    }

    #[test]
    fn unrelated() {
        assert_eq!(level(&rule(), "ps aux"), None);
    }
}
