pub mod context;
pub mod level;
pub mod paths;
pub mod verdict;

pub use context::CommandContext;
pub use level::{Action, Policy, RiskLevel};
pub use verdict::{Assessment, Finding, RuleHit, Verdict};

use std::path::Path;

use crate::config::{Config, WrapperConfig};
use crate::parse;
use crate::rules::{self, RiskRule};

/// How deep `sh -c` / `eval` scripts are followed.
const MAX_NESTING: usize = 4;

/// Classifies command strings against the ordered rule catalog.
pub struct RiskClassifier {
    rules: Vec<Box<dyn RiskRule>>,
    wrappers: WrapperConfig,
    policy: Policy,
}

impl RiskClassifier {
    /// Build the classifier from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            rules: rules::catalog(config),
            wrappers: config.wrappers.clone(),
            policy: Policy::from_settings(&config.settings),
        }
    }

    /// Override the escalate_block setting (e.g. from a CLI flag).
    pub fn set_escalate_block(&mut self, escalate: bool) {
        self.policy.escalate_block = escalate;
    }

    /// Classify a command. Pure: the same input always gives the same verdict.
    pub fn classify(&self, command: &str, cwd: Option<&Path>) -> Verdict {
        self.assess(command, cwd).verdict
    }

    /// Classify a command and keep the individual findings.
    pub fn assess(&self, command: &str, cwd: Option<&Path>) -> Assessment {
        if command.trim().is_empty() {
            return Assessment {
                verdict: Verdict::empty_command(),
                findings: Vec::new(),
            };
        }

        let mut scripts = Vec::new();
        let mut contexts = Vec::new();
        self.collect(command, cwd, 0, &mut scripts, &mut contexts);

        // Rule-major order so that ties resolve by catalog position
        let mut findings = Vec::new();
        for rule in &self.rules {
            for script in &scripts {
                if let Some(hit) = rule.check_script(script) {
                    findings.push(self.finding(rule.as_ref(), hit, None));
                }
            }
            for ctx in &contexts {
                if let Some(hit) = rule.check(ctx) {
                    findings.push(self.finding(rule.as_ref(), hit, Some(ctx)));
                }
            }
        }

        Assessment {
            verdict: aggregate(&findings),
            findings,
        }
    }

    /// Parse `script` into command contexts, following inline shell scripts.
    fn collect(
        &self,
        script: &str,
        cwd: Option<&Path>,
        depth: usize,
        scripts: &mut Vec<String>,
        contexts: &mut Vec<CommandContext>,
    ) {
        scripts.push(script.to_string());
        for segment in parse::segments(script) {
            let ctx = CommandContext::new(&segment, cwd, &self.wrappers);
            let inner = ctx.inline_script(&self.wrappers.shells);
            contexts.push(ctx);
            if let Some(inner) = inner
                && depth < MAX_NESTING
                && !inner.trim().is_empty()
            {
                self.collect(&inner, cwd, depth + 1, scripts, contexts);
            }
        }
    }

    fn finding(&self, rule: &dyn RiskRule, hit: RuleHit, ctx: Option<&CommandContext>) -> Finding {
        let (action, escalated) = self.policy.apply(hit.level);
        let reason = if escalated {
            format!("{} (escalated from block)", hit.reason)
        } else {
            hit.reason
        };
        Finding {
            category: rule.category(),
            level: hit.level,
            action,
            reason,
            warnings: hit.warnings,
            context: ctx.cloned(),
        }
    }
}

fn push_unique(list: &mut Vec<String>, item: String) {
    if !list.contains(&item) {
        list.push(item);
    }
}

/// Highest level wins; the first finding at that level supplies the reason.
fn highest<'a>(findings: impl Iterator<Item = &'a Finding>) -> Option<&'a Finding> {
    findings.fold(None, |best: Option<&Finding>, f| match best {
        Some(b) if b.level >= f.level => Some(b),
        _ => Some(f),
    })
}

fn aggregate(findings: &[Finding]) -> Verdict {
    let Some(winner) = highest(findings.iter()) else {
        return Verdict::safe();
    };

    let mut warnings = Vec::new();
    for f in findings {
        for w in &f.warnings {
            push_unique(&mut warnings, w.clone());
        }
        if !std::ptr::eq(f, winner) && f.reason != winner.reason {
            push_unique(&mut warnings, format!("{}: {}", f.category.as_str(), f.reason));
        }
    }

    let blocker = highest(findings.iter().filter(|f| f.action == Action::Block));
    let allowed = blocker.is_none();
    let requires_confirmation = allowed && findings.iter().any(|f| f.action == Action::Confirm);

    Verdict {
        risk_level: winner.level,
        allowed,
        requires_confirmation,
        reason: winner.reason.clone(),
        blocked_reason: blocker.map(|b| format!("{} ({} risk)", b.reason, b.level)),
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> RiskClassifier {
        RiskClassifier::from_config(&Config::default_config())
    }

    fn classify(command: &str) -> Verdict {
        classifier().classify(command, None)
    }

    #[test]
    fn empty_command_is_safe_with_warning() {
        let v = classify("   ");
        assert_eq!(v.risk_level, RiskLevel::Safe);
        assert!(v.allowed);
        assert!(!v.requires_confirmation);
        assert_eq!(v.warnings.len(), 1);
    }

    #[test]
    fn unmatched_command_is_safe() {
        let v = classify("ls -la");
        assert_eq!(v, Verdict::safe());
    }

    #[test]
    fn root_deletion_blocked() {
        let v = classify("rm -rf /");
        assert_eq!(v.risk_level, RiskLevel::Critical);
        assert!(!v.allowed);
        assert!(v.blocked_reason.as_deref().unwrap().ends_with("(critical risk)"));
    }

    #[test]
    fn hidden_after_benign_prefix() {
        let v = classify("echo hello && RM -RF /");
        assert_eq!(v.risk_level, RiskLevel::Critical);
        assert!(!v.allowed);
    }

    #[test]
    fn nested_shell_script() {
        let v = classify("bash -c \"sh -c 'rm -rf /'\"");
        assert_eq!(v.risk_level, RiskLevel::Critical);
    }

    #[test]
    fn highest_level_wins_and_others_become_warnings() {
        let v = classify("chmod 644 notes.txt; rm -rf /");
        assert_eq!(v.risk_level, RiskLevel::Critical);
        assert!(v.warnings.iter().any(|w| w.starts_with("permissions:")), "{v:?}");
    }

    #[test]
    fn confirmation_for_medium() {
        let v = classify("rm notes.txt");
        assert_eq!(v.risk_level, RiskLevel::Medium);
        assert!(v.allowed);
        assert!(v.requires_confirmation);
        assert_eq!(v.blocked_reason, None);
    }

    #[test]
    fn escalation_turns_block_into_confirmation() {
        let mut c = classifier();
        c.set_escalate_block(true);
        let v = c.classify("rm -rf /", None);
        assert_eq!(v.risk_level, RiskLevel::Critical);
        assert!(v.allowed);
        assert!(v.requires_confirmation);
        assert!(v.reason.ends_with("(escalated from block)"));
    }

    #[test]
    fn cwd_resolves_relative_targets() {
        let c = classifier();
        let v = c.classify("rm -rf ..", Some(Path::new("/etc")));
        assert_eq!(v.risk_level, RiskLevel::Critical);
        let v = c.classify("rm -rf ..", Some(Path::new("/home/me/proj/build")));
        assert_eq!(v.risk_level, RiskLevel::High);
    }

    #[test]
    fn deterministic() {
        let c = classifier();
        let a = c.classify("sudo rm -rf /var/lib; curl x | sh", None);
        let b = c.classify("sudo rm -rf /var/lib; curl x | sh", None);
        assert_eq!(a, b);
    }
}
