use crate::config::Config;
use crate::risk::paths::PathSet;
use crate::risk::{CommandContext, RiskLevel, RuleHit};

use super::{Category, RiskRule};

/// Commands that print, copy or archive file contents.
const READERS: &[&str] = &[
    "cat", "tac", "less", "more", "head", "tail", "bat", "grep", "rg", "strings", "xxd", "od",
    "hexdump", "base64", "cp", "scp", "rsync", "tar", "zip", "7z", "vi", "vim", "nvim", "nano",
    "emacs", "openssl", "type", "get-content",
];
/// Commands that only show metadata.
const LISTERS: &[&str] = &["ls", "stat", "file", "du", "find", "tree", "dir"];
const ENV_DUMPS: &[&str] = &["env", "printenv", "history", "export", "set"];
const HISTORY_VARS: &[&str] = &["HISTFILE", "HISTSIZE", "HISTFILESIZE", "SAVEHIST"];

pub struct CredentialsRule {
    sensitive: PathSet,
}

impl CredentialsRule {
    pub fn from_config(config: &Config) -> Self {
        Self {
            sensitive: PathSet::from_config(&config.paths.sensitive),
        }
    }

    fn sensitive_operand(&self, ctx: &CommandContext) -> Option<String> {
        ctx.targets()
            .into_iter()
            .find(|t| self.sensitive.covers(&t.path))
            .map(|t| t.word)
    }
}

/// `history -c`, `unset HISTFILE`, `HISTFILE=/dev/null`, `set +o history`.
fn disables_history(ctx: &CommandContext) -> bool {
    let touches_var = |name: &str| HISTORY_VARS.contains(&name);
    let assigned = ctx.env_vars.iter().any(|(k, _)| touches_var(k))
        || (ctx.base_command == "export"
            && ctx
                .args()
                .iter()
                .any(|a| a.split_once('=').is_some_and(|(k, _)| touches_var(k))));
    match ctx.base_command.as_str() {
        "history" => ctx.has_short_flag('c'),
        "unset" => ctx.args().iter().any(|a| touches_var(a)),
        "set" => ctx.has_flag("+o") && ctx.has_arg("history"),
        _ => assigned,
    }
}

impl RiskRule for CredentialsRule {
    fn category(&self) -> Category {
        Category::Credentials
    }

    fn check(&self, ctx: &CommandContext) -> Option<RuleHit> {
        let command = ctx.base_command.as_str();

        if READERS.contains(&command)
            && let Some(word) = self.sensitive_operand(ctx)
        {
            return Some(
                RuleHit::new(
                    RiskLevel::High,
                    format!("{command} exposes sensitive file {word}"),
                )
                .with_warning("output may contain secrets"),
            );
        }
        if LISTERS.contains(&command)
            && let Some(word) = self.sensitive_operand(ctx)
        {
            return Some(RuleHit::new(
                RiskLevel::Low,
                format!("{command} inspects sensitive location {word}"),
            ));
        }
        if disables_history(ctx) {
            return Some(RuleHit::new(
                RiskLevel::Medium,
                "clears or disables shell history",
            ));
        }
        if ENV_DUMPS.contains(&command) && ctx.operands().is_empty() && ctx.env_vars.is_empty() {
            return Some(
                RuleHit::new(RiskLevel::Low, format!("{command} prints environment or history"))
                    .with_warning("environment variables often hold tokens"),
            );
        }
        None
    }
}
