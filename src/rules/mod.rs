//! The risk-category catalog.
//!
//! Each category has its own `RiskRule` implementation. Rules are evaluated in
//! declaration order against every command segment; the classifier keeps the
//! highest level and breaks ties by this order.

/// Secret files, shell history and environment dumps.
pub mod credentials;
/// Forced, recursive or truncating deletion (rm, shred, find -delete, `>`).
pub mod deletion;
/// Formatting, partitioning and raw device writes.
pub mod disk;
/// Listeners, firewall changes and piping downloads into interpreters.
pub mod network;
/// Mode and ownership changes.
pub mod permissions;
/// Signals at scope and fork bombs.
pub mod process;
/// Power, packages, services, accounts and elevation.
pub mod system;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::risk::{CommandContext, RuleHit};

/// Risk categories, in catalog order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Deletion,
    Disk,
    Permissions,
    Process,
    Network,
    System,
    Credentials,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Deletion => "deletion",
            Category::Disk => "disk",
            Category::Permissions => "permissions",
            Category::Process => "process",
            Category::Network => "network",
            Category::System => "system",
            Category::Credentials => "credentials",
        }
    }
}

/// A single risk category.
pub trait RiskRule: Send + Sync {
    fn category(&self) -> Category;

    /// Inspect one command segment.
    fn check(&self, ctx: &CommandContext) -> Option<RuleHit>;

    /// Inspect a whole script, for patterns that span segments.
    fn check_script(&self, _script: &str) -> Option<RuleHit> {
        None
    }
}

/// The highest-level hit; the earliest one on ties.
pub(crate) fn strongest(hits: impl IntoIterator<Item = Option<RuleHit>>) -> Option<RuleHit> {
    hits.into_iter().flatten().fold(None, |best, hit| match best {
        Some(b) if b.level >= hit.level => Some(b),
        _ => Some(hit),
    })
}

/// Operands joined for a reason string.
pub(crate) fn operand_list(ctx: &CommandContext) -> String {
    let ops = ctx.operands();
    if ops.is_empty() {
        "(no operands)".to_string()
    } else {
        ops.join(" ")
    }
}

/// Build every rule, in catalog order.
pub fn catalog(config: &Config) -> Vec<Box<dyn RiskRule>> {
    vec![
        Box::new(deletion::DeletionRule::from_config(config)),
        Box::new(disk::DiskRule::from_config(config)),
        Box::new(permissions::PermissionsRule::from_config(config)),
        Box::new(process::ProcessRule::from_config(config)),
        Box::new(network::NetworkRule::from_config(config)),
        Box::new(system::SystemRule::from_config(config)),
        Box::new(credentials::CredentialsRule::from_config(config)),
    ]
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::config::Config;
    use crate::parse;
    use crate::risk::{CommandContext, RiskLevel};

    use super::RiskRule;

    /// Run `rule` over every segment of `script`; return the highest level hit.
    pub fn level(rule: &dyn RiskRule, script: &str) -> Option<RiskLevel> {
        let wrappers = Config::default_config().wrappers;
        let mut best = rule.check_script(script).map(|h| h.level);
        for segment in parse::segments(script) {
            let ctx = CommandContext::new(&segment, None, &wrappers);
            if let Some(hit) = rule.check(&ctx) {
                best = best.max(Some(hit.level));
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_in_declaration_order() {
        let rules = catalog(&Config::default_config());
        let order: Vec<Category> = rules.iter().map(|r| r.category()).collect();
        assert_eq!(
            order,
            vec![
                Category::Deletion,
                Category::Disk,
                Category::Permissions,
                Category::Process,
                Category::Network,
                Category::System,
                Category::Credentials,
            ]
        );
    }
}
