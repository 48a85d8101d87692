use crate::config::{Config, RuleConfig};
use crate::risk::{CommandContext, RiskLevel, RuleHit};

use super::{Category, RiskRule, strongest};

/// Reason prefix of the hit for a command that is only risky because it is elevated.
pub const ELEVATED_REASON: &str = "runs with elevated privileges via";

pub struct SystemRule {
    rules: RuleConfig,
}

impl SystemRule {
    pub fn from_config(config: &Config) -> Self {
        Self {
            rules: config.rules.clone(),
        }
    }

    fn check_power(&self, ctx: &CommandContext) -> Option<RuleHit> {
        let init_halt = ctx.base_command == "init"
            && matches!(ctx.first_operand().as_deref(), Some("0" | "6"));
        (ctx.is_one_of(&self.rules.power) || init_halt).then(|| {
            RuleHit::new(
                RiskLevel::Critical,
                format!("{} changes the machine's power state", ctx.base_command),
            )
        })
    }

    /// Package operations are matched case-sensitively: `pacman -S` installs,
    /// `pacman -Ss` searches.
    fn check_packages(&self, ctx: &CommandContext) -> Option<RuleHit> {
        if !ctx.is_one_of(&self.rules.package_managers) {
            return None;
        }
        let manager = &ctx.base_command;
        ctx.args().iter().find_map(|arg| {
            if self.rules.package_removal.contains(arg) {
                Some(RuleHit::new(
                    RiskLevel::High,
                    format!("{manager} {arg} removes packages"),
                ))
            } else if self.rules.package_mutating.contains(arg) {
                Some(RuleHit::new(
                    RiskLevel::Medium,
                    format!("{manager} {arg} changes installed packages"),
                ))
            } else {
                None
            }
        })
    }

    fn check_services(&self, ctx: &CommandContext) -> Option<RuleHit> {
        if !ctx.is_one_of(&self.rules.services) {
            return None;
        }
        let manager = &ctx.base_command;
        let operands: Vec<String> = ctx
            .operands()
            .iter()
            .map(|o| o.to_ascii_lowercase())
            .collect();
        if let Some(op) = operands.iter().find(|o| self.rules.power.contains(o)) {
            return Some(RuleHit::new(
                RiskLevel::Critical,
                format!("{manager} {op} changes the machine's power state"),
            ));
        }
        if let Some(op) = operands
            .iter()
            .find(|o| self.rules.service_disruptive.contains(o))
        {
            return Some(
                RuleHit::new(RiskLevel::High, format!("{manager} {op} takes a service down"))
                    .with_warning("dependent services may stop working"),
            );
        }
        let read_only = operands.is_empty()
            || self
                .rules
                .service_read_only
                .iter()
                .any(|r| operands.contains(r) || ctx.has_flag(r));
        if read_only {
            return None;
        }
        Some(RuleHit::new(
            RiskLevel::Medium,
            format!("{manager} changes service state"),
        ))
    }

    fn check_accounts(&self, ctx: &CommandContext) -> Option<RuleHit> {
        if ctx.is_one_of(&self.rules.accounts) {
            return Some(RuleHit::new(
                RiskLevel::High,
                format!("{} modifies user accounts or privileges", ctx.base_command),
            ));
        }
        if ctx.base_command == "crontab" && ctx.has_flag("-r") {
            return Some(RuleHit::new(
                RiskLevel::High,
                "crontab -r deletes every scheduled job",
            ));
        }
        None
    }
}

impl RiskRule for SystemRule {
    fn category(&self) -> Category {
        Category::System
    }

    fn check(&self, ctx: &CommandContext) -> Option<RuleHit> {
        let mut hit = self
            .check_power(ctx)
            .or_else(|| self.check_packages(ctx))
            .or_else(|| self.check_services(ctx))
            .or_else(|| self.check_accounts(ctx));

        let Some(by) = &ctx.elevated_by else {
            return hit;
        };
        if let Some(hit) = hit.as_mut() {
            hit.warnings.push(format!("runs as root via {by}"));
        }
        let elevated = RuleHit::new(
            RiskLevel::Medium,
            format!("{ELEVATED_REASON} {by}"),
        );
        strongest([hit, Some(elevated)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::testing::level;

    fn rule() -> SystemRule {
        SystemRule::from_config(&Config::default_config())
    }

    #[test]
    fn power() {
        assert_eq!(level(&rule(), "shutdown -h now"), Some(RiskLevel::Critical));
        assert_eq!(level(&rule(), "sudo reboot"), Some(RiskLevel::Critical));
        assert_eq!(level(&rule(), "init 0"), Some(RiskLevel::Critical));
        assert_eq!(level(&rule(), "systemctl poweroff"), Some(RiskLevel::Critical));
    }

    #[test]
    fn packages() {
        assert_eq!(level(&rule(), "apt-get -y remove nginx"), Some(RiskLevel::High));
        assert_eq!(level(&rule(), "pacman -Rns foo"), Some(RiskLevel::High));
        assert_eq!(level(&rule(), "pip uninstall requests"), Some(RiskLevel::High));
        assert_eq!(level(&rule(), "brew install jq"), Some(RiskLevel::Medium));
        assert_eq!(level(&rule(), "pacman -S foo"), Some(RiskLevel::Medium));
        assert_eq!(level(&rule(), "pip install -r requirements.txt"), Some(RiskLevel::Medium));
    }

    #[test]
    fn package_queries_do_not_match() {
        assert_eq!(level(&rule(), "pacman -Ss foo"), None);
        assert_eq!(level(&rule(), "dpkg -l"), None);
        assert_eq!(level(&rule(), "brew list"), None);
        assert_eq!(level(&rule(), "pip show requests"), None);
    }

    #[test]
    fn services() {
        assert_eq!(level(&rule(), "systemctl stop nginx"), Some(RiskLevel::High));
        assert_eq!(level(&rule(), "service sshd stop"), Some(RiskLevel::High));
        assert_eq!(level(&rule(), "systemctl restart nginx"), Some(RiskLevel::Medium));
        assert_eq!(level(&rule(), "systemctl status nginx"), None);
        assert_eq!(level(&rule(), "service --status-all"), None);
        assert_eq!(level(&rule(), "systemctl"), None);
    }

    #[test]
    fn accounts() {
        assert_eq!(level(&rule(), "userdel bob"), Some(RiskLevel::High));
        assert_eq!(level(&rule(), "crontab -r"), Some(RiskLevel::High));
        assert_eq!(level(&rule(), "crontab -l"), None);
    }

    #[test]
    fn elevation_alone_is_medium() {
        assert_eq!(level(&rule(), "sudo ls /root"), Some(RiskLevel::Medium));
        assert_eq!(level(&rule(), "sudo -l"), None);
    }

    #[test]
    fn elevation_annotates_stronger_hit() {
        let wrappers = Config::default_config().wrappers;
        let seg = crate::parse::Segment::new("sudo systemctl stop nginx");
        let hit = rule().check(&CommandContext::new(&seg, None, &wrappers)).unwrap();
        assert_eq!(hit.level, RiskLevel::High);
        assert!(hit.warnings.iter().any(|w| w == "runs as root via sudo"));
    }
}
