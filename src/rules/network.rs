use crate::config::Config;
use crate::risk::{CommandContext, RiskLevel, RuleHit};

use super::{Category, RiskRule};

pub struct NetworkRule {
    fetchers: Vec<String>,
    interpreters: Vec<String>,
    firewall: Vec<String>,
    listeners: Vec<String>,
}

impl NetworkRule {
    pub fn from_config(config: &Config) -> Self {
        let rules = &config.rules;
        Self {
            fetchers: rules.fetchers.clone(),
            interpreters: rules.interpreters.clone(),
            firewall: rules.firewall.clone(),
            listeners: rules.listeners.clone(),
        }
    }

    /// `curl ... | sh`, `bash <(curl ...)`, `sh -c "$(wget -O- ...)"`.
    fn runs_download(&self, ctx: &CommandContext) -> Option<String> {
        if !ctx.is_one_of(&self.interpreters) {
            return None;
        }
        if let Some(upstream) = &ctx.piped_from
            && self.fetchers.contains(upstream)
        {
            return Some(upstream.clone());
        }
        let raw = ctx.raw.to_ascii_lowercase();
        self.fetchers
            .iter()
            .find(|f| raw.contains(&format!("<({f}")) || raw.contains(&format!("$({f}")))
            .cloned()
    }

    fn check_firewall(&self, ctx: &CommandContext) -> RuleHit {
        if firewall_listing(ctx) {
            return RuleHit::new(
                RiskLevel::Low,
                format!("{} lists firewall rules", ctx.base_command),
            );
        }
        RuleHit::new(
            RiskLevel::High,
            format!("{} changes firewall rules", ctx.base_command),
        )
        .with_warning("a wrong firewall rule can cut off remote access")
    }

    fn check_listener(&self, ctx: &CommandContext) -> RuleHit {
        let listening = if ctx.base_command == "socat" {
            ctx.args()
                .iter()
                .any(|a| a.to_ascii_uppercase().contains("LISTEN"))
        } else {
            ctx.has_short_flag('l') || ctx.has_flag("--listen")
        };
        if listening {
            RuleHit::new(
                RiskLevel::Medium,
                format!("{} opens a listening socket", ctx.base_command),
            )
        } else {
            RuleHit::new(
                RiskLevel::Low,
                format!("{} opens a raw network connection", ctx.base_command),
            )
        }
    }
}

/// Read-only forms of the firewall tools.
fn firewall_listing(ctx: &CommandContext) -> bool {
    let args = ctx.args();
    match ctx.base_command.as_str() {
        // -L / -S list; lowercase -s is a source address
        "iptables" | "ip6tables" => args.iter().any(|a| {
            a == "--list"
                || a == "--list-rules"
                || (a.starts_with('-') && !a.starts_with("--") && a.contains(['L', 'S']))
        }),
        "ufw" => matches!(ctx.first_operand().as_deref(), Some("status" | "show")),
        "nft" => matches!(ctx.first_operand().as_deref(), Some("list")),
        "firewall-cmd" => args.iter().any(|a| {
            ["--list", "--get", "--query", "--state"]
                .iter()
                .any(|p| a.starts_with(p))
        }),
        "pfctl" => args.iter().any(|a| a.starts_with("-s")),
        "netsh" => ctx.has_arg("show"),
        _ => false,
    }
}

fn brings_interface_down(ctx: &CommandContext) -> bool {
    match ctx.base_command.as_str() {
        "ifdown" => true,
        "ifconfig" => ctx.has_arg("down"),
        "ip" => ctx.has_arg("link") && ctx.has_arg("down"),
        "nmcli" => ["down", "disconnect", "off"].iter().any(|w| ctx.has_arg(w)),
        _ => false,
    }
}

fn serves_files(ctx: &CommandContext) -> bool {
    let args = ctx.args();
    match ctx.base_command.as_str() {
        "python" | "python3" | "python2" => args.windows(2).any(|w| {
            w[0] == "-m" && matches!(w[1].as_str(), "http.server" | "SimpleHTTPServer")
        }),
        "php" => args.iter().any(|a| a == "-S"),
        _ => false,
    }
}

impl RiskRule for NetworkRule {
    fn category(&self) -> Category {
        Category::Network
    }

    fn check(&self, ctx: &CommandContext) -> Option<RuleHit> {
        if let Some(fetcher) = self.runs_download(ctx) {
            return Some(
                RuleHit::new(
                    RiskLevel::Critical,
                    format!(
                        "{fetcher} output executed by {} without review",
                        ctx.base_command
                    ),
                )
                .with_warning("remote code runs with your privileges"),
            );
        }
        if ctx.is_one_of(&self.firewall) {
            return Some(self.check_firewall(ctx));
        }
        if brings_interface_down(ctx) {
            return Some(RuleHit::new(
                RiskLevel::High,
                "network interface taken down",
            ));
        }
        if ctx.is_one_of(&self.listeners) {
            return Some(self.check_listener(ctx));
        }
        if serves_files(ctx) {
            return Some(RuleHit::new(
                RiskLevel::Medium,
                "serves the working directory over HTTP",
            ));
        }
        if ctx.base_command == "ssh" && ctx.args().iter().any(|a| a.starts_with("-R")) {
            return Some(RuleHit::new(
                RiskLevel::Medium,
                "ssh -R exposes a local port on the remote host",
            ));
        }
        if ctx.is_one_of(&self.fetchers) {
            return Some(RuleHit::new(
                RiskLevel::Low,
                format!("{} network fetch", ctx.base_command),
            ));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::testing::level;

    fn rule() -> NetworkRule {
        NetworkRule::from_config(&Config::default_config())
    }

    #[test]
    fn download_piped_into_shell() {
        assert_eq!(
            level(&rule(), "curl -fsSL https://get.example.com | sh"),
            Some(RiskLevel::Critical)
        );
        assert_eq!(
            level(&rule(), "wget -qO- https://x.io/i.sh | sudo bash"),
            Some(RiskLevel::Critical)
        );
        assert_eq!(
            level(&rule(), "bash <(curl -s https://x.io/i.sh)"),
            Some(RiskLevel::Critical)
        );
    }

    #[test]
    fn download_piped_elsewhere_is_low() {
        assert_eq!(level(&rule(), "curl -s https://x.io | jq ."), Some(RiskLevel::Low));
    }

    #[test]
    fn firewall() {
        assert_eq!(level(&rule(), "iptables -F"), Some(RiskLevel::High));
        assert_eq!(level(&rule(), "sudo ufw disable"), Some(RiskLevel::High));
        assert_eq!(level(&rule(), "iptables -L -n"), Some(RiskLevel::Low));
        assert_eq!(level(&rule(), "ufw status verbose"), Some(RiskLevel::Low));
        assert_eq!(level(&rule(), "nft list ruleset"), Some(RiskLevel::Low));
        assert_eq!(level(&rule(), "iptables -A INPUT -s 10.0.0.1 -j DROP"), Some(RiskLevel::High));
    }

    #[test]
    fn interface_down() {
        assert_eq!(level(&rule(), "ip link set eth0 down"), Some(RiskLevel::High));
        assert_eq!(level(&rule(), "ifconfig en0 down"), Some(RiskLevel::High));
        assert_eq!(level(&rule(), "ip addr show"), None);
    }

    #[test]
    fn listeners() {
        assert_eq!(level(&rule(), "nc -lvp 4444"), Some(RiskLevel::Medium));
        assert_eq!(
            level(&rule(), "socat TCP-LISTEN:8080,fork EXEC:/bin/sh"),
            Some(RiskLevel::Medium)
        );
        assert_eq!(level(&rule(), "python3 -m http.server 8000"), Some(RiskLevel::Medium));
        assert_eq!(level(&rule(), "ssh -R 8080:localhost:80 host"), Some(RiskLevel::Medium));
    }

    #[test]
    fn plain_fetch_low() {
        assert_eq!(level(&rule(), "curl https://example.com"), Some(RiskLevel::Low));
    }

    #[test]
    fn unrelated() {
        assert_eq!(level(&rule(), "ping -c 1 example.com"), None);
        assert_eq!(level(&rule(), "ssh host uptime"), None);
        assert_eq!(level(&rule(), "python3 script.py"), None);
    }
}
