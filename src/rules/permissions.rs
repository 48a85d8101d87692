use crate::config::Config;
use crate::risk::paths::{GuardedPaths, Target};
use crate::risk::{CommandContext, RiskLevel, RuleHit};

use super::{Category, RiskRule};

/// What a chmod mode argument grants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModeEffect {
    pub world_writable: bool,
    pub setid: bool,
}

impl ModeEffect {
    /// Parse an octal (`755`, `4755`) or symbolic (`u+x,go-w`, `+s`) mode.
    pub fn parse(mode: &str) -> Option<Self> {
        if !mode.is_empty() && mode.len() <= 4 && mode.chars().all(|c| c.is_digit(8)) {
            let bits = u32::from_str_radix(mode, 8).ok()?;
            return Some(Self {
                world_writable: bits & 0o002 != 0,
                setid: bits & 0o6000 != 0,
            });
        }

        let mut effect = Self::default();
        for clause in mode.split(',') {
            let who_len = clause
                .find(|c: char| !matches!(c, 'u' | 'g' | 'o' | 'a'))
                .unwrap_or(clause.len());
            let (who, actions) = clause.split_at(who_len);
            if actions.is_empty() {
                return None;
            }
            let reaches_others = who.is_empty() || who.contains(['o', 'a']);
            let mut op = None;
            for c in actions.chars() {
                match c {
                    '+' | '-' | '=' => op = Some(c),
                    'r' | 'w' | 'x' | 'X' | 's' | 't' | 'u' | 'g' | 'o' => {
                        let granting = matches!(op?, '+' | '=');
                        if granting && c == 'w' && reaches_others {
                            effect.world_writable = true;
                        }
                        if granting && c == 's' {
                            effect.setid = true;
                        }
                    }
                    _ => return None,
                }
            }
            op?;
        }
        Some(effect)
    }
}

pub struct PermissionsRule {
    commands: Vec<String>,
    guarded: GuardedPaths,
}

impl PermissionsRule {
    pub fn from_config(config: &Config) -> Self {
        Self {
            commands: config.rules.permissions.clone(),
            guarded: GuardedPaths::from_config(&config.paths),
        }
    }
}

/// The mode argument of a chmod and the paths after it.
fn chmod_args(ctx: &CommandContext) -> (Option<ModeEffect>, Vec<Target>) {
    let args = ctx.args();
    let Some(at) = args.iter().position(|a| ModeEffect::parse(a).is_some()) else {
        return (None, ctx.targets());
    };
    let targets = args[at + 1..]
        .iter()
        .filter(|a| !a.starts_with('-'))
        .map(|a| ctx.resolve(a))
        .collect();
    (ModeEffect::parse(&args[at]), targets)
}

impl RiskRule for PermissionsRule {
    fn category(&self) -> Category {
        Category::Permissions
    }

    fn check(&self, ctx: &CommandContext) -> Option<RuleHit> {
        if !ctx.is_one_of(&self.commands) {
            return None;
        }
        let command = ctx.base_command.as_str();
        let recursive = ctx.has_short_flag('r')
            || ctx.has_flag("--recursive")
            || (matches!(command, "icacls" | "takeown") && (ctx.has_arg("/t") || ctx.has_arg("/r")));

        let (effect, targets) = match command {
            "chmod" => {
                let (effect, targets) = chmod_args(ctx);
                (effect.unwrap_or_default(), targets)
            }
            // Owner or group comes first
            "chown" | "chgrp" => (
                ModeEffect::default(),
                ctx.targets().into_iter().skip(1).collect(),
            ),
            _ => (ModeEffect::default(), ctx.targets()),
        };

        if effect.world_writable
            && let Some(t) = targets.iter().find(|t| self.guarded.guards_file(&t.path))
        {
            return Some(RuleHit::new(
                RiskLevel::Critical,
                format!("{command} makes protected path {} world-writable", t.word),
            ));
        }
        if recursive && let Some(t) = targets.iter().find(|t| self.guarded.reaches(&t.path)) {
            return Some(RuleHit::new(
                RiskLevel::Critical,
                format!("recursive {command} on protected path {}", t.word),
            ));
        }
        if effect.setid {
            return Some(RuleHit::new(
                RiskLevel::High,
                format!("{command} sets setuid/setgid bits"),
            ));
        }
        if effect.world_writable {
            return Some(
                RuleHit::new(RiskLevel::Medium, format!("{command} grants world write access"))
                    .with_warning("any local user can modify the target"),
            );
        }
        if recursive {
            return Some(RuleHit::new(
                RiskLevel::Medium,
                format!("recursive {command}"),
            ));
        }
        if command != "chmod" {
            return Some(RuleHit::new(
                RiskLevel::Medium,
                format!("{command} changes ownership or access lists"),
            ));
        }
        Some(RuleHit::new(RiskLevel::Low, "file mode change"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::testing::level;

    fn rule() -> PermissionsRule {
        PermissionsRule::from_config(&Config::default_config())
    }

    #[test]
    fn octal_modes() {
        let m = ModeEffect::parse("777").unwrap();
        assert!(m.world_writable);
        assert!(!m.setid);
        let m = ModeEffect::parse("4755").unwrap();
        assert!(m.setid);
        assert!(!m.world_writable);
        assert_eq!(ModeEffect::parse("644"), Some(ModeEffect::default()));
    }

    #[test]
    fn symbolic_modes() {
        assert!(ModeEffect::parse("o+w").unwrap().world_writable);
        assert!(ModeEffect::parse("a=rwx").unwrap().world_writable);
        assert!(ModeEffect::parse("+w").unwrap().world_writable);
        assert!(!ModeEffect::parse("u+w").unwrap().world_writable);
        assert!(!ModeEffect::parse("o-w").unwrap().world_writable);
        assert!(ModeEffect::parse("u+s").unwrap().setid);
        assert!(ModeEffect::parse("-x").is_some());
    }

    #[test]
    fn non_modes() {
        assert_eq!(ModeEffect::parse("-R"), None);
        assert_eq!(ModeEffect::parse("file.txt"), None);
        assert_eq!(ModeEffect::parse("ugo"), None);
        assert_eq!(ModeEffect::parse("88"), None);
    }

    #[test]
    fn world_writable_protected() {
        assert_eq!(level(&rule(), "chmod 777 /etc/passwd"), Some(RiskLevel::Critical));
        assert_eq!(level(&rule(), "chmod -R 777 /"), Some(RiskLevel::Critical));
        assert_eq!(level(&rule(), "chmod o+w ~/.ssh/id_rsa"), Some(RiskLevel::Critical));
    }

    #[test]
    fn recursive_protected() {
        assert_eq!(level(&rule(), "chown -R nobody /usr"), Some(RiskLevel::Critical));
    }

    #[test]
    fn setid_high() {
        assert_eq!(level(&rule(), "chmod u+s ./tool"), Some(RiskLevel::High));
    }

    #[test]
    fn medium_cases() {
        assert_eq!(level(&rule(), "chmod 777 shared/"), Some(RiskLevel::Medium));
        assert_eq!(level(&rule(), "chmod -R 755 build"), Some(RiskLevel::Medium));
        assert_eq!(level(&rule(), "chown me:me notes.txt"), Some(RiskLevel::Medium));
    }

    #[test]
    fn plain_chmod_low() {
        assert_eq!(level(&rule(), "chmod +x run.sh"), Some(RiskLevel::Low));
        assert_eq!(level(&rule(), "chmod 644 notes.txt"), Some(RiskLevel::Low));
    }

    #[test]
    fn unrelated() {
        assert_eq!(level(&rule(), "ls -l"), None);
    }
}
