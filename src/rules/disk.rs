use crate::config::Config;
use crate::risk::{CommandContext, RiskLevel, RuleHit};

use super::{Category, RiskRule, operand_list, strongest};

/// Partitioning tools with a read-only listing mode.
const LISTING_TOOLS: &[&str] = &["fdisk", "sfdisk", "gdisk", "sgdisk", "parted", "diskutil"];
/// Listing options, matched case-sensitively (`-L` is a label elsewhere).
const LISTING_FLAGS: &[&str] = &["-l", "--list", "-p", "--print", "-s", "--show"];
const LISTING_WORDS: &[&str] = &["list", "info", "print"];

/// Device node name prefixes for disks and partitions.
const BLOCK_DEVICES: &[&str] = &[
    "sd", "hd", "vd", "xvd", "nvme", "mmcblk", "disk", "rdisk", "md", "dm-", "loop", "mapper/",
];

/// Whether `target` names a disk or partition device node.
pub fn is_block_device(target: &str) -> bool {
    target
        .strip_prefix("/dev/")
        .is_some_and(|node| BLOCK_DEVICES.iter().any(|p| node.starts_with(p)))
}

pub struct DiskRule {
    commands: Vec<String>,
}

impl DiskRule {
    pub fn from_config(config: &Config) -> Self {
        Self {
            commands: config.rules.disk.clone(),
        }
    }

    fn check_tool(&self, ctx: &CommandContext) -> RuleHit {
        let listing = LISTING_TOOLS.contains(&ctx.base_command.as_str())
            && ctx.args().iter().any(|a| {
                LISTING_FLAGS.contains(&a.as_str())
                    || LISTING_WORDS.contains(&a.to_ascii_lowercase().as_str())
            });
        if listing {
            RuleHit::new(
                RiskLevel::Low,
                format!("{} listing partitions", ctx.base_command),
            )
        } else {
            RuleHit::new(
                RiskLevel::Critical,
                format!(
                    "{} formats or repartitions {}",
                    ctx.base_command,
                    operand_list(ctx)
                ),
            )
        }
    }

    fn check_dd(&self, ctx: &CommandContext) -> RuleHit {
        let output = ctx
            .args()
            .iter()
            .find_map(|a| a.strip_prefix("of="))
            .map(str::to_string);
        match output {
            Some(dev) if is_block_device(&dev) => RuleHit::new(
                RiskLevel::Critical,
                format!("dd writes raw data to device {dev}"),
            ),
            Some(file) => RuleHit::new(RiskLevel::High, format!("dd overwrites {file}")),
            None => RuleHit::new(RiskLevel::High, "dd raw copy"),
        }
    }

    fn check_redirects(&self, ctx: &CommandContext) -> Option<RuleHit> {
        ctx.redirects
            .iter()
            .find(|r| is_block_device(&r.target))
            .map(|r| {
                RuleHit::new(
                    RiskLevel::Critical,
                    format!("redirection writes to block device {}", r.target),
                )
            })
    }
}

impl RiskRule for DiskRule {
    fn category(&self) -> Category {
        Category::Disk
    }

    fn check(&self, ctx: &CommandContext) -> Option<RuleHit> {
        let command = if ctx.is_one_of(&self.commands) {
            Some(self.check_tool(ctx))
        } else if ctx.base_command == "dd" {
            Some(self.check_dd(ctx))
        } else {
            None
        };
        strongest([command, self.check_redirects(ctx)])
    }
}
