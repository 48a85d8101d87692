//! Safer rewrites for risky commands.
//!
//! Suggestions are looked up by the category that matched and built from the
//! matched segment's own words. Nothing is suggested for a category without a
//! known safer equivalent.

use std::path::Path;

use crate::risk::{CommandContext, Finding, RiskClassifier};
use crate::rules::Category;
use crate::rules::permissions::ModeEffect;
use crate::rules::system::ELEVATED_REASON;

/// Suggest safer alternatives for `command`.
pub fn suggest(classifier: &RiskClassifier, command: &str, cwd: Option<&Path>) -> Vec<String> {
    for_findings(&classifier.assess(command, cwd).findings)
}

/// Suggestions for already-computed findings, most severe first.
pub fn for_findings(findings: &[Finding]) -> Vec<String> {
    let mut ordered: Vec<&Finding> = findings.iter().collect();
    ordered.sort_by(|a, b| b.level.cmp(&a.level));

    let mut out = Vec::new();
    for finding in ordered {
        let Some(ctx) = &finding.context else {
            continue;
        };
        let suggestions = match finding.category {
            Category::Deletion => deletion(ctx),
            Category::Disk => disk(ctx),
            Category::Permissions => permissions(ctx),
            Category::Process => process(ctx),
            Category::Network => network(ctx),
            Category::System => system(ctx, finding.reason.starts_with(ELEVATED_REASON)),
            Category::Credentials => credentials(ctx),
        };
        for s in suggestions {
            if !out.contains(&s) {
                out.push(s);
            }
        }
    }
    out
}

pub(crate) fn quote(word: &str) -> String {
    shlex::try_quote(word)
        .map(|q| q.into_owned())
        .unwrap_or_else(|_| word.to_string())
}

/// Shell-quote and join words, leaving a leading `~` unquoted so it still expands.
pub(crate) fn join<'a>(words: impl IntoIterator<Item = &'a str>) -> String {
    words
        .into_iter()
        .map(|w| match w.strip_prefix("~/") {
            _ if w == "~" => w.to_string(),
            Some(rest) if !rest.is_empty() => format!("~/{}", quote(rest)),
            _ => quote(w),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// The segment's words with `replace` applied to each argument (`None` drops it).
fn rewrite(ctx: &CommandContext, replace: impl Fn(&str) -> Option<String>) -> String {
    let mut words = vec![ctx.words.first().cloned().unwrap_or_default()];
    words.extend(ctx.args().iter().filter_map(|a| replace(a)));
    join(words.iter().map(String::as_str))
}

fn deletion(ctx: &CommandContext) -> Vec<String> {
    let operands = ctx.operands();
    match ctx.base_command.as_str() {
        "find" => {
            let cut = ctx
                .args()
                .iter()
                .position(|a| matches!(a.as_str(), "-exec" | "-execdir" | "-ok" | "-okdir"));
            let kept = &ctx.args()[..cut.unwrap_or(ctx.args().len())];
            let mut words = vec!["find"];
            words.extend(
                kept.iter()
                    .map(String::as_str)
                    .map(|a| if a == "-delete" { "-print" } else { a }),
            );
            if cut.is_some() {
                words.push("-print");
            }
            vec![join(words)]
        }
        "git" => match ctx.first_operand().as_deref() {
            Some("clean") => vec!["git clean -n".into()],
            Some("reset") => vec!["git stash".into(), "git diff".into()],
            _ => Vec::new(),
        },
        "rm" => {
            let recursive = ctx.has_short_flag('r') || ctx.has_flag("--recursive");
            let interactive = if recursive { "-ri" } else { "-i" };
            let mut list = vec!["ls", "-la"];
            list.extend(operands.iter().copied());
            let mut rm = vec!["rm", interactive];
            rm.extend(operands.iter().copied());
            vec![join(list), join(rm)]
        }
        "rmdir" | "unlink" | "shred" | "srm" => {
            let mut list = vec!["ls", "-la"];
            list.extend(operands.iter().copied());
            vec![join(list)]
        }
        // A truncating redirect: append instead
        _ => ctx
            .redirects
            .iter()
            .filter(|r| r.truncates())
            .map(|r| format!("{} >> {}", ctx.raw, join([r.target.as_str()])))
            .collect(),
    }
}

fn disk(ctx: &CommandContext) -> Vec<String> {
    let tool = ctx.base_command.as_str();
    let mut out = Vec::new();
    match tool {
        "fdisk" | "sfdisk" | "gdisk" | "parted" => out.push(format!("{tool} -l")),
        "sgdisk" => out.push("sgdisk --print".into()),
        "diskutil" => out.push("diskutil list".into()),
        _ => {}
    }
    out.push("lsblk -f".into());
    out
}

/// Drop group/other write and setuid/setgid from a mode.
fn safer_mode(mode: &str) -> Option<String> {
    if mode.chars().all(|c| c.is_digit(8)) {
        let bits = u32::from_str_radix(mode, 8).ok()?;
        return Some(format!("{:o}", bits & 0o1755));
    }
    let mut safer = mode.replace(['s'], "");
    for (from, to) in [("a+w", "u+w"), ("o+w", "u+w"), ("a=rwx", "u=rwx,go=rx"), ("o=rwx", "o=rx")] {
        safer = safer.replace(from, to);
    }
    if safer.starts_with("+w") {
        safer.replace_range(..2, "u+w");
    }
    let valid = ModeEffect::parse(&safer)?;
    (!valid.world_writable && safer != mode).then_some(safer)
}

fn permissions(ctx: &CommandContext) -> Vec<String> {
    let drop_recursive = |a: &str| {
        if a.eq_ignore_ascii_case("-r") || a == "--recursive" {
            None
        } else {
            Some(a.to_string())
        }
    };
    match ctx.base_command.as_str() {
        "chmod" => {
            let Some(mode) = ctx.args().iter().find(|a| ModeEffect::parse(a).is_some()) else {
                return Vec::new();
            };
            let new_mode = safer_mode(mode);
            let rewritten = rewrite(ctx, |a| {
                if a == mode.as_str() {
                    Some(new_mode.clone().unwrap_or_else(|| a.to_string()))
                } else {
                    drop_recursive(a)
                }
            });
            if rewritten == join(ctx.words.iter().map(String::as_str)) {
                Vec::new()
            } else {
                vec![rewritten]
            }
        }
        _ => {
            let mut list = vec!["ls", "-ld"];
            list.extend(ctx.operands().into_iter().skip(1));
            vec![join(list)]
        }
    }
}

fn process(ctx: &CommandContext) -> Vec<String> {
    match ctx.base_command.as_str() {
        "killall" | "pkill" => match ctx.operands().last() {
            Some(pattern) => vec![join(["pgrep", "-l", *pattern])],
            None => Vec::new(),
        },
        "kill" => {
            let pids: Vec<&str> = ctx
                .args()
                .iter()
                .map(String::as_str)
                .filter(|a| a.chars().all(|c| c.is_ascii_digit()) && *a != "1")
                .collect();
            if pids.is_empty() {
                vec!["ps aux".into()]
            } else {
                let mut term = vec!["kill", "-15"];
                term.extend(pids);
                vec![join(term)]
            }
        }
        _ => Vec::new(),
    }
}

fn find_url(text: &str) -> Option<String> {
    text.split_whitespace()
        .find(|w| w.contains("://"))
        .map(|w| w.trim_matches(|c| matches!(c, '"' | '\'' | ')' | '(')).to_string())
}

fn network(ctx: &CommandContext) -> Vec<String> {
    let url = ctx
        .upstream
        .as_deref()
        .and_then(find_url)
        .or_else(|| find_url(&ctx.raw));
    let runs_download =
        ctx.piped_from.is_some() || ctx.raw.contains("<(") || ctx.raw.contains("$(");
    if runs_download && let Some(url) = url {
        return vec![
            format!("curl -fsSL -o install.sh {}", join([url.as_str()])),
            "less install.sh".into(),
        ];
    }
    let listing = match ctx.base_command.as_str() {
        "iptables" => "iptables -L -n -v",
        "ip6tables" => "ip6tables -L -n -v",
        "ufw" => "ufw status verbose",
        "nft" => "nft list ruleset",
        "firewall-cmd" => "firewall-cmd --list-all",
        "pfctl" => "pfctl -s rules",
        "netsh" => "netsh advfirewall show allprofiles",
        "ip" | "ifconfig" | "ifdown" | "nmcli" => "ip link show",
        "python" | "python3" => "python3 -m http.server --bind 127.0.0.1",
        _ => return Vec::new(),
    };
    vec![listing.to_string()]
}

fn system(ctx: &CommandContext, elevation_only: bool) -> Vec<String> {
    let base = ctx.base_command.as_str();
    let words = || ctx.words.iter().map(String::as_str);
    let mut out = Vec::new();
    match base {
        "apt" | "apt-get" => {
            let mut w = vec!["apt-get", "-s"];
            w.extend(words().skip(1));
            out.push(join(w));
        }
        "dnf" | "yum" => {
            let mut w: Vec<&str> = words().collect();
            w.push("--assumeno");
            out.push(join(w));
        }
        "pip" | "pip3" | "npm" => {
            let mut w: Vec<&str> = words().collect();
            w.push("--dry-run");
            out.push(join(w));
        }
        "brew" => {
            let mut w = vec!["brew", "info"];
            w.extend(ctx.operands().into_iter().skip(1));
            out.push(join(w));
        }
        "systemctl" => {
            let units: Vec<&str> = ctx.operands().into_iter().skip(1).collect();
            if !units.is_empty() {
                let mut w = vec!["systemctl", "status"];
                w.extend(units);
                out.push(join(w));
            }
        }
        "service" => {
            if let Some(name) = ctx.operands().first() {
                out.push(join(["service", *name, "status"]));
            }
        }
        _ => {}
    }
    if out.is_empty() && elevation_only && !ctx.words.is_empty() {
        out.push(join(words()));
    }
    out
}

fn credentials(ctx: &CommandContext) -> Vec<String> {
    if ctx.targets().is_empty() || matches!(ctx.base_command.as_str(), "ls" | "stat") {
        return Vec::new();
    }
    let mut list = vec!["ls", "-l"];
    list.extend(ctx.operands());
    vec![join(list)]
}
