use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;

use simplelog::{
    ColorChoice, CombinedLogger, Config, LevelFilter, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

use crate::risk::Verdict;

/// Target of the one-line-per-decision audit records.
pub const DECISION_TARGET: &str = "askgate::decision";

/// `~/.local/share/askgate`, if there is a home directory.
pub fn data_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".local/share/askgate"))
}

/// Install the global logger: warnings (or everything with `verbose`) on
/// stderr, plus info and above appended to `askgate.log` when it can be opened.
pub fn init(verbose: bool) {
    let term_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        term_level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];
    if let Some(file) = open_log_file() {
        loggers.push(WriteLogger::new(LevelFilter::Info, Config::default(), file));
    }
    // Only fails if a logger is already installed.
    let _ = CombinedLogger::init(loggers);
}

fn open_log_file() -> Option<File> {
    let dir = data_dir()?;
    fs::create_dir_all(&dir).ok()?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("askgate.log"))
        .ok()
}

/// Record a gate decision.
pub fn log_decision(command: &str, verdict: &Verdict) {
    let command: String = command.chars().take(200).collect();
    let reason = verdict
        .blocked_reason
        .as_deref()
        .unwrap_or(&verdict.reason)
        .replace('\n', "; ");
    log::info!(
        target: DECISION_TARGET,
        "{action}\t{level}\tallowed={allowed}\tconfirm={confirm}\t{command}\t{reason}",
        action = verdict.action().as_str(),
        level = verdict.risk_level,
        allowed = verdict.allowed,
        confirm = verdict.requires_confirmation,
        command = command.replace('\n', "; "),
    );
}
