use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::risk::RiskLevel;

/// Embedded default configuration.
const DEFAULT_CONFIG: &str = include_str!("../config.default.toml");

// ── Final (merged) config types ──

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub wrappers: WrapperConfig,
    #[serde(default)]
    pub paths: PathConfig,
    #[serde(default)]
    pub rules: RuleConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default = "default_true")]
    pub safe_mode: bool,
    #[serde(default = "default_block_at")]
    pub block_at: RiskLevel,
    #[serde(default = "default_confirm_at")]
    pub confirm_at: RiskLevel,
    #[serde(default)]
    pub escalate_block: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            safe_mode: true,
            block_at: default_block_at(),
            confirm_at: default_confirm_at(),
            escalate_block: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_block_at() -> RiskLevel {
    RiskLevel::Critical
}

fn default_confirm_at() -> RiskLevel {
    RiskLevel::Medium
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub shell: String,
    /// Seconds before a running command is killed. 0 disables the timeout.
    #[serde(default)]
    pub timeout_secs: u64,
    /// Bytes captured per output stream.
    #[serde(default)]
    pub max_output_bytes: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct HistoryConfig {
    #[serde(default)]
    pub capacity: usize,
    #[serde(default)]
    pub summary_chars: usize,
    #[serde(default)]
    pub dir: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ModelConfig {
    /// External program that reads a prompt on stdin and answers on stdout.
    #[serde(default)]
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub synthesis_tokens: u32,
    #[serde(default)]
    pub retry_tokens: u32,
    #[serde(default)]
    pub answer_tokens: u32,
    #[serde(default)]
    pub system_prompt_file: String,
}

/// Commands that execute their arguments as another command.
/// The wrapped command is extracted and classified in their place.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct WrapperConfig {
    /// e.g. env, nohup, nice, timeout, xargs
    #[serde(default)]
    pub transparent: Vec<String>,
    /// e.g. sudo, doas, pkexec: the wrapped command runs elevated.
    #[serde(default)]
    pub elevating: Vec<String>,
    /// Shells whose `-c` script argument is classified recursively.
    #[serde(default)]
    pub shells: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct PathConfig {
    /// System and home locations whose wholesale removal or opening-up is refused.
    #[serde(default)]
    pub protected: Vec<String>,
    /// Files and directories holding credentials or history.
    #[serde(default)]
    pub sensitive: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RuleConfig {
    #[serde(default)]
    pub deletion: Vec<String>,
    #[serde(default)]
    pub disk: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub process: Vec<String>,
    #[serde(default)]
    pub firewall: Vec<String>,
    #[serde(default)]
    pub listeners: Vec<String>,
    #[serde(default)]
    pub fetchers: Vec<String>,
    #[serde(default)]
    pub interpreters: Vec<String>,
    #[serde(default)]
    pub package_managers: Vec<String>,
    #[serde(default)]
    pub package_mutating: Vec<String>,
    #[serde(default)]
    pub package_removal: Vec<String>,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub service_read_only: Vec<String>,
    #[serde(default)]
    pub service_disruptive: Vec<String>,
    #[serde(default)]
    pub power: Vec<String>,
    #[serde(default)]
    pub accounts: Vec<String>,
}

// ── Overlay types (user config that merges with defaults) ──

#[derive(Debug, Deserialize, Default)]
struct ConfigOverlay {
    #[serde(default)]
    settings: SettingsOverlay,
    #[serde(default)]
    execution: ExecutionOverlay,
    #[serde(default)]
    history: HistoryOverlay,
    #[serde(default)]
    model: ModelOverlay,
    #[serde(default)]
    wrappers: WrappersOverlay,
    #[serde(default)]
    paths: PathsOverlay,
    #[serde(default)]
    rules: RulesOverlay,
}

#[derive(Debug, Deserialize, Default)]
struct SettingsOverlay {
    safe_mode: Option<bool>,
    block_at: Option<RiskLevel>,
    confirm_at: Option<RiskLevel>,
    escalate_block: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct ExecutionOverlay {
    shell: Option<String>,
    timeout_secs: Option<u64>,
    max_output_bytes: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct HistoryOverlay {
    capacity: Option<usize>,
    summary_chars: Option<usize>,
    dir: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelOverlay {
    program: Option<String>,
    args: Option<Vec<String>>,
    synthesis_tokens: Option<u32>,
    retry_tokens: Option<u32>,
    answer_tokens: Option<u32>,
    system_prompt_file: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct WrappersOverlay {
    #[serde(default)]
    replace: bool,
    #[serde(default)]
    transparent: Vec<String>,
    #[serde(default)]
    elevating: Vec<String>,
    #[serde(default)]
    shells: Vec<String>,
    #[serde(default)]
    remove_transparent: Vec<String>,
    #[serde(default)]
    remove_elevating: Vec<String>,
    #[serde(default)]
    remove_shells: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
struct PathsOverlay {
    #[serde(default)]
    replace: bool,
    #[serde(default)]
    protected: Vec<String>,
    #[serde(default)]
    sensitive: Vec<String>,
    #[serde(default)]
    remove_protected: Vec<String>,
    #[serde(default)]
    remove_sensitive: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RulesOverlay {
    #[serde(default)]
    replace: bool,
    #[serde(default)]
    deletion: Vec<String>,
    #[serde(default)]
    disk: Vec<String>,
    #[serde(default)]
    permissions: Vec<String>,
    #[serde(default)]
    process: Vec<String>,
    #[serde(default)]
    firewall: Vec<String>,
    #[serde(default)]
    listeners: Vec<String>,
    #[serde(default)]
    fetchers: Vec<String>,
    #[serde(default)]
    interpreters: Vec<String>,
    #[serde(default)]
    package_managers: Vec<String>,
    #[serde(default)]
    package_mutating: Vec<String>,
    #[serde(default)]
    package_removal: Vec<String>,
    #[serde(default)]
    services: Vec<String>,
    #[serde(default)]
    service_read_only: Vec<String>,
    #[serde(default)]
    service_disruptive: Vec<String>,
    #[serde(default)]
    power: Vec<String>,
    #[serde(default)]
    accounts: Vec<String>,
    #[serde(default)]
    remove_deletion: Vec<String>,
    #[serde(default)]
    remove_disk: Vec<String>,
    #[serde(default)]
    remove_permissions: Vec<String>,
    #[serde(default)]
    remove_process: Vec<String>,
    #[serde(default)]
    remove_firewall: Vec<String>,
    #[serde(default)]
    remove_listeners: Vec<String>,
    #[serde(default)]
    remove_fetchers: Vec<String>,
    #[serde(default)]
    remove_interpreters: Vec<String>,
    #[serde(default)]
    remove_package_managers: Vec<String>,
    #[serde(default)]
    remove_package_mutating: Vec<String>,
    #[serde(default)]
    remove_package_removal: Vec<String>,
    #[serde(default)]
    remove_services: Vec<String>,
    #[serde(default)]
    remove_service_read_only: Vec<String>,
    #[serde(default)]
    remove_service_disruptive: Vec<String>,
    #[serde(default)]
    remove_power: Vec<String>,
    #[serde(default)]
    remove_accounts: Vec<String>,
}

// ── Merge logic ──

/// Merge a user list into a default list.
/// In replace mode: user list replaces default entirely.
/// In merge mode: remove items first, then extend with additions (deduped).
fn merge_list(base: &mut Vec<String>, add: Vec<String>, remove: &[String], replace: bool) {
    if replace {
        *base = add;
    } else {
        base.retain(|item| !remove.contains(item));
        for item in add {
            if !base.contains(&item) {
                base.push(item);
            }
        }
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

impl Config {
    /// Load the default embedded configuration.
    pub fn default_config() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("embedded default config must parse")
    }

    /// Load configuration with resolution order:
    /// 1. Start with embedded defaults
    /// 2. Merge user overlay from ~/.config/askgate/config.toml (if exists)
    ///
    /// User config merges with defaults: lists extend, scalars override.
    /// Set `replace = true` in a list section to replace its defaults entirely.
    /// Use `remove_<field>` lists to subtract specific items from defaults.
    pub fn load() -> Self {
        let mut config = Self::default_config();
        if let Some(overlay) = Self::load_overlay() {
            config.apply_overlay(overlay);
        }
        config
    }

    /// Path of the user overlay, if a home directory is known.
    pub fn overlay_path() -> Option<PathBuf> {
        let home = std::env::var_os("HOME")?;
        Some(PathBuf::from(home).join(".config/askgate/config.toml"))
    }

    fn load_overlay() -> Option<ConfigOverlay> {
        let path = Self::overlay_path()?;
        let content = std::fs::read_to_string(&path).ok()?;
        match toml::from_str(&content) {
            Ok(overlay) => Some(overlay),
            Err(e) => {
                log::warn!("ignoring {}: config parse error: {e}", path.display());
                None
            }
        }
    }

    /// History directory with `~` and env vars expanded.
    pub fn history_dir(&self) -> PathBuf {
        PathBuf::from(crate::risk::paths::expand(&self.history.dir))
    }

    /// Serialize the merged config back to TOML (for `--dump-config`).
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Apply an overlay on top of this config (merge semantics).
    fn apply_overlay(&mut self, overlay: ConfigOverlay) {
        // Scalars
        let s = overlay.settings;
        set(&mut self.settings.safe_mode, s.safe_mode);
        set(&mut self.settings.block_at, s.block_at);
        set(&mut self.settings.confirm_at, s.confirm_at);
        set(&mut self.settings.escalate_block, s.escalate_block);

        let e = overlay.execution;
        set(&mut self.execution.shell, e.shell);
        set(&mut self.execution.timeout_secs, e.timeout_secs);
        set(&mut self.execution.max_output_bytes, e.max_output_bytes);

        let h = overlay.history;
        set(&mut self.history.capacity, h.capacity);
        set(&mut self.history.summary_chars, h.summary_chars);
        set(&mut self.history.dir, h.dir);

        let m = overlay.model;
        set(&mut self.model.program, m.program);
        set(&mut self.model.args, m.args);
        set(&mut self.model.synthesis_tokens, m.synthesis_tokens);
        set(&mut self.model.retry_tokens, m.retry_tokens);
        set(&mut self.model.answer_tokens, m.answer_tokens);
        set(&mut self.model.system_prompt_file, m.system_prompt_file);

        // Wrappers
        let w = overlay.wrappers;
        merge_list(
            &mut self.wrappers.transparent,
            w.transparent,
            &w.remove_transparent,
            w.replace,
        );
        merge_list(
            &mut self.wrappers.elevating,
            w.elevating,
            &w.remove_elevating,
            w.replace,
        );
        merge_list(&mut self.wrappers.shells, w.shells, &w.remove_shells, w.replace);

        // Paths
        let p = overlay.paths;
        merge_list(
            &mut self.paths.protected,
            p.protected,
            &p.remove_protected,
            p.replace,
        );
        merge_list(
            &mut self.paths.sensitive,
            p.sensitive,
            &p.remove_sensitive,
            p.replace,
        );

        // Rules
        let r = overlay.rules;
        let rules = &mut self.rules;
        merge_list(&mut rules.deletion, r.deletion, &r.remove_deletion, r.replace);
        merge_list(&mut rules.disk, r.disk, &r.remove_disk, r.replace);
        merge_list(
            &mut rules.permissions,
            r.permissions,
            &r.remove_permissions,
            r.replace,
        );
        merge_list(&mut rules.process, r.process, &r.remove_process, r.replace);
        merge_list(&mut rules.firewall, r.firewall, &r.remove_firewall, r.replace);
        merge_list(&mut rules.listeners, r.listeners, &r.remove_listeners, r.replace);
        merge_list(&mut rules.fetchers, r.fetchers, &r.remove_fetchers, r.replace);
        merge_list(
            &mut rules.interpreters,
            r.interpreters,
            &r.remove_interpreters,
            r.replace,
        );
        merge_list(
            &mut rules.package_managers,
            r.package_managers,
            &r.remove_package_managers,
            r.replace,
        );
        merge_list(
            &mut rules.package_mutating,
            r.package_mutating,
            &r.remove_package_mutating,
            r.replace,
        );
        merge_list(
            &mut rules.package_removal,
            r.package_removal,
            &r.remove_package_removal,
            r.replace,
        );
        merge_list(&mut rules.services, r.services, &r.remove_services, r.replace);
        merge_list(
            &mut rules.service_read_only,
            r.service_read_only,
            &r.remove_service_read_only,
            r.replace,
        );
        merge_list(
            &mut rules.service_disruptive,
            r.service_disruptive,
            &r.remove_service_disruptive,
            r.replace,
        );
        merge_list(&mut rules.power, r.power, &r.remove_power, r.replace);
        merge_list(&mut rules.accounts, r.accounts, &r.remove_accounts, r.replace);
    }

    /// Apply an overlay from a TOML string. Used for testing.
    #[cfg(test)]
    pub(crate) fn apply_overlay_str(&mut self, toml_str: &str) {
        let overlay: ConfigOverlay = toml::from_str(toml_str).unwrap();
        self.apply_overlay(overlay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_parses() {
        let config = Config::default_config();
        assert!(config.settings.safe_mode);
        assert!(!config.rules.deletion.is_empty());
        assert!(!config.rules.disk.is_empty());
        assert!(!config.paths.protected.is_empty());
        assert!(!config.paths.sensitive.is_empty());
        assert!(!config.wrappers.elevating.is_empty());
    }

    #[test]
    fn default_policy_thresholds() {
        let config = Config::default_config();
        assert_eq!(config.settings.block_at, RiskLevel::Critical);
        assert_eq!(config.settings.confirm_at, RiskLevel::Medium);
        assert!(!config.settings.escalate_block);
    }

    #[test]
    fn default_limits() {
        let config = Config::default_config();
        assert_eq!(config.history.capacity, 20);
        assert_eq!(config.history.summary_chars, 200);
        assert_eq!(config.execution.timeout_secs, 120);
        assert_eq!(config.execution.max_output_bytes, 1024 * 1024);
        assert_eq!(config.model.synthesis_tokens, 200);
        assert_eq!(config.model.retry_tokens, 50);
        assert_eq!(config.model.answer_tokens, 300);
    }

    #[test]
    fn default_model_unconfigured() {
        let config = Config::default_config();
        assert!(config.model.program.is_empty());
    }

    // ── Merge semantics ──

    #[test]
    fn overlay_extends_deletion_list() {
        let mut config = Config::default_config();
        config.apply_overlay_str(
            r#"
            [rules]
            deletion = ["trash-empty"]
        "#,
        );
        assert!(config.rules.deletion.contains(&"rm".to_string()));
        assert!(config.rules.deletion.contains(&"trash-empty".to_string()));
    }

    #[test]
    fn overlay_removes_protected_path() {
        let mut config = Config::default_config();
        config.apply_overlay_str(
            r#"
            [paths]
            remove_protected = ["/opt"]
        "#,
        );
        assert!(!config.paths.protected.contains(&"/opt".to_string()));
        assert!(config.paths.protected.contains(&"/etc".to_string()));
    }

    #[test]
    fn overlay_replace_wrappers() {
        let mut config = Config::default_config();
        config.apply_overlay_str(
            r#"
            [wrappers]
            replace = true
            elevating = ["sudo"]
        "#,
        );
        assert_eq!(config.wrappers.elevating, vec!["sudo"]);
        assert!(config.wrappers.transparent.is_empty());
        assert!(config.wrappers.shells.is_empty());
    }

    #[test]
    fn overlay_scalars_override() {
        let mut config = Config::default_config();
        config.apply_overlay_str(
            r#"
            [settings]
            escalate_block = true
            confirm_at = "high"

            [execution]
            timeout_secs = 5

            [model]
            program = "llm"
            args = ["-m", "local"]
        "#,
        );
        assert!(config.settings.escalate_block);
        assert_eq!(config.settings.confirm_at, RiskLevel::High);
        assert_eq!(config.settings.block_at, RiskLevel::Critical);
        assert_eq!(config.execution.timeout_secs, 5);
        assert_eq!(config.model.program, "llm");
        assert_eq!(config.model.args, vec!["-m", "local"]);
        // Untouched scalars keep defaults
        assert_eq!(config.model.answer_tokens, 300);
    }

    #[test]
    fn overlay_no_duplicates() {
        let mut config = Config::default_config();
        config.apply_overlay_str(
            r#"
            [rules]
            fetchers = ["curl"]
        "#,
        );
        let count = config.rules.fetchers.iter().filter(|s| *s == "curl").count();
        assert_eq!(count, 1);
    }

    #[test]
    fn overlay_unrelated_sections_untouched() {
        let mut config = Config::default_config();
        let original_sensitive = config.paths.sensitive.clone();
        config.apply_overlay_str(
            r#"
            [rules]
            power = ["suspend"]
        "#,
        );
        assert_eq!(config.paths.sensitive, original_sensitive);
    }

    #[test]
    fn empty_overlay_changes_nothing() {
        let original = Config::default_config();
        let mut config = Config::default_config();
        config.apply_overlay_str("");
        assert_eq!(config.rules.deletion, original.rules.deletion);
        assert_eq!(config.paths.protected, original.paths.protected);
        assert_eq!(config.history.capacity, original.history.capacity);
    }

    #[test]
    fn dump_round_trips() {
        let config = Config::default_config();
        let dumped = config.to_toml().unwrap();
        let reparsed: Config = toml::from_str(&dumped).unwrap();
        assert_eq!(reparsed.rules.power, config.rules.power);
    }
}
