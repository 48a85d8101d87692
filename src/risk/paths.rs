//! Lexical path handling for command targets.
//!
//! Nothing here touches the filesystem: classification must give the same
//! answer whether or not a path exists.

use std::path::{Component, Path, PathBuf};

use crate::config::PathConfig;

/// Expand `~` and `$VAR` references. Unknown variables are left as written.
pub fn expand(word: &str) -> String {
    match shellexpand::full(word) {
        Ok(expanded) => expanded.into_owned(),
        Err(_) => shellexpand::tilde(word).into_owned(),
    }
}

/// Resolve `.` and `..` components without consulting the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(out.components().next_back(), Some(Component::Normal(_)))
                    && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            Component::Normal(name) => out.push(name),
        }
    }
    out
}

fn has_glob(name: &str) -> bool {
    name.contains(['*', '?', '['])
}

/// A path argument as it will be seen by the command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// The word as written on the command line.
    pub word: String,
    /// Expanded, normalized path. For a trailing glob (`/etc/*`) this is the
    /// directory the glob ranges over.
    pub path: PathBuf,
    /// The final component was a glob pattern.
    pub glob: bool,
}

/// Resolve a command-line word against an optional working directory.
pub fn resolve(word: &str, cwd: Option<&Path>) -> Target {
    let expanded = expand(word);
    let mut path = PathBuf::from(&expanded);
    if path.is_relative()
        && let Some(cwd) = cwd
    {
        path = cwd.join(path);
    }
    let mut path = normalize(&path);
    let glob = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(has_glob);
    if glob {
        path.pop();
    }
    Target {
        word: word.to_string(),
        path,
        glob,
    }
}

/// A configured set of paths (`protected` or `sensitive`).
#[derive(Debug, Clone, Default)]
pub struct PathSet {
    entries: Vec<PathBuf>,
}

impl PathSet {
    pub fn from_config(entries: &[String]) -> Self {
        Self {
            entries: entries
                .iter()
                .map(|e| normalize(Path::new(&expand(e))))
                .filter(|p| !p.as_os_str().is_empty())
                .collect(),
        }
    }

    /// `path` is exactly one of the entries.
    pub fn is_exact(&self, path: &Path) -> bool {
        self.entries.iter().any(|e| e == path)
    }

    /// `path` is one of the entries or lies beneath one.
    pub fn covers(&self, path: &Path) -> bool {
        self.entries.iter().any(|e| path.starts_with(e))
    }

    /// `path` is an entry, lies beneath one, or contains one.
    ///
    /// Used for recursive operations: `rm -r ~/` reaches `~/.ssh`.
    pub fn overlaps(&self, path: &Path) -> bool {
        !path.as_os_str().is_empty()
            && self
                .entries
                .iter()
                .any(|e| path.starts_with(e) || e.starts_with(path))
    }
}

/// The configured protected and sensitive locations.
#[derive(Debug, Clone, Default)]
pub struct GuardedPaths {
    pub protected: PathSet,
    pub sensitive: PathSet,
    home: Option<PathBuf>,
}

impl GuardedPaths {
    pub fn from_config(config: &PathConfig) -> Self {
        Self {
            protected: PathSet::from_config(&config.protected),
            sensitive: PathSet::from_config(&config.sensitive),
            home: std::env::var_os("HOME").map(|h| normalize(Path::new(&h))),
        }
    }

    /// Whether a recursive operation on `path` reaches a guarded location:
    /// `path` is protected itself, or contains or lies in a sensitive path.
    pub fn reaches(&self, path: &Path) -> bool {
        self.protected.is_exact(path) || self.sensitive.overlaps(path)
    }

    /// Whether `path` is a protected location itself, a file directly inside
    /// a protected system directory, or anything under a sensitive path.
    pub fn guards_file(&self, path: &Path) -> bool {
        if self.protected.is_exact(path) || self.sensitive.covers(path) {
            return true;
        }
        path.parent().is_some_and(|parent| {
            parent.parent().is_some()
                && self.home.as_deref() != Some(parent)
                && self.protected.is_exact(parent)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_dots() {
        assert_eq!(normalize(Path::new("/etc/./ssh/../passwd")), PathBuf::from("/etc/passwd"));
        assert_eq!(normalize(Path::new("/..")), PathBuf::from("/"));
        assert_eq!(normalize(Path::new("a/../../b")), PathBuf::from("../b"));
        assert_eq!(normalize(Path::new(".")), PathBuf::new());
    }

    #[test]
    fn resolve_root_glob() {
        let t = resolve("/*", None);
        assert!(t.glob);
        assert_eq!(t.path, PathBuf::from("/"));
    }

    #[test]
    fn resolve_relative_with_cwd() {
        let t = resolve("..", Some(Path::new("/etc")));
        assert_eq!(t.path, PathBuf::from("/"));
        let t = resolve("build", Some(Path::new("/home/me/proj")));
        assert_eq!(t.path, PathBuf::from("/home/me/proj/build"));
    }

    #[test]
    fn resolve_relative_without_cwd_stays_relative() {
        let t = resolve("build", None);
        assert_eq!(t.path, PathBuf::from("build"));
    }

    #[test]
    fn resolve_trailing_slash() {
        assert_eq!(resolve("/etc/", None).path, PathBuf::from("/etc"));
    }

    #[test]
    fn tilde_expands_to_home() {
        let Some(home) = std::env::var_os("HOME") else {
            return;
        };
        assert_eq!(resolve("~", None).path, normalize(Path::new(&home)));
    }

    #[test]
    fn unknown_variable_left_alone() {
        assert_eq!(expand("$ASKGATE_SURELY_UNSET_VAR/x"), "$ASKGATE_SURELY_UNSET_VAR/x");
    }

    #[test]
    fn path_set_matching() {
        let set = PathSet::from_config(&["/etc".into(), "/etc/ssh".into()]);
        assert!(set.is_exact(Path::new("/etc")));
        assert!(!set.is_exact(Path::new("/etc/hosts")));
        assert!(set.covers(Path::new("/etc/hosts")));
        assert!(!set.covers(Path::new("/tmp")));
        assert!(set.overlaps(Path::new("/")));
        assert!(!set.overlaps(Path::new("")));
    }

    #[test]
    fn guarded_files() {
        let guard = GuardedPaths::from_config(&PathConfig {
            protected: vec!["/".into(), "/etc".into()],
            sensitive: vec!["/srv/keys".into()],
        });
        assert!(guard.guards_file(Path::new("/etc/passwd")));
        assert!(guard.guards_file(Path::new("/srv/keys/id")));
        assert!(!guard.guards_file(Path::new("/etc/apt/sources.list")));
        assert!(!guard.guards_file(Path::new("/notes.txt")));
        assert!(!guard.guards_file(Path::new("out.txt")));
        assert!(guard.reaches(Path::new("/srv")));
        assert!(!guard.reaches(Path::new("/tmp")));
    }
}
