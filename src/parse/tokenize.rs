use crate::config::WrapperConfig;

/// Words of one command after assignments and wrappers are peeled off.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandWords {
    /// Leading KEY=VALUE assignments, in order.
    pub env_vars: Vec<(String, String)>,
    /// Wrapper commands that were stripped (lowercased basenames), outermost first.
    pub wrappers: Vec<String>,
    /// The effective command: `words[0]` is the command as written.
    pub words: Vec<String>,
}

/// Tokenize a command segment into words using shlex (POSIX word splitting).
pub fn tokenize(command: &str) -> Vec<String> {
    shlex::split(command).unwrap_or_else(|| {
        // Fallback: simple whitespace splitting if shlex can't parse
        command.split_whitespace().map(String::from).collect()
    })
}

/// Lowercased basename of a command word: `/usr/bin/RM` → `rm`.
pub fn base_name(word: &str) -> String {
    let name = match word.rsplit_once(['/', '\\']) {
        Some((_, name)) if !name.is_empty() => name,
        _ => word,
    };
    let name = name.to_ascii_lowercase();
    match name.strip_suffix(".exe") {
        Some(stem) => stem.to_string(),
        None => name,
    }
}

/// Whether a word is a `KEY=VALUE` shell assignment.
pub fn split_assignment(word: &str) -> Option<(&str, &str)> {
    let (key, value) = word.split_once('=')?;
    let mut chars = key.chars();
    let first = chars.next()?;
    if (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        Some((key, value))
    } else {
        None
    }
}

/// Split a command into assignments, wrappers, and the effective command words.
///
/// `sudo -u root FOO=1 timeout 5 rm -rf x` yields wrappers `[sudo, timeout]`,
/// env `[(FOO, 1)]`, and words `[rm, -rf, x]`.
pub fn split_command(command: &str, wrappers: &WrapperConfig) -> CommandWords {
    let mut words = tokenize(command);
    let mut env_vars = Vec::new();
    let mut found = Vec::new();
    let mut start = 0;

    loop {
        while let Some((key, value)) = words.get(start).and_then(|w| split_assignment(w)) {
            env_vars.push((key.to_string(), value.to_string()));
            start += 1;
        }
        let Some(first) = words.get(start) else {
            break;
        };
        let name = base_name(first);
        let is_wrapper = wrappers.transparent.iter().any(|w| *w == name)
            || wrappers.elevating.iter().any(|w| *w == name);
        if !is_wrapper {
            break;
        }
        let wrapper_at = start;
        start += 1;

        // Wrapper options, including ones that take a separate value
        while let Some(word) = words.get(start) {
            if word == "--" {
                start += 1;
                break;
            }
            if !word.starts_with('-') || word.len() == 1 {
                break;
            }
            if name == "su" && (word == "-c" || word == "--command") {
                // su -c 'script': the script becomes the wrapped command
                let script = words.get(start + 1).cloned().unwrap_or_default();
                words.truncate(start);
                words.extend(tokenize(&script));
                break;
            }
            let takes_value = !word.contains('=') && option_takes_value(&name, word);
            start += if takes_value { 2 } else { 1 };
        }

        // timeout DURATION cmd
        if name == "timeout"
            && words
                .get(start)
                .is_some_and(|w| w.starts_with(|c: char| c.is_ascii_digit()))
        {
            start += 1;
        }

        // A bare wrapper (`env`, `sudo -l`) is itself the command
        if start >= words.len() {
            start = wrapper_at;
            break;
        }
        found.push(name);
    }

    let start = start.min(words.len());
    CommandWords {
        env_vars,
        wrappers: found,
        words: words.split_off(start),
    }
}

/// Wrapper options that consume the following word.
fn option_takes_value(wrapper: &str, option: &str) -> bool {
    let options: &[&str] = match wrapper {
        "sudo" => &["-u", "-g", "-h", "-p", "-C", "-D", "-r", "-t", "-U", "--user", "--group"],
        "doas" => &["-u", "-C"],
        "su" => &["-s", "-g", "-G", "--shell", "--group"],
        "env" => &["-u", "-C", "-S", "--unset", "--chdir"],
        "timeout" => &["-s", "-k", "--signal", "--kill-after"],
        "nice" | "ionice" => &["-n", "-c", "--adjustment", "--class"],
        "xargs" => &[
            "-I", "-n", "-P", "-L", "-d", "-E", "-s", "-a", "--max-args", "--max-procs",
            "--delimiter", "--arg-file",
        ],
        "watch" => &["-n", "--interval"],
        _ => &[],
    };
    options.contains(&option)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn wrappers() -> WrapperConfig {
        Config::default_config().wrappers
    }

    #[test]
    fn base_name_simple() {
        assert_eq!(base_name("ls"), "ls");
    }

    #[test]
    fn base_name_absolute_path() {
        assert_eq!(base_name("/usr/bin/ls"), "ls");
    }

    #[test]
    fn base_name_relative_path() {
        assert_eq!(base_name("./script.sh"), "script.sh");
    }

    #[test]
    fn base_name_lowercases() {
        assert_eq!(base_name("RM"), "rm");
    }

    #[test]
    fn base_name_windows_exe() {
        assert_eq!(base_name("C:\\Windows\\System32\\format.exe"), "format");
    }

    #[test]
    fn base_name_empty() {
        assert_eq!(base_name(""), "");
    }

    #[test]
    fn assignment_detected() {
        assert_eq!(split_assignment("FOO=bar"), Some(("FOO", "bar")));
        assert_eq!(split_assignment("_X1="), Some(("_X1", "")));
    }

    #[test]
    fn assignment_rejected() {
        assert_eq!(split_assignment("if=/dev/zero").map(|(k, _)| k), Some("if"));
        assert_eq!(split_assignment("1X=2"), None);
        assert_eq!(split_assignment("--opt=1"), None);
        assert_eq!(split_assignment("plain"), None);
    }

    #[test]
    fn tokenize_simple() {
        assert_eq!(tokenize("ls -la /tmp"), vec!["ls", "-la", "/tmp"]);
    }

    #[test]
    fn tokenize_quoted() {
        assert_eq!(tokenize("echo 'hello world'"), vec!["echo", "hello world"]);
    }

    #[test]
    fn tokenize_unbalanced_quote_falls_back() {
        assert_eq!(tokenize("echo 'oops"), vec!["echo", "'oops"]);
    }

    #[test]
    fn split_env_prefix() {
        let cw = split_command("A=1 B=2 make install", &wrappers());
        assert_eq!(
            cw.env_vars,
            vec![("A".into(), "1".into()), ("B".into(), "2".into())]
        );
        assert_eq!(cw.words, vec!["make", "install"]);
        assert!(cw.wrappers.is_empty());
    }

    #[test]
    fn split_sudo_with_user() {
        let cw = split_command("sudo -u root rm -rf /tmp/x", &wrappers());
        assert_eq!(cw.wrappers, vec!["sudo"]);
        assert_eq!(cw.words, vec!["rm", "-rf", "/tmp/x"]);
    }

    #[test]
    fn split_nested_wrappers() {
        let cw = split_command("sudo FOO=1 timeout 5s nice -n 10 kill -9 1", &wrappers());
        assert_eq!(cw.wrappers, vec!["sudo", "timeout", "nice"]);
        assert_eq!(cw.env_vars, vec![("FOO".into(), "1".into())]);
        assert_eq!(cw.words, vec!["kill", "-9", "1"]);
    }

    #[test]
    fn split_su_command() {
        let cw = split_command("su -c 'rm -rf /'", &wrappers());
        assert_eq!(cw.wrappers, vec!["su"]);
        assert_eq!(cw.words, vec!["rm", "-rf", "/"]);
    }

    #[test]
    fn split_xargs() {
        let cw = split_command("xargs -I {} rm {}", &wrappers());
        assert_eq!(cw.wrappers, vec!["xargs"]);
        assert_eq!(cw.words, vec!["rm", "{}"]);
    }

    #[test]
    fn split_bare_wrapper() {
        let cw = split_command("env", &wrappers());
        assert!(cw.wrappers.is_empty());
        assert_eq!(cw.words, vec!["env"]);

        let cw = split_command("sudo -l", &wrappers());
        assert!(cw.wrappers.is_empty());
        assert_eq!(cw.words, vec!["sudo", "-l"]);
    }
}
