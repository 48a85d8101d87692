//! Types produced by the shell parser and consumed by the risk layer.

/// A single evaluable command found anywhere in a shell script.
///
/// Compound constructs (lists, pipelines, subshells, loops, substitutions)
/// are flattened: every simple command becomes its own segment, so a
/// dangerous command hidden behind a benign prefix is still seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Command text exactly as it appears in the script.
    pub command: String,

    /// Output redirections applying to this command.
    ///
    /// Includes redirections on a wrapping construct (e.g. the `> file` in
    /// `for ... done > file`), which are not part of `command`.
    pub redirects: Vec<Redirect>,

    /// Text of the command whose stdout feeds this one through a pipe.
    pub piped_from: Option<String>,
}

impl Segment {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            redirects: Vec::new(),
            piped_from: None,
        }
    }
}

/// An output redirection that writes to a file.
///
/// fd duplication (`2>&1`, `>&-`) and input redirection are never represented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    /// Operator without the fd number: `>`, `>>`, `&>`, `>|`, ...
    pub operator: String,
    /// Destination word with surrounding quotes removed.
    pub target: String,
}

impl Redirect {
    /// Whether this redirection truncates its target rather than appending.
    pub fn truncates(&self) -> bool {
        !self.operator.contains(">>")
    }

    /// Parse the text of a redirect node, e.g. `2> err.log` or `>>out`.
    pub fn parse(text: &str) -> Option<Self> {
        let t = text.trim();
        let t = t.trim_start_matches(|c: char| c.is_ascii_digit());
        let op_len = t
            .find(|c: char| !matches!(c, '<' | '>' | '&' | '|'))
            .unwrap_or(t.len());
        let (operator, rest) = t.split_at(op_len);
        if !operator.contains('>') {
            return None;
        }
        let target = rest.trim().trim_matches(|c| c == '"' || c == '\'');
        // >&2, 2>&1, >&- duplicate or close descriptors
        if operator.ends_with('&')
            && (target == "-" || target.chars().all(|c| c.is_ascii_digit()))
        {
            return None;
        }
        if target.is_empty() {
            return None;
        }
        Some(Self {
            operator: operator.to_string(),
            target: target.to_string(),
        })
    }
}
