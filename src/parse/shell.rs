//! Flattening of shell scripts into command segments.
//!
//! tree-sitter-bash does the heavy lifting: every `command` node anywhere in
//! the tree (lists, pipelines, subshells, loops, function bodies, `$(...)`,
//! backticks, `<(...)`) becomes a [`Segment`]. If the grammar cannot be
//! loaded, a quote-aware operator splitter takes over.

use std::sync::{Mutex, OnceLock};

use tree_sitter::{Node, Parser};

use super::types::{Redirect, Segment};

/// Lazily initialised bash parser. `None` if the grammar failed to load.
static BASH_PARSER: OnceLock<Option<Mutex<Parser>>> = OnceLock::new();

fn bash_parser() -> Option<&'static Mutex<Parser>> {
    BASH_PARSER
        .get_or_init(|| {
            let mut parser = Parser::new();
            let lang: tree_sitter::Language = tree_sitter_bash::LANGUAGE.into();
            match parser.set_language(&lang) {
                Ok(()) => Some(Mutex::new(parser)),
                Err(e) => {
                    log::warn!("bash grammar unavailable, using fallback splitter: {e}");
                    None
                }
            }
        })
        .as_ref()
}

/// Split a script into every simple command it contains, in source order.
pub fn segments(script: &str) -> Vec<Segment> {
    if script.trim().is_empty() {
        return Vec::new();
    }

    let tree = bash_parser().and_then(|parser| {
        let mut parser = parser.lock().unwrap_or_else(|e| e.into_inner());
        parser.parse(script, None)
    });

    let mut out = Vec::new();
    match tree {
        Some(tree) => {
            let mut walker = Walker {
                src: script,
                out: &mut out,
            };
            walker.visit(tree.root_node(), &[], None);
        }
        None => out = split_operators(script),
    }

    if out.is_empty() {
        out.push(Segment::new(script.trim()));
    }
    out
}

struct Walker<'s, 'o> {
    src: &'s str,
    out: &'o mut Vec<Segment>,
}

impl<'s> Walker<'s, '_> {
    fn text(&self, node: Node) -> &'s str {
        node.utf8_text(self.src.as_bytes()).unwrap_or_default()
    }

    /// Visit `node`, attaching `redirects` and `piped_from` to the commands found.
    /// Returns the text of the first command produced, for pipe bookkeeping.
    fn visit(
        &mut self,
        node: Node,
        redirects: &[Redirect],
        piped_from: Option<&str>,
    ) -> Option<String> {
        match node.kind() {
            "command" => {
                let kids = children(node);
                let mut own = redirects.to_vec();
                let mut words = Vec::new();
                for child in &kids {
                    if child.kind() == "file_redirect" {
                        own.extend(Redirect::parse(self.text(*child)));
                    } else if !child.kind().ends_with("_redirect") {
                        words.push(self.text(*child));
                    }
                }
                // Keep the exact source text unless redirects have to be cut out
                let command = if words.len() == kids.len() {
                    self.text(node).trim().to_string()
                } else {
                    words.join(" ")
                };
                self.out.push(Segment {
                    command: command.clone(),
                    redirects: own,
                    piped_from: piped_from.map(str::to_string),
                });
                // Substitutions nested in the arguments are commands too
                for child in kids {
                    self.visit(child, &[], None);
                }
                Some(command)
            }
            // `export X=1`, `unset X` and bare `X=1` are not `command` nodes
            "declaration_command" | "unset_command" | "variable_assignment" => {
                let nested = node
                    .parent()
                    .is_some_and(|p| matches!(p.kind(), "command" | "declaration_command"));
                let produced = if nested {
                    None
                } else {
                    let command = self.text(node).trim().to_string();
                    self.out.push(Segment {
                        command: command.clone(),
                        redirects: redirects.to_vec(),
                        piped_from: piped_from.map(str::to_string),
                    });
                    Some(command)
                };
                for child in children(node) {
                    self.visit(child, &[], None);
                }
                produced
            }
            "redirected_statement" => {
                let mut own = redirects.to_vec();
                let mut body = Vec::new();
                for child in children(node) {
                    match child.kind() {
                        "file_redirect" => own.extend(Redirect::parse(self.text(child))),
                        "heredoc_redirect" | "herestring_redirect" => {}
                        _ => body.push(child),
                    }
                }
                let mut first = None;
                for child in body {
                    let produced = self.visit(child, &own, piped_from);
                    first = first.or(produced);
                }
                // `> file` on its own still truncates the file
                if first.is_none() && own.len() > redirects.len() {
                    self.out.push(Segment {
                        command: String::new(),
                        redirects: own,
                        piped_from: piped_from.map(str::to_string),
                    });
                    return Some(String::new());
                }
                first
            }
            "pipeline" => {
                let mut upstream: Option<String> = piped_from.map(str::to_string);
                let mut first = None;
                for child in children(node) {
                    if !child.is_named() {
                        continue;
                    }
                    let produced = self.visit(child, redirects, upstream.as_deref());
                    first = first.clone().or(produced.clone());
                    upstream = produced;
                }
                first
            }
            _ => {
                let mut first = None;
                for child in children(node) {
                    let produced = self.visit(child, redirects, None);
                    first = first.or(produced);
                }
                first
            }
        }
    }
}

fn children(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    let kids = node.children(&mut cursor).collect();
    kids
}

/// Split a command at shell operators (&&, ||, ;, |, |&),
/// respecting single/double quotes and backslash escapes.
fn split_operators(command: &str) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::new();
    let mut buf = String::new();
    let mut pipe_pending = false;
    let (mut sq, mut dq, mut esc) = (false, false, false);
    let mut chars = command.chars().peekable();

    while let Some(c) = chars.next() {
        if esc {
            esc = false;
        } else if c == '\\' && !sq {
            esc = true;
        } else if c == '\'' && !dq {
            sq = !sq;
        } else if c == '"' && !sq {
            dq = !dq;
        } else if !sq && !dq && matches!(c, ';' | '|' | '&' | '\n') {
            let next = chars.peek().copied();
            let (is_op, is_pipe) = match (c, next) {
                ('&', Some('&')) | ('|', Some('|')) => {
                    chars.next();
                    (true, false)
                }
                ('|', Some('&')) => {
                    chars.next();
                    (true, true)
                }
                ('|', _) => (true, true),
                (';' | '\n', _) => (true, false),
                _ => (false, false),
            };
            if is_op {
                flush(&mut buf, pipe_pending, &mut segments);
                pipe_pending = is_pipe;
                continue;
            }
        }
        buf.push(c);
    }
    flush(&mut buf, pipe_pending, &mut segments);
    segments
}

fn flush(buf: &mut String, piped: bool, segments: &mut Vec<Segment>) {
    let text = buf.trim().to_string();
    buf.clear();
    if text.is_empty() {
        return;
    }
    let piped_from = if piped {
        segments.last().map(|s| s.command.clone())
    } else {
        None
    };
    segments.push(Segment {
        command: text,
        redirects: Vec::new(),
        piped_from,
    });
}
