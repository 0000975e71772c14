//! Line-keyed source edits applied in a single pass.
//!
//! Edits always refer to the 1-based line numbers of the *original* text, so
//! all of them can be computed up front and merged without shifting each
//! other. Lines no edit touches are copied through unchanged, and the result
//! is re-joined with the original line ending and trailing-newline state.

use std::collections::{HashMap, HashSet};

/// Original lines of a file, without terminators.
#[derive(Clone, Debug)]
pub struct LineTable {
    lines: Vec<String>,
    line_ending: &'static str,
    trailing_newline: bool,
}

impl LineTable {
    pub fn new(source: &str) -> Self {
        let line_ending = match source.find('\n') {
            Some(idx) if idx > 0 && source.as_bytes()[idx - 1] == b'\r' => "\r\n",
            _ => "\n",
        };
        let trailing_newline = source.ends_with('\n');
        let body = if trailing_newline {
            &source[..source.len() - 1]
        } else {
            source
        };
        let lines = if source.is_empty() {
            Vec::new()
        } else {
            body.split('\n')
                .map(|line| {
                    if line_ending == "\r\n" {
                        line.strip_suffix('\r').unwrap_or(line).to_string()
                    } else {
                        line.to_string()
                    }
                })
                .collect()
        };
        LineTable {
            lines,
            line_ending,
            trailing_newline,
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Line by 1-based number.
    pub fn line(&self, number: usize) -> Option<&str> {
        if number == 0 {
            return None;
        }
        self.lines.get(number - 1).map(|s| s.as_str())
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn line_ending(&self) -> &'static str {
        self.line_ending
    }

    pub fn has_trailing_newline(&self) -> bool {
        self.trailing_newline
    }

    /// Join `lines` the way the original text was joined.
    pub fn join(&self, lines: &[String]) -> String {
        let mut out = lines.join(self.line_ending);
        if self.trailing_newline && !lines.is_empty() {
            out.push_str(self.line_ending);
        }
        out
    }
}

/// A pending mutation keyed by an original 1-based line number.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceEdit {
    /// Insert `lines` after `line`; `line == 0` inserts at the top of the file.
    InsertAfter { line: usize, lines: Vec<String> },
    /// Replace `line` with `text`.
    Replace { line: usize, text: String },
    /// Drop `line` entirely.
    Remove { line: usize },
}

/// Apply all `edits` to `table` and return the resulting line sequence.
///
/// Inserts at the same line are concatenated in push order. When several
/// replacements target one line the last one wins.
pub fn apply_edits_to_lines(table: &LineTable, edits: &[SourceEdit]) -> Vec<String> {
    let mut inserts: HashMap<usize, Vec<&str>> = HashMap::new();
    let mut replacements: HashMap<usize, &str> = HashMap::new();
    let mut removed: HashSet<usize> = HashSet::new();
    let last = table.len();

    for edit in edits {
        match edit {
            SourceEdit::InsertAfter { line, lines } => {
                inserts
                    .entry((*line).min(last))
                    .or_default()
                    .extend(lines.iter().map(|s| s.as_str()));
            }
            SourceEdit::Replace { line, text } => {
                replacements.insert(*line, text.as_str());
            }
            SourceEdit::Remove { line } => {
                removed.insert(*line);
            }
        }
    }

    let mut output: Vec<String> = Vec::with_capacity(table.len() + inserts.len());
    if let Some(top) = inserts.get(&0) {
        output.extend(top.iter().map(|s| s.to_string()));
    }
    for (idx, original) in table.lines().iter().enumerate() {
        let number = idx + 1;
        if !removed.contains(&number) {
            match replacements.get(&number) {
                Some(text) => output.push(text.to_string()),
                None => output.push(original.clone()),
            }
        }
        if let Some(extra) = inserts.get(&number) {
            output.extend(extra.iter().map(|s| s.to_string()));
        }
    }
    output
}

/// Apply all `edits` to `table` and re-join into source text.
pub fn apply_edits(table: &LineTable, edits: &[SourceEdit]) -> String {
    table.join(&apply_edits_to_lines(table, edits))
}

/// Leading whitespace of `line`.
pub fn leading_whitespace(line: &str) -> &str {
    let end = line
        .find(|c: char| c != ' ' && c != '\t')
        .unwrap_or(line.len());
    &line[..end]
}
