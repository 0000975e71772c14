//! Python parsing wrapper used by the inference passes.
//!
//! Wraps tree-sitter's Python grammar and keeps the original text and its
//! line table next to the tree, so every pass can slice exact source spans
//! and edit by original line number.

use tree_sitter::{Node, Parser, Tree};

use crate::edits::LineTable;
use crate::errors::{TypifyError, TypifyResult};

/// A parsed Python module plus its original text.
pub struct ParsedModule {
    source: String,
    tree: Tree,
    table: LineTable,
}

/// Parse `source` into a [`ParsedModule`].
///
/// tree-sitter recovers from syntax errors, so a tree containing `ERROR` or
/// `MISSING` nodes is reported as a parse failure at the first such node.
pub fn parse_module(source: &str) -> TypifyResult<ParsedModule> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| TypifyError::Parse {
            line: 0,
            column: 0,
            message: format!("failed to load python grammar: {e}"),
        })?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| TypifyError::Parse {
            line: 0,
            column: 0,
            message: "parser returned no tree".to_string(),
        })?;

    if tree.root_node().has_error() {
        let (line, column, message) = match first_error(tree.root_node()) {
            Some(node) if node.is_missing() => (
                node.start_position().row + 1,
                node.start_position().column + 1,
                format!("missing `{}`", node.kind()),
            ),
            Some(node) => (
                node.start_position().row + 1,
                node.start_position().column + 1,
                "invalid syntax".to_string(),
            ),
            None => (1, 1, "invalid syntax".to_string()),
        };
        return Err(TypifyError::Parse {
            line,
            column,
            message,
        });
    }

    Ok(ParsedModule {
        source: source.to_string(),
        tree,
        table: LineTable::new(source),
    })
}

fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|child| child.has_error() || child.is_missing())
        .find_map(first_error)
}

/// The small closed set of expression shapes the inference passes match on.
/// Anything else is [`Shape::Other`] and never yields a fact.
#[derive(Debug)]
pub enum Shape<'a> {
    Call {
        function: Node<'a>,
        positional: Vec<Node<'a>>,
        keywords: Vec<(&'a str, Node<'a>)>,
    },
    Attribute {
        object: Node<'a>,
        attribute: &'a str,
    },
    Subscript {
        value: Node<'a>,
        index: Option<Node<'a>>,
    },
    Name(&'a str),
    Str(String),
    Other,
}

impl ParsedModule {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn lines(&self) -> &LineTable {
        &self.table
    }

    /// Exact source text of `node`, if its byte range is valid.
    pub fn try_text(&self, node: Node<'_>) -> Option<&str> {
        self.source.get(node.start_byte()..node.end_byte())
    }

    pub fn text(&self, node: Node<'_>) -> &str {
        self.try_text(node).unwrap_or("")
    }

    /// 1-based line the node starts on.
    pub fn start_line(&self, node: Node<'_>) -> usize {
        node.start_position().row + 1
    }

    /// 1-based line the node ends on.
    pub fn end_line(&self, node: Node<'_>) -> usize {
        node.end_position().row + 1
    }

    /// Line holding the `:` that opens a class or function body. Falls back
    /// to the first line at or after the header that ends with `:`.
    pub fn header_end_line(&self, definition: Node<'_>) -> usize {
        let mut cursor = definition.walk();
        let colon = definition
            .children(&mut cursor)
            .find(|child| child.kind() == ":");
        if let Some(colon) = colon {
            return self.start_line(colon);
        }

        let mut line = self.start_line(definition);
        while line < self.table.len()
            && !self
                .table
                .line(line)
                .is_some_and(|text| text.trim_end().ends_with(':'))
        {
            line += 1;
        }
        line
    }

    /// Top-level class definitions in file order, decorators unwrapped.
    pub fn top_level_classes(&self) -> Vec<Node<'_>> {
        named_children(self.root())
            .into_iter()
            .filter_map(as_class_definition)
            .collect()
    }

    /// Every class definition in the tree, in pre-order.
    pub fn all_classes(&self) -> Vec<Node<'_>> {
        let mut found = Vec::new();
        collect_kind(self.root(), "class_definition", &mut found);
        found
    }

    pub fn name_of(&self, definition: Node<'_>) -> Option<&str> {
        definition
            .child_by_field_name("name")
            .map(|name| self.text(name))
    }

    /// Classify `node` into one of the recognised [`Shape`]s. Parentheses
    /// around an expression are looked through.
    pub fn shape<'a>(&'a self, node: Node<'a>) -> Shape<'a> {
        let node = strip_parens(node);
        match node.kind() {
            "call" => {
                let Some(function) = node.child_by_field_name("function") else {
                    return Shape::Other;
                };
                let mut positional = Vec::new();
                let mut keywords = Vec::new();
                if let Some(arguments) = node.child_by_field_name("arguments") {
                    if arguments.kind() == "argument_list" {
                        for arg in named_children(arguments) {
                            if arg.kind() == "keyword_argument" {
                                if let (Some(name), Some(value)) = (
                                    arg.child_by_field_name("name"),
                                    arg.child_by_field_name("value"),
                                ) {
                                    keywords.push((self.text(name), value));
                                }
                            } else if arg.kind() != "dictionary_splat" {
                                positional.push(arg);
                            }
                        }
                    }
                }
                Shape::Call {
                    function,
                    positional,
                    keywords,
                }
            }
            "attribute" => match (
                node.child_by_field_name("object"),
                node.child_by_field_name("attribute"),
            ) {
                (Some(object), Some(attribute)) => Shape::Attribute {
                    object,
                    attribute: self.text(attribute),
                },
                _ => Shape::Other,
            },
            "subscript" => match node.child_by_field_name("value") {
                Some(value) => Shape::Subscript {
                    value,
                    index: node.child_by_field_name("subscript"),
                },
                None => Shape::Other,
            },
            "identifier" => Shape::Name(self.text(node)),
            "string" => match self.string_literal_value(node) {
                Some(value) => Shape::Str(value),
                None => Shape::Other,
            },
            _ => Shape::Other,
        }
    }

    /// Body of a plain string literal. f-strings and byte strings have no
    /// literal value.
    pub fn string_literal_value(&self, node: Node<'_>) -> Option<String> {
        if node.kind() != "string" {
            return None;
        }
        let mut value = String::new();
        for child in all_children(node) {
            match child.kind() {
                "string_start" => {
                    let prefix = self.text(child);
                    if prefix
                        .chars()
                        .any(|c| matches!(c, 'f' | 'F' | 'b' | 'B' | 't' | 'T'))
                    {
                        return None;
                    }
                }
                "string_content" => value.push_str(self.text(child)),
                "interpolation" => return None,
                _ => {}
            }
        }
        Some(value)
    }

    /// Return the assignment node inside a simple statement, if any.
    pub fn statement_assignment<'a>(&self, statement: Node<'a>) -> Option<Node<'a>> {
        if statement.kind() == "assignment" {
            return Some(statement);
        }
        if statement.kind() != "expression_statement" {
            return None;
        }
        let children = named_children(statement);
        match children.as_slice() {
            [only] if only.kind() == "assignment" => Some(*only),
            _ => None,
        }
    }

    /// Identifier target(s) and final value of an assignment, looking
    /// through chained `a = b = value` forms.
    pub fn assignment_parts<'a>(&self, assignment: Node<'a>) -> (Vec<Node<'a>>, Option<Node<'a>>) {
        let mut targets = Vec::new();
        let mut current = assignment;
        loop {
            if let Some(left) = current.child_by_field_name("left") {
                targets.push(left);
            }
            match current.child_by_field_name("right") {
                Some(right) if right.kind() == "assignment" => current = right,
                right => return (targets, right),
            }
        }
    }
}

/// Class definition behind `node`, looking through decorators.
pub fn as_class_definition(node: Node<'_>) -> Option<Node<'_>> {
    match node.kind() {
        "class_definition" => Some(node),
        "decorated_definition" => node
            .child_by_field_name("definition")
            .filter(|def| def.kind() == "class_definition"),
        _ => None,
    }
}

/// Function definition behind `node`, looking through decorators.
pub fn as_function_definition(node: Node<'_>) -> Option<Node<'_>> {
    match node.kind() {
        "function_definition" => Some(node),
        "decorated_definition" => node
            .child_by_field_name("definition")
            .filter(|def| def.kind() == "function_definition"),
        _ => None,
    }
}

/// Statements of a class or function body, comments excluded.
pub fn body_statements(definition: Node<'_>) -> Vec<Node<'_>> {
    definition
        .child_by_field_name("body")
        .map(named_children)
        .unwrap_or_default()
}

/// Named children of `node` with comments filtered out.
pub fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .collect()
}

fn all_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

/// Look through any number of wrapping parentheses.
pub fn strip_parens(mut node: Node<'_>) -> Node<'_> {
    while node.kind() == "parenthesized_expression" {
        match named_children(node).as_slice() {
            [inner] => node = *inner,
            _ => break,
        }
    }
    node
}

/// Collect every descendant of `node` (itself included) of `kind`, pre-order.
pub fn collect_kind<'a>(node: Node<'a>, kind: &str, out: &mut Vec<Node<'a>>) {
    if node.kind() == kind {
        out.push(node);
    }
    for child in named_children(node) {
        collect_kind(child, kind, out);
    }
}
