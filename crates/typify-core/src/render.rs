//! Rendering reverse-relation annotations into model class bodies.

use tree_sitter::Node;
use tracing::debug;

use crate::config::TypifyConfig;
use crate::edits::{apply_edits, leading_whitespace, SourceEdit};
use crate::facts::AnnotationMap;
use crate::parser::{named_children, ParsedModule};

const DEFAULT_BODY_INDENT: &str = "    ";

/// One annotation line, e.g. `    posts: models.Manager['Post']`.
pub fn annotation_line(indent: &str, accessor: &str, model: &str, config: &TypifyConfig) -> String {
    format!("{indent}{accessor}: {}['{model}']", config.manager_type)
}

/// Insert one annotation line per accessor, followed by a blank line, at
/// the top of each annotated class body.
///
/// Insertion points are computed against the original line numbering and
/// applied in one pass. Existing annotations are not detected, so running
/// this twice on its own output adds the block twice.
pub fn annotate_model_source(
    module: &ParsedModule,
    annotations: &AnnotationMap,
    config: &TypifyConfig,
) -> String {
    let edits = annotation_edits(module, annotations, config);
    apply_edits(module.lines(), &edits)
}

/// The insert edits [`annotate_model_source`] applies.
pub fn annotation_edits(
    module: &ParsedModule,
    annotations: &AnnotationMap,
    config: &TypifyConfig,
) -> Vec<SourceEdit> {
    let mut edits = Vec::new();

    for class in module.top_level_classes() {
        let Some(name) = module.name_of(class) else {
            continue;
        };
        let Some(entries) = annotations.get(name) else {
            continue;
        };

        let header_end = module.header_end_line(class);
        let first_statement = class
            .child_by_field_name("body")
            .and_then(|body| named_children(body).into_iter().next());

        let mut insert_after = header_end;
        let mut indent = DEFAULT_BODY_INDENT;
        if let Some(statement) = first_statement {
            let first_line = module.start_line(statement);
            if first_line > header_end {
                if let Some(line) = module.lines().line(first_line) {
                    let body_indent = leading_whitespace(line);
                    if !body_indent.is_empty() {
                        indent = body_indent;
                    }
                }
            }
            if is_docstring(module, statement) {
                insert_after = module.end_line(statement);
            }
        }

        let mut lines: Vec<String> = entries
            .iter()
            .map(|(accessor, model)| annotation_line(indent, accessor, model, config))
            .collect();
        lines.push(String::new());

        debug!(class = name, line = insert_after, count = entries.len(), "annotating model");
        edits.push(SourceEdit::InsertAfter {
            line: insert_after,
            lines,
        });
    }

    edits
}

fn is_docstring(module: &ParsedModule, statement: Node<'_>) -> bool {
    if statement.kind() != "expression_statement" {
        return false;
    }
    match named_children(statement).as_slice() {
        [only] => match only.kind() {
            "string" => module.string_literal_value(*only).is_some(),
            "concatenated_string" => true,
            _ => false,
        },
        _ => false,
    }
}
