//! Reverse-relation extraction from model field declarations.
//!
//! A field such as `author = models.ForeignKey(User, related_name="posts")`
//! declared on `Post` gives `User` a reverse accessor `posts`. Only fields
//! with an explicit, non-sentinel `related_name` produce a relation.

use tree_sitter::Node;
use tracing::debug;

use crate::config::TypifyConfig;
use crate::facts::{ReverseRelation, NO_REVERSE_ACCESSOR};
use crate::parser::{body_statements, ParsedModule, Shape};

const RELATION_FIELD_KINDS: &[&str] = &["ForeignKey", "OneToOneField", "ManyToManyField"];

/// A recognised relation field call.
struct FieldCall<'a> {
    kind: &'a str,
    /// Subscript of the generic form `models.ForeignKey["User"](...)`.
    generic_index: Option<Node<'a>>,
}

/// Extract reverse relations from every top-level class, in declaration
/// order (classes in file order, fields in body order).
pub fn extract_reverse_relations(
    module: &ParsedModule,
    config: &TypifyConfig,
) -> Vec<ReverseRelation> {
    let mut relations = Vec::new();

    for class in module.top_level_classes() {
        let Some(source_model) = module.name_of(class) else {
            continue;
        };
        for statement in body_statements(class) {
            let Some(assignment) = module.statement_assignment(statement) else {
                continue;
            };
            let (_, Some(value)) = module.assignment_parts(assignment) else {
                continue;
            };
            if let Some(relation) = relation_from_field(module, value, source_model, config) {
                debug!(
                    target_model = %relation.target_model,
                    accessor = %relation.accessor_name,
                    source_model = %relation.source_model,
                    line = module.start_line(statement),
                    "found reverse relation"
                );
                relations.push(relation);
            }
        }
    }

    relations
}

fn relation_from_field(
    module: &ParsedModule,
    value: Node<'_>,
    source_model: &str,
    config: &TypifyConfig,
) -> Option<ReverseRelation> {
    let Shape::Call {
        function,
        positional,
        keywords,
    } = module.shape(value)
    else {
        return None;
    };
    let field = field_call(module, function, config)?;

    let mut target_model = positional
        .first()
        .and_then(|arg| model_reference(module, *arg));
    for (name, value) in &keywords {
        if *name == "to" {
            if let Some(model) = model_reference(module, *value) {
                target_model = Some(model);
            }
        }
    }
    if target_model.is_none() {
        target_model = field
            .generic_index
            .and_then(|index| model_reference(module, index));
    }

    let mut accessor_name = None;
    for (name, value) in &keywords {
        if *name != "related_name" {
            continue;
        }
        if let Shape::Str(related) = module.shape(*value) {
            if related != NO_REVERSE_ACCESSOR {
                accessor_name = Some(related);
            }
        }
    }

    match (target_model, accessor_name) {
        (Some(target), Some(accessor)) => {
            debug!(kind = field.kind, "relation field resolved");
            Some(ReverseRelation {
                target_model: target,
                accessor_name: accessor,
                source_model: source_model.to_string(),
            })
        }
        _ => None,
    }
}

/// Match `ns.Kind` or `ns.Kind[...]` where `ns` is a configured namespace.
fn field_call<'a>(
    module: &'a ParsedModule,
    function: Node<'a>,
    config: &TypifyConfig,
) -> Option<FieldCall<'a>> {
    match module.shape(function) {
        Shape::Attribute { object, attribute } => {
            relation_kind(module, object, attribute, config).map(|kind| FieldCall {
                kind,
                generic_index: None,
            })
        }
        Shape::Subscript { value, index } => match module.shape(value) {
            Shape::Attribute { object, attribute } => {
                relation_kind(module, object, attribute, config).map(|kind| FieldCall {
                    kind,
                    generic_index: index,
                })
            }
            _ => None,
        },
        _ => None,
    }
}

fn relation_kind<'a>(
    module: &ParsedModule,
    object: Node<'_>,
    attribute: &'a str,
    config: &TypifyConfig,
) -> Option<&'a str> {
    let Shape::Name(namespace) = module.shape(object) else {
        return None;
    };
    if !config.field_namespaces.iter().any(|ns| ns == namespace) {
        return None;
    }
    RELATION_FIELD_KINDS
        .contains(&attribute)
        .then_some(attribute)
}

/// Model name from a bare name, a quoted `"app.Model"` path, or a dotted
/// attribute; the last segment is the model.
fn model_reference(module: &ParsedModule, node: Node<'_>) -> Option<String> {
    let name = match module.shape(node) {
        Shape::Name(name) => name.to_string(),
        Shape::Str(path) => path.rsplit('.').next().unwrap_or_default().to_string(),
        Shape::Attribute { attribute, .. } => attribute.to_string(),
        _ => return None,
    };
    (!name.is_empty()).then_some(name)
}
