//! View-set variable annotation.
//!
//! A view-set's model is inferred from its `queryset` class attribute.
//! Inside the methods of such a class, local variables holding an instance of
//! that model are annotated in place:
//!
//! ```python
//! class VirtualMachineViewSet(ResourceViewSet):
//!     queryset = models.VirtualMachine.objects.all().order_by("name")
//!
//!     def start(self, request, uuid=None):
//!         virtual_machine: models.VirtualMachine = self.get_object()
//! ```

use std::collections::{BTreeMap, HashSet};

use tree_sitter::Node;
use tracing::{debug, warn};

use crate::config::TypifyConfig;
use crate::edits::{apply_edits, SourceEdit};
use crate::facts::{Rewrite, ViewModelBinding};
use crate::parser::{as_function_definition, body_statements, collect_kind, ParsedModule, Shape};

/// Generic variable names assumed to hold the view's instance.
const GENERIC_INSTANCE_NAMES: &[&str] = &["instance", "obj", "object"];

/// Conventional names for the result of `serializer.save()`.
const SAVED_INSTANCE_NAMES: &[&str] = &["created_instance", "updated_instance"];

const INSTANCE_LOOKUP_METHOD: &str = "get_object";
const SAVE_METHOD: &str = "save";

/// Why an assignment is annotated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstanceSource {
    /// `self.get_object()`
    Lookup,
    /// `<name>.save()` assigned to an instance-like name.
    Save,
}

/// Replacement of `[start, end)` bytes within one original line.
struct Splice {
    start: usize,
    end: usize,
    text: String,
}

/// Resolve the model a queryset expression iterates.
///
/// Calls, subscripts and attribute hops are unwound until the manager
/// accessor (`objects`) is reached; the expression it hangs off is the
/// model. Returns `(simple_name, path)`, where deep paths collapse to their
/// last two segments: `app.models.Node` gives `("Node", "models.Node")`.
pub fn extract_queryset_model(
    module: &ParsedModule,
    expr: Node<'_>,
    config: &TypifyConfig,
) -> Option<(String, String)> {
    let mut current = expr;
    loop {
        match module.shape(current) {
            Shape::Call { function, .. } => current = function,
            Shape::Subscript { value, .. } => current = value,
            Shape::Attribute { object, attribute } => {
                if attribute == config.manager_accessor {
                    return model_from_reference(module, object);
                }
                current = object;
            }
            _ => return None,
        }
    }
}

fn model_from_reference(module: &ParsedModule, node: Node<'_>) -> Option<(String, String)> {
    let mut parts: Vec<&str> = Vec::new();
    let mut current = node;
    loop {
        match module.shape(current) {
            Shape::Name(name) => {
                parts.push(name);
                break;
            }
            Shape::Attribute { object, attribute } => {
                parts.push(attribute);
                current = object;
            }
            _ if parts.is_empty() => return None,
            _ => break,
        }
    }
    parts.reverse();

    let simple = parts.last()?.to_string();
    let path = match parts.as_slice() {
        [.., parent, model] => format!("{parent}.{model}"),
        _ => simple.clone(),
    };
    Some((simple, path))
}

/// Every view class whose `queryset` resolves to a model.
pub fn find_view_bindings(module: &ParsedModule, config: &TypifyConfig) -> Vec<ViewModelBinding> {
    bound_classes(module, config)
        .into_iter()
        .map(|(binding, _)| binding)
        .collect()
}

fn bound_classes<'a>(
    module: &'a ParsedModule,
    config: &TypifyConfig,
) -> Vec<(ViewModelBinding, Node<'a>)> {
    let mut bound = Vec::new();

    for class in module.all_classes() {
        let Some(class_name) = module.name_of(class) else {
            continue;
        };
        let binding = body_statements(class).into_iter().find_map(|statement| {
            let assignment = module.statement_assignment(statement)?;
            let (targets, value) = module.assignment_parts(assignment);
            let is_queryset = targets
                .iter()
                .any(|t| t.kind() == "identifier" && module.text(*t) == "queryset");
            if !is_queryset {
                return None;
            }
            extract_queryset_model(module, value?, config)
        });

        match binding {
            Some((simple_model_name, model_path)) => {
                debug!(class = class_name, model = %model_path, "bound view to model");
                bound.push((
                    ViewModelBinding {
                        view_class_name: class_name.to_string(),
                        model_path,
                        simple_model_name,
                    },
                    class,
                ));
            }
            None => debug!(class = class_name, "no queryset model, skipping class"),
        }
    }

    bound
}

/// Decide whether assigning `value` to `target` yields a model instance.
pub fn instance_source(
    module: &ParsedModule,
    value: Node<'_>,
    target: &str,
    simple_model_name: &str,
) -> Option<InstanceSource> {
    let Shape::Call { function, .. } = module.shape(value) else {
        return None;
    };
    let Shape::Attribute { object, attribute } = module.shape(function) else {
        return None;
    };
    let Shape::Name(receiver) = module.shape(object) else {
        return None;
    };
    match attribute {
        INSTANCE_LOOKUP_METHOD if receiver == "self" => Some(InstanceSource::Lookup),
        SAVE_METHOD if names_model_instance(target, simple_model_name) => Some(InstanceSource::Save),
        _ => None,
    }
}

/// Whether a variable name suggests it holds an instance of `model`.
pub fn names_model_instance(target: &str, model: &str) -> bool {
    GENERIC_INSTANCE_NAMES.contains(&target)
        || SAVED_INSTANCE_NAMES.contains(&target)
        || target == model.to_lowercase()
        || pascal_case(target) == model
        || target.replace('_', "").to_lowercase() == model.replace('_', "").to_lowercase()
}

/// `virtual_machine` -> `VirtualMachine`.
fn pascal_case(snake: &str) -> String {
    snake
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect()
}

/// Annotate instance-holding variables in every method of every bound view
/// class. Only the assignment lines change; all other lines, the line
/// ending style and the trailing newline are preserved.
pub fn rewrite_view_source(module: &ParsedModule, config: &TypifyConfig) -> Rewrite {
    let table = module.lines();
    let mut splices: BTreeMap<usize, Vec<Splice>> = BTreeMap::new();
    let mut annotated: HashSet<usize> = HashSet::new();

    for (binding, class) in bound_classes(module, config) {
        for method in body_statements(class)
            .into_iter()
            .filter_map(as_function_definition)
        {
            let mut assignments = Vec::new();
            collect_kind(method, "assignment", &mut assignments);

            for assignment in assignments {
                let Some(target) = single_plain_target(assignment) else {
                    continue;
                };
                let Some(value) = assignment.child_by_field_name("right") else {
                    continue;
                };
                let target_name = module.text(target);
                let Some(source) =
                    instance_source(module, value, target_name, &binding.simple_model_name)
                else {
                    continue;
                };

                let line_number = module.start_line(assignment);
                let Some(splice) = annotation_splice(module, target, value, &binding.model_path)
                else {
                    continue;
                };
                if !annotated.insert(target.start_byte()) {
                    continue;
                }
                debug!(
                    variable = target_name,
                    model = %binding.model_path,
                    line = line_number,
                    ?source,
                    "annotating view variable"
                );
                splices.entry(line_number).or_default().push(splice);
            }
        }
    }

    let mut edits = Vec::new();
    for (line_number, mut line_splices) in splices {
        let Some(original) = table.line(line_number) else {
            continue;
        };
        line_splices.sort_by(|a, b| b.start.cmp(&a.start));
        let mut text = original.to_string();
        for splice in line_splices {
            if splice.start <= splice.end
                && splice.end <= text.len()
                && text.is_char_boundary(splice.start)
                && text.is_char_boundary(splice.end)
            {
                text.replace_range(splice.start..splice.end, &splice.text);
            }
        }
        if text != original {
            edits.push(SourceEdit::Replace {
                line: line_number,
                text,
            });
        }
    }

    if edits.is_empty() {
        return Rewrite::unchanged(module.source());
    }
    Rewrite {
        changed: true,
        source: apply_edits(table, &edits),
    }
}

/// The identifier target of an unannotated, unchained single assignment.
fn single_plain_target(assignment: Node<'_>) -> Option<Node<'_>> {
    if assignment.child_by_field_name("type").is_some() {
        return None;
    }
    if assignment
        .parent()
        .is_some_and(|parent| parent.kind() == "assignment")
    {
        return None;
    }
    let right = assignment.child_by_field_name("right")?;
    if right.kind() == "assignment" {
        return None;
    }
    assignment
        .child_by_field_name("left")
        .filter(|left| left.kind() == "identifier")
}

/// Build `<target>: <model_path> = <rhs>` covering the target through the
/// end of the value on the assignment's first line.
fn annotation_splice(
    module: &ParsedModule,
    target: Node<'_>,
    value: Node<'_>,
    model_path: &str,
) -> Option<Splice> {
    let row = target.start_position().row;
    let line = module.lines().line(row + 1)?;
    let start = target.start_position().column;
    let target_name = module.text(target);

    let (rhs, end) = if value.start_position().row != row {
        (line_after_equals(line, start)?, line.len())
    } else if value.end_position().row == row {
        let rhs = match module.try_text(value) {
            Some(text) => text.to_string(),
            None => {
                warn!(line = row + 1, "value span unavailable, splitting line at '='");
                line_after_equals(line, start)?
            }
        };
        (rhs, value.end_position().column)
    } else {
        let rhs = line.get(value.start_position().column..)?.trim_end().to_string();
        (rhs, line.len())
    };

    Some(Splice {
        start,
        end,
        text: format!("{target_name}: {model_path} = {rhs}"),
    })
}

fn line_after_equals(line: &str, from: usize) -> Option<String> {
    let (_, rest) = line.get(from..)?.split_once('=')?;
    Some(rest.trim().to_string())
}
