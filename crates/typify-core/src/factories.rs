//! factory_boy factory header rewriting.
//!
//! A factory such as
//!
//! ```python
//! class CustomerFactory(factory.django.DjangoModelFactory):
//!     class Meta:
//!         model = models.Customer
//! ```
//!
//! has its header rewritten to carry a generic metaclass bound to the model,
//! `metaclass=BaseMetaFactory[models.Customer]`, and the metaclass import is
//! prepended to the file. Classes already declaring a metaclass are skipped,
//! which makes the pass idempotent.

use tree_sitter::Node;
use tracing::debug;

use crate::config::TypifyConfig;
use crate::edits::{apply_edits, SourceEdit};
use crate::facts::{FactoryBinding, Rewrite};
use crate::parser::{as_class_definition, body_statements, ParsedModule};

/// A factory binding plus the header lines it will replace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FactoryMatch {
    pub binding: FactoryBinding,
    /// First line of the class header (the `class` keyword).
    pub header_start: usize,
    /// Line holding the `:` that closes the header.
    pub header_end: usize,
}

/// Find every top-level factory class with a `Meta.model` and no explicit
/// metaclass.
pub fn find_factory_bindings(module: &ParsedModule, config: &TypifyConfig) -> Vec<FactoryMatch> {
    let mut found = Vec::new();

    for class in module.top_level_classes() {
        let Some(name) = module.name_of(class) else {
            continue;
        };
        if !class_text(module, class).contains(&config.factory_marker) {
            continue;
        }
        if declares_metaclass(module, class) {
            debug!(class = name, "factory already declares a metaclass");
            continue;
        }
        let Some(model_path) = meta_model_path(module, class) else {
            continue;
        };

        debug!(class = name, model = %model_path, "found factory binding");
        found.push(FactoryMatch {
            binding: FactoryBinding {
                factory_class_name: name.to_string(),
                bound_model_path: model_path,
            },
            header_start: module.start_line(class),
            header_end: module.header_end_line(class),
        });
    }

    found
}

/// The rewritten header line for `binding`.
pub fn factory_header(binding: &FactoryBinding, config: &TypifyConfig) -> String {
    format!(
        "class {}({}, metaclass={}[{}]):",
        binding.factory_class_name,
        config.factory_base,
        config.metaclass_name,
        binding.bound_model_path
    )
}

/// Rewrite every qualifying factory header and prepend the metaclass import
/// when at least one header changed.
pub fn rewrite_factory_source(module: &ParsedModule, config: &TypifyConfig) -> Rewrite {
    let matches = find_factory_bindings(module, config);
    if matches.is_empty() {
        return Rewrite::unchanged(module.source());
    }

    let mut edits = vec![SourceEdit::InsertAfter {
        line: 0,
        lines: vec![config.metaclass_import.clone()],
    }];
    for found in &matches {
        edits.push(SourceEdit::Replace {
            line: found.header_start,
            text: factory_header(&found.binding, config),
        });
        for line in found.header_start + 1..=found.header_end {
            edits.push(SourceEdit::Remove { line });
        }
    }

    let source = apply_edits(module.lines(), &edits);
    Rewrite {
        changed: source != module.source(),
        source,
    }
}

/// Full text of the lines the class spans.
fn class_text(module: &ParsedModule, class: Node<'_>) -> String {
    let table = module.lines();
    let start = module.start_line(class);
    let end = module.end_line(class).min(table.len());
    if start > end {
        return String::new();
    }
    table.lines()[start - 1..end].join("\n")
}

fn declares_metaclass(module: &ParsedModule, class: Node<'_>) -> bool {
    let Some(superclasses) = class.child_by_field_name("superclasses") else {
        return false;
    };
    let mut cursor = superclasses.walk();
    let declares = superclasses
        .named_children(&mut cursor)
        .filter(|arg| arg.kind() == "keyword_argument")
        .filter_map(|arg| arg.child_by_field_name("name"))
        .any(|name| module.text(name) == "metaclass");
    declares
}

/// Text of `model = ...` inside the first nested `class Meta`.
fn meta_model_path(module: &ParsedModule, class: Node<'_>) -> Option<String> {
    let meta = body_statements(class)
        .into_iter()
        .filter_map(as_class_definition)
        .find(|inner| module.name_of(*inner) == Some("Meta"))?;

    for statement in body_statements(meta) {
        let Some(assignment) = module.statement_assignment(statement) else {
            continue;
        };
        if assignment.child_by_field_name("type").is_some() {
            continue;
        }
        let (targets, Some(value)) = module.assignment_parts(assignment) else {
            continue;
        };
        match targets.as_slice() {
            [target] if target.kind() == "identifier" && module.text(*target) == "model" => {
                return model_value_text(module, assignment, value);
            }
            _ => continue,
        }
    }
    None
}

/// Slice the original line after its first `=`. When the value ends on the
/// same line the slice stops at the value, leaving trailing comments out.
fn model_value_text(
    module: &ParsedModule,
    assignment: Node<'_>,
    value: Node<'_>,
) -> Option<String> {
    let line_number = module.start_line(assignment);
    let line = module.lines().line(line_number)?;
    let line = if module.end_line(value) == line_number {
        line.get(..value.end_position().column).unwrap_or(line)
    } else {
        line
    };
    let text = match line.split_once('=') {
        Some((_, rest)) => rest.trim(),
        None => module.text(value).trim(),
    };
    (!text.is_empty()).then(|| text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_module;

    const IMPORT: &str = "from waldur_core.core.tests.types import BaseMetaFactory";

    fn rewrite(source: &str) -> Rewrite {
        let module = parse_module(source).unwrap();
        rewrite_factory_source(&module, &TypifyConfig::default())
    }

    #[test]
    fn test_rewrites_header_and_prepends_import() {
        let source = "import factory\n\nfrom . import models\n\n\nclass CustomerFactory(factory.django.DjangoModelFactory):\n    class Meta:\n        model = models.Customer\n\n    name = factory.Sequence(lambda n: f\"customer{n}\")\n";
        let result = rewrite(source);
        assert!(result.changed);
        let expected = format!(
            "{IMPORT}\nimport factory\n\nfrom . import models\n\n\nclass CustomerFactory(factory.django.DjangoModelFactory, metaclass=BaseMetaFactory[models.Customer]):\n    class Meta:\n        model = models.Customer\n\n    name = factory.Sequence(lambda n: f\"customer{{n}}\")\n"
        );
        assert_eq!(result.source, expected);
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let source = "class UserFactory(factory.django.DjangoModelFactory):\n    class Meta:\n        model = User\n";
        let first = rewrite(source);
        assert!(first.changed);
        let second = rewrite(&first.source);
        assert!(!second.changed);
        assert_eq!(second.source, first.source);
        assert_eq!(second.source.matches(IMPORT).count(), 1);
    }

    #[test]
    fn test_model_text_kept_verbatim() {
        let source = "class ProjectFactory(DjangoModelFactory):\n    class Meta:\n        model = \"structure.Project\"  # string reference\n";
        let result = rewrite(source);
        assert!(result.source.contains(
            "class ProjectFactory(factory.django.DjangoModelFactory, metaclass=BaseMetaFactory[\"structure.Project\"]):"
        ));
    }

    #[test]
    fn test_multiline_header_collapses() {
        let source = "class OfferingFactory(\n    factory.django.DjangoModelFactory\n):\n    class Meta:\n        model = marketplace_models.Offering\n\n    name = 'offering'\n";
        let result = rewrite(source);
        let expected = format!(
            "{IMPORT}\nclass OfferingFactory(factory.django.DjangoModelFactory, metaclass=BaseMetaFactory[marketplace_models.Offering]):\n    class Meta:\n        model = marketplace_models.Offering\n\n    name = 'offering'\n"
        );
        assert_eq!(result.source, expected);
    }

    #[test]
    fn test_skips_explicit_metaclass() {
        let source = "class UserFactory(factory.django.DjangoModelFactory, metaclass=Custom):\n    class Meta:\n        model = User\n";
        let result = rewrite(source);
        assert!(!result.changed);
        assert_eq!(result.source, source);
    }

    #[test]
    fn test_skips_non_factory_and_missing_meta() {
        let source = "class Helper:\n    class Meta:\n        model = User\n\nclass NoMetaFactory(factory.django.DjangoModelFactory):\n    name = 'x'\n\nclass NoModelFactory(factory.django.DjangoModelFactory):\n    class Meta:\n        abstract = True\n";
        let result = rewrite(source);
        assert!(!result.changed);
        assert_eq!(result.source, source);
    }

    #[test]
    fn test_only_first_meta_is_searched() {
        let source = "class UserFactory(factory.django.DjangoModelFactory):\n    class Meta:\n        abstract = True\n\n    class Meta:\n        model = User\n";
        assert!(!rewrite(source).changed);
    }

    #[test]
    fn test_bindings_report_header_span() {
        let source = "class A(DjangoModelFactory):\n    class Meta:\n        model = app.A\n\nclass B(\n    DjangoModelFactory,\n):\n    class Meta:\n        model = app.B\n";
        let module = parse_module(source).unwrap();
        let found = find_factory_bindings(&module, &TypifyConfig::default());
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].binding.factory_class_name, "A");
        assert_eq!(found[0].binding.bound_model_path, "app.A");
        assert_eq!((found[0].header_start, found[0].header_end), (1, 1));
        assert_eq!(found[1].binding.bound_model_path, "app.B");
        assert_eq!((found[1].header_start, found[1].header_end), (5, 7));
    }

    #[test]
    fn test_preserves_crlf_endings() {
        let source = "class UserFactory(DjangoModelFactory):\r\n    class Meta:\r\n        model = User\r\n";
        let result = rewrite(source);
        assert_eq!(
            result.source,
            format!("{IMPORT}\r\nclass UserFactory(factory.django.DjangoModelFactory, metaclass=BaseMetaFactory[User]):\r\n    class Meta:\r\n        model = User\r\n")
        );
    }
}
