//! Facts recovered from a single parsed file.
//!
//! Everything here is built from one parse and dropped once that file has
//! been written or its stub emitted.

use indexmap::IndexMap;

/// Marker value of `related_name` meaning "no reverse accessor".
pub const NO_REVERSE_ACCESSOR: &str = "+";

/// `source_model` declares a relation field pointing at `target_model`,
/// which gains a reverse accessor called `accessor_name`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReverseRelation {
    pub target_model: String,
    pub accessor_name: String,
    pub source_model: String,
}

impl ReverseRelation {
    pub fn new(target_model: &str, accessor_name: &str, source_model: &str) -> Self {
        ReverseRelation {
            target_model: target_model.to_string(),
            accessor_name: accessor_name.to_string(),
            source_model: source_model.to_string(),
        }
    }
}

/// Target model -> `(accessor_name, source_model)` in first-seen order.
pub type AnnotationMap = IndexMap<String, Vec<(String, String)>>;

/// Group relations by target model, keeping source order both for the
/// models and for the accessors within each model.
pub fn group_relations(relations: &[ReverseRelation]) -> AnnotationMap {
    let mut annotations = AnnotationMap::new();
    for relation in relations {
        annotations
            .entry(relation.target_model.clone())
            .or_default()
            .push((
                relation.accessor_name.clone(),
                relation.source_model.clone(),
            ));
    }
    annotations
}

/// A factory class and the verbatim text of its `Meta.model` value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FactoryBinding {
    pub factory_class_name: String,
    pub bound_model_path: String,
}

/// A view-set class and the model its `queryset` iterates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewModelBinding {
    pub view_class_name: String,
    /// Dotted path as written, collapsed to at most two segments.
    pub model_path: String,
    /// Final segment of `model_path`.
    pub simple_model_name: String,
}

/// Result of a rewriting pass over one file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rewrite {
    pub changed: bool,
    pub source: String,
}

impl Rewrite {
    pub fn unchanged(source: &str) -> Self {
        Rewrite {
            changed: false,
            source: source.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_relations_keeps_first_seen_order() {
        let relations = vec![
            ReverseRelation::new("User", "posts", "Post"),
            ReverseRelation::new("Network", "ports", "Port"),
            ReverseRelation::new("User", "comments", "Comment"),
        ];
        let grouped = group_relations(&relations);
        let models: Vec<&str> = grouped.keys().map(|k| k.as_str()).collect();
        assert_eq!(models, vec!["User", "Network"]);
        assert_eq!(
            grouped["User"],
            vec![
                ("posts".to_string(), "Post".to_string()),
                ("comments".to_string(), "Comment".to_string()),
            ]
        );
    }

    #[test]
    fn test_group_relations_empty() {
        assert!(group_relations(&[]).is_empty());
    }
}
