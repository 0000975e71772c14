//! `.pyi` stub emission for reverse relations.

use std::path::{Path, PathBuf};

use crate::config::TypifyConfig;
use crate::facts::{group_relations, AnnotationMap};
use crate::parser::ParsedModule;
use crate::relations::extract_reverse_relations;
use crate::render::annotation_line;

const STUB_INDENT: &str = "    ";

pub fn generate_stub_lines(annotations: &AnnotationMap, config: &TypifyConfig) -> Vec<String> {
    let mut lines = vec![config.stub_header.clone(), String::new()];
    for (model, entries) in annotations {
        lines.push(format!("class {model}:"));
        lines.extend(
            entries
                .iter()
                .map(|(accessor, source)| annotation_line(STUB_INDENT, accessor, source, config)),
        );
        lines.push(String::new());
    }
    lines
}

/// Stub text for `module`, or `None` when it declares no reverse relations.
pub fn generate_stub_source(module: &ParsedModule, config: &TypifyConfig) -> Option<String> {
    let relations = extract_reverse_relations(module, config);
    if relations.is_empty() {
        return None;
    }
    let annotations = group_relations(&relations);
    Some(generate_stub_lines(&annotations, config).join("\n"))
}

/// `app/models.py` -> `app/models.pyi`.
pub fn stub_path_for(path: &Path) -> PathBuf {
    path.with_extension("pyi")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_module;

    #[test]
    fn test_stub_lines_for_grouped_relations() {
        let mut annotations = AnnotationMap::new();
        annotations.insert(
            "Network".to_string(),
            vec![("rbac_policies".to_string(), "NetworkRBACPolicy".to_string())],
        );
        annotations.insert(
            "Instance".to_string(),
            vec![("ports".to_string(), "Port".to_string())],
        );

        let lines = generate_stub_lines(&annotations, &TypifyConfig::default());
        assert_eq!(
            lines,
            vec![
                "from django.db import models",
                "",
                "class Network:",
                "    rbac_policies: models.Manager['NetworkRBACPolicy']",
                "",
                "class Instance:",
                "    ports: models.Manager['Port']",
                "",
            ]
        );
    }

    #[test]
    fn test_stub_source_from_module() {
        let source = "class Network(models.Model):\n    pass\n\nclass Port(models.Model):\n    network = models.ForeignKey(Network, related_name=\"ports\")\n    peer = models.ForeignKey(\"self.Network\", related_name=\"peers\")\n";
        let module = parse_module(source).unwrap();
        let stub = generate_stub_source(&module, &TypifyConfig::default()).unwrap();
        assert_eq!(
            stub,
            "from django.db import models\n\nclass Network:\n    ports: models.Manager['Port']\n    peers: models.Manager['Port']\n"
        );
    }

    #[test]
    fn test_no_relations_means_no_stub() {
        let module = parse_module("class Plain(models.Model):\n    name = models.CharField()\n").unwrap();
        assert!(generate_stub_source(&module, &TypifyConfig::default()).is_none());
    }

    #[test]
    fn test_custom_header_and_manager() {
        let mut annotations = AnnotationMap::new();
        annotations.insert("A".to_string(), vec![("bs".to_string(), "B".to_string())]);
        let config = TypifyConfig {
            stub_header: "from django.db.models import Manager".to_string(),
            manager_type: "Manager".to_string(),
            ..TypifyConfig::default()
        };
        let lines = generate_stub_lines(&annotations, &config);
        assert_eq!(lines[0], "from django.db.models import Manager");
        assert_eq!(lines[3], "    bs: Manager['B']");
    }

    #[test]
    fn test_stub_path_for() {
        assert_eq!(
            stub_path_for(Path::new("app/models.py")),
            PathBuf::from("app/models.pyi")
        );
    }
}
