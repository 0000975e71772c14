//! Target file discovery for a directory tree.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::TypifyConfig;

const IMPLICIT_IGNORED_DIRS: &[&str] = &[".git", "__pycache__", "node_modules", ".venv", "venv"];

/// Which family of Django source files a pass operates on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Models,
    Factories,
    Views,
}

impl TargetKind {
    /// Whether a file called `file_name` belongs to this kind.
    pub fn matches(self, file_name: &str) -> bool {
        match self {
            TargetKind::Models => file_name == "models.py",
            TargetKind::Factories => file_name.ends_with("factories.py"),
            TargetKind::Views => file_name == "views.py",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TargetKind::Models => "models",
            TargetKind::Factories => "factories",
            TargetKind::Views => "views",
        };
        f.write_str(label)
    }
}

/// Lazily walk `root` for files of `kind`, sorted by file name.
///
/// Every call starts a fresh walk. Unreadable entries are logged and skipped.
pub fn discover<'a>(
    root: &'a Path,
    kind: TargetKind,
    config: &'a TypifyConfig,
) -> impl Iterator<Item = PathBuf> + 'a {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |entry| !is_excluded(root, entry, config))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(move |entry| kind.matches(&entry.file_name().to_string_lossy()))
        .map(move |entry| {
            debug!(path = %entry.path().display(), %kind, "discovered target");
            entry.into_path()
        })
}

fn is_excluded(root: &Path, entry: &DirEntry, config: &TypifyConfig) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    if entry.file_type().is_dir() && IMPLICIT_IGNORED_DIRS.contains(&&*name) {
        return true;
    }
    if config.exclude.is_empty() {
        return false;
    }
    let rel = entry
        .path()
        .strip_prefix(root)
        .unwrap_or(entry.path())
        .to_string_lossy()
        .replace('\\', "/");
    config
        .exclude
        .iter()
        .any(|pattern| glob_match(&rel, pattern) || glob_match(&name, pattern))
}

/// Glob match supporting `*` and `?`. `*` also crosses `/`.
fn glob_match(text: &str, pattern: &str) -> bool {
    let t: Vec<char> = text.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    let mut dp = vec![vec![false; p.len() + 1]; t.len() + 1];
    dp[0][0] = true;
    for j in 1..=p.len() {
        if p[j - 1] == '*' {
            dp[0][j] = dp[0][j - 1];
        }
    }
    for i in 1..=t.len() {
        for j in 1..=p.len() {
            dp[i][j] = match p[j - 1] {
                '*' => dp[i][j - 1] || dp[i - 1][j],
                '?' => dp[i - 1][j - 1],
                c => c == t[i - 1] && dp[i - 1][j - 1],
            };
        }
    }
    dp[t.len()][p.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    fn found(root: &Path, kind: TargetKind, config: &TypifyConfig) -> Vec<String> {
        discover(root, kind, config)
            .map(|p| {
                p.strip_prefix(root)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect()
    }

    #[test]
    fn test_kind_matching() {
        assert!(TargetKind::Models.matches("models.py"));
        assert!(!TargetKind::Models.matches("base_models.py"));
        assert!(TargetKind::Factories.matches("factories.py"));
        assert!(TargetKind::Factories.matches("test_factories.py"));
        assert!(!TargetKind::Factories.matches("factories.pyi"));
        assert!(TargetKind::Views.matches("views.py"));
        assert!(!TargetKind::Views.matches("viewsets.py"));
    }

    #[test]
    fn test_discover_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "b/models.py");
        touch(root, "a/models.py");
        touch(root, "a/views.py");
        touch(root, "a/tests/factories.py");
        touch(root, "a/tests/marketplace_factories.py");
        touch(root, ".git/models.py");
        touch(root, "venv/lib/models.py");
        touch(root, "a/__pycache__/models.py");

        let config = TypifyConfig::default();
        assert_eq!(
            found(root, TargetKind::Models, &config),
            vec!["a/models.py", "b/models.py"]
        );
        assert_eq!(found(root, TargetKind::Views, &config), vec!["a/views.py"]);
        assert_eq!(
            found(root, TargetKind::Factories, &config),
            vec!["a/tests/factories.py", "a/tests/marketplace_factories.py"]
        );
    }

    #[test]
    fn test_discover_is_restartable() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "app/models.py");
        let config = TypifyConfig::default();
        let first = found(dir.path(), TargetKind::Models, &config);
        let second = found(dir.path(), TargetKind::Models, &config);
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
    }

    #[test]
    fn test_exclude_patterns() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "core/models.py");
        touch(root, "legacy/models.py");
        touch(root, "migrations_old/app/models.py");

        let config = TypifyConfig {
            exclude: vec!["legacy".to_string(), "migrations_*".to_string()],
            ..TypifyConfig::default()
        };
        assert_eq!(
            found(root, TargetKind::Models, &config),
            vec!["core/models.py"]
        );
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("a/b/models.py", "*models.py"));
        assert!(glob_match("views.py", "view?.py"));
        assert!(!glob_match("views.py", "model*"));
        assert!(glob_match("", "*"));
    }
}
