//! django-typify - static type annotations for Django projects
//!
//! Usage:
//!   django-typify annotate-models <path>             Insert reverse-relation managers
//!   django-typify annotate-models <path> --stub      Write sibling .pyi stubs instead
//!   django-typify annotate-factories <path>          Bind factory metaclasses to models
//!   django-typify annotate-views <path>              Annotate view-set instance variables
//!   django-typify <command> <path> --dry-run         Print diffs, write nothing

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use typify_core::{
    run_batch_with, BatchReport, FileOutcome, Mode, ProcessOptions, TargetKind, TypifyConfig, TypifyResult,
};

#[derive(Parser, Debug)]
#[command(name = "django-typify")]
#[command(about = "Annotate Django models, factories and views with static types", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file, overriding .django-typify.json and $DJANGO_TYPIFY_CONFIG
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add reverse-relation manager annotations to models.py files
    AnnotateModels {
        /// Project directory or single file
        path: PathBuf,

        /// Write <name>.pyi stubs next to each models.py instead of editing it
        #[arg(long)]
        stub: bool,

        /// Show what would change without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Bind factory_boy factories to their models through a generic metaclass
    AnnotateFactories {
        /// Project directory or single file
        path: PathBuf,

        /// Show what would change without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Annotate model instances in view-set methods
    AnnotateViews {
        /// Project directory or single file
        path: PathBuf,

        /// Show what would change without writing
        #[arg(long)]
        dry_run: bool,
    },
}

impl Commands {
    fn target(&self) -> (&Path, TargetKind, ProcessOptions) {
        match self {
            Commands::AnnotateModels {
                path,
                stub,
                dry_run,
            } => (
                path.as_path(),
                TargetKind::Models,
                ProcessOptions {
                    mode: if *stub { Mode::Stub } else { Mode::Rewrite },
                    dry_run: *dry_run,
                },
            ),
            Commands::AnnotateFactories { path, dry_run } => (
                path.as_path(),
                TargetKind::Factories,
                ProcessOptions {
                    mode: Mode::Rewrite,
                    dry_run: *dry_run,
                },
            ),
            Commands::AnnotateViews { path, dry_run } => (
                path.as_path(),
                TargetKind::Views,
                ProcessOptions {
                    mode: Mode::Rewrite,
                    dry_run: *dry_run,
                },
            ),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let kind = cli.command.target().1;
    let report = execute(&cli)?;

    println!(
        "{kind}: {} file(s), {} updated, {} unchanged, {} stub(s), {} would update, {} failed",
        report.processed(),
        report.updated,
        report.unchanged,
        report.stubs_written,
        report.would_update,
        report.failed.len()
    );

    if report.has_failures() {
        std::process::exit(1);
    }
    Ok(())
}

/// Load the config for the target path and run the batch.
fn execute(cli: &Cli) -> Result<BatchReport> {
    let (path, kind, options) = cli.command.target();
    let config_root = if path.is_dir() {
        path
    } else {
        path.parent().unwrap_or(Path::new("."))
    };
    let config = TypifyConfig::load(config_root, cli.config.as_deref())
        .with_context(|| format!("failed to load configuration for {}", path.display()))?;

    Ok(run_batch_with(path, kind, options, &config, print_outcome))
}

/// One console line per file, separate from the tracing output on stderr.
fn print_outcome(path: &Path, result: &TypifyResult<FileOutcome>) {
    match result {
        Ok(FileOutcome::Updated) => println!("updated: {}", path.display()),
        Ok(FileOutcome::Unchanged) => println!("no changes: {}", path.display()),
        Ok(FileOutcome::StubWritten(stub)) => println!("stub written: {}", stub.display()),
        Ok(FileOutcome::WouldUpdate(diff)) => {
            println!("would update: {}", path.display());
            print!("{diff}");
        }
        Err(e) => println!("error: {}: {e}", path.display()),
    }
}

/// Logs go to stderr; `RUST_LOG` wins over `--verbose`.
fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_models_with_stub() {
        let cli = Cli::try_parse_from(["django-typify", "annotate-models", "src", "--stub"]).unwrap();
        let (path, kind, options) = cli.command.target();
        assert_eq!(path, Path::new("src"));
        assert_eq!(kind, TargetKind::Models);
        assert_eq!(options.mode, Mode::Stub);
        assert!(!options.dry_run);
        assert!(!cli.verbose);
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "django-typify",
            "annotate-views",
            "app",
            "--dry-run",
            "-v",
            "--config",
            "typify.json",
        ])
        .unwrap();
        let (_, kind, options) = cli.command.target();
        assert_eq!(kind, TargetKind::Views);
        assert!(options.dry_run);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("typify.json")));
    }

    #[test]
    fn test_factories_reject_stub_flag() {
        assert!(
            Cli::try_parse_from(["django-typify", "annotate-factories", "app", "--stub"]).is_err()
        );
    }

    #[test]
    fn test_path_is_required() {
        assert!(Cli::try_parse_from(["django-typify", "annotate-models"]).is_err());
    }

    #[test]
    fn test_factories_default_options() {
        let cli = Cli::try_parse_from(["django-typify", "annotate-factories", "."]).unwrap();
        let (_, kind, options) = cli.command.target();
        assert_eq!(kind, TargetKind::Factories);
        assert_eq!(options, ProcessOptions::default());
    }

    #[test]
    fn test_execute_uses_project_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".django-typify.json"),
            r#"{"manager_accessor": "all_objects"}"#,
        )
        .unwrap();
        let views = dir.path().join("app/views.py");
        std::fs::create_dir_all(views.parent().unwrap()).unwrap();
        std::fs::write(
            &views,
            "class NodeViewSet(ViewSet):\n    queryset = Node.all_objects.all()\n\n    def get(self, request):\n        node = self.get_object()\n",
        )
        .unwrap();

        let root = dir.path().to_string_lossy().to_string();
        let cli = Cli::try_parse_from(["django-typify", "annotate-views", root.as_str()]).unwrap();
        let report = execute(&cli).unwrap();
        assert_eq!(report.updated, 1);
        assert!(!report.has_failures());
        assert!(std::fs::read_to_string(&views)
            .unwrap()
            .contains("        node: Node = self.get_object()\n"));
    }

    #[test]
    fn test_execute_single_file_dry_run_and_failures() {
        let dir = tempfile::tempdir().unwrap();
        let models = dir.path().join("models.py");
        let source = "class User(models.Model):\n    pass\n\nclass Post(models.Model):\n    author = models.ForeignKey(User, related_name=\"posts\")\n";
        std::fs::write(&models, source).unwrap();

        let file = models.to_string_lossy().to_string();
        let cli = Cli::try_parse_from(["django-typify", "annotate-models", file.as_str(), "--dry-run"])
            .unwrap();
        let report = execute(&cli).unwrap();
        assert_eq!(report.would_update, 1);
        assert_eq!(std::fs::read_to_string(&models).unwrap(), source);

        std::fs::write(&models, "class Broken(:\n").unwrap();
        let report = execute(&cli).unwrap();
        assert!(report.has_failures());
    }

    #[test]
    fn test_execute_rejects_missing_explicit_config() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_string_lossy().to_string();
        let missing = dir.path().join("missing.json").to_string_lossy().to_string();
        let cli = Cli::try_parse_from([
            "django-typify",
            "annotate-factories",
            root.as_str(),
            "--config",
            missing.as_str(),
        ])
        .unwrap();
        assert!(execute(&cli).is_err());
    }
}
