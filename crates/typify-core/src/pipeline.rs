//! Per-file processing and sequential batch runs.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use similar::TextDiff;
use tracing::{info, warn};

use crate::config::TypifyConfig;
use crate::discovery::{discover, TargetKind};
use crate::errors::{TypifyError, TypifyResult};
use crate::facts::{group_relations, Rewrite};
use crate::factories::rewrite_factory_source;
use crate::parser::{parse_module, ParsedModule};
use crate::relations::extract_reverse_relations;
use crate::render::annotate_model_source;
use crate::stubgen::{generate_stub_source, stub_path_for};
use crate::views::rewrite_view_source;

/// How model annotations are emitted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    /// Rewrite the source file in place.
    #[default]
    Rewrite,
    /// Write a sibling `.pyi` stub and leave the source alone.
    Stub,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcessOptions {
    pub mode: Mode,
    /// Compute the change but never write it.
    pub dry_run: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileOutcome {
    Updated,
    Unchanged,
    StubWritten(PathBuf),
    /// Dry run: unified diff of the change that would be written.
    WouldUpdate(String),
}

/// Counts for one batch run, plus the failures that were skipped over.
#[derive(Clone, Debug, Default)]
pub struct BatchReport {
    pub updated: usize,
    pub unchanged: usize,
    pub stubs_written: usize,
    pub would_update: usize,
    pub failed: Vec<(PathBuf, String)>,
}

impl BatchReport {
    pub fn processed(&self) -> usize {
        self.updated + self.unchanged + self.stubs_written + self.would_update + self.failed.len()
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    fn record(&mut self, path: &Path, result: &TypifyResult<FileOutcome>) {
        match result {
            Ok(FileOutcome::Updated) => self.updated += 1,
            Ok(FileOutcome::Unchanged) => self.unchanged += 1,
            Ok(FileOutcome::StubWritten(_)) => self.stubs_written += 1,
            Ok(FileOutcome::WouldUpdate(_)) => self.would_update += 1,
            Err(e) => self.failed.push((path.to_path_buf(), e.to_string())),
        }
    }
}

/// Run the pass for `kind` over one parsed module.
pub fn transform(module: &ParsedModule, kind: TargetKind, config: &TypifyConfig) -> Rewrite {
    match kind {
        TargetKind::Models => {
            let relations = extract_reverse_relations(module, config);
            if relations.is_empty() {
                return Rewrite::unchanged(module.source());
            }
            let annotations = group_relations(&relations);
            let source = annotate_model_source(module, &annotations, config);
            Rewrite {
                changed: source != module.source(),
                source,
            }
        }
        TargetKind::Factories => rewrite_factory_source(module, config),
        TargetKind::Views => rewrite_view_source(module, config),
    }
}

/// Read, parse, transform and (unless dry-running) write one file.
///
/// A file where nothing matched is reported as [`FileOutcome::Unchanged`]
/// and never written.
pub fn process_file(
    path: &Path,
    kind: TargetKind,
    options: ProcessOptions,
    config: &TypifyConfig,
) -> TypifyResult<FileOutcome> {
    if options.mode == Mode::Stub && kind != TargetKind::Models {
        return Err(TypifyError::UnsupportedMode(format!(
            "stub output is only available for models, not {kind}"
        )));
    }

    let source = fs::read_to_string(path).map_err(|e| TypifyError::io(path, e))?;
    let module = parse_module(&source)?;

    if options.mode == Mode::Stub {
        return emit_stub(path, &module, options, config);
    }

    let rewrite = transform(&module, kind, config);
    if !rewrite.changed {
        info!(path = %path.display(), "no changes");
        return Ok(FileOutcome::Unchanged);
    }
    if options.dry_run {
        info!(path = %path.display(), "would update");
        return Ok(FileOutcome::WouldUpdate(unified_diff(
            path,
            &source,
            &rewrite.source,
        )));
    }

    fs::write(path, &rewrite.source).map_err(|e| TypifyError::io(path, e))?;
    info!(path = %path.display(), "updated");
    Ok(FileOutcome::Updated)
}

fn emit_stub(
    path: &Path,
    module: &ParsedModule,
    options: ProcessOptions,
    config: &TypifyConfig,
) -> TypifyResult<FileOutcome> {
    let Some(stub) = generate_stub_source(module, config) else {
        info!(path = %path.display(), "no relations, no stub");
        return Ok(FileOutcome::Unchanged);
    };
    let stub_path = stub_path_for(path);

    if options.dry_run {
        let existing = match fs::read_to_string(&stub_path) {
            Ok(existing) => existing,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => return Err(TypifyError::io(&stub_path, e)),
        };
        if existing == stub {
            return Ok(FileOutcome::Unchanged);
        }
        return Ok(FileOutcome::WouldUpdate(unified_diff(
            &stub_path, &existing, &stub,
        )));
    }

    fs::write(&stub_path, &stub).map_err(|e| TypifyError::io(&stub_path, e))?;
    info!(path = %stub_path.display(), "stub written");
    Ok(FileOutcome::StubWritten(stub_path))
}

/// Unified diff between two versions of the file at `path`.
pub fn unified_diff(path: &Path, before: &str, after: &str) -> String {
    let label = path.display().to_string();
    TextDiff::from_lines(before, after)
        .unified_diff()
        .context_radius(3)
        .header(&label, &label)
        .to_string()
}

/// Process every file of `kind` under `root`, one at a time.
pub fn run_batch(
    root: &Path,
    kind: TargetKind,
    options: ProcessOptions,
    config: &TypifyConfig,
) -> BatchReport {
    run_batch_with(root, kind, options, config, |_, _| {})
}

/// Like [`run_batch`], calling `on_file` after each file with its result.
///
/// A failing file is logged and recorded; the batch always continues.
pub fn run_batch_with<F>(
    root: &Path,
    kind: TargetKind,
    options: ProcessOptions,
    config: &TypifyConfig,
    mut on_file: F,
) -> BatchReport
where
    F: FnMut(&Path, &TypifyResult<FileOutcome>),
{
    let mut report = BatchReport::default();
    for path in discover(root, kind, config) {
        let result = process_file(&path, kind, options, config);
        if let Err(e) = &result {
            warn!(path = %path.display(), error = %e, "failed to process file");
        }
        report.record(&path, &result);
        on_file(&path, &result);
    }
    info!(
        %kind,
        processed = report.processed(),
        updated = report.updated,
        failed = report.failed.len(),
        "batch finished"
    );
    report
}
