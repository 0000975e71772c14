//! typify core library: static type-annotation inference for Django sources.
//!
//! Three passes share one parsing and editing layer:
//!
//! - **models**: reverse-relation managers (`posts: models.Manager['Post']`)
//!   inserted into target model bodies, or emitted as a `.pyi` stub.
//! - **factories**: factory_boy headers gain a generic metaclass bound to the
//!   factory's `Meta.model`.
//! - **views**: view-set method variables holding the queryset's model are
//!   annotated in place.
//!
//! Every rewrite touches only the lines it has to; everything else is copied
//! through byte for byte.

pub mod config;
pub mod discovery;
pub mod edits;
pub mod errors;
pub mod factories;
pub mod facts;
pub mod parser;
pub mod pipeline;
pub mod relations;
pub mod render;
pub mod stubgen;
pub mod views;

pub use config::TypifyConfig;
pub use discovery::{discover, TargetKind};
pub use errors::{TypifyError, TypifyResult};
pub use pipeline::{process_file, run_batch, run_batch_with, BatchReport, FileOutcome, Mode, ProcessOptions};
