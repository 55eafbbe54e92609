//! Thumbnail production pipeline for thumbforge.
//!
//! This crate turns photo collections (RAW formats included) into
//! freedesktop-compatible cache entries: canonical `file://`-URI MD5
//! addressing, embedded `Thumb::*` staleness tags, atomic writes, and a
//! parallel scheduler that keeps one bad file from sinking a batch. The
//! CLI binary is a thin shell over [`scheduler::run`].

pub mod cache;
pub mod extract;
pub mod normalize;
pub mod progress;
pub mod render;
pub mod reporting;
pub mod scheduler;
pub mod source;
pub mod tier;

pub use cache::{
    is_fresh, read_entry_tags, CacheError, CacheKey, EntryTags, ThumbnailCache, WriteError,
};
pub use extract::{ExifTool, ExtractionError, Preview, DEFAULT_TIMEOUT};
pub use normalize::{apply_orientation, decode_oriented, open_oriented, DecodeError};
pub use render::{encode_png, render, RenderError};
pub use reporting::{print_summary, write_report, ReportingError};
pub use scheduler::{
    discover, run, JobOutcome, JobResult, RunConfig, RunSummary, SetupError, Stage,
};
pub use source::{PathResolutionError, SourceFile, SourceKind};
pub use tier::SizeTier;
