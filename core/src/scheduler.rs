use crate::cache::{self, CacheError, CacheKey, EntryTags, ThumbnailCache, WriteError};
use crate::extract::{ExifTool, ExtractionError, Preview};
use crate::normalize::{self, DecodeError};
use crate::render::{self, RenderError};
use crate::source::{self, PathResolutionError, SourceFile};
use crate::tier::SizeTier;
use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// Parameters for one scheduler run.
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// Cache root; `None` means the user's standard thumbnail location.
    pub cache_root: Option<PathBuf>,
    /// Worker pool size; 0 means host parallelism.
    pub jobs: usize,
    /// Regenerate every entry, bypassing the staleness filter.
    pub force: bool,
    /// Extraction capability for RAW/unsupported files.
    pub extractor: ExifTool,
}

impl RunConfig {
    pub fn new() -> Self {
        Self {
            cache_root: None,
            jobs: 0,
            force: false,
            extractor: ExifTool::default(),
        }
    }

    pub fn with_cache_root(mut self, root: PathBuf) -> Self {
        self.cache_root = Some(root);
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_extractor(mut self, extractor: ExifTool) -> Self {
        self.extractor = extractor;
        self
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Pipeline stage a job failed in, for reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Resolve,
    Extract,
    Decode,
    Render,
    Write,
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Resolve => "resolve",
            Self::Extract => "extract",
            Self::Decode => "decode",
            Self::Render => "render",
            Self::Write => "write",
        };
        write!(f, "{}", label)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum JobOutcome {
    /// At least one tier was (re)generated.
    Generated,
    /// Every tier's cache entry was already fresh.
    SkippedFresh,
    Failed { stage: Stage, reason: String },
}

/// Terminal record for one source file.
#[derive(Clone, Debug, Serialize)]
pub struct JobResult {
    pub path: PathBuf,
    #[serde(flatten)]
    pub outcome: JobOutcome,
}

/// Aggregate of a whole run, folded from individual job results with no
/// shared mutable counters.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RunSummary {
    pub generated: u64,
    pub skipped: u64,
    pub failed: u64,
    pub failures: Vec<JobResult>,
}

impl RunSummary {
    pub fn record(&mut self, result: JobResult) {
        match result.outcome {
            JobOutcome::Generated => self.generated += 1,
            JobOutcome::SkippedFresh => self.skipped += 1,
            JobOutcome::Failed { .. } => {
                self.failed += 1;
                self.failures.push(result);
            }
        }
    }

    pub fn merge(mut left: Self, right: Self) -> Self {
        left.generated += right.generated;
        left.skipped += right.skipped;
        left.failed += right.failed;
        left.failures.extend(right.failures);
        left
    }

    pub fn total(&self) -> u64 {
        self.generated + self.skipped + self.failed
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Runs the whole pipeline: discover candidate files under `input`, filter
/// fresh entries, fan the remaining jobs across a fixed-size worker pool,
/// and fold the results. Only setup problems abort the run; per-job errors
/// become `Failed` results and the batch continues.
pub fn run(
    input: &Path,
    config: &RunConfig,
    progress: &Arc<ProgressBar>,
) -> Result<RunSummary, SetupError> {
    let cache = ThumbnailCache::new(config.cache_root.clone()).map_err(SetupError::Cache)?;
    let files = discover(input, progress)?;
    progress.set_length(files.len() as u64);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(effective_jobs(config.jobs))
        .build()
        .map_err(SetupError::Pool)?;

    let summary = pool.install(|| {
        files
            .par_iter()
            .map(|path| {
                progress.set_message(path.display().to_string());
                let result = process_file(path, &cache, config);
                progress.inc(1);
                result
            })
            .fold(RunSummary::default, |mut summary, result| {
                summary.record(result);
                summary
            })
            .reduce(RunSummary::default, RunSummary::merge)
    });

    Ok(summary)
}

/// Discovery: a single file is its own job set (whatever its extension —
/// the pipeline will classify it); a directory is walked recursively,
/// following symlinks, keeping recognized image extensions. Unreadable
/// entries are noted on the progress bar and skipped.
pub fn discover(input: &Path, progress: &ProgressBar) -> Result<Vec<PathBuf>, SetupError> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        return Err(SetupError::InputMissing(input.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(input).follow_links(true) {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_file() && source::is_recognized(entry.path()) {
                    files.push(entry.into_path());
                }
            }
            Err(error) => {
                progress.set_message(format!("walk error: {}", error));
            }
        }
    }
    Ok(files)
}

fn effective_jobs(jobs: usize) -> usize {
    if jobs > 0 {
        jobs
    } else {
        std::thread::available_parallelism()
            .map(|parallelism| parallelism.get())
            .unwrap_or(1)
    }
}

fn process_file(path: &Path, cache: &ThumbnailCache, config: &RunConfig) -> JobResult {
    let outcome = match generate(path, cache, config) {
        Ok(outcome) => outcome,
        Err(error) => JobOutcome::Failed {
            stage: error.stage(),
            reason: error.to_string(),
        },
    };
    JobResult {
        path: path.to_path_buf(),
        outcome,
    }
}

/// One job: snapshot the source, work out which tiers are stale, and only
/// then pay for extraction, decode, and rendering. The decoded buffer
/// lives for the duration of this call only.
fn generate(
    path: &Path,
    cache: &ThumbnailCache,
    config: &RunConfig,
) -> Result<JobOutcome, JobError> {
    let source = SourceFile::snapshot(path)?;
    let key = CacheKey::for_path(&source.path)?;

    let stale: Vec<(SizeTier, PathBuf)> = SizeTier::ALL
        .iter()
        .filter_map(|&tier| {
            let destination = cache.entry_path(&key, tier);
            let fresh = !config.force
                && cache::is_fresh(
                    &source,
                    &key.uri,
                    cache::read_entry_tags(&destination).as_ref(),
                );
            if fresh {
                None
            } else {
                Some((tier, destination))
            }
        })
        .collect();

    if stale.is_empty() {
        return Ok(JobOutcome::SkippedFresh);
    }

    let image = match config.extractor.extract(&source)? {
        Preview::Native { orientation } => normalize::open_oriented(&source.path, orientation)?,
        Preview::Embedded { bytes, orientation } => {
            normalize::decode_oriented(&bytes, orientation)?
        }
    };

    let tags = EntryTags {
        uri: key.uri.clone(),
        mtime: source.mtime,
        size: source.size_bytes,
    };
    for (tier, destination) in stale {
        let thumb = render::render(&image, tier);
        let bytes = render::encode_png(&thumb, &tags)?;
        cache.write_atomic(&bytes, &destination)?;
    }

    Ok(JobOutcome::Generated)
}

/// Per-job error taxonomy. Every variant is caught at the job boundary and
/// folded into the summary; none of them terminates a worker or the run.
#[derive(Debug)]
enum JobError {
    Resolve(PathResolutionError),
    Key(CacheError),
    Extraction(ExtractionError),
    Decode(DecodeError),
    Render(RenderError),
    Write(WriteError),
}

impl JobError {
    fn stage(&self) -> Stage {
        match self {
            Self::Resolve(_) | Self::Key(_) => Stage::Resolve,
            Self::Extraction(_) => Stage::Extract,
            Self::Decode(_) => Stage::Decode,
            Self::Render(_) => Stage::Render,
            Self::Write(_) => Stage::Write,
        }
    }
}

impl Display for JobError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resolve(error) => Display::fmt(error, f),
            Self::Key(error) => Display::fmt(error, f),
            Self::Extraction(error) => Display::fmt(error, f),
            Self::Decode(error) => Display::fmt(error, f),
            Self::Render(error) => Display::fmt(error, f),
            Self::Write(error) => Display::fmt(error, f),
        }
    }
}

impl From<PathResolutionError> for JobError {
    fn from(error: PathResolutionError) -> Self {
        Self::Resolve(error)
    }
}

impl From<CacheError> for JobError {
    fn from(error: CacheError) -> Self {
        Self::Key(error)
    }
}

impl From<ExtractionError> for JobError {
    fn from(error: ExtractionError) -> Self {
        Self::Extraction(error)
    }
}

impl From<DecodeError> for JobError {
    fn from(error: DecodeError) -> Self {
        Self::Decode(error)
    }
}

impl From<RenderError> for JobError {
    fn from(error: RenderError) -> Self {
        Self::Render(error)
    }
}

impl From<WriteError> for JobError {
    fn from(error: WriteError) -> Self {
        Self::Write(error)
    }
}

/// Problems that abort the run before any job is dispatched. Everything
/// else is a per-job failure.
#[derive(Debug)]
pub enum SetupError {
    InputMissing(PathBuf),
    Cache(CacheError),
    Pool(rayon::ThreadPoolBuildError),
}

impl Display for SetupError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InputMissing(path) => {
                write!(f, "input {} is not a file or directory", path.display())
            }
            Self::Cache(error) => write!(f, "cannot open thumbnail cache: {}", error),
            Self::Pool(error) => write!(f, "cannot build worker pool: {}", error),
        }
    }
}

impl Error for SetupError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Cache(error) => Some(error),
            Self::Pool(error) => Some(error),
            Self::InputMissing(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::fs;
    use tempfile::tempdir;

    fn write_photo(path: &Path, width: u32, height: u32) {
        let image = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 64])
        });
        image.save(path).unwrap();
    }

    fn config(cache_root: &Path) -> RunConfig {
        RunConfig::new()
            .with_cache_root(cache_root.to_path_buf())
            .with_jobs(2)
    }

    fn hidden() -> Arc<ProgressBar> {
        Arc::new(ProgressBar::hidden())
    }

    #[test]
    fn generates_every_tier_for_a_directory_of_images() {
        let photos = tempdir().unwrap();
        let cache_root = tempdir().unwrap();
        write_photo(&photos.path().join("a.png"), 640, 480);
        write_photo(&photos.path().join("b.jpg"), 320, 200);
        fs::write(photos.path().join("notes.txt"), b"ignored").unwrap();

        let summary = run(photos.path(), &config(cache_root.path()), &hidden()).unwrap();
        assert_eq!(summary.generated, 2);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.failed, 0);

        for tier in SizeTier::ALL {
            let dir = cache_root.path().join(tier.directory_name());
            let entries = fs::read_dir(&dir).unwrap().count();
            assert_eq!(entries, 2, "entries in {}", tier.directory_name());
        }
    }

    #[test]
    fn thumbnails_respect_the_tier_target_and_never_upscale() {
        let photos = tempdir().unwrap();
        let cache_root = tempdir().unwrap();
        let photo = photos.path().join("wide.png");
        write_photo(&photo, 512, 256);

        run(photos.path(), &config(cache_root.path()), &hidden()).unwrap();

        let source = SourceFile::snapshot(&photo).unwrap();
        let key = CacheKey::for_path(&source.path).unwrap();
        let cache = ThumbnailCache::new(Some(cache_root.path().to_path_buf())).unwrap();

        let normal = image::open(cache.entry_path(&key, SizeTier::Normal)).unwrap();
        assert_eq!((normal.width(), normal.height()), (128, 64));

        // Source is exactly 512 wide: x-large keeps it, xx-large must not
        // enlarge it.
        let xlarge = image::open(cache.entry_path(&key, SizeTier::XLarge)).unwrap();
        assert_eq!((xlarge.width(), xlarge.height()), (512, 256));
        let xxlarge = image::open(cache.entry_path(&key, SizeTier::XxLarge)).unwrap();
        assert_eq!((xxlarge.width(), xxlarge.height()), (512, 256));
    }

    #[test]
    fn second_run_skips_fresh_entries() {
        let photos = tempdir().unwrap();
        let cache_root = tempdir().unwrap();
        write_photo(&photos.path().join("a.png"), 64, 64);

        let config = config(cache_root.path());
        let first = run(photos.path(), &config, &hidden()).unwrap();
        assert_eq!(first.generated, 1);

        let second = run(photos.path(), &config, &hidden()).unwrap();
        assert_eq!(second.generated, 0);
        assert_eq!(second.skipped, 1);
    }

    #[test]
    fn idempotent_runs_produce_byte_identical_entries() {
        let photos = tempdir().unwrap();
        let cache_root = tempdir().unwrap();
        let photo = photos.path().join("a.png");
        write_photo(&photo, 96, 48);

        let config = config(cache_root.path());
        run(photos.path(), &config, &hidden()).unwrap();

        let source = SourceFile::snapshot(&photo).unwrap();
        let key = CacheKey::for_path(&source.path).unwrap();
        let cache = ThumbnailCache::new(Some(cache_root.path().to_path_buf())).unwrap();
        let entry = cache.entry_path(&key, SizeTier::Normal);
        let before = fs::read(&entry).unwrap();

        run(photos.path(), &config.clone().with_force(true), &hidden()).unwrap();
        let after = fs::read(&entry).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn force_regenerates_fresh_entries() {
        let photos = tempdir().unwrap();
        let cache_root = tempdir().unwrap();
        write_photo(&photos.path().join("a.png"), 64, 64);

        let base = config(cache_root.path());
        run(photos.path(), &base, &hidden()).unwrap();
        let forced = run(photos.path(), &base.clone().with_force(true), &hidden()).unwrap();
        assert_eq!(forced.generated, 1);
        assert_eq!(forced.skipped, 0);
    }

    #[test]
    fn changing_the_source_makes_its_entries_stale() {
        let photos = tempdir().unwrap();
        let cache_root = tempdir().unwrap();
        let photo = photos.path().join("a.png");
        write_photo(&photo, 64, 64);

        let config = config(cache_root.path());
        run(photos.path(), &config, &hidden()).unwrap();

        // Different content means a different size, which fails the
        // embedded-tag comparison even if mtime granularity hides the
        // rewrite.
        write_photo(&photo, 100, 80);
        let again = run(photos.path(), &config, &hidden()).unwrap();
        assert_eq!(again.generated, 1);
        assert_eq!(again.skipped, 0);
    }

    #[test]
    fn one_corrupt_file_fails_without_sinking_the_batch() {
        let photos = tempdir().unwrap();
        let cache_root = tempdir().unwrap();
        write_photo(&photos.path().join("good1.png"), 64, 64);
        write_photo(&photos.path().join("good2.png"), 64, 64);
        fs::write(photos.path().join("broken.jpg"), b"not a jpeg at all").unwrap();

        let summary = run(photos.path(), &config(cache_root.path()), &hidden()).unwrap();
        assert_eq!(summary.generated, 2);
        assert_eq!(summary.failed, 1);
        assert!(summary.has_failures());
        assert_eq!(summary.failures.len(), 1);
        assert!(summary.failures[0].path.ends_with("broken.jpg"));
        match &summary.failures[0].outcome {
            JobOutcome::Failed { stage, .. } => assert_eq!(*stage, Stage::Decode),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn failed_jobs_leave_no_partial_cache_entries() {
        let photos = tempdir().unwrap();
        let cache_root = tempdir().unwrap();
        fs::write(photos.path().join("broken.jpg"), b"garbage").unwrap();

        let summary = run(photos.path(), &config(cache_root.path()), &hidden()).unwrap();
        assert_eq!(summary.failed, 1);

        for tier in SizeTier::ALL {
            let dir = cache_root.path().join(tier.directory_name());
            if dir.exists() {
                assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
            }
        }
    }

    #[test]
    fn single_file_input_is_a_one_job_run() {
        let photos = tempdir().unwrap();
        let cache_root = tempdir().unwrap();
        let photo = photos.path().join("only.png");
        write_photo(&photo, 64, 64);
        write_photo(&photos.path().join("ignored.png"), 64, 64);

        let summary = run(&photo, &config(cache_root.path()), &hidden()).unwrap();
        assert_eq!(summary.total(), 1);
        assert_eq!(summary.generated, 1);
    }

    #[test]
    fn missing_input_is_a_setup_error() {
        let cache_root = tempdir().unwrap();
        let error = run(
            Path::new("/definitely/not/here"),
            &config(cache_root.path()),
            &hidden(),
        )
        .unwrap_err();
        assert!(matches!(error, SetupError::InputMissing(_)));
    }

    #[test]
    fn discovery_recurses_and_filters_by_extension() {
        let photos = tempdir().unwrap();
        let nested = photos.path().join("2025").join("01");
        fs::create_dir_all(&nested).unwrap();
        write_photo(&photos.path().join("top.png"), 16, 16);
        write_photo(&nested.join("deep.jpg"), 16, 16);
        fs::write(nested.join("skip.txt"), b"x").unwrap();
        fs::write(photos.path().join("shot.cr3"), b"raw-ish").unwrap();

        let found = discover(photos.path(), &ProgressBar::hidden()).unwrap();
        let mut names: Vec<_> = found
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["deep.jpg", "shot.cr3", "top.png"]);
    }

    #[test]
    fn cache_entries_embed_source_metadata() {
        let photos = tempdir().unwrap();
        let cache_root = tempdir().unwrap();
        let photo = photos.path().join("a.png");
        write_photo(&photo, 64, 64);

        run(photos.path(), &config(cache_root.path()), &hidden()).unwrap();

        let source = SourceFile::snapshot(&photo).unwrap();
        let key = CacheKey::for_path(&source.path).unwrap();
        let cache = ThumbnailCache::new(Some(cache_root.path().to_path_buf())).unwrap();
        let tags = cache::read_entry_tags(&cache.entry_path(&key, SizeTier::Large)).unwrap();
        assert_eq!(tags.uri, key.uri);
        assert_eq!(tags.mtime, source.mtime);
        assert_eq!(tags.size, source.size_bytes);
    }
}
