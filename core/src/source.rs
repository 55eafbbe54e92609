use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Raster formats the renderer decodes in-process.
pub const NATIVE_EXTENSIONS: [&str; 8] = [
    "jpg", "jpeg", "png", "gif", "bmp", "webp", "tif", "tiff",
];

/// RAW camera formats handled through the external extraction capability.
pub const RAW_EXTENSIONS: [&str; 8] = [
    "cr2", "cr3", "arw", "nef", "dng", "raf", "orf", "rw2",
];

/// How a source file's bytes become pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    /// Decoded directly by the image codecs.
    NativeRaster,
    /// Preview bytes pulled out by the extraction capability.
    Raw,
    /// Unknown extension; only reachable when the user names the file
    /// explicitly, and routed through the extraction capability as a last
    /// resort.
    Unsupported,
}

impl SourceKind {
    pub fn classify(path: &Path) -> SourceKind {
        match lowercase_extension(path) {
            Some(ext) if NATIVE_EXTENSIONS.contains(&ext.as_str()) => SourceKind::NativeRaster,
            Some(ext) if RAW_EXTENSIONS.contains(&ext.as_str()) => SourceKind::Raw,
            _ => SourceKind::Unsupported,
        }
    }
}

/// True when the extension belongs to the native or RAW sets. Directory
/// discovery only dispatches recognized files.
pub fn is_recognized(path: &Path) -> bool {
    !matches!(SourceKind::classify(path), SourceKind::Unsupported)
}

fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

/// Immutable snapshot of a source file, taken once at job-dispatch time.
/// The path is canonical (symlinks resolved), which makes the derived cache
/// identity a pure function of the file's location.
#[derive(Clone, Debug)]
pub struct SourceFile {
    pub path: PathBuf,
    pub mtime: i64,
    pub size_bytes: u64,
    pub kind: SourceKind,
}

impl SourceFile {
    pub fn snapshot(path: &Path) -> Result<Self, PathResolutionError> {
        let canonical = fs::canonicalize(path).map_err(|source| PathResolutionError {
            path: path.to_path_buf(),
            source,
        })?;
        let metadata = fs::metadata(&canonical).map_err(|source| PathResolutionError {
            path: canonical.clone(),
            source,
        })?;
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|stamp| stamp.duration_since(UNIX_EPOCH).ok())
            .map(|elapsed| elapsed.as_secs() as i64)
            .unwrap_or(0);
        let kind = SourceKind::classify(&canonical);

        Ok(Self {
            path: canonical,
            mtime,
            size_bytes: metadata.len(),
            kind,
        })
    }
}

/// The source path could not be canonicalized or statted: dangling symlink,
/// permission denied, or a file removed between discovery and dispatch.
#[derive(Debug)]
pub struct PathResolutionError {
    pub path: PathBuf,
    pub source: std::io::Error,
}

impl Display for PathResolutionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cannot resolve {}: {}",
            self.path.display(),
            self.source
        )
    }
}

impl Error for PathResolutionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}
