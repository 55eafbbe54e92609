use crate::source::SourceFile;
use crate::tier::SizeTier;
use dirs::cache_dir;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use url::Url;

/// Value of the `Software` tag written into every cache entry.
pub const SOFTWARE_TAG: &str = "thumbforge";

/// Canonical identity of a source file inside the shared cache: the
/// `file://` URI of its canonical absolute path and the lowercase hex MD5
/// of that URI. Both are fixed by the freedesktop.org thumbnail managing
/// standard; any other digest or encoding would make the entries invisible
/// to other cache consumers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheKey {
    pub uri: String,
    pub hash: String,
}

impl CacheKey {
    /// `path` must be absolute (and should be canonical — the caller
    /// resolves symlinks before deriving identity).
    pub fn for_path(path: &Path) -> Result<CacheKey, CacheError> {
        let url = Url::from_file_path(path)
            .map_err(|_| CacheError::NotAbsolute(path.to_path_buf()))?;
        let uri = String::from(url);
        let hash = format!("{:x}", md5::compute(uri.as_bytes()));
        Ok(CacheKey { uri, hash })
    }
}

/// Metadata embedded in a cache entry as PNG `tEXt` chunks. Readers use
/// `mtime`/`size` against a fresh stat of the source to decide staleness
/// without re-deriving anything.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryTags {
    pub uri: String,
    pub mtime: i64,
    pub size: u64,
}

/// Handle on a thumbnail cache root directory.
#[derive(Clone, Debug)]
pub struct ThumbnailCache {
    root: PathBuf,
}

impl ThumbnailCache {
    /// Opens (creating if needed) the cache at `root`, defaulting to the
    /// user's standard location (`~/.cache/thumbnails` on Linux).
    pub fn new(root: Option<PathBuf>) -> Result<Self, CacheError> {
        let root = match root {
            Some(path) => path,
            None => default_cache_root().ok_or(CacheError::CacheDirectoryUnavailable)?,
        };
        fs::create_dir_all(&root).map_err(|source| CacheError::Io {
            source,
            path: root.clone(),
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Destination path for one (source, tier) pair:
    /// `<root>/<tier-dir>/<md5>.png`.
    pub fn entry_path(&self, key: &CacheKey, tier: SizeTier) -> PathBuf {
        self.root
            .join(tier.directory_name())
            .join(format!("{}.png", key.hash))
    }

    /// Writes a finished entry so that no reader ever observes a partial
    /// file: the bytes go to a temp file in the destination directory,
    /// are synced, then renamed into place. The tier subdirectory is
    /// created on demand.
    pub fn write_atomic(&self, bytes: &[u8], destination: &Path) -> Result<(), WriteError> {
        let parent = destination
            .parent()
            .ok_or_else(|| WriteError::NoParent(destination.to_path_buf()))?;
        fs::create_dir_all(parent).map_err(|source| WriteError::Io {
            source,
            path: parent.to_path_buf(),
        })?;

        let mut staged = NamedTempFile::new_in(parent).map_err(|source| WriteError::Io {
            source,
            path: parent.to_path_buf(),
        })?;
        staged.write_all(bytes).map_err(|source| WriteError::Io {
            source,
            path: staged.path().to_path_buf(),
        })?;
        staged
            .as_file_mut()
            .sync_all()
            .map_err(|source| WriteError::Io {
                source,
                path: staged.path().to_path_buf(),
            })?;
        staged
            .persist(destination)
            .map_err(|error| WriteError::Io {
                source: error.error,
                path: destination.to_path_buf(),
            })?;
        Ok(())
    }
}

/// Parses the `Thumb::*` tags back out of an existing entry. `None` means
/// the entry is missing, unreadable, or lacks the required tags — all of
/// which the freshness check treats as stale.
pub fn read_entry_tags(path: &Path) -> Option<EntryTags> {
    let file = File::open(path).ok()?;
    read_tags_from(BufReader::new(file))
}

pub fn read_tags_from<R: Read>(reader: R) -> Option<EntryTags> {
    let decoder = png::Decoder::new(reader);
    let png_reader = decoder.read_info().ok()?;
    let info = png_reader.info();

    let mut uri = None;
    let mut mtime = None;
    let mut size = None;
    for chunk in &info.uncompressed_latin1_text {
        match chunk.keyword.as_str() {
            "Thumb::URI" => uri = Some(chunk.text.clone()),
            "Thumb::MTime" => mtime = chunk.text.trim().parse().ok(),
            "Thumb::Size" => size = chunk.text.trim().parse().ok(),
            _ => {}
        }
    }
    Some(EntryTags {
        uri: uri?,
        mtime: mtime?,
        size: size?,
    })
}

/// Staleness predicate: an entry is fresh when it identifies the same URI
/// and its embedded mtime and size both match the current snapshot. Pure
/// function of its inputs; the I/O that produced `tags` lives elsewhere.
pub fn is_fresh(source: &SourceFile, uri: &str, tags: Option<&EntryTags>) -> bool {
    match tags {
        Some(tags) => {
            tags.uri == uri && tags.mtime == source.mtime && tags.size == source.size_bytes
        }
        None => false,
    }
}

fn default_cache_root() -> Option<PathBuf> {
    cache_dir().map(|mut dir| {
        dir.push("thumbnails");
        dir
    })
}

#[derive(Debug)]
pub enum CacheError {
    CacheDirectoryUnavailable,
    NotAbsolute(PathBuf),
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
}

impl Display for CacheError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CacheDirectoryUnavailable => {
                write!(f, "unable to determine the thumbnail cache directory")
            }
            Self::NotAbsolute(path) => write!(
                f,
                "cache identity requires an absolute path, got {}",
                path.display()
            ),
            Self::Io { source, path } => {
                write!(f, "io error for {}: {}", path.display(), source)
            }
        }
    }
}

impl Error for CacheError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum WriteError {
    NoParent(PathBuf),
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
}

impl Display for WriteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoParent(path) => {
                write!(f, "destination {} has no parent directory", path.display())
            }
            Self::Io { source, path } => {
                write!(f, "io error for {}: {}", path.display(), source)
            }
        }
    }
}

impl Error for WriteError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}
