use crate::source::{SourceFile, SourceKind};
use kamadak_exif::{In, Reader, Tag};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Tags tried in order when pulling an embedded preview out of a RAW file.
/// `PreviewImage` is present in nearly every RAW container; `JpgFromRaw`
/// is the larger fallback some Canon/Nikon files carry instead.
const PREVIEW_TAGS: [&str; 2] = ["PreviewImage", "JpgFromRaw"];

const POLL_INTERVAL: Duration = Duration::from_millis(25);

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// What the extraction step hands the normalizer.
#[derive(Debug)]
pub enum Preview {
    /// The renderer decodes the file itself; only the orientation code was
    /// looked up.
    Native { orientation: u32 },
    /// Preview bytes pulled out of a RAW/unsupported container.
    Embedded { bytes: Vec<u8>, orientation: u32 },
}

/// The external extraction capability, backed by an `exiftool` subprocess.
/// Every spawn is supervised: a child that exceeds the timeout is killed
/// and the job fails without stalling the worker.
#[derive(Clone, Debug)]
pub struct ExifTool {
    binary: String,
    timeout: Duration,
}

impl Default for ExifTool {
    fn default() -> Self {
        Self {
            binary: String::from("exiftool"),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ExifTool {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolves a snapshot to its preview source. Native rasters skip the
    /// subprocess entirely; RAW and unsupported files go through it.
    pub fn extract(&self, source: &SourceFile) -> Result<Preview, ExtractionError> {
        match source.kind {
            SourceKind::NativeRaster => Ok(Preview::Native {
                orientation: native_orientation(&source.path),
            }),
            SourceKind::Raw | SourceKind::Unsupported => {
                let bytes = self.preview_bytes(&source.path)?;
                // A RAW file without a readable orientation tag is still
                // renderable; fall back to "no transform".
                let orientation = self.orientation(&source.path).unwrap_or(1);
                Ok(Preview::Embedded { bytes, orientation })
            }
        }
    }

    /// Pulls the embedded preview bytes, trying each known tag in turn.
    pub fn preview_bytes(&self, path: &Path) -> Result<Vec<u8>, ExtractionError> {
        for tag in PREVIEW_TAGS {
            let stdout = self.run(&["-b", &format!("-{tag}")], path)?;
            if !stdout.is_empty() {
                return Ok(stdout);
            }
        }
        Err(ExtractionError::EmptyPreview(path.to_path_buf()))
    }

    /// Numeric EXIF orientation (1-8) as reported by the tool.
    pub fn orientation(&self, path: &Path) -> Result<u32, ExtractionError> {
        let stdout = self.run(&["-Orientation", "-n", "-s3"], path)?;
        let code = String::from_utf8_lossy(&stdout)
            .trim()
            .parse::<u32>()
            .unwrap_or(1);
        Ok(if (1..=8).contains(&code) { code } else { 1 })
    }

    fn run(&self, args: &[&str], path: &Path) -> Result<Vec<u8>, ExtractionError> {
        let mut child = Command::new(&self.binary)
            .args(args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ExtractionError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        // Drain the pipes off-thread so a chatty child can't deadlock
        // against a full pipe buffer while we poll for exit.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let started = Instant::now();
        loop {
            let status = child.try_wait().map_err(|source| ExtractionError::Wait {
                path: path.to_path_buf(),
                source,
            })?;
            match status {
                Some(status) => {
                    let stdout = stdout.join().unwrap_or_default();
                    let stderr = stderr.join().unwrap_or_default();
                    if !status.success() {
                        return Err(ExtractionError::Failed {
                            path: path.to_path_buf(),
                            detail: String::from_utf8_lossy(&stderr).trim().to_string(),
                        });
                    }
                    return Ok(stdout);
                }
                None if started.elapsed() >= self.timeout => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ExtractionError::TimedOut {
                        path: path.to_path_buf(),
                        timeout: self.timeout,
                    });
                }
                None => thread::sleep(POLL_INTERVAL),
            }
        }
    }
}

fn drain<R: Read + Send + 'static>(stream: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut stream) = stream {
            let _ = stream.read_to_end(&mut buffer);
        }
        buffer
    })
}

/// In-process EXIF orientation lookup for natively decodable files.
/// Absent or malformed metadata means "no transform".
pub fn native_orientation(path: &Path) -> u32 {
    read_orientation(path).unwrap_or(1)
}

fn read_orientation(path: &Path) -> Option<u32> {
    let file = File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    let exif = Reader::new().read_from_container(&mut reader).ok()?;
    let code = exif
        .get_field(Tag::Orientation, In::PRIMARY)?
        .value
        .get_uint(0)?;
    (1..=8).contains(&code).then_some(code)
}

#[derive(Debug)]
pub enum ExtractionError {
    Spawn {
        binary: String,
        source: std::io::Error,
    },
    Wait {
        path: PathBuf,
        source: std::io::Error,
    },
    TimedOut {
        path: PathBuf,
        timeout: Duration,
    },
    Failed {
        path: PathBuf,
        detail: String,
    },
    EmptyPreview(PathBuf),
}

impl Display for ExtractionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spawn { binary, source } => {
                write!(f, "cannot launch {}: {}", binary, source)
            }
            Self::Wait { path, source } => {
                write!(f, "lost track of extractor for {}: {}", path.display(), source)
            }
            Self::TimedOut { path, timeout } => write!(
                f,
                "extraction for {} exceeded {}s",
                path.display(),
                timeout.as_secs_f64()
            ),
            Self::Failed { path, detail } if detail.is_empty() => {
                write!(f, "extractor reported failure for {}", path.display())
            }
            Self::Failed { path, detail } => {
                write!(f, "extractor failed for {}: {}", path.display(), detail)
            }
            Self::EmptyPreview(path) => {
                write!(f, "no embedded preview found in {}", path.display())
            }
        }
    }
}

impl Error for ExtractionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Spawn { source, .. } | Self::Wait { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    fn stub(dir: &Path, name: &str, script: &str) -> String {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        let mut permissions = fs::metadata(&path).unwrap().permissions();
        permissions.set_mode(0o755);
        fs::set_permissions(&path, permissions).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn preview_bytes_returns_stdout() {
        let dir = tempdir().unwrap();
        let tool = ExifTool::new(stub(dir.path(), "ok", "printf 'JPEGDATA'"));
        let bytes = tool.preview_bytes(Path::new("/any/file.cr3")).unwrap();
        assert_eq!(bytes, b"JPEGDATA");
    }

    #[test]
    fn empty_output_from_every_tag_is_an_error() {
        let dir = tempdir().unwrap();
        let tool = ExifTool::new(stub(dir.path(), "silent", "exit 0"));
        let error = tool.preview_bytes(Path::new("/any/file.cr3")).unwrap_err();
        assert!(matches!(error, ExtractionError::EmptyPreview(_)));
    }

    #[test]
    fn nonzero_exit_is_an_error() {
        let dir = tempdir().unwrap();
        let tool = ExifTool::new(stub(
            dir.path(),
            "angry",
            "echo 'bad file' >&2; exit 3",
        ));
        let error = tool.preview_bytes(Path::new("/any/file.cr3")).unwrap_err();
        match error {
            ExtractionError::Failed { detail, .. } => assert_eq!(detail, "bad file"),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn hung_extractor_is_killed_after_timeout() {
        let dir = tempdir().unwrap();
        let tool = ExifTool::new(stub(dir.path(), "hang", "sleep 30"))
            .with_timeout(Duration::from_millis(200));
        let started = Instant::now();
        let error = tool.preview_bytes(Path::new("/any/file.cr3")).unwrap_err();
        assert!(matches!(error, ExtractionError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn missing_binary_is_a_spawn_error() {
        let tool = ExifTool::new("/nonexistent/exiftool-definitely-absent");
        let error = tool.preview_bytes(Path::new("/any/file.cr3")).unwrap_err();
        assert!(matches!(error, ExtractionError::Spawn { .. }));
    }

    #[test]
    fn orientation_parses_numeric_output() {
        let dir = tempdir().unwrap();
        let tool = ExifTool::new(stub(dir.path(), "orient", "printf '6\\n'"));
        assert_eq!(tool.orientation(Path::new("/any/file.cr3")).unwrap(), 6);
    }

    #[test]
    fn garbage_orientation_defaults_to_identity() {
        let dir = tempdir().unwrap();
        let tool = ExifTool::new(stub(dir.path(), "noise", "printf 'Rotate 90 CW'"));
        assert_eq!(tool.orientation(Path::new("/any/file.cr3")).unwrap(), 1);
    }

    #[test]
    fn native_orientation_defaults_without_exif() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plain.png");
        fs::write(&path, b"not even a png").unwrap();
        assert_eq!(native_orientation(&path), 1);
    }
}
