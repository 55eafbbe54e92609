use std::env;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

const USAGE: &str = "\
Usage: thumbforge [-h] [-o OUTPUT_DIR] [-j JOBS] [-f|--force] INPUT

Generate freedesktop-compatible PNG thumbnails (normal, large, x-large,
xx-large) for an image file or a directory searched recursively.

Arguments:
  INPUT                 image file or directory

Options:
  -o, --output DIR      cache root (default: the user's thumbnail cache)
  -j, --jobs N          worker pool size (default: all cores)
  -f, --force           regenerate entries even when they are fresh
  -h, --help            show this help";

#[derive(Debug, PartialEq, Eq)]
pub struct CliConfig {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    /// 0 means host parallelism.
    pub jobs: usize,
    pub force: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub enum CliError {
    Help,
    MissingInput,
    MissingValue(String),
    InvalidJobs(String),
    InvalidFlag(String),
    UnexpectedArgument(String),
}

impl CliConfig {
    pub fn from_env() -> Result<Self, CliError> {
        Self::from_iter(env::args().skip(1))
    }

    pub fn from_iter<I>(args: I) -> Result<Self, CliError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        let mut input: Option<PathBuf> = None;
        let mut output: Option<PathBuf> = None;
        let mut jobs = 0usize;
        let mut force = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => return Err(CliError::Help),
                "-f" | "--force" => {
                    force = true;
                    continue;
                }
                "-o" | "--output" => {
                    let value = args.next().ok_or_else(|| CliError::MissingValue(arg))?;
                    output = Some(PathBuf::from(value));
                    continue;
                }
                "-j" | "--jobs" => {
                    let value = args.next().ok_or_else(|| CliError::MissingValue(arg))?;
                    jobs = parse_jobs(&value)?;
                    continue;
                }
                _ => {}
            }

            if let Some(value) = arg.strip_prefix("--output=") {
                output = Some(PathBuf::from(value));
                continue;
            }
            if let Some(value) = arg.strip_prefix("--jobs=") {
                jobs = parse_jobs(value)?;
                continue;
            }
            if arg.starts_with('-') && arg.len() > 1 {
                return Err(CliError::InvalidFlag(arg));
            }
            if input.is_some() {
                return Err(CliError::UnexpectedArgument(arg));
            }
            input = Some(PathBuf::from(arg));
        }

        Ok(Self {
            input: input.ok_or(CliError::MissingInput)?,
            output,
            jobs,
            force,
        })
    }
}

fn parse_jobs(value: &str) -> Result<usize, CliError> {
    match value.parse::<usize>() {
        Ok(jobs) if jobs > 0 => Ok(jobs),
        _ => Err(CliError::InvalidJobs(value.to_string())),
    }
}

impl Display for CliError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Help => write!(f, "{}", USAGE),
            Self::MissingInput => write!(f, "an input file or directory is required\n\n{}", USAGE),
            Self::MissingValue(flag) => write!(f, "{} requires a value", flag),
            Self::InvalidJobs(value) => {
                write!(f, "jobs must be a positive integer, got '{}'", value)
            }
            Self::InvalidFlag(flag) => write!(f, "unrecognized argument: {}", flag),
            Self::UnexpectedArgument(arg) => write!(f, "unexpected argument: {}", arg),
        }
    }
}

impl Error for CliError {}
