use std::path::PathBuf;

use serde::Serialize;

/// Run-level failures. Any of these aborts the run before a single media set
/// is touched.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no library path configured (set `library_path` or MEDIALIB_LIBRARY_PATH)")]
    MissingLibraryPath,

    #[error("no source directory configured (set `source_directory_path` or MEDIALIB_SOURCE_DIRECTORY_PATH)")]
    MissingSourceDirectory,

    #[error("library directory does not exist: {0}")]
    LibraryNotFound(PathBuf),

    #[error("source directory does not exist: {0}")]
    SourceNotFound(PathBuf),

    #[error("no variant suffixes configured")]
    NoVariantSuffixes,

    #[error("variant suffix at position {0} is empty")]
    EmptyVariantSuffix(usize),

    #[error("external tool `{0}` not found on PATH")]
    ToolNotFound(String),

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to list source directory {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build worker pool: {0}")]
    WorkerPool(String),
}

/// The external inspection tool could not be run or exited with an error.
/// A missing tag is never an `ExtractionError`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExtractionError {
    #[error("failed to spawn `{tool}`: {message}")]
    Spawn { tool: String, message: String },

    #[error("`{tool}` exited with {status}: {stderr}")]
    Failed {
        tool: String,
        status: String,
        stderr: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VariantResolutionError {
    #[error("no variant suffixes configured")]
    NoSuffixesConfigured,

    #[error("{0} does not end with any configured variant suffix")]
    NoSuffixMatch(String),
}

/// Text that is not a recognized descriptor. Callers skip the file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
    #[error("malformed descriptor XML: {0}")]
    Xml(String),

    #[error("descriptor has no title")]
    MissingTitle,

    #[error("unparseable published date `{0}`")]
    InvalidPublished(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathResolutionError {
    #[error("library root is not set")]
    LibraryRootUnset,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum FileOperationError {
    #[error("{op} failed for {path}: {message}")]
    Io {
        op: &'static str,
        path: PathBuf,
        message: String,
    },

    #[error("destination already exists with different content: {0}")]
    DestinationExists(PathBuf),

    #[error("source does not exist: {0}")]
    SourceMissing(PathBuf),
}

impl FileOperationError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// Pipeline stage of [`crate::integrator::MediaIntegrator`] a media set had
/// reached when it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    MetadataResolved,
    PathResolved,
    DirectoryEnsured,
    VideoMoved,
    ImagesResolved,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::MetadataResolved => "metadata",
            Stage::PathResolved => "target path",
            Stage::DirectoryEnsured => "target directory",
            Stage::VideoMoved => "video move",
            Stage::ImagesResolved => "images",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum IntegrationErrorKind {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    PathResolution(#[from] PathResolutionError),

    #[error(transparent)]
    FileOperation(#[from] FileOperationError),

    #[error("{0}")]
    Configuration(String),
}

/// Failure of one media set. `stage` names the stage that failed, so
/// everything before it is committed on disk.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{stage} stage failed: {kind}")]
pub struct IntegrationError {
    pub stage: Stage,
    pub kind: IntegrationErrorKind,
}

impl IntegrationError {
    pub fn new(stage: Stage, kind: impl Into<IntegrationErrorKind>) -> Self {
        Self {
            stage,
            kind: kind.into(),
        }
    }
}
