use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ShelfError {
    #[error("invalid comic id: {0:?}")]
    #[diagnostic(help("ids may contain letters, digits, '_', '-' and '.'"))]
    InvalidComicId(String),

    #[error("concurrency must be at least 1, got {0}")]
    InvalidConcurrency(usize),

    #[error("comic not found locally: {0}")]
    RecordNotFound(String),

    #[error("metadata file missing: {0}")]
    MetadataMissing(Utf8PathBuf),

    #[error("failed to parse metadata {path}: {message}")]
    MetadataParse { path: Utf8PathBuf, message: String },

    #[error("comic {source_id} has no related work {related_id}")]
    RelatedNotFound {
        source_id: String,
        related_id: String,
    },

    #[error("comic {0} has no related works with a valid id")]
    NoRelatedWorks(String),

    #[error("photo set {0} contains no images")]
    EmptyPhoto(String),

    #[error("download list does not exist: {0}")]
    #[diagnostic(help("an existing JSON file is required when switching lists"))]
    ListNotFound(Utf8PathBuf),

    #[error("failed to read download list {path}: {message}")]
    ListRead { path: Utf8PathBuf, message: String },

    #[error("failed to parse download list {path}: {message}")]
    ListParse { path: Utf8PathBuf, message: String },

    #[error("config file does not exist: {0}")]
    ConfigMissing(Utf8PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("remote request failed: {0}")]
    Remote(String),

    #[error("remote returned status {status}: {message}")]
    RemoteStatus { status: u16, message: String },

    #[error("background worker failed: {0}")]
    Worker(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
