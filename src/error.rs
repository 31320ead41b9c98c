use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CatalogError {
    #[error("character API request failed: {0}")]
    ApiHttp(String),

    #[error("character API returned status {status}: {message}")]
    ApiStatus { status: u16, message: String },

    #[error("wiki request failed: {0}")]
    WikiHttp(String),

    #[error("wiki returned status {status}: {message}")]
    WikiStatus { status: u16, message: String },

    #[error("failed to parse payload: {0}")]
    Parse(String),

    #[error("canonical store not found at {0}")]
    #[diagnostic(help("run `hero-catalog fetch` to build the store first"))]
    StoreNotFound(Utf8PathBuf),

    #[error("malformed canonical store: {0}")]
    StoreParse(String),

    #[error("invalid record {id:?}: {reason}")]
    RecordInvalid { id: String, reason: String },

    #[error("image processing failed for {path}: {message}")]
    Image { path: Utf8PathBuf, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config: {0}")]
    ConfigInvalid(String),
}

impl CatalogError {
    pub fn is_source_unavailable(&self) -> bool {
        matches!(
            self,
            CatalogError::ApiHttp(_)
                | CatalogError::ApiStatus { .. }
                | CatalogError::WikiHttp(_)
                | CatalogError::WikiStatus { .. }
        )
    }
}
