use thiserror::Error;

#[derive(Error, Debug)]
pub enum OatscopeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("Header decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("Header encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error(transparent)]
    Api(#[from] oatscope_api::ApiError),

    #[error("Invalid {kind} header in {path}")]
    BadMagic { kind: &'static str, path: String },
    #[error("{path} is neither a zip archive nor a dex file")]
    NotAnArchive { path: String },
    #[error("{path} has no paired vdex file")]
    MissingVdex { path: String },
    #[error("Dex checksums of {path} disagree with its vdex file")]
    TornArtifact { path: String },
    #[error("{path} declares {size} bytes, more than a header can hold")]
    OversizedEntry { path: String, size: u64 },
    #[error("{0}")]
    InvalidLocation(String),

    #[error("Class loader context '{0}' is invalid")]
    InvalidContext(String),
    #[error("Failed to load class loader context files for '{path}' with context '{context}'")]
    ContextFilesUnreadable { path: String, context: String },
}

pub type Result<T> = std::result::Result<T, OatscopeError>;
