use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("Archive is not a readable zip container: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid graph document: {0}")]
    InvalidGraph(String),

    #[error("Graph not found: {0}")]
    GraphNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ProjectError> for napi::Error {
    fn from(e: ProjectError) -> Self {
        napi::Error::from_reason(e.to_string())
    }
}
