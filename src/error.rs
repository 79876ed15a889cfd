use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Task '{task}' failed: {message}")]
    Action { task: String, message: String },

    #[error("Graph error: {0}")]
    Graph(String),

    #[error("Task '{task}' interrupted by signal")]
    Interrupted { task: String },

    #[error("Branch '{root}' terminated with {code}")]
    Branch {
        root: String,
        code: crate::engine::ErrorCode,
    },

    #[error("Branch join error: {0}")]
    BranchJoin(String),

    #[error("No branch registered for root '{0}'")]
    BranchNotFound(String),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown action '{0}' in plan")]
    UnknownAction(String),
}

pub type Result<T> = std::result::Result<T, Error>;
