use std::path::PathBuf;

/// Core error type for the bot builder.
///
/// Adapter crates map their specific errors into this type so callers can
/// decide uniformly between "report to operator", "reply to user" and
/// "count and continue".
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Blocking configuration problem (e.g. the token is still a placeholder).
    #[error("config error: {0}")]
    Config(String),

    #[error("cannot access config file {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
