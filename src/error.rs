use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or contradictory search parameters supplied by the user.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The login flow did not return the expected redirect artifacts.
    #[error("unexpected response: {0}")]
    BadResponse(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error(
        "access denied (HTTP 403) for {url}; check that the product's collection is listed \
         in the configured collections and that your account may access it"
    )]
    AccessDenied { url: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("unable to extract {}: {reason}", path.display())]
    Extraction { path: PathBuf, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("malformed catalogue document: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),
}

impl Error {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether another download attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forbidden_is_not_retryable() {
        let err = Error::AccessDenied {
            url: "https://example.org/file.ZIP".to_string(),
        };
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("collections"));
    }

    #[test]
    fn test_io_is_retryable() {
        let err = Error::from(std::io::Error::other("disk hiccup"));
        assert!(err.is_retryable());
        assert!(!Error::invalid_input("bad").is_retryable());
    }
}
