use crate::config::ValidationError;
use std::fmt;
use thiserror::Error;

/// Which of the two documents a conversion step was working on
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Template,
    Feed,
}

impl Stage {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Stage::Template => "template",
            Stage::Feed => "feed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced while fetching a remote document
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Always built from an error stripped of its URL, which may carry an access token.
    #[error("request failed: {0}")]
    Request(reqwest::Error),

    #[error("unexpected status {0}")]
    Status(http::StatusCode),

    #[error("timed out after {0} seconds")]
    Timeout(u64),
}

/// Reasons a single endpoint record is dropped
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MalformedRecord {
    #[error("record is not a mapping")]
    NotAMapping,

    #[error("line has {0} fields, expected at least 5")]
    TooFewFields(usize),

    #[error("missing server")]
    MissingServer,

    #[error("missing port")]
    MissingPort,

    #[error("invalid port: {0}")]
    InvalidPort(String),
}

/// Errors that abort a single conversion
///
/// Malformed individual records are not represented here: they are dropped
/// by the parser and never fail a request.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("fetching {stage} failed: {source}")]
    Fetch {
        stage: Stage,
        #[source]
        source: FetchError,
    },

    #[error("{stage} is not a valid YAML document: {source}")]
    Parse {
        stage: Stage,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("template root must be a mapping")]
    InvalidTemplate,

    #[error("could not serialize the merged document: {0}")]
    Serialize(#[source] serde_yaml::Error),
}

impl ConvertError {
    /// Short tag used for metrics and failure messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ConvertError::Fetch { .. } => "fetch",
            ConvertError::Parse { .. } => "parse",
            ConvertError::InvalidTemplate => "template",
            ConvertError::Serialize(_) => "serialize",
        }
    }
}

/// Errors raised by the converter service itself
#[derive(Error, Debug)]
pub enum ConverterError {
    #[error("invalid config: {0}")]
    InvalidConfig(#[from] ValidationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}
