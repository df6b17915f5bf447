use thiserror::Error;

#[derive(Error, Debug)]
pub enum PolyscanError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Endpoint error: {0}")]
    Endpoint(#[from] EndpointError),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Unsupported input '{path}': {reason}")]
    UnsupportedInput { path: String, reason: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl PolyscanError {
    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn unsupported_input<P: Into<String>, R: Into<String>>(path: P, reason: R) -> Self {
        Self::UnsupportedInput {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Errors produced while turning user input into a stream endpoint
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    #[error("address is empty")]
    Empty,

    #[error("unsupported scheme '{scheme}'")]
    UnsupportedScheme { scheme: String },

    #[error("invalid address '{address}': {details}")]
    Invalid { address: String, details: String },
}

/// Technical cause of a failed analysis submission.
///
/// These never reach the user verbatim; the pipeline maps every variant to a
/// single fixed message and only logs the detail.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("transport failure: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("server responded with HTTP {status}")]
    Status { status: u16 },

    #[error("malformed response body: {details}")]
    MalformedBody { details: String },
}

impl AnalysisError {
    pub fn malformed<S: Into<String>>(details: S) -> Self {
        Self::MalformedBody {
            details: details.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PolyscanError>;
