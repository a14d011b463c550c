//! Unified error types for wd-harness

use thiserror::Error;

/// Unified Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for wd-harness
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport errors talking to a WebDriver endpoint
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Primary locator and every alternative failed to resolve
    #[error("Element not found: {0}")]
    NotFound(String),

    /// Element handle invalidated by a DOM mutation
    #[error("Stale element reference: {0}")]
    StaleElement(String),

    /// Every retry attempt of an element operation failed
    #[error("Action failed on {target} after {attempts} attempt(s) in {elapsed_secs:.2}s: {cause}")]
    ActionFailed {
        target: String,
        attempts: u32,
        elapsed_secs: f64,
        cause: Box<Error>,
    },

    /// No browser permit available under fast-fail admission control
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// A previously active session no longer responds
    #[error("Session invalid: {0}")]
    SessionInvalid(String),

    /// Browser session construction failed (driver binary, endpoint, capabilities)
    #[error("Session creation failed: {0}")]
    SessionCreation(String),

    /// Error reported by the remote end of the WebDriver protocol
    #[error("WebDriver error [{error}]: {message}")]
    WebDriver { error: String, message: String },

    /// Timeout
    #[error("Operation timeout: {0}")]
    Timeout(String),

    /// Script execution failed
    #[error("Script execution failed: {0}")]
    ScriptExecution(String),

    /// Browser pool has been shut down
    #[error("Browser pool closed")]
    PoolClosed,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new not found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Error::NotFound(msg.into())
    }

    /// Create a new stale element error
    pub fn stale<S: Into<String>>(msg: S) -> Self {
        Error::StaleElement(msg.into())
    }

    /// Create a new resource exhausted error
    pub fn resource_exhausted<S: Into<String>>(msg: S) -> Self {
        Error::ResourceExhausted(msg.into())
    }

    /// Create a new session invalid error
    pub fn session_invalid<S: Into<String>>(msg: S) -> Self {
        Error::SessionInvalid(msg.into())
    }

    /// Create a new session creation error
    pub fn session_creation<S: Into<String>>(msg: S) -> Self {
        Error::SessionCreation(msg.into())
    }

    /// Create a new WebDriver protocol error
    pub fn webdriver<E: Into<String>, M: Into<String>>(error: E, message: M) -> Self {
        Error::WebDriver {
            error: error.into(),
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Error::Timeout(msg.into())
    }

    /// Create a new script execution error
    pub fn script_execution<S: Into<String>>(msg: S) -> Self {
        Error::ScriptExecution(msg.into())
    }

    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Error::Configuration(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }

    /// Whether this error signals an invalidated element handle
    pub fn is_stale(&self) -> bool {
        match self {
            Error::StaleElement(_) => true,
            Error::WebDriver { error, .. } => error == "stale element reference",
            _ => false,
        }
    }

    /// Whether this error is the fast-fail admission-control signal
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Error::ResourceExhausted(_))
    }
}
