use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// Outbound command attempted while the device session is disconnected.
    /// Never retried; reconnection is the session's own concern.
    NotConnected,
    /// Hostname resolution failed during discovery or before a connect attempt.
    Resolve(String),
    Transport(tokio_tungstenite::tungstenite::Error),
    /// WebSocket handshake did not complete within the configured timeout.
    Handshake,
    Json(serde_json::Error),
    Io(std::io::Error),
    /// The session has been shut down and no longer accepts commands.
    Closed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotConnected => write!(f, "device not connected"),
            Error::Resolve(host) => write!(f, "failed to resolve host: {host}"),
            Error::Transport(e) => write!(f, "transport error: {e}"),
            Error::Handshake => write!(f, "websocket handshake timed out"),
            Error::Json(e) => write!(f, "JSON error: {e}"),
            Error::Io(e) => write!(f, "IO error: {e}"),
            Error::Closed => write!(f, "session closed"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Transport(e) => Some(e),
            Error::Json(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::Transport(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
