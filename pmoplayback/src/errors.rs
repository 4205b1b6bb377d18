use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlaybackError {
    // Native sink call failed (local player or remote channel)
    #[error("Sink operation '{0}' failed: {1}")]
    Sink(String, String),
    #[error("Malformed device message '{0}': {1}")]
    Protocol(String, String),
    #[error("Engine Error: {0}")]
    Engine(String),
    #[error("Engine callback queue is full ({0} pending)")]
    EngineQueueFull(usize),
    #[error("Catalog Error: {0}")]
    Catalog(String),
    #[error("Playlist Error: {0}")]
    Playlist(String),
    #[error("Invalid sleep timer duration: {0}")]
    SleepTimer(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PlaybackError {
    pub fn sink(operation: &str, message: impl ToString) -> Self {
        PlaybackError::Sink(operation.to_string(), message.to_string())
    }

    pub fn protocol(method: &str, message: impl ToString) -> Self {
        PlaybackError::Protocol(method.to_string(), message.to_string())
    }

    pub fn engine(message: impl ToString) -> Self {
        PlaybackError::Engine(message.to_string())
    }
}
