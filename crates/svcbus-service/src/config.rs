use std::time::Duration;

/// Default time a call may wait for its reply.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Client proxy behavior.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long a call waits for `Return`/`Error` before failing with
    /// `Timeout`. `None` waits until the reply or disconnect.
    pub call_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            call_timeout: Some(DEFAULT_CALL_TIMEOUT),
        }
    }
}
