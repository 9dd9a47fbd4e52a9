use thiserror::Error;

pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Errors produced while building or delivering a playback timeline.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("media duration is required")]
    MissingDuration,

    #[error("heartbeat interval must be a positive number of seconds, got {0}")]
    InvalidInterval(f64),

    #[error("media duration must be a finite, non-negative number of seconds, got {0}")]
    InvalidDuration(f64),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP status {status}{}", status_suffix(.body))]
    UnexpectedStatus { status: u16, body: String },

    #[error("payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

impl TelemetryError {
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::Transport(msg.into())
    }
}

fn status_suffix(body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        String::new()
    } else {
        let truncated = body.chars().take(240).collect::<String>();
        format!(" ({truncated})")
    }
}
