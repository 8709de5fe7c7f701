use storm_core::ConfigError;
use thiserror::Error;

/// Where a failed command should land in the panel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Surface {
    /// Per-field message next to the offending input.
    Inline,
    /// Transient toast; the next poll cycle retries on its own.
    Notification,
    /// Blocking dialog the user has to resolve.
    Confirmation,
}

/// Everything a command can fail with, classified by how the panel reacts
/// rather than by transport detail.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Bad form input, caught before the request leaves the process.
    #[error(transparent)]
    Validation(#[from] ConfigError),
    /// The engine could not be reached, timed out, or answered garbage.
    #[error("network error: {0}")]
    Network(String),
    /// The engine answered `success: false` with a reason.
    #[error("{message}")]
    Rejected {
        code: Option<String>,
        message: String,
    },
    /// The command lost a race with the session lifecycle. Not a bug in the
    /// request; the user decides what happens next.
    #[error("{message}")]
    StateConflict { code: String, message: String },
    /// The caller tore the request down before the engine answered.
    #[error("request cancelled")]
    Cancelled,
}

impl ClientError {
    /// `None` means the failure is deliberate (cancellation) and should not
    /// be shown at all.
    pub fn surface(&self) -> Option<Surface> {
        match self {
            Self::Validation(_) => Some(Surface::Inline),
            Self::Network(_) | Self::Rejected { .. } => Some(Surface::Notification),
            Self::StateConflict { .. } => Some(Surface::Confirmation),
            Self::Cancelled => None,
        }
    }

    /// Network failures resolve themselves on the next poll; everything else
    /// needs a changed request or a user decision.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Rejected { code, .. } => code.as_deref(),
            Self::StateConflict { code, .. } => Some(code),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Network("request timed out".to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Network(format!("malformed response: {err}"))
    }
}

/// Codes the backend marks as user-resolvable conflicts. Mirrors the
/// engine's own conflict classification.
const CONFLICT_CODES: [&str; 3] = ["ALREADY_ACTIVE", "INVALID_TRANSITION", "ENGINE_BUSY"];

/// Turn a `success: false` envelope into the right variant.
pub(crate) fn classify(code: Option<String>, message: String) -> ClientError {
    match code {
        Some(code) if CONFLICT_CODES.contains(&code.as_str()) => {
            ClientError::StateConflict { code, message }
        }
        code => ClientError::Rejected { code, message },
    }
}
