use thiserror::Error;

/// Every condition a line, prompt, or backend operation can surface.
///
/// [`VoiceError::Disposing`] means unwind now; [`VoiceError::Disposed`]
/// means the line is already gone.
#[derive(Debug, Error)]
pub enum VoiceError {
    /// An argument was outside its contract. Raised before any backend call.
    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    /// The far end disconnected while an operation was in flight.
    #[error("the caller hung up")]
    Hangup,

    /// Another thread asked this line to stop. Unwind and dispose the line.
    #[error("line is being disposed")]
    Disposing,

    /// An operation was issued after the line finished disposing.
    #[error("line {line_number} has already been disposed")]
    Disposed { line_number: u32 },

    /// No digits arrived before the digit timeout.
    #[error("timed out waiting for digits")]
    GetDigitsTimeout,

    /// A prompt exhausted its attempt budget.
    #[error("too many attempts")]
    TooManyAttempts,

    /// The caller-supplied cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,

    /// Plain voice failure with a message (missing TTS engine, bad phrase, ...).
    #[error("{0}")]
    Voice(String),

    /// Anything else the backend raised.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type Result<T, E = VoiceError> = std::result::Result<T, E>;

impl VoiceError {
    pub fn invalid_argument(name: &'static str, reason: impl Into<String>) -> Self {
        VoiceError::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }

    pub fn is_disposing(&self) -> bool {
        matches!(self, VoiceError::Disposing)
    }

    pub fn is_disposed(&self) -> bool {
        matches!(self, VoiceError::Disposed { .. })
    }

    pub fn is_hangup(&self) -> bool {
        matches!(self, VoiceError::Hangup)
    }

    pub fn is_too_many_attempts(&self) -> bool {
        matches!(self, VoiceError::TooManyAttempts)
    }

    /// True for the conditions that mean "stop using this line": the owning
    /// loop should leave its script and call `dispose`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            VoiceError::Disposing | VoiceError::Disposed { .. } | VoiceError::Cancelled
        )
    }
}

impl From<std::io::Error> for VoiceError {
    fn from(e: std::io::Error) -> Self {
        VoiceError::Backend(e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disposing_and_disposed_are_distinct() {
        let disposing = VoiceError::Disposing;
        let disposed = VoiceError::Disposed { line_number: 3 };
        assert!(disposing.is_disposing());
        assert!(!disposing.is_disposed());
        assert!(disposed.is_disposed());
        assert!(!disposed.is_disposing());
        assert_eq!(disposed.to_string(), "line 3 has already been disposed");
    }

    #[test]
    fn test_invalid_argument_message() {
        let err = VoiceError::invalid_argument("volume", "must be between -10 and 10");
        assert_eq!(
            err.to_string(),
            "invalid argument `volume`: must be between -10 and 10"
        );
        assert!(!err.is_terminal());
    }

    #[test]
    fn test_backend_wraps_anyhow() {
        let err: VoiceError = anyhow::anyhow!("board fault").into();
        assert!(matches!(err, VoiceError::Backend(_)));
        assert_eq!(err.to_string(), "board fault");
    }
}
