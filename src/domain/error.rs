use crate::domain::models::ScanState;
use thiserror::Error;

/// Failures reported by a transport adapter
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open transport: {0}")]
    Open(String),
    #[error("failed to write command: {0}")]
    Write(String),
    #[error("transport is closed")]
    Closed,
}

/// Errors surfaced by the scan session
#[derive(Debug, Error)]
pub enum ScanError {
    /// Rejected before any transport call
    #[error("invalid scan parameter: {0}")]
    InvalidParameter(String),
    /// Command issued in the wrong state; nothing changed
    #[error("cannot {operation} while {state}")]
    InvalidStateTransition {
        state: ScanState,
        operation: &'static str,
    },
    /// Command could not be delivered; session state unchanged
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// Adapter reported a disconnect; session forced to stopped
    #[error("transport lost")]
    TransportLost,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ScanError::InvalidStateTransition {
            state: ScanState::Idle,
            operation: "stop",
        };
        assert_eq!(err.to_string(), "cannot stop while idle");

        let err: ScanError = TransportError::Closed.into();
        assert_eq!(err.to_string(), "transport error: transport is closed");

        let err: ScanError = TransportError::Open("no runtime".to_string()).into();
        assert_eq!(
            err.to_string(),
            "transport error: failed to open transport: no runtime"
        );
    }
}
