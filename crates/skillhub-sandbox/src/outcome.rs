//! Guest failure taxonomy.
//!
//! A guest run either yields a JSON value or one of these failures. The
//! variants map one-to-one onto the protocol's execution error kinds.

/// Why a guest execution did not produce a result.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GuestFailure {
    /// The wall-clock deadline elapsed; the guest process was killed.
    #[error("execution exceeded the {0}s deadline")]
    TimedOut(u64),

    /// The guest emitted more than the output cap; the result is discarded.
    #[error("guest output exceeded {0} bytes")]
    OversizeOutput(usize),

    /// The guest raised; `traceback` holds the captured stderr tail.
    #[error("guest execution failed")]
    ExecutionFailed {
        traceback: String,
    },

    /// The guest returned a value that could not be carried as JSON
    /// (non-serialisable return, missing result frame, non-UTF-8 bytes).
    #[error("guest result could not be marshalled: {0}")]
    MarshallingFailed(String),

    /// The host could not stage or launch the isolate at all.
    #[error("sandbox unavailable: {0}")]
    Unavailable(String),
}

impl GuestFailure {
    /// Stable kind string for this failure.
    pub fn kind(&self) -> &'static str {
        match self {
            GuestFailure::TimedOut(_) => "timed_out",
            GuestFailure::OversizeOutput(_) => "oversize_output",
            GuestFailure::ExecutionFailed { .. } => "execution_failed",
            GuestFailure::MarshallingFailed(_) => "marshalling_failed",
            GuestFailure::Unavailable(_) => "sandbox_unavailable",
        }
    }

    /// Human-readable detail, without any host-side context.
    pub fn detail(&self) -> String {
        match self {
            GuestFailure::ExecutionFailed { traceback } => traceback.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(GuestFailure::TimedOut(2).kind(), "timed_out");
        assert_eq!(GuestFailure::OversizeOutput(10).kind(), "oversize_output");
        assert_eq!(
            GuestFailure::ExecutionFailed {
                traceback: "boom".into()
            }
            .kind(),
            "execution_failed"
        );
        assert_eq!(
            GuestFailure::MarshallingFailed("x".into()).kind(),
            "marshalling_failed"
        );
        assert_eq!(
            GuestFailure::Unavailable("no interpreter".into()).kind(),
            "sandbox_unavailable"
        );
    }

    #[test]
    fn execution_failed_detail_is_the_traceback() {
        let failure = GuestFailure::ExecutionFailed {
            traceback: "Traceback (most recent call last): ...".into(),
        };
        assert!(failure.detail().starts_with("Traceback"));
    }
}
