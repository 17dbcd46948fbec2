#![forbid(unsafe_code)]

/// Result of one blocking capture from the utterance source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Heard(String),
    Timeout,
    Unintelligible,
    TransportError(String),
}

impl CaptureOutcome {
    /// Collapses every failure variant, and blank text, into "no utterance this turn".
    pub fn into_text(self) -> Option<String> {
        match self {
            CaptureOutcome::Heard(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            CaptureOutcome::Timeout
            | CaptureOutcome::Unintelligible
            | CaptureOutcome::TransportError(_) => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureOutcome::Heard(_) => "heard",
            CaptureOutcome::Timeout => "timeout",
            CaptureOutcome::Unintelligible => "unintelligible",
            CaptureOutcome::TransportError(_) => "transport_error",
        }
    }
}
