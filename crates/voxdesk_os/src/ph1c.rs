#![forbid(unsafe_code)]

use std::collections::VecDeque;

use voxdesk_kernel_contracts::ph1c::CaptureOutcome;

/// Blocking source of user utterances (microphone + recognizer, console, script).
pub trait UtteranceSource {
    fn capture(&mut self) -> CaptureOutcome;

    /// True once no further utterance can ever arrive (stdin EOF, script exhausted).
    fn is_closed(&self) -> bool {
        false
    }
}

/// Replays a fixed list of capture outcomes, then reports itself closed.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    queue: VecDeque<CaptureOutcome>,
}

impl ScriptedSource {
    pub fn new(outcomes: impl IntoIterator<Item = CaptureOutcome>) -> Self {
        Self {
            queue: outcomes.into_iter().collect(),
        }
    }

    /// Every line is a heard utterance; an empty line is an unintelligible capture.
    pub fn from_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        Self::new(lines.into_iter().map(|l| {
            if l.trim().is_empty() {
                CaptureOutcome::Unintelligible
            } else {
                CaptureOutcome::Heard(l.to_string())
            }
        }))
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}

impl UtteranceSource for ScriptedSource {
    fn capture(&mut self) -> CaptureOutcome {
        self.queue.pop_front().unwrap_or(CaptureOutcome::Timeout)
    }

    fn is_closed(&self) -> bool {
        self.queue.is_empty()
    }
}
