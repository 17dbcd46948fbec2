#![forbid(unsafe_code)]

/// Fire-and-forget speech output. Blocks until the utterance has been handed off.
pub trait SpeechSink {
    fn say(&mut self, text: &str);
}

/// Keeps everything said, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpeechTranscript {
    lines: Vec<String>,
}

impl SpeechTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn contains(&self, text: &str) -> bool {
        self.lines.iter().any(|l| l == text)
    }

    pub fn last(&self) -> Option<&str> {
        self.lines.last().map(String::as_str)
    }
}

impl SpeechSink for SpeechTranscript {
    fn say(&mut self, text: &str) {
        self.lines.push(text.to_string());
    }
}

/// Sends each line to every inner sink in turn.
pub struct TeeSpeech<'a> {
    sinks: Vec<&'a mut dyn SpeechSink>,
}

impl<'a> TeeSpeech<'a> {
    pub fn new(sinks: Vec<&'a mut dyn SpeechSink>) -> Self {
        Self { sinks }
    }
}

impl SpeechSink for TeeSpeech<'_> {
    fn say(&mut self, text: &str) {
        for s in self.sinks.iter_mut() {
            s.say(text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_tts_01_tee_preserves_order_per_sink() {
        let mut a = SpeechTranscript::new();
        let mut b = SpeechTranscript::new();
        {
            let mut tee = TeeSpeech::new(vec![&mut a, &mut b]);
            tee.say("one");
            tee.say("two");
        }
        assert_eq!(a.lines(), &["one".to_string(), "two".to_string()]);
        assert_eq!(a, b);
        assert_eq!(a.last(), Some("two"));
    }
}
