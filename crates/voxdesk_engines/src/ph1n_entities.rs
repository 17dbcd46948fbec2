#![forbid(unsafe_code)]

use voxdesk_kernel_contracts::ph1n::{
    Entities, IntentKind, IntentMatch, NounChunk, PosTag, SlotKey, Utterance,
};

use crate::ph1n_lexicon::is_placeholder_head;

/// Chunks that name a kind of record instead of a record.
pub const PLACEHOLDER_PHRASES: &[&str] = &[
    "a task",
    "an event",
    "the task",
    "the event",
    "task",
    "tasks",
    "event",
    "events",
    "meeting",
    "a meeting",
    "the meeting",
    "appointment",
    "an appointment",
    "the appointment",
    "reminder",
    "a reminder",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityExtractorConfig {
    pub stoplist: Vec<String>,
}

impl EntityExtractorConfig {
    pub fn mvp_v1() -> Self {
        Self {
            stoplist: PLACEHOLDER_PHRASES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EntityExtractor {
    config: EntityExtractorConfig,
}

impl EntityExtractor {
    pub fn new(config: EntityExtractorConfig) -> Self {
        Self { config }
    }

    pub fn mvp_v1() -> Self {
        Self::new(EntityExtractorConfig::mvp_v1())
    }

    pub fn extract(&self, utterance: &Utterance, m: &IntentMatch) -> Entities {
        let mut out = Entities::new();
        let kind = m.intent.kind();

        let name_slot = match kind {
            Some(IntentKind::AddTask) => Some(SlotKey::TaskName),
            Some(IntentKind::AddEvent) => Some(SlotKey::EventName),
            _ => None,
        };
        if let Some(slot) = name_slot {
            if let Some(name) = self.name_after_verb(utterance, m) {
                out.insert(slot, name);
            }
        }

        if let Some(time) = self.time_phrase(utterance) {
            out.insert(SlotKey::Time, time);
        }
        if kind == Some(IntentKind::GetWeather) {
            if let Some(place) = self.location(utterance) {
                out.insert(SlotKey::Location, place);
            }
        }

        tracing::debug!(
            intent = m.intent.as_str(),
            slots = ?out.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
            "entities extracted"
        );
        out
    }

    /// Every date/time span, joined in utterance order.
    pub fn time_phrase(&self, utterance: &Utterance) -> Option<String> {
        let time = utterance
            .entities()
            .iter()
            .filter(|e| e.label.is_temporal())
            .map(|e| utterance.span_text(e.start, e.end))
            .collect::<Vec<_>>()
            .join(" ");
        (!time.is_empty()).then_some(time)
    }

    pub fn location(&self, utterance: &Utterance) -> Option<String> {
        utterance
            .entities()
            .iter()
            .find(|e| e.label.is_place())
            .map(|e| utterance.span_text(e.start, e.end))
    }

    /// First non-placeholder noun chunk starting after the first verb of the match.
    fn name_after_verb(&self, utterance: &Utterance, m: &IntentMatch) -> Option<String> {
        let tokens = utterance.tokens();
        let end = m.end.min(tokens.len());
        let verb = (m.start..end).find(|&i| tokens[i].pos == PosTag::Verb)?;
        utterance
            .noun_chunks()
            .iter()
            .filter(|c| c.start > verb)
            .find(|c| !self.is_placeholder(utterance, c))
            .map(|c| utterance.span_text(c.start, c.end))
    }

    fn is_placeholder(&self, utterance: &Utterance, chunk: &NounChunk) -> bool {
        let text = utterance.span_text(chunk.start, chunk.end).to_lowercase();
        if self.config.stoplist.iter().any(|s| *s == text) {
            return true;
        }
        // "a new task", "urgent meeting": only modifiers in front of a placeholder head.
        let tokens = &utterance.tokens()[chunk.start..chunk.end];
        match tokens.split_last() {
            Some((head, mods)) => {
                is_placeholder_head(head)
                    && mods
                        .iter()
                        .all(|t| matches!(t.pos, PosTag::Det | PosTag::Adj | PosTag::Num))
            }
            None => false,
        }
    }
}
