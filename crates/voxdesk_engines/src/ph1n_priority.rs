#![forbid(unsafe_code)]

use voxdesk_kernel_contracts::ph1n::{Priority, Utterance};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityClassifierConfig {
    /// Multi-word cues, matched on lowercased tokens before any single-word cue.
    pub high_phrases: Vec<Vec<String>>,
    pub low_phrases: Vec<Vec<String>>,
    pub high_cues: Vec<String>,
    pub low_cues: Vec<String>,
}

fn phrases(list: &[&[&str]]) -> Vec<Vec<String>> {
    list.iter()
        .map(|p| p.iter().map(|w| w.to_string()).collect())
        .collect()
}

impl PriorityClassifierConfig {
    pub fn mvp_v1() -> Self {
        Self {
            high_phrases: phrases(&[&["top", "priority"]]),
            low_phrases: phrases(&[
                &["not", "urgent"],
                &["not", "important"],
                &["no", "rush"],
            ]),
            high_cues: vec!["urgent".into(), "important".into(), "high".into()],
            low_cues: vec!["quick".into(), "low".into()],
        }
    }
}

/// Lexical urgency cues, independent of intent. Phrases win over single words;
/// within each kind, high is checked first.
#[derive(Debug, Clone)]
pub struct PriorityClassifier {
    config: PriorityClassifierConfig,
}

impl PriorityClassifier {
    pub fn new(config: PriorityClassifierConfig) -> Self {
        Self { config }
    }

    pub fn mvp_v1() -> Self {
        Self::new(PriorityClassifierConfig::mvp_v1())
    }

    pub fn classify(&self, utterance: &Utterance) -> Priority {
        let has_lemma = |cues: &[String]| {
            utterance
                .tokens()
                .iter()
                .any(|t| cues.iter().any(|c| *c == t.lemma))
        };
        let has_phrase = |list: &[Vec<String>]| {
            list.iter().any(|p| {
                let words: Vec<&str> = p.iter().map(String::as_str).collect();
                utterance.contains_phrase(&words)
            })
        };
        if has_phrase(&self.config.high_phrases) {
            Priority::High
        } else if has_phrase(&self.config.low_phrases) {
            Priority::Low
        } else if has_lemma(&self.config.high_cues) {
            Priority::High
        } else if has_lemma(&self.config.low_cues) {
            Priority::Low
        } else {
            Priority::Normal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ph1n_lexicon::LexiconAnnotator;

    fn classify(text: &str) -> Priority {
        let u = LexiconAnnotator::mvp_v1().annotate(text).unwrap();
        PriorityClassifier::mvp_v1().classify(&u)
    }

    #[test]
    fn at_n_prio_01_cues_map_to_levels() {
        assert_eq!(classify("add urgent task pay rent"), Priority::High);
        assert_eq!(classify("add task water plants, low priority"), Priority::Low);
        assert_eq!(classify("add a quick task"), Priority::Low);
        assert_eq!(classify("add task buy groceries"), Priority::Normal);
    }

    #[test]
    fn at_n_prio_02_high_dominates_low() {
        assert_eq!(classify("quick but important call"), Priority::High);
        assert_eq!(classify("low and high"), Priority::High);
    }

    #[test]
    fn at_n_prio_03_total_and_idempotent() {
        let c = PriorityClassifier::mvp_v1();
        for text in ["", "   ", "?!", "purple elephants", "URGENT"] {
            let u = LexiconAnnotator::mvp_v1().annotate(text).unwrap();
            assert_eq!(c.classify(&u), c.classify(&u));
        }
        assert_eq!(classify("URGENT"), Priority::High);
        assert_eq!(classify(""), Priority::Normal);
    }

    #[test]
    fn at_n_prio_04_phrases_override_single_word_cues() {
        assert_eq!(classify("add task file report, not urgent"), Priority::Low);
        assert_eq!(classify("no rush, add task sort photos"), Priority::Low);
        assert_eq!(classify("add task fix the quick sort, top priority"), Priority::High);

        let mut config = PriorityClassifierConfig::mvp_v1();
        config.low_phrases = phrases(&[&["low", "priority"], &["whenever"]]);
        config.low_cues.clear();
        let c = PriorityClassifier::new(config);
        let annotate = |t: &str| LexiconAnnotator::mvp_v1().annotate(t).unwrap();
        assert_eq!(c.classify(&annotate("water plants, low priority")), Priority::Low);
        assert_eq!(c.classify(&annotate("water plants whenever")), Priority::Low);
        assert_eq!(c.classify(&annotate("water plants, low")), Priority::Normal);
    }
}
