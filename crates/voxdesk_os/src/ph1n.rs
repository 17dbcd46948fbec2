#![forbid(unsafe_code)]

use voxdesk_engines::ph1n::{IntentMatcher, PatternTable};
use voxdesk_engines::ph1n_entities::EntityExtractor;
use voxdesk_engines::ph1n_lexicon::LexiconAnnotator;
use voxdesk_engines::ph1n_priority::PriorityClassifier;
use voxdesk_kernel_contracts::ph1n::{Entities, IntentKind, IntentMatch, Priority, Utterance};
use voxdesk_kernel_contracts::ContractViolation;

/// Tokenizer + tagger + entity recognizer + chunker behind one call.
pub trait LinguisticAnnotator {
    fn parse(&self, text: &str) -> Result<Utterance, ContractViolation>;
}

impl LinguisticAnnotator for LexiconAnnotator {
    fn parse(&self, text: &str) -> Result<Utterance, ContractViolation> {
        self.annotate(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpretation {
    pub utterance: Utterance,
    pub matched: Option<IntentMatch>,
    pub entities: Entities,
    pub priority: Priority,
}

impl Interpretation {
    /// `None` for no match, and for matches on intents the dialogue cannot dispatch.
    pub fn intent(&self) -> Option<IntentKind> {
        self.matched.as_ref().and_then(|m| m.intent.kind())
    }
}

/// Utterance text to (intent, entities, priority).
pub struct Interpreter {
    annotator: Box<dyn LinguisticAnnotator + Send>,
    matcher: IntentMatcher,
    extractor: EntityExtractor,
    classifier: PriorityClassifier,
}

impl Interpreter {
    pub fn new(
        annotator: Box<dyn LinguisticAnnotator + Send>,
        matcher: IntentMatcher,
        extractor: EntityExtractor,
        classifier: PriorityClassifier,
    ) -> Self {
        Self {
            annotator,
            matcher,
            extractor,
            classifier,
        }
    }

    pub fn mvp_v1() -> Self {
        Self::new(
            Box::new(LexiconAnnotator::mvp_v1()),
            IntentMatcher::builtin(),
            EntityExtractor::mvp_v1(),
            PriorityClassifier::mvp_v1(),
        )
    }

    pub fn with_patterns(table: PatternTable) -> Self {
        let mut i = Self::mvp_v1();
        i.matcher = IntentMatcher::new(voxdesk_engines::ph1n::IntentMatcherConfig::mvp_v1(), table);
        i
    }

    pub fn annotate(&self, text: &str) -> Result<Utterance, ContractViolation> {
        self.annotator.parse(text)
    }

    pub fn extractor(&self) -> &EntityExtractor {
        &self.extractor
    }

    pub fn interpret(&self, text: &str) -> Result<Interpretation, ContractViolation> {
        let utterance = self.annotator.parse(text)?;
        let matched = self.matcher.match_utterance(&utterance);
        let entities = match &matched {
            Some(m) => self.extractor.extract(&utterance, m),
            None => Entities::new(),
        };
        let priority = self.classifier.classify(&utterance);
        Ok(Interpretation {
            utterance,
            matched,
            entities,
            priority,
        })
    }
}
