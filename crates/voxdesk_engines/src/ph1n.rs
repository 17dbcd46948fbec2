#![forbid(unsafe_code)]

use std::cmp::Reverse;

use serde::Deserialize;
use voxdesk_kernel_contracts::ph1n::{
    IntentKind, IntentMatch, IntentName, IntentPattern, PosTag, Quantifier, Token,
    TokenConstraint, TokenTest, Utterance, MAX_UTTERANCE_TOKENS, PH1N_CONTRACT_VERSION,
};
use voxdesk_kernel_contracts::{ContractViolation, Validate};

#[derive(Debug, thiserror::Error)]
pub enum PatternTableError {
    #[error("pattern table json is malformed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("pattern table violates contract: {0}")]
    Contract(#[from] ContractViolation),
    #[error("intent {intent}: pattern {pattern_index} token {token_index}: {reason}")]
    InvalidToken {
        intent: String,
        pattern_index: usize,
        token_index: usize,
        reason: &'static str,
    },
    #[error("pattern table must contain at least one pattern")]
    Empty,
}

/// Ordered pattern set. Intent registration order is the order of first appearance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternTable {
    patterns: Vec<IntentPattern>,
    intent_order: Vec<IntentName>,
}

impl PatternTable {
    pub fn new(patterns: Vec<IntentPattern>) -> Result<Self, ContractViolation> {
        if patterns.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "pattern_table.patterns",
                reason: "must not be empty",
            });
        }
        let mut intent_order: Vec<IntentName> = Vec::new();
        for p in &patterns {
            p.validate()?;
            if !intent_order.contains(&p.intent) {
                intent_order.push(p.intent.clone());
            }
        }
        Ok(Self {
            patterns,
            intent_order,
        })
    }

    /// Hand-authored English command patterns.
    pub fn builtin() -> Self {
        let patterns = builtin_patterns();
        let mut intent_order: Vec<IntentName> = Vec::new();
        for p in &patterns {
            if !intent_order.contains(&p.intent) {
                intent_order.push(p.intent.clone());
            }
        }
        Self {
            patterns,
            intent_order,
        }
    }

    /// Loads a table from the JSON document format:
    /// `[{"intent": "add_task", "patterns": [[{"LEMMA": "add"}, {"LOWER": {"IN": ["a", "the"]}, "OP": "?"}]]}]`.
    /// An entry with `"anchored": true` only matches whole utterances.
    pub fn from_json_str(json: &str) -> Result<Self, PatternTableError> {
        let entries: Vec<RawIntentEntry> = serde_json::from_str(json)?;
        let mut patterns = Vec::new();
        for entry in entries {
            for (pattern_index, raw_pattern) in entry.patterns.into_iter().enumerate() {
                let mut constraints = Vec::with_capacity(raw_pattern.len());
                for (token_index, raw) in raw_pattern.into_iter().enumerate() {
                    let fail = |reason: &'static str| PatternTableError::InvalidToken {
                        intent: entry.intent.to_string(),
                        pattern_index,
                        token_index,
                        reason,
                    };
                    constraints.extend(raw.into_constraints().map_err(fail)?);
                }
                let mut p = IntentPattern::v1(entry.intent.clone(), constraints)?;
                p.anchored = entry.anchored;
                patterns.push(p);
            }
        }
        if patterns.is_empty() {
            return Err(PatternTableError::Empty);
        }
        Ok(Self::new(patterns)?)
    }

    pub fn patterns(&self) -> &[IntentPattern] {
        &self.patterns
    }

    pub fn intents(&self) -> &[IntentName] {
        &self.intent_order
    }

    fn intent_rank(&self, intent: &IntentName) -> usize {
        self.intent_order
            .iter()
            .position(|i| i == intent)
            .unwrap_or(usize::MAX)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawIntentEntry {
    intent: IntentName,
    patterns: Vec<Vec<RawToken>>,
    #[serde(default)]
    anchored: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawText {
    One(String),
    In {
        #[serde(rename = "IN")]
        values: Vec<String>,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawToken {
    #[serde(rename = "LEMMA")]
    lemma: Option<RawText>,
    #[serde(rename = "LOWER")]
    lower: Option<RawText>,
    #[serde(rename = "POS")]
    pos: Option<String>,
    #[serde(rename = "OP")]
    op: Option<String>,
}

impl RawToken {
    fn into_constraints(self) -> Result<Vec<TokenConstraint>, &'static str> {
        let test = match (self.lemma, self.lower, self.pos) {
            (None, None, None) => TokenTest::Any,
            (Some(RawText::One(l)), None, None) => TokenTest::Lemma(l),
            (Some(RawText::In { values }), None, None) => TokenTest::LemmaIn(values),
            (None, Some(RawText::One(l)), None) => TokenTest::Lower(l),
            (None, Some(RawText::In { values }), None) => TokenTest::LowerIn(values),
            (None, None, Some(p)) => {
                TokenTest::Pos(PosTag::parse(&p).ok_or("unknown POS tag")?)
            }
            _ => return Err("at most one of LEMMA, LOWER, POS may be set"),
        };
        match self.op.as_deref() {
            None | Some("1") => Ok(vec![TokenConstraint::one(test)]),
            Some("?") => Ok(vec![TokenConstraint::optional(test)]),
            Some("*") => Ok(vec![TokenConstraint::zero_or_more(test)]),
            // `+` is one required token followed by zero or more of the same.
            Some("+") => Ok(vec![
                TokenConstraint::one(test.clone()),
                TokenConstraint::zero_or_more(test),
            ]),
            Some(_) => Err("unsupported OP (expected ?, *, + or 1)"),
        }
    }
}

fn lemma(s: &str) -> TokenTest {
    TokenTest::Lemma(s.to_string())
}

fn lemma_in(set: &[&str]) -> TokenTest {
    TokenTest::LemmaIn(set.iter().map(|s| s.to_string()).collect())
}

fn lower(s: &str) -> TokenTest {
    TokenTest::Lower(s.to_string())
}

fn lower_in(set: &[&str]) -> TokenTest {
    TokenTest::LowerIn(set.iter().map(|s| s.to_string()).collect())
}

fn pattern(kind: IntentKind, constraints: Vec<TokenConstraint>) -> IntentPattern {
    IntentPattern {
        schema_version: PH1N_CONTRACT_VERSION,
        intent: IntentName::of(kind),
        constraints,
        anchored: false,
    }
}

const LIST_VERBS: &[&str] = &["read", "list", "show", "tell", "get", "give"];
const EVENT_NOUNS: &[&str] = &["event", "meeting", "appointment"];
const ARTICLES: &[&str] = &["a", "an", "the", "new", "another"];

fn builtin_patterns() -> Vec<IntentPattern> {
    use TokenConstraint as C;
    vec![
        // add_task
        pattern(
            IntentKind::AddTask,
            vec![
                C::one(lemma_in(&["add", "create", "make"])),
                C::optional(lower_in(ARTICLES)),
                C::optional(TokenTest::Pos(PosTag::Adj)),
                C::one(lemma_in(&["task", "todo", "to-do"])),
                C::zero_or_more(TokenTest::Any),
            ],
        ),
        pattern(
            IntentKind::AddTask,
            vec![
                C::one(lower("new")),
                C::one(lemma("task")),
                C::zero_or_more(TokenTest::Any),
            ],
        ),
        pattern(
            IntentKind::AddTask,
            vec![
                C::one(lemma("add")),
                C::zero_or_more(TokenTest::Any),
                C::one(lower("to")),
                C::optional(lower_in(&["my", "the"])),
                C::one(lemma_in(&["task", "list", "todo", "to-do"])),
            ],
        ),
        pattern(
            IntentKind::AddTask,
            vec![
                C::one(lemma("remind")),
                C::one(lower("me")),
                C::one(lower("to")),
                C::zero_or_more(TokenTest::Any),
            ],
        ),
        // list_tasks
        pattern(
            IntentKind::ListTasks,
            vec![
                C::one(lemma_in(LIST_VERBS)),
                C::optional(lower("me")),
                C::optional(lower_in(&["my", "the", "all"])),
                C::optional(lower_in(&["current", "open", "pending"])),
                C::one(lemma_in(&["task", "todo", "to-do"])),
            ],
        ),
        pattern(
            IntentKind::ListTasks,
            vec![
                C::one(lower("what")),
                C::one(lemma("be")),
                C::optional(lower_in(&["my", "the"])),
                C::one(lemma("task")),
            ],
        ),
        // add_event
        pattern(
            IntentKind::AddEvent,
            vec![
                C::one(lemma_in(&["add", "create", "schedule", "book", "make", "set"])),
                C::optional(lower_in(ARTICLES)),
                C::optional(TokenTest::Pos(PosTag::Adj)),
                C::one(lemma_in(EVENT_NOUNS)),
                C::zero_or_more(TokenTest::Any),
            ],
        ),
        pattern(
            IntentKind::AddEvent,
            vec![C::one(lemma("schedule")), C::zero_or_more(TokenTest::Any)],
        ),
        pattern(
            IntentKind::AddEvent,
            vec![
                C::one(lemma_in(&["put", "add"])),
                C::zero_or_more(TokenTest::Any),
                C::one(lower("on")),
                C::optional(lower_in(&["my", "the"])),
                C::one(lower("calendar")),
            ],
        ),
        // list_events
        pattern(
            IntentKind::ListEvents,
            vec![
                C::one(lemma_in(LIST_VERBS)),
                C::optional(lower("me")),
                C::optional(lower_in(&["my", "the", "all"])),
                C::optional(lower_in(&["upcoming", "next"])),
                C::one(lemma_in(&["event", "meeting", "appointment", "calendar", "schedule"])),
            ],
        ),
        pattern(
            IntentKind::ListEvents,
            vec![
                C::one(lower("what")),
                C::one(lemma("be")),
                C::one(lower("on")),
                C::optional(lower_in(&["my", "the"])),
                C::one(lemma_in(&["calendar", "schedule"])),
            ],
        ),
        // get_weather
        pattern(
            IntentKind::GetWeather,
            vec![
                C::one(lower_in(&["what", "how"])),
                C::one(lemma("be")),
                C::optional(lower("the")),
                C::one(lemma_in(&["weather", "forecast", "temperature"])),
            ],
        ),
        pattern(
            IntentKind::GetWeather,
            vec![
                C::one(lemma_in(&["check", "get", "tell", "give"])),
                C::optional(lower("me")),
                C::optional(lower("the")),
                C::one(lemma_in(&["weather", "forecast"])),
            ],
        ),
        pattern(
            IntentKind::GetWeather,
            vec![
                C::one(lower_in(&["will", "is"])),
                C::one(lower("it")),
                C::optional(lower("be")),
                C::one(lemma_in(&["rain", "snow", "sunny", "cold", "hot", "windy"])),
            ],
        ),
        pattern(
            IntentKind::GetWeather,
            vec![C::one(lemma_in(&["weather", "forecast"]))],
        ),
        // exit
        pattern(
            IntentKind::Exit,
            vec![
                C::one(lower_in(&["exit", "quit", "stop", "goodbye", "bye"])),
                C::optional(lower_in(&["now", "please"])),
            ],
        )
        .anchored(),
    ]
}

/// Longest end reachable by aligning `constraints` at token offset `at`, if any.
fn longest_alignment(constraints: &[TokenConstraint], tokens: &[Token], at: usize) -> Option<usize> {
    let Some((first, rest)) = constraints.split_first() else {
        return Some(at);
    };
    let q: Quantifier = first.quantifier;
    let mut run = 0usize;
    while run < q.max() && at + run < tokens.len() && first.test.accepts(&tokens[at + run]) {
        run += 1;
    }
    if run < q.min() {
        return None;
    }
    (q.min()..=run)
        .filter_map(|n| longest_alignment(rest, tokens, at + n))
        .max()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntentMatcherConfig {
    pub max_tokens: usize,
}

impl IntentMatcherConfig {
    pub fn mvp_v1() -> Self {
        Self {
            max_tokens: MAX_UTTERANCE_TOKENS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IntentMatcher {
    config: IntentMatcherConfig,
    table: PatternTable,
}

impl IntentMatcher {
    pub fn new(config: IntentMatcherConfig, table: PatternTable) -> Self {
        Self { config, table }
    }

    pub fn builtin() -> Self {
        Self::new(IntentMatcherConfig::mvp_v1(), PatternTable::builtin())
    }

    pub fn table(&self) -> &PatternTable {
        &self.table
    }

    /// Best alignment across every pattern: longest span, then earliest-registered
    /// intent, then earliest start, then earliest pattern.
    pub fn match_utterance(&self, utterance: &Utterance) -> Option<IntentMatch> {
        let tokens = utterance.tokens();
        if tokens.is_empty() {
            return None;
        }
        if tokens.len() > self.config.max_tokens {
            tracing::warn!(
                tokens = tokens.len(),
                max_tokens = self.config.max_tokens,
                "utterance too long to match"
            );
            return None;
        }
        let content_start = tokens
            .iter()
            .position(|t| t.pos != PosTag::Punct)
            .unwrap_or(tokens.len());
        let content_end = tokens
            .iter()
            .rposition(|t| t.pos != PosTag::Punct)
            .map_or(0, |i| i + 1);

        let mut best: Option<(Reverse<usize>, usize, usize, usize, usize)> = None;
        for (pattern_index, p) in self.table.patterns.iter().enumerate() {
            let rank = self.table.intent_rank(&p.intent);
            let starts = if p.anchored {
                content_start..(content_start + 1).min(tokens.len())
            } else {
                0..tokens.len()
            };
            for start in starts {
                let Some(end) = longest_alignment(&p.constraints, tokens, start) else {
                    continue;
                };
                if end <= start || (p.anchored && end < content_end) {
                    continue;
                }
                let key = (Reverse(end - start), rank, start, pattern_index, end);
                if best.map_or(true, |b| key < b) {
                    best = Some(key);
                }
            }
        }

        let (_, _, start, pattern_index, end) = best?;
        let intent = self.table.patterns[pattern_index].intent.clone();
        tracing::debug!(
            intent = intent.as_str(),
            start,
            end,
            pattern_index,
            "intent pattern matched"
        );
        IntentMatch::v1(intent, start, end).ok()
    }
}
