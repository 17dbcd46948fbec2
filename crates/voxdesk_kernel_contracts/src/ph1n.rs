#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::validate_text;
use crate::{ContractViolation, SchemaVersion, Validate};

pub const PH1N_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

pub const MAX_UTTERANCE_TOKENS: usize = 256;
pub const MAX_UTTERANCE_TEXT_LEN: usize = 4_096;
pub const MAX_PATTERN_CONSTRAINTS: usize = 32;

/// Coarse part-of-speech tags (universal tag set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PosTag {
    Noun,
    Propn,
    Verb,
    Aux,
    Adj,
    Adv,
    Det,
    Adp,
    Pron,
    Num,
    Cconj,
    Part,
    Intj,
    Punct,
    X,
}

impl PosTag {
    pub fn as_str(self) -> &'static str {
        match self {
            PosTag::Noun => "NOUN",
            PosTag::Propn => "PROPN",
            PosTag::Verb => "VERB",
            PosTag::Aux => "AUX",
            PosTag::Adj => "ADJ",
            PosTag::Adv => "ADV",
            PosTag::Det => "DET",
            PosTag::Adp => "ADP",
            PosTag::Pron => "PRON",
            PosTag::Num => "NUM",
            PosTag::Cconj => "CCONJ",
            PosTag::Part => "PART",
            PosTag::Intj => "INTJ",
            PosTag::Punct => "PUNCT",
            PosTag::X => "X",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let tag = match raw.trim().to_ascii_uppercase().as_str() {
            "NOUN" => PosTag::Noun,
            "PROPN" => PosTag::Propn,
            "VERB" => PosTag::Verb,
            "AUX" => PosTag::Aux,
            "ADJ" => PosTag::Adj,
            "ADV" => PosTag::Adv,
            "DET" => PosTag::Det,
            "ADP" => PosTag::Adp,
            "PRON" => PosTag::Pron,
            "NUM" => PosTag::Num,
            "CCONJ" => PosTag::Cconj,
            "PART" => PosTag::Part,
            "INTJ" => PosTag::Intj,
            "PUNCT" => PosTag::Punct,
            "X" => PosTag::X,
            _ => return None,
        };
        Some(tag)
    }

    /// Tags that can head a noun chunk.
    pub fn is_nominal(self) -> bool {
        matches!(self, PosTag::Noun | PosTag::Propn)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityLabel {
    Date,
    Time,
    Location,
    Person,
}

impl EntityLabel {
    pub fn is_temporal(self) -> bool {
        matches!(self, EntityLabel::Date | EntityLabel::Time)
    }

    pub fn is_place(self) -> bool {
        matches!(self, EntityLabel::Location)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    /// Lowercased surface form, precomputed for `LOWER` constraints.
    pub lower: String,
    pub lemma: String,
    pub pos: PosTag,
}

impl Token {
    pub fn new(
        text: impl Into<String>,
        lemma: impl Into<String>,
        pos: PosTag,
    ) -> Result<Self, ContractViolation> {
        let text = text.into();
        let lemma = lemma.into().to_lowercase();
        let t = Self {
            lower: text.to_lowercase(),
            text,
            lemma,
            pos,
        };
        t.validate()?;
        Ok(t)
    }
}

impl Validate for Token {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_text("token.text", &self.text, MAX_UTTERANCE_TEXT_LEN)?;
        validate_text("token.lemma", &self.lemma, MAX_UTTERANCE_TEXT_LEN)?;
        if self.text.chars().any(char::is_whitespace) {
            return Err(ContractViolation::InvalidValue {
                field: "token.text",
                reason: "must not contain whitespace",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitySpan {
    pub label: EntityLabel,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NounChunk {
    pub start: usize,
    pub end: usize,
}

fn validate_span(
    field: &'static str,
    start: usize,
    end: usize,
    token_count: usize,
) -> Result<(), ContractViolation> {
    if start >= end {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "span must be non-empty (start < end)",
        });
    }
    if end > token_count {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "span must lie inside the token sequence",
        });
    }
    Ok(())
}

/// Annotated utterance. Immutable once built; fields are only reachable through accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    schema_version: SchemaVersion,
    text: String,
    tokens: Vec<Token>,
    entities: Vec<EntitySpan>,
    noun_chunks: Vec<NounChunk>,
}

impl Utterance {
    pub fn v1(
        text: impl Into<String>,
        tokens: Vec<Token>,
        entities: Vec<EntitySpan>,
        noun_chunks: Vec<NounChunk>,
    ) -> Result<Self, ContractViolation> {
        let u = Self {
            schema_version: PH1N_CONTRACT_VERSION,
            text: text.into(),
            tokens,
            entities,
            noun_chunks,
        };
        u.validate()?;
        Ok(u)
    }

    pub fn schema_version(&self) -> SchemaVersion {
        self.schema_version
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn entities(&self) -> &[EntitySpan] {
        &self.entities
    }

    pub fn noun_chunks(&self) -> &[NounChunk] {
        &self.noun_chunks
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Surface text of `[start, end)`, tokens joined by single spaces.
    pub fn span_text(&self, start: usize, end: usize) -> String {
        let end = end.min(self.tokens.len());
        if start >= end {
            return String::new();
        }
        self.tokens[start..end]
            .iter()
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// True when the lowercased words appear as a contiguous token run.
    pub fn contains_phrase(&self, words: &[&str]) -> bool {
        if words.is_empty() || words.len() > self.tokens.len() {
            return false;
        }
        self.tokens
            .windows(words.len())
            .any(|w| w.iter().zip(words).all(|(t, word)| t.lower == *word))
    }
}

impl Validate for Utterance {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != PH1N_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "utterance.schema_version",
                reason: "must match PH1N_CONTRACT_VERSION",
            });
        }
        if self.text.len() > MAX_UTTERANCE_TEXT_LEN {
            return Err(ContractViolation::InvalidValue {
                field: "utterance.text",
                reason: "exceeds maximum length",
            });
        }
        if self.tokens.len() > MAX_UTTERANCE_TOKENS {
            return Err(ContractViolation::InvalidValue {
                field: "utterance.tokens",
                reason: "exceeds maximum token count",
            });
        }
        for t in &self.tokens {
            t.validate()?;
        }
        for e in &self.entities {
            validate_span("utterance.entities", e.start, e.end, self.tokens.len())?;
        }
        for c in &self.noun_chunks {
            validate_span("utterance.noun_chunks", c.start, c.end, self.tokens.len())?;
        }
        Ok(())
    }
}

/// The intents the dialogue layer knows how to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IntentKind {
    AddTask,
    ListTasks,
    AddEvent,
    ListEvents,
    GetWeather,
    Exit,
}

impl IntentKind {
    pub const ALL: [IntentKind; 6] = [
        IntentKind::AddTask,
        IntentKind::ListTasks,
        IntentKind::AddEvent,
        IntentKind::ListEvents,
        IntentKind::GetWeather,
        IntentKind::Exit,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            IntentKind::AddTask => "add_task",
            IntentKind::ListTasks => "list_tasks",
            IntentKind::AddEvent => "add_event",
            IntentKind::ListEvents => "list_events",
            IntentKind::GetWeather => "get_weather",
            IntentKind::Exit => "exit",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        IntentKind::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IntentName(String);

impl IntentName {
    pub fn new(name: impl Into<String>) -> Result<Self, ContractViolation> {
        let n = Self(name.into());
        n.validate()?;
        Ok(n)
    }

    pub fn of(kind: IntentKind) -> Self {
        Self(kind.as_str().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn kind(&self) -> Option<IntentKind> {
        IntentKind::from_name(&self.0)
    }
}

impl Validate for IntentName {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_text("intent_name", &self.0, 64)?;
        if !self
            .0
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(ContractViolation::InvalidValue {
                field: "intent_name",
                reason: "must be lowercase snake_case",
            });
        }
        Ok(())
    }
}

impl TryFrom<String> for IntentName {
    type Error = ContractViolation;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        IntentName::new(value)
    }
}

impl From<IntentName> for String {
    fn from(value: IntentName) -> Self {
        value.0
    }
}

impl fmt::Display for IntentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Single-token predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenTest {
    Lemma(String),
    LemmaIn(Vec<String>),
    Lower(String),
    LowerIn(Vec<String>),
    Pos(PosTag),
    Any,
}

impl TokenTest {
    pub fn accepts(&self, token: &Token) -> bool {
        match self {
            TokenTest::Lemma(l) => token.lemma == *l,
            TokenTest::LemmaIn(set) => set.iter().any(|l| token.lemma == *l),
            TokenTest::Lower(l) => token.lower == *l,
            TokenTest::LowerIn(set) => set.iter().any(|l| token.lower == *l),
            TokenTest::Pos(p) => token.pos == *p,
            TokenTest::Any => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    One,
    /// `{0,1}`
    Optional,
    /// `*`
    ZeroOrMore,
}

impl Quantifier {
    pub fn min(self) -> usize {
        match self {
            Quantifier::One => 1,
            Quantifier::Optional | Quantifier::ZeroOrMore => 0,
        }
    }

    pub fn max(self) -> usize {
        match self {
            Quantifier::One | Quantifier::Optional => 1,
            Quantifier::ZeroOrMore => usize::MAX,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenConstraint {
    pub test: TokenTest,
    pub quantifier: Quantifier,
}

impl TokenConstraint {
    pub fn one(test: TokenTest) -> Self {
        Self {
            test,
            quantifier: Quantifier::One,
        }
    }

    pub fn optional(test: TokenTest) -> Self {
        Self {
            test,
            quantifier: Quantifier::Optional,
        }
    }

    pub fn zero_or_more(test: TokenTest) -> Self {
        Self {
            test,
            quantifier: Quantifier::ZeroOrMore,
        }
    }
}

fn validate_lower_literal(field: &'static str, s: &str) -> Result<(), ContractViolation> {
    validate_text(field, s, 64)?;
    if s.to_lowercase() != s {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must be lowercase",
        });
    }
    Ok(())
}

fn validate_literal_set(field: &'static str, set: &[String]) -> Result<(), ContractViolation> {
    if set.is_empty() {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must not be empty",
        });
    }
    for l in set {
        validate_lower_literal(field, l)?;
    }
    Ok(())
}

impl Validate for TokenConstraint {
    fn validate(&self) -> Result<(), ContractViolation> {
        match &self.test {
            TokenTest::Lemma(l) => validate_lower_literal("token_constraint.lemma", l),
            TokenTest::Lower(l) => validate_lower_literal("token_constraint.lower", l),
            TokenTest::LemmaIn(set) => validate_literal_set("token_constraint.lemma_in", set),
            TokenTest::LowerIn(set) => validate_literal_set("token_constraint.lower_in", set),
            TokenTest::Pos(_) | TokenTest::Any => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentPattern {
    pub schema_version: SchemaVersion,
    pub intent: IntentName,
    pub constraints: Vec<TokenConstraint>,
    /// Must cover the whole utterance, ignoring leading and trailing punctuation.
    pub anchored: bool,
}

impl IntentPattern {
    pub fn v1(
        intent: IntentName,
        constraints: Vec<TokenConstraint>,
    ) -> Result<Self, ContractViolation> {
        let p = Self {
            schema_version: PH1N_CONTRACT_VERSION,
            intent,
            constraints,
            anchored: false,
        };
        p.validate()?;
        Ok(p)
    }

    pub fn anchored(mut self) -> Self {
        self.anchored = true;
        self
    }
}

impl Validate for IntentPattern {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.intent.validate()?;
        if self.constraints.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "intent_pattern.constraints",
                reason: "must not be empty",
            });
        }
        if self.constraints.len() > MAX_PATTERN_CONSTRAINTS {
            return Err(ContractViolation::InvalidValue {
                field: "intent_pattern.constraints",
                reason: "exceeds maximum constraint count",
            });
        }
        // A pattern made only of optional tokens could align on zero tokens.
        if !self
            .constraints
            .iter()
            .any(|c| c.quantifier == Quantifier::One)
        {
            return Err(ContractViolation::InvalidValue {
                field: "intent_pattern.constraints",
                reason: "must contain at least one required token",
            });
        }
        for c in &self.constraints {
            c.validate()?;
        }
        Ok(())
    }
}

/// Matched span `[start, end)` for one intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentMatch {
    pub intent: IntentName,
    pub start: usize,
    pub end: usize,
}

impl IntentMatch {
    pub fn v1(intent: IntentName, start: usize, end: usize) -> Result<Self, ContractViolation> {
        let m = Self { intent, start, end };
        m.validate()?;
        Ok(m)
    }

    pub fn span_len(&self) -> usize {
        self.end - self.start
    }
}

impl Validate for IntentMatch {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.start >= self.end {
            return Err(ContractViolation::InvalidValue {
                field: "intent_match",
                reason: "span must be non-empty (start < end)",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotKey {
    TaskName,
    TaskType,
    EventName,
    Time,
    Location,
}

impl SlotKey {
    pub fn as_str(self) -> &'static str {
        match self {
            SlotKey::TaskName => "TASK_NAME",
            SlotKey::TaskType => "TASK_TYPE",
            SlotKey::EventName => "EVENT_NAME",
            SlotKey::Time => "TIME",
            SlotKey::Location => "LOCATION",
        }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Slot values found in one turn. An absent key means "not found".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entities {
    values: BTreeMap<SlotKey, String>,
}

impl Entities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a trimmed value; blank values are dropped so a present key is never empty.
    pub fn insert(&mut self, key: SlotKey, value: impl AsRef<str>) -> bool {
        let v = value.as_ref().trim();
        if v.is_empty() {
            return false;
        }
        self.values.insert(key, v.to_string());
        true
    }

    pub fn get(&self, key: SlotKey) -> Option<&str> {
        self.values.get(&key).map(String::as_str)
    }

    pub fn contains(&self, key: SlotKey) -> bool {
        self.values.contains_key(&key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotKey, &str)> {
        self.values.iter().map(|(k, v)| (*k, v.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
