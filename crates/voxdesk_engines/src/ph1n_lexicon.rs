#![forbid(unsafe_code)]

use unicode_normalization::UnicodeNormalization;
use voxdesk_kernel_contracts::ph1n::{
    EntityLabel, EntitySpan, NounChunk, PosTag, Token, Utterance, MAX_UTTERANCE_TOKENS,
};
use voxdesk_kernel_contracts::ContractViolation;

use crate::ph1n_time::{parse_clock, parse_day_word, parse_meridiem, parse_weekday};

/// Head nouns that name a kind of record rather than the record itself.
pub const PLACEHOLDER_HEADS: &[&str] = &[
    "task",
    "todo",
    "to-do",
    "event",
    "meeting",
    "appointment",
    "reminder",
];

const LEAD_PUNCT: &[char] = &['"', '(', '[', '{', '¿', '¡'];
const TRAIL_PUNCT: &[char] = &['.', ',', '!', '?', ';', ':', '"', ')', ']', '}'];
const CLITICS: &[&str] = &["'s", "'re", "'m", "'ll", "'ve", "'d"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexiconAnnotatorConfig {
    pub max_tokens: usize,
    /// Prepositions after which a place name is expected.
    pub location_markers: Vec<String>,
}

impl LexiconAnnotatorConfig {
    pub fn mvp_v1() -> Self {
        Self {
            max_tokens: MAX_UTTERANCE_TOKENS,
            location_markers: vec!["in".to_string(), "for".to_string(), "at".to_string()],
        }
    }
}

/// Deterministic English annotator: tokens, lemmas, coarse POS, date/time and
/// location spans, noun chunks.
#[derive(Debug, Clone)]
pub struct LexiconAnnotator {
    config: LexiconAnnotatorConfig,
}

impl LexiconAnnotator {
    pub fn new(config: LexiconAnnotatorConfig) -> Self {
        Self { config }
    }

    pub fn mvp_v1() -> Self {
        Self::new(LexiconAnnotatorConfig::mvp_v1())
    }

    pub fn annotate(&self, text: &str) -> Result<Utterance, ContractViolation> {
        let normalized: String = text
            .nfkc()
            .map(|c| match c {
                '\u{2018}' | '\u{2019}' => '\'',
                '\u{201C}' | '\u{201D}' => '"',
                c => c,
            })
            .collect();
        let words = split_words(&normalized);
        let max_tokens = self.config.max_tokens.min(MAX_UTTERANCE_TOKENS);
        if words.len() > max_tokens {
            tracing::warn!(
                tokens = words.len(),
                max_tokens,
                "utterance has too many tokens to annotate"
            );
            return Err(ContractViolation::InvalidValue {
                field: "utterance.tokens",
                reason: "exceeds maximum token count",
            });
        }

        let mut tokens = Vec::with_capacity(words.len());
        let mut known = Vec::with_capacity(words.len());
        for (index, word) in words.iter().enumerate() {
            let lower = word.to_lowercase();
            let lemma = lemmatize(&lower);
            let (pos, is_known) = tag(word, &lower, &lemma, index);
            tokens.push(Token::new(word.as_str(), lemma, pos)?);
            known.push(is_known);
        }

        let mut entities = temporal_spans(&tokens);
        let mut temporal = vec![false; tokens.len()];
        for e in &entities {
            temporal[e.start..e.end].iter_mut().for_each(|t| *t = true);
        }
        entities.extend(self.location_spans(&tokens, &known, &temporal));
        entities.sort_by_key(|e| (e.start, e.end));
        let chunks = noun_chunks(&tokens, &temporal);

        tracing::trace!(
            tokens = tokens.len(),
            entities = entities.len(),
            noun_chunks = chunks.len(),
            "utterance annotated"
        );
        Utterance::v1(normalized.trim(), tokens, entities, chunks)
    }

    fn location_spans(&self, tokens: &[Token], known: &[bool], temporal: &[bool]) -> Vec<EntitySpan> {
        let n = tokens.len();
        let mut out = Vec::new();
        let mut i = 0;
        while i < n {
            let is_marker = !temporal[i]
                && self
                    .config
                    .location_markers
                    .iter()
                    .any(|m| *m == tokens[i].lower);
            if !is_marker {
                i += 1;
                continue;
            }
            let mut start = i + 1;
            if start < n && tokens[start].lower == "the" {
                start += 1;
            }
            let mut end = start;
            while end < n && !temporal[end] && is_place_word(&tokens[end], known[end], end) {
                end += 1;
            }
            if end > start {
                out.push(EntitySpan {
                    label: EntityLabel::Location,
                    start,
                    end,
                });
                i = end;
            } else {
                i += 1;
            }
        }
        out
    }
}

fn is_place_word(token: &Token, known: bool, index: usize) -> bool {
    match token.pos {
        PosTag::Propn => true,
        PosTag::Noun if !known => true,
        PosTag::Punct | PosTag::Pron | PosTag::Det | PosTag::Adp | PosTag::Aux | PosTag::Cconj => {
            false
        }
        _ => index > 0 && starts_uppercase(&token.text),
    }
}

fn starts_uppercase(s: &str) -> bool {
    s.chars().next().is_some_and(char::is_uppercase)
}

fn split_words(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for chunk in text.split_whitespace() {
        let mut core = chunk;
        while let Some(c) = core.chars().next().filter(|c| LEAD_PUNCT.contains(c)) {
            out.push(c.to_string());
            core = &core[c.len_utf8()..];
        }
        let mut trail = Vec::new();
        while let Some(c) = core.chars().next_back().filter(|c| TRAIL_PUNCT.contains(c)) {
            trail.push(c.to_string());
            core = &core[..core.len() - c.len_utf8()];
        }
        if !core.is_empty() {
            split_clitic(core, &mut out);
        }
        out.extend(trail.into_iter().rev());
    }
    out
}

fn split_clitic(core: &str, out: &mut Vec<String>) {
    let lower = core.to_lowercase();
    let suffix_len = if lower.len() > 3 && lower.ends_with("n't") {
        Some(3)
    } else {
        CLITICS
            .iter()
            .find(|s| lower.len() > s.len() && lower.ends_with(*s))
            .map(|s| s.len())
    };
    match suffix_len {
        Some(len) if core.is_char_boundary(core.len() - len) => {
            let (head, tail) = core.split_at(core.len() - len);
            out.push(head.to_string());
            out.push(tail.to_string());
        }
        _ => out.push(core.to_string()),
    }
}

fn irregular_lemma(lower: &str) -> Option<&'static str> {
    let l = match lower {
        "is" | "are" | "was" | "were" | "am" | "been" | "being" | "'s" | "'re" | "'m" => "be",
        "has" | "had" | "'ve" => "have",
        "does" | "did" | "done" => "do",
        "n't" => "not",
        "'ll" => "will",
        "'d" => "would",
        "ca" => "can",
        "wo" => "will",
        "made" => "make",
        "got" | "gotten" => "get",
        "went" | "gone" => "go",
        "took" | "taken" => "take",
        "told" => "tell",
        "gave" | "given" => "give",
        "sent" => "send",
        "bought" => "buy",
        "brought" => "bring",
        "met" => "meet",
        "paid" => "pay",
        "wrote" | "written" => "write",
        "left" => "leave",
        "kept" => "keep",
        "found" => "find",
        "children" => "child",
        "people" => "person",
        "men" => "man",
        "women" => "woman",
        _ => return None,
    };
    Some(l)
}

fn lemmatize(lower: &str) -> String {
    if let Some(l) = irregular_lemma(lower) {
        return l.to_string();
    }
    if lexicon_pos(lower).is_some() || !lower.chars().all(|c| c.is_alphabetic() || c == '-') {
        return lower.to_string();
    }
    let mut candidates: Vec<String> = Vec::new();
    if let Some(stem) = lower.strip_suffix("ies") {
        candidates.push(format!("{stem}y"));
    }
    if let Some(stem) = lower.strip_suffix("es") {
        candidates.push(stem.to_string());
    }
    if let Some(stem) = lower.strip_suffix('s').filter(|s| !s.ends_with('s')) {
        candidates.push(stem.to_string());
    }
    for suffix in ["ing", "ed"] {
        if let Some(stem) = lower.strip_suffix(suffix) {
            candidates.push(stem.to_string());
            candidates.push(format!("{stem}e"));
            let mut chars = stem.chars().rev();
            if let (Some(a), Some(b)) = (chars.next(), chars.next()) {
                if a == b {
                    candidates.push(stem[..stem.len() - a.len_utf8()].to_string());
                }
            }
        }
    }
    if let Some(stem) = lower.strip_suffix('d') {
        candidates.push(stem.to_string());
    }
    candidates
        .into_iter()
        .find(|c| c.len() > 1 && lexicon_pos(c).is_some())
        .unwrap_or_else(|| lower.to_string())
}

/// Returns the tag and whether the word came from the lexicon.
fn tag(word: &str, lower: &str, lemma: &str, index: usize) -> (PosTag, bool) {
    if lower.chars().all(|c| !c.is_alphanumeric()) {
        return (PosTag::Punct, true);
    }
    if lower.chars().all(|c| c.is_ascii_digit()) || parse_clock(lower).is_some() {
        return (PosTag::Num, true);
    }
    if let Some(pos) = lexicon_pos(lower).or_else(|| lexicon_pos(lemma)) {
        return (pos, true);
    }
    if index > 0 && starts_uppercase(word) {
        (PosTag::Propn, false)
    } else {
        (PosTag::Noun, false)
    }
}

fn lexicon_pos(word: &str) -> Option<PosTag> {
    let pos = match word {
        "a" | "an" | "the" | "my" | "your" | "our" | "their" | "his" | "its" | "this" | "that"
        | "these" | "those" | "all" | "some" | "any" | "every" | "each" | "another" | "no" => {
            PosTag::Det
        }
        "i" | "me" | "you" | "he" | "she" | "it" | "we" | "they" | "him" | "her" | "us"
        | "them" | "what" | "who" | "which" | "something" | "anything" | "everything"
        | "myself" => PosTag::Pron,
        "in" | "on" | "at" | "for" | "to" | "from" | "with" | "about" | "by" | "of" | "after"
        | "before" | "until" | "into" | "like" | "up" | "out" | "off" | "over" | "during"
        | "near" | "around" | "via" => PosTag::Adp,
        "be" | "will" | "would" | "can" | "could" | "should" | "shall" | "may" | "might"
        | "must" | "do" => PosTag::Aux,
        "and" | "or" | "but" => PosTag::Cconj,
        "not" | "n't" => PosTag::Part,
        "hello" | "hi" | "hey" | "goodbye" | "bye" | "thanks" | "ok" | "okay" | "yes"
        | "please" | "oh" => PosTag::Intj,
        "now" | "then" | "also" | "just" | "really" | "very" | "how" | "when" | "where"
        | "why" | "soon" | "later" | "there" | "here" | "again" | "always" | "never"
        | "maybe" | "asap" | "urgently" | "quickly" => PosTag::Adv,
        "one" | "two" | "three" | "four" | "five" | "six" | "seven" | "eight" | "nine"
        | "ten" | "eleven" | "twelve" | "twenty" | "thirty" | "half" => PosTag::Num,
        "urgent" | "important" | "high" | "low" | "quick" | "new" | "next" | "upcoming"
        | "current" | "open" | "pending" | "sunny" | "cold" | "hot" | "windy" | "rainy"
        | "cloudy" | "big" | "small" | "first" | "last" | "weekly" | "daily" | "good"
        | "critical" | "minor" => PosTag::Adj,
        "add" | "create" | "make" | "schedule" | "book" | "set" | "put" | "read" | "show"
        | "tell" | "get" | "give" | "remind" | "check" | "call" | "buy" | "pay" | "send"
        | "write" | "clean" | "finish" | "pick" | "meet" | "visit" | "fix" | "review"
        | "prepare" | "plan" | "cancel" | "delete" | "remove" | "update" | "exit" | "quit"
        | "stop" | "rain" | "snow" | "go" | "take" | "bring" | "submit" | "order" | "renew"
        | "return" | "walk" | "feed" | "wash" | "cook" | "need" | "want" | "let" | "see"
        | "start" | "organize" | "sign" | "have" | "know" | "say" | "ask" | "find" | "look"
        | "keep" | "leave" | "help" | "use" | "try" | "study" | "practice" | "attend"
        | "drop" | "text" | "water" | "mail" | "print" | "charge" | "named" | "titled" => {
            PosTag::Verb
        }
        "task" | "todo" | "to-do" | "event" | "meeting" | "appointment" | "reminder"
        | "calendar" | "list" | "weather" | "forecast" | "temperature" | "priority"
        | "grocery" | "milk" | "bread" | "egg" | "report" | "bill" | "rent" | "doctor"
        | "dentist" | "mom" | "dad" | "team" | "standup" | "project" | "email" | "lunch"
        | "dinner" | "breakfast" | "party" | "birthday" | "office" | "home" | "work"
        | "school" | "car" | "kid" | "child" | "person" | "man" | "woman" | "friend"
        | "week" | "weekend" | "month" | "day" | "hour" | "minute" | "time" | "thing"
        | "item" | "note" | "document" | "file" | "presentation" | "interview" | "deadline"
        | "class" | "gym" | "flight" | "trip" | "invoice" | "tax" | "homework" | "laundry"
        | "dog" | "cat" | "package" | "letter" | "morning" | "afternoon" | "evening"
        | "night" | "noon" | "midnight" | "today" | "tomorrow" | "tonight" | "pm" => {
            PosTag::Noun
        }
        _ if parse_weekday(word).is_some() && word.len() > 3 => PosTag::Propn,
        _ => return None,
    };
    Some(pos)
}

fn is_period_word(lower: &str) -> bool {
    matches!(lower, "morning" | "afternoon" | "evening")
}

/// Length and label of a temporal expression starting at `i`, if one does.
fn temporal_at(tokens: &[Token], i: usize) -> Option<(EntityLabel, usize)> {
    let w = tokens[i].lower.as_str();
    let next = tokens.get(i + 1).map(|t| t.lower.as_str());

    if matches!(w, "next" | "this" | "coming") {
        let n = next?;
        if parse_weekday(n).is_some() || matches!(n, "week" | "weekend" | "month") {
            return Some((EntityLabel::Date, 2));
        }
        if is_period_word(n) {
            return Some((EntityLabel::Time, 2));
        }
        return None;
    }
    if parse_day_word(w).is_some() && (w.len() > 3 || w.contains('-')) {
        return Some((EntityLabel::Date, 1));
    }
    if matches!(w, "noon" | "midnight") || is_period_word(w) {
        return Some((EntityLabel::Time, 1));
    }
    let clock = parse_clock(w)?;
    if clock.meridiem.is_some() {
        return Some((EntityLabel::Time, 1));
    }
    if next.and_then(parse_meridiem).is_some() {
        return Some((EntityLabel::Time, 2));
    }
    let after_at = i > 0 && tokens[i - 1].lower == "at";
    if clock.has_minutes || after_at {
        return Some((EntityLabel::Time, 1));
    }
    None
}

/// Date and time spans, each absorbing a directly preceding `at`/`on`.
fn temporal_spans(tokens: &[Token]) -> Vec<EntitySpan> {
    let mut spans: Vec<EntitySpan> = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let Some((label, len)) = temporal_at(tokens, i) else {
            i += 1;
            continue;
        };
        let prev_free = spans.last().map_or(true, |s| s.end < i);
        let start = if i > 0 && prev_free && matches!(tokens[i - 1].lower.as_str(), "at" | "on")
        {
            i - 1
        } else {
            i
        };
        spans.push(EntitySpan {
            label,
            start,
            end: i + len,
        });
        i += len;
    }
    spans
}

pub fn is_placeholder_head(token: &Token) -> bool {
    PLACEHOLDER_HEADS.contains(&token.lemma.as_str())
}

fn title_boundary(tokens: &[Token], k: usize) -> bool {
    let t = &tokens[k];
    let next_is_priority = tokens.get(k + 1).is_some_and(|n| n.lemma == "priority");
    match t.pos {
        PosTag::Adp => !matches!(t.lower.as_str(), "up" | "out" | "off" | "over"),
        PosTag::Punct | PosTag::Cconj | PosTag::Aux | PosTag::Pron | PosTag::Part | PosTag::Intj => {
            true
        }
        PosTag::Adj if next_is_priority => true,
        _ => matches!(t.lemma.as_str(), "priority" | "urgent" | "asap" | "urgently"),
    }
}

/// Free-form name run after a placeholder head (`task buy groceries`) or after `remind me to`.
fn title_run(tokens: &[Token], temporal: &[bool], from: usize) -> Option<(usize, usize)> {
    let mut start = from;
    while let Some(t) = tokens.get(start) {
        let next_is_verb = tokens.get(start + 1).is_some_and(|n| n.pos == PosTag::Verb);
        match t.lower.as_str() {
            "called" | "named" | "titled" | ":" => start += 1,
            "to" if next_is_verb => start += 1,
            _ => break,
        }
    }
    let mut end = start;
    while end < tokens.len() && !temporal[end] && !title_boundary(tokens, end) {
        end += 1;
    }
    let has_nominal = tokens[start..end].iter().any(|t| t.pos.is_nominal());
    (end > start && has_nominal).then_some((start, end))
}

fn follows_remind_me_to(tokens: &[Token], i: usize) -> bool {
    i >= 3
        && tokens[i - 3].lemma == "remind"
        && tokens[i - 2].lower == "me"
        && tokens[i - 1].lower == "to"
}

fn noun_chunks(tokens: &[Token], temporal: &[bool]) -> Vec<NounChunk> {
    let n = tokens.len();
    let chunkable = |k: usize| {
        !temporal[k]
            && matches!(
                tokens[k].pos,
                PosTag::Det | PosTag::Adj | PosTag::Num | PosTag::Noun | PosTag::Propn
            )
    };
    let mut chunks = Vec::new();
    let mut i = 0;
    while i < n {
        if follows_remind_me_to(tokens, i) {
            if let Some((start, end)) = title_run(tokens, temporal, i) {
                chunks.push(NounChunk { start, end });
                i = end;
                continue;
            }
        }
        if !chunkable(i) {
            i += 1;
            continue;
        }
        let start = i;
        let mut last_nominal = None;
        let mut j = i;
        while j < n && chunkable(j) {
            if tokens[j].pos.is_nominal() {
                last_nominal = Some(j);
                if is_placeholder_head(&tokens[j]) {
                    break;
                }
            }
            j += 1;
        }
        let Some(last) = last_nominal else {
            i = j;
            continue;
        };
        chunks.push(NounChunk {
            start,
            end: last + 1,
        });
        i = last + 1;
        if is_placeholder_head(&tokens[last]) {
            if let Some((s, e)) = title_run(tokens, temporal, i) {
                chunks.push(NounChunk { start: s, end: e });
                i = e;
            }
        }
    }
    chunks
}
