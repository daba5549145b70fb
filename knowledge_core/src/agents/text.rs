//! Text heuristics shared by the agents and the retrieval engine.
//!
//! Nothing here parses language. Tokens are whitespace-separated words,
//! case-folded with surrounding punctuation stripped; sentences end at
//! `.`, `!` or `?` followed by whitespace or the end of the text.

use crate::error::{Error, Result};
use crate::knowledge_base::ConceptKind;

/// A normalized word and the kind of concept it becomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub kind: ConceptKind,
}

/// Reject text no agent can ingest.
pub fn validate(raw: &[u8]) -> Result<&str> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| Error::malformed(format!("not valid UTF-8: {}", e)))?;
    if text.trim().is_empty() {
        return Err(Error::malformed("empty text"));
    }
    if text.chars().any(|c| c.is_control() && !c.is_whitespace()) {
        return Err(Error::malformed("contains control characters"));
    }
    Ok(text)
}

/// Case-fold a word and strip the punctuation around it.
/// Apostrophes and hyphens inside a word are kept.
pub fn normalize(word: &str) -> Option<String> {
    let trimmed = word.trim_matches(|c: char| !c.is_alphanumeric());
    if trimmed.is_empty() {
        return None;
    }
    let normalized: String = trimmed
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '\'' | '-' | '.' | ','))
        .flat_map(char::to_lowercase)
        .collect();
    Some(normalized)
}

/// Normalized words of `text`, in order, duplicates kept.
pub fn words(text: &str) -> Vec<String> {
    text.split_whitespace().filter_map(normalize).collect()
}

/// Tokens of `text` with their kinds, in order, duplicates kept.
///
/// A word is an entity if it is capitalized somewhere other than the start
/// of a sentence, or written in capitals with at least two letters.
pub fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut sentence_start = true;

    for raw in text.split_whitespace() {
        let ends_sentence = ends_sentence(raw);
        if let Some(normalized) = normalize(raw) {
            let kind = classify(raw, &normalized, sentence_start);
            tokens.push(Token {
                text: normalized,
                kind,
            });
            sentence_start = false;
        }
        if ends_sentence {
            sentence_start = true;
        }
    }
    tokens
}

fn classify(raw: &str, normalized: &str, sentence_start: bool) -> ConceptKind {
    if normalized.starts_with(|c: char| c.is_ascii_digit())
        && normalized
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.' || c == ',')
    {
        return ConceptKind::Number;
    }

    let letters: Vec<char> = raw.chars().filter(|c| c.is_alphabetic()).collect();
    let all_caps = letters.len() >= 2 && letters.iter().all(|c| c.is_uppercase());
    let capitalized = letters.first().is_some_and(|c| c.is_uppercase());

    if all_caps || (capitalized && !sentence_start) {
        ConceptKind::Entity
    } else {
        ConceptKind::Token
    }
}

fn ends_sentence(word: &str) -> bool {
    word.trim_end_matches(|c: char| matches!(c, '"' | '\'' | ')' | ']'))
        .ends_with(['.', '!', '?'])
}

/// Sentences of `text`, trimmed, in order.
pub fn sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        // Runs like "?!" or "..." end one sentence.
        while let Some(&(_, next)) = chars.peek() {
            if matches!(next, '.' | '!' | '?') {
                chars.next();
            } else {
                break;
            }
        }
        let end = chars.peek().map_or(text.len(), |&(j, _)| j);
        let boundary = chars.peek().map_or(true, |&(_, next)| next.is_whitespace());
        if boundary {
            push_sentence(&mut sentences, &text[start..end]);
            start = end;
        }
    }
    push_sentence(&mut sentences, &text[start..]);
    sentences
}

fn push_sentence<'a>(sentences: &mut Vec<&'a str>, candidate: &'a str) {
    let candidate = candidate.trim();
    if candidate.chars().any(char::is_alphanumeric) {
        sentences.push(candidate);
    }
}

pub fn is_exclamatory(sentence: &str) -> bool {
    sentence.trim_end().ends_with('!')
}
