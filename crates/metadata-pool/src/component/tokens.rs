//! Search token table for a component.

use std::collections::HashMap;

use bitflags::bitflags;

use super::{Component, ProvidedKind};

bitflags! {
    /// Which component field a token was taken from. Higher bits rank higher.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TokenMatch: u32 {
        const MEDIATYPE = 1 << 0;
        const PKGNAME = 1 << 1;
        const DESCRIPTION = 1 << 2;
        const SUMMARY = 1 << 3;
        const KEYWORD = 1 << 4;
        const NAME = 1 << 5;
        const ID = 1 << 6;
    }
}

/// Splits a free-text value into lowercase word tokens.
pub fn tokenize_value(value: &str) -> Vec<String> {
    value
        .split(|ch: char| !(ch.is_alphanumeric() || matches!(ch, '-' | '+' | '.' | '_')))
        .map(|word| word.trim_matches(|ch: char| matches!(ch, '.' | '-')))
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect()
}

pub(super) fn token_table(cpt: &Component) -> HashMap<String, TokenMatch> {
    let mut table = HashMap::new();

    if !cpt.id.is_empty() {
        add_token(&mut table, &cpt.id.to_lowercase(), false, TokenMatch::ID);
    }
    if let Some(name) = &cpt.name {
        add_tokens(&mut table, name, true, TokenMatch::NAME);
    }
    if let Some(summary) = &cpt.summary {
        add_tokens(&mut table, summary, true, TokenMatch::SUMMARY);
    }
    if let Some(description) = &cpt.description {
        add_tokens(&mut table, description, false, TokenMatch::DESCRIPTION);
    }
    for keyword in &cpt.keywords {
        add_tokens(&mut table, keyword, false, TokenMatch::KEYWORD);
    }
    if let Some(provided) = cpt.provided_for_kind(ProvidedKind::Mediatype) {
        for item in &provided.items {
            add_token(&mut table, &item.to_lowercase(), false, TokenMatch::MEDIATYPE);
        }
    }
    for pkgname in &cpt.pkgnames {
        add_token(&mut table, &pkgname.to_lowercase(), false, TokenMatch::PKGNAME);
    }

    table
}

pub(super) fn score_term(table: &HashMap<String, TokenMatch>, term: &str) -> u32 {
    if let Some(found) = table.get(term) {
        return found.bits() << 2;
    }

    let mut result = TokenMatch::empty();
    for (token, found) in table {
        if token.starts_with(term) {
            result |= *found;
        }
    }
    result.bits()
}

fn add_tokens(table: &mut HashMap<String, TokenMatch>, value: &str, allow_split: bool, flag: TokenMatch) {
    for token in tokenize_value(value) {
        add_token(table, &token, allow_split, flag);
    }
}

fn add_token(table: &mut HashMap<String, TokenMatch>, value: &str, allow_split: bool, flag: TokenMatch) {
    // names like x-plane or half-life also match on their parts
    if allow_split && value.contains('-') {
        for part in value.split('-').filter(|part| !part.is_empty()) {
            *table.entry(part.to_string()).or_insert(TokenMatch::empty()) |= flag;
        }
    }
    *table.entry(value.to_string()).or_insert(TokenMatch::empty()) |= flag;
}
