//! Ordered sequences of search tokens.

use std::fmt;
use std::ops::{Index, IndexMut};

use serde::Serialize;
use utoipa::ToSchema;

use super::token::{collapse_whitespace, Token, TokenType};

/// Upper bound on the number of words a merged token may span, whatever
/// targets are passed to [`TokenSequence::merge_multiword_tokens`].
pub const MAX_MULTIWORD_TOKEN_LEN: usize = 6;

/// A sequence of [`Token`]s kept in search order while classifiers work on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct TokenSequence {
    pub tokens: Vec<Token>,
}

impl TokenSequence {
    pub fn new<I, T>(tokens: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Token>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Token> {
        self.tokens.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Token> {
        self.tokens.iter_mut()
    }

    pub fn all_classified(&self) -> bool {
        self.tokens.iter().all(Token::is_classified)
    }

    pub fn unclassified_count(&self) -> usize {
        self.tokens.iter().filter(|t| !t.is_classified()).count()
    }

    pub fn longest_unclassified_run(&self) -> usize {
        let mut current = 0;
        let mut longest = 0;
        for token in &self.tokens {
            current = if token.is_classified() { 0 } else { current + 1 };
            longest = longest.max(current);
        }
        longest
    }

    /// Whether any token carries `token_type`.
    pub fn contains_type(&self, token_type: TokenType) -> bool {
        self.tokens.iter().any(|t| t.has_type(token_type))
    }

    /// Values of every token carrying `token_type`, in order.
    pub fn values_of(&self, token_type: TokenType) -> Vec<&str> {
        self.tokens
            .iter()
            .filter(|t| t.has_type(token_type))
            .map(|t| t.value.as_str())
            .collect()
    }

    /// Whether `word` appears as a whole word anywhere in the sequence.
    pub fn contains_word(&self, word: &str) -> bool {
        self.tokens
            .iter()
            .any(|t| t.value.split(' ').any(|w| w == word))
    }

    /// Index of the first token of the unclassified run ending just before `idx`.
    ///
    /// Returns `idx` itself when the token before it is classified or `idx` is 0.
    pub fn unclassified_run_start(&self, idx: usize) -> usize {
        let mut start = idx;
        while start > 0 && !self.tokens[start - 1].is_classified() {
            start -= 1;
        }
        start
    }

    /// Index one past the last token of the unclassified run starting at `idx`.
    pub fn unclassified_run_end(&self, idx: usize) -> usize {
        let mut end = idx;
        while end < self.tokens.len() && !self.tokens[end].is_classified() {
            end += 1;
        }
        end
    }

    /// Space-joined values of the tokens in `range`.
    pub fn joined(&self, range: std::ops::Range<usize>) -> String {
        self.tokens[range]
            .iter()
            .map(|t| t.value.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Lowercases each target and collapses its whitespace.
    pub fn normalize_target_list<S: AsRef<str>>(targets: &[S]) -> Vec<String> {
        targets
            .iter()
            .map(|t| collapse_whitespace(t.as_ref()).to_lowercase())
            .collect()
    }

    /// Returns the targets that occur in this sequence on token boundaries.
    ///
    /// A target qualifies when it has between 2 and
    /// `max(2, min(longest target, MAX_MULTIWORD_TOKEN_LEN))` words and some run
    /// of whole tokens joins to exactly that string. A target may span several
    /// tokens but never part of one: in `["alpha", "bravo charlie", "delta"]`,
    /// "alpha bravo charlie" is found and "charlie delta" is not.
    ///
    /// Finding a target does not guarantee it can be merged, since an earlier
    /// merge may consume some of its tokens.
    pub fn multiword_targets_found<S: AsRef<str>>(&self, targets: &[S]) -> Vec<String> {
        let normalized = Self::normalize_target_list(targets);
        let Some(longest) = normalized.iter().map(|t| word_count(t)).max() else {
            return Vec::new();
        };
        let max_words = longest.min(MAX_MULTIWORD_TOKEN_LEN).max(2);

        let mut found: Vec<String> = Vec::new();
        for target in normalized {
            let words = word_count(&target);
            if !(2..=max_words).contains(&words) || found.contains(&target) {
                continue;
            }
            if self.find_run(&target, 0).is_some() {
                found.push(target);
            }
        }
        found
    }

    /// Merges runs of tokens matching any of `targets` into single tokens of
    /// `merged_type`, longest targets first.
    ///
    /// Only runs spanning two or more whole tokens are merged; the types of
    /// the consumed tokens are ignored.
    pub fn merge_multiword_tokens<S: AsRef<str>>(&mut self, targets: &[S], merged_type: TokenType) {
        let mut found = self.multiword_targets_found(targets);
        found.sort_by_key(|t| std::cmp::Reverse(word_count(t)));

        for target in found {
            let mut merged = Vec::with_capacity(self.tokens.len());
            let mut idx = 0;
            while idx < self.tokens.len() {
                match self.find_run(&target, idx) {
                    Some((start, end)) if start == idx && end - start >= 2 => {
                        merged.push(Token::typed(&target, merged_type));
                        idx = end;
                    }
                    _ => {
                        merged.push(self.tokens[idx].clone());
                        idx += 1;
                    }
                }
            }
            self.tokens = merged;
        }
    }

    /// Replaces the tokens in `start..end` with one token of `merged_type`.
    ///
    /// A single-token range is simply retyped. Multi-token ranges longer than
    /// [`MAX_MULTIWORD_TOKEN_LEN`] words are left alone. Returns whether the
    /// sequence changed.
    pub fn merge_range(&mut self, start: usize, end: usize, merged_type: TokenType) -> bool {
        if start >= end || end > self.tokens.len() {
            return false;
        }
        if end - start == 1 {
            self.tokens[start].token_type = Some(merged_type);
            return true;
        }
        let value = self.joined(start..end);
        if word_count(&value) > MAX_MULTIWORD_TOKEN_LEN {
            return false;
        }
        self.tokens
            .splice(start..end, [Token::typed(value, merged_type)]);
        true
    }

    /// Finds the first run of whole tokens, starting at or after `from`, whose
    /// joined values equal `target`. Returns `(start, end)` with `end` exclusive.
    fn find_run(&self, target: &str, from: usize) -> Option<(usize, usize)> {
        for start in from..self.tokens.len() {
            let mut joined = String::new();
            for end in start..self.tokens.len() {
                if end > start {
                    joined.push(' ');
                }
                joined.push_str(&self.tokens[end].value);

                if joined == target {
                    return Some((start, end + 1));
                }
                if !target.starts_with(&format!("{joined} ")) {
                    break;
                }
            }
        }
        None
    }
}

fn word_count(value: &str) -> usize {
    value.split_whitespace().count()
}

impl fmt::Display for TokenSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.joined(0..self.tokens.len()))
    }
}

impl Index<usize> for TokenSequence {
    type Output = Token;

    fn index(&self, idx: usize) -> &Token {
        &self.tokens[idx]
    }
}

impl IndexMut<usize> for TokenSequence {
    fn index_mut(&mut self, idx: usize) -> &mut Token {
        &mut self.tokens[idx]
    }
}

impl<'a> IntoIterator for &'a TokenSequence {
    type Item = &'a Token;
    type IntoIter = std::slice::Iter<'a, Token>;

    fn into_iter(self) -> Self::IntoIter {
        self.tokens.iter()
    }
}

impl IntoIterator for TokenSequence {
    type Item = Token;
    type IntoIter = std::vec::IntoIter<Token>;

    fn into_iter(self) -> Self::IntoIter {
        self.tokens.into_iter()
    }
}
