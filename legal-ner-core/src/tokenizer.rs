//! # Tokenizer with Character Offsets
//!
//! Splits a decision's text into tokens and records where each token sits in
//! the original text. Offsets are counted in **characters** (Unicode scalar
//! values), the coordinate space the annotation tool exports, so a token can be
//! compared directly with an [`crate::corpus::EntitySpan`].
//!
//! ## Tokenization Scheme
//!
//! A token is either a maximal run of word characters (`\w+`) or a single
//! character that is neither a word character nor whitespace (`[^\w\s]`).
//! Punctuation is therefore always its own token, so an entity that ends right
//! before a comma is never swallowed into a larger "word".
//!
//! ```text
//! "NEDA issued PD 1468."
//!  NEDA | issued | PD | 1468 | .
//!  0..4   5..11    12..14 15..19 19..20
//! ```
//!
//! ## Offsets
//!
//! Offsets come from the match positions of a single left-to-right scan. The
//! byte→char conversion only counts the characters between the end of the
//! previous match and the start of the next, so repeated substrings ("PD ...
//! PD") can never be mapped to the wrong occurrence.
//!
//! ## Example
//!
//! ```rust
//! use legal_ner_core::tokenizer::tokenize;
//!
//! let tokens = tokenize("R.A. No. 3019");
//! let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
//! assert_eq!(texts, ["R", ".", "A", ".", "No", ".", "3019"]);
//! ```

use std::sync::OnceLock;

use regex::{Matches, Regex};
use serde::{Deserialize, Serialize};

/// A token extracted from the original text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Token {
    /// Token text (ex: "Republic", ",", "3019").
    pub text: String,
    /// Start character offset in the original text (inclusive).
    pub start: usize,
    /// End character offset in the original text (exclusive).
    pub end: usize,
    /// Position of the token in the sequence (0, 1, 2...).
    pub index: usize,
}

impl Token {
    pub fn new(text: impl Into<String>, start: usize, end: usize, index: usize) -> Self {
        Self {
            text: text.into(),
            start,
            end,
            index,
        }
    }

    /// Character length of the token.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\w+|[^\w\s]").expect("token pattern is valid"))
}

/// Tokenizes a text eagerly.
pub fn tokenize(text: &str) -> Vec<Token> {
    TokenStream::new(text).collect()
}

/// Lazy token iterator over a text.
///
/// Every call to [`TokenStream::new`] starts from the beginning; nothing is
/// shared between streams.
pub struct TokenStream<'t> {
    text: &'t str,
    matches: Matches<'static, 't>,
    /// Byte position right after the previous match.
    last_byte: usize,
    /// Character offset corresponding to `last_byte`.
    last_char: usize,
    index: usize,
}

impl<'t> TokenStream<'t> {
    pub fn new(text: &'t str) -> Self {
        Self {
            text,
            matches: token_pattern().find_iter(text),
            last_byte: 0,
            last_char: 0,
            index: 0,
        }
    }
}

impl Iterator for TokenStream<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        let m = self.matches.next()?;

        // Characters skipped since the previous token (whitespace only).
        let start = self.last_char + self.text[self.last_byte..m.start()].chars().count();
        let end = start + m.as_str().chars().count();

        self.last_byte = m.end();
        self.last_char = end;

        let token = Token::new(m.as_str(), start, end, self.index);
        self.index += 1;
        Some(token)
    }
}

/// Number of characters in a text, the upper bound for every span offset.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Slices a text by character offsets. Returns `None` when the range is out of
/// bounds or reversed.
pub fn slice_chars(text: &str, start: usize, end: usize) -> Option<&str> {
    if start > end {
        return None;
    }
    let mut boundaries = text
        .char_indices()
        .map(|(b, _)| b)
        .chain(std::iter::once(text.len()));
    let start_byte = boundaries.nth(start)?;
    let end_byte = if end == start {
        start_byte
    } else {
        boundaries.nth(end - start - 1)?
    };
    Some(&text[start_byte..end_byte])
}
