//! Search tokens.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// What a token is believed to represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Postcode,
    StateAbbr,
    StateName,
    CountyName,
    CityName,
    LibraryKeyword,
    LibraryName,
}

impl TokenType {
    pub const ALL: [TokenType; 7] = [
        TokenType::Postcode,
        TokenType::StateAbbr,
        TokenType::StateName,
        TokenType::CountyName,
        TokenType::CityName,
        TokenType::LibraryKeyword,
        TokenType::LibraryName,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Postcode => "postcode",
            TokenType::StateAbbr => "state_abbr",
            TokenType::StateName => "state_name",
            TokenType::CountyName => "county_name",
            TokenType::CityName => "city_name",
            TokenType::LibraryKeyword => "library_keyword",
            TokenType::LibraryName => "library_name",
        }
    }

    /// Parses a type name; unknown names yield `None` rather than an error.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    /// Whether this type names a state.
    pub fn is_state(&self) -> bool {
        matches!(self, TokenType::StateAbbr | TokenType::StateName)
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single token of a search string.
///
/// The value may hold several words ("new york"). Whitespace is normalized on
/// construction: leading and trailing whitespace is removed and internal runs
/// collapse to one space.
///
/// Two tokens are equal when their values are equal, whatever their types.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Token {
    pub value: String,
    #[serde(rename = "type")]
    pub token_type: Option<TokenType>,
}

impl Token {
    pub fn new(value: impl AsRef<str>) -> Self {
        Self {
            value: collapse_whitespace(value.as_ref()),
            token_type: None,
        }
    }

    pub fn typed(value: impl AsRef<str>, token_type: TokenType) -> Self {
        Self {
            value: collapse_whitespace(value.as_ref()),
            token_type: Some(token_type),
        }
    }

    pub fn with_type(value: impl AsRef<str>, token_type: Option<TokenType>) -> Self {
        Self {
            value: collapse_whitespace(value.as_ref()),
            token_type,
        }
    }

    pub fn is_multiword(&self) -> bool {
        self.value.contains(' ')
    }

    pub fn is_classified(&self) -> bool {
        self.token_type.is_some()
    }

    pub fn is_state(&self) -> bool {
        self.token_type.is_some_and(|t| t.is_state())
    }

    pub fn has_type(&self, token_type: TokenType) -> bool {
        self.token_type == Some(token_type)
    }

    pub fn word_count(&self) -> usize {
        self.value.split(' ').filter(|w| !w.is_empty()).count()
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for Token {}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Token::new(value)
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Token::new(value)
    }
}

/// True for strings of exactly 5 or 9 ASCII digits (ZIP and ZIP+4 without the dash).
pub fn is_simple_postcode(value: &str) -> bool {
    (value.len() == 5 || value.len() == 9) && value.bytes().all(|b| b.is_ascii_digit())
}

pub(crate) fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
