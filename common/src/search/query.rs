//! Search query parsing and planning.
//!
//! A [`Query`] normalizes the raw search string, classifies its tokens and
//! decides what kind of search to run.

use serde::Serialize;
use utoipa::ToSchema;

use super::classifier::classify_all;
use super::sequence::TokenSequence;
use super::token::{collapse_whitespace, TokenType};
use super::vocabulary;
use crate::models::geo::Location;
use crate::models::place::PlaceType;

/// Longest search string considered, in characters.
pub const MAX_SEARCH_STRING_LEN: usize = 128;

/// What kind of search a query calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    /// One place to search around.
    GeoSingle,
    /// Several candidate places; the location picks one, if known.
    GeoMultiple,
    /// The searcher named a library.
    Libtarget,
}

/// A place named in the query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct GeoTarget {
    pub name: String,
    pub place_type: PlaceType,
    /// State the place is in, when the query names one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// A parsed search query.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Query {
    /// The raw input, truncated to three times [`MAX_SEARCH_STRING_LEN`].
    pub raw: String,
    /// Normalized search string.
    pub normalized: String,
    /// Classified tokens of the cleaned search string.
    pub tokens: TokenSequence,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_type: Option<SearchType>,
}

impl Query {
    pub fn new(search: Option<&str>, location: Option<Location>) -> Self {
        let raw_input = search.unwrap_or_default();
        let raw = truncate_chars(raw_input, MAX_SEARCH_STRING_LEN * 3).to_string();
        let normalized = normalize(raw_input);
        let tokens = classify_all(&TokenSequence::new(clean(&normalized).split_whitespace()));
        let search_type = decide_search_type(&tokens);

        tracing::debug!(
            query = %normalized,
            tokens = %tokens,
            search_type = ?search_type,
            "parsed search query"
        );

        Self {
            raw,
            normalized,
            tokens,
            location,
            search_type,
        }
    }

    /// An empty query has no search text.
    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }

    /// Whether the query can produce any results at all.
    pub fn is_searchable(&self) -> bool {
        !self.is_empty() || self.location.is_some()
    }

    /// Places named by the query, most specific first.
    ///
    /// Postcodes win outright. Otherwise cities and counties are returned,
    /// qualified by the state the query names, and a bare state is the last
    /// resort.
    pub fn geotargets(&self) -> Vec<GeoTarget> {
        let postcodes = self.tokens.values_of(TokenType::Postcode);
        if !postcodes.is_empty() {
            return postcodes
                .into_iter()
                .map(|code| GeoTarget {
                    name: code.to_string(),
                    place_type: PlaceType::PostalCode,
                    state: None,
                })
                .collect();
        }

        let state = self.state_name();
        let mut targets: Vec<GeoTarget> = self
            .tokens
            .values_of(TokenType::CityName)
            .into_iter()
            .map(|name| GeoTarget {
                name: name.to_string(),
                place_type: PlaceType::City,
                state: state.clone(),
            })
            .collect();
        targets.extend(self.tokens.values_of(TokenType::CountyName).into_iter().map(|name| {
            GeoTarget {
                name: strip_county_word(name),
                place_type: PlaceType::County,
                state: state.clone(),
            }
        }));

        if targets.is_empty() {
            if let Some(state) = state {
                targets.push(GeoTarget {
                    name: state,
                    place_type: PlaceType::State,
                    state: None,
                });
            }
        }
        targets
    }

    /// Text to match against library names.
    pub fn library_text(&self) -> String {
        self.tokens.to_string()
    }

    fn state_name(&self) -> Option<String> {
        if let Some(name) = self.tokens.values_of(TokenType::StateName).first() {
            return Some(name.to_string());
        }
        self.tokens
            .values_of(TokenType::StateAbbr)
            .first()
            .and_then(|abbr| vocabulary::state_name_for_abbreviation(abbr))
            .map(String::from)
    }
}

/// Normalizes a raw search string.
///
/// Whitespace is collapsed, the result is cut to [`MAX_SEARCH_STRING_LEN`]
/// characters with any trailing partial word dropped, and common misspellings
/// are corrected.
pub fn normalize(search: &str) -> String {
    let collapsed = collapse_whitespace(truncate_chars(search, MAX_SEARCH_STRING_LEN * 3));
    let mut text = if collapsed.chars().count() > MAX_SEARCH_STRING_LEN {
        let cut = truncate_chars(&collapsed, MAX_SEARCH_STRING_LEN);
        let next_is_boundary = collapsed[cut.len()..].starts_with(' ');
        match (next_is_boundary, cut.rfind(' ')) {
            (true, _) => cut.to_string(),
            (false, Some(space)) => cut[..space].to_string(),
            (false, None) => cut.to_string(),
        }
    } else {
        collapsed
    };
    text = text.trim_end().to_string();

    text.split(' ')
        .map(|word| {
            vocabulary::COMMON_MISTAKES
                .iter()
                .find(|(wrong, _)| word.eq_ignore_ascii_case(wrong))
                .map(|(_, right)| (*right).to_string())
                .unwrap_or_else(|| word.to_string())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strips ASCII punctuation and lowercases.
pub fn clean(search: &str) -> String {
    search
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .collect::<String>()
        .to_lowercase()
}

/// Picks the search type for a classified sequence.
pub fn decide_search_type(tokens: &TokenSequence) -> Option<SearchType> {
    if tokens.is_empty() {
        return None;
    }
    match tokens.values_of(TokenType::Postcode).len() {
        1 => return Some(SearchType::GeoSingle),
        n if n > 1 => return Some(SearchType::GeoMultiple),
        _ => {}
    }
    if tokens.contains_type(TokenType::LibraryName)
        || tokens.contains_type(TokenType::LibraryKeyword)
    {
        return Some(SearchType::Libtarget);
    }
    let places = tokens.values_of(TokenType::CityName).len()
        + tokens.values_of(TokenType::CountyName).len();
    if places == 1 {
        return Some(SearchType::GeoSingle);
    }
    if places > 1 {
        return Some(SearchType::GeoMultiple);
    }
    if tokens.contains_type(TokenType::StateName) || tokens.contains_type(TokenType::StateAbbr) {
        return Some(SearchType::GeoSingle);
    }
    if tokens.unclassified_count() > 0 {
        return Some(SearchType::Libtarget);
    }
    None
}

fn strip_county_word(name: &str) -> String {
    name.split(' ')
        .filter(|w| !vocabulary::is_county_word(w))
        .collect::<Vec<_>>()
        .join(" ")
}

fn truncate_chars(value: &str, max: usize) -> &str {
    match value.char_indices().nth(max) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}
