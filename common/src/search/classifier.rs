//! Token classifiers.
//!
//! Each classifier looks for one kind of pattern in a [`TokenSequence`] and
//! returns an augmented copy: tokens may gain a type, and runs of tokens may be
//! merged into one. The input sequence is never modified.

use super::sequence::TokenSequence;
use super::token::{is_simple_postcode, TokenType};
use super::vocabulary;

/// A rule that assigns types to tokens in a sequence.
pub trait TokenClassifier: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Whether the classifier is likely to find something to do.
    fn work_to_do(&self, sequence: &TokenSequence) -> bool {
        !sequence.all_classified()
    }

    /// Returns a classified copy of `sequence`.
    fn classify(&self, sequence: &TokenSequence) -> TokenSequence;
}

/// Types single-word tokens: postcodes, state abbreviations, state names and
/// library keywords, in that order of preference.
pub struct SinglewordClassifier;

impl TokenClassifier for SinglewordClassifier {
    fn name(&self) -> &'static str {
        "singleword"
    }

    fn classify(&self, sequence: &TokenSequence) -> TokenSequence {
        let mut augmented = sequence.clone();
        if !self.work_to_do(sequence) {
            return augmented;
        }

        for token in augmented.iter_mut() {
            if token.is_classified() || token.is_multiword() {
                continue;
            }
            token.token_type = if is_simple_postcode(&token.value) {
                Some(TokenType::Postcode)
            } else if vocabulary::is_state_abbreviation(&token.value) {
                Some(TokenType::StateAbbr)
            } else if vocabulary::is_state_name(&token.value) {
                Some(TokenType::StateName)
            } else if vocabulary::is_library_keyword(&token.value) {
                Some(TokenType::LibraryKeyword)
            } else {
                None
            };
        }
        augmented
    }
}

/// Types state names, merging multi-word names such as "new york".
pub struct StatenameClassifier;

impl TokenClassifier for StatenameClassifier {
    fn name(&self) -> &'static str {
        "statename"
    }

    fn classify(&self, sequence: &TokenSequence) -> TokenSequence {
        let mut augmented = sequence.clone();
        if !self.work_to_do(sequence) {
            return augmented;
        }

        for token in augmented.iter_mut() {
            if !token.is_classified() && vocabulary::is_state_name(&token.value) {
                token.token_type = Some(TokenType::StateName);
            }
        }

        let targets: Vec<&str> = vocabulary::multi_word_state_names().collect();
        augmented.merge_multiword_tokens(&targets, TokenType::StateName);
        augmented
    }
}

/// Types county names: a county word ("county", "parish") absorbs the run of
/// unclassified tokens before it.
pub struct CountynameClassifier;

impl TokenClassifier for CountynameClassifier {
    fn name(&self) -> &'static str {
        "countyname"
    }

    fn work_to_do(&self, sequence: &TokenSequence) -> bool {
        sequence
            .iter()
            .any(|t| vocabulary::is_county_word(&t.value))
    }

    fn classify(&self, sequence: &TokenSequence) -> TokenSequence {
        let mut augmented = sequence.clone();
        if !self.work_to_do(sequence) {
            return augmented;
        }

        let county_idx = (1..augmented.len()).find(|&idx| {
            vocabulary::is_county_word(&augmented[idx].value) && !augmented[idx - 1].is_classified()
        });
        if let Some(idx) = county_idx {
            let start = augmented.unclassified_run_start(idx);
            augmented.merge_range(start, idx + 1, TokenType::CountyName);
        }
        augmented
    }
}

/// Types city names.
///
/// Should run after the state classifiers: a state name or abbreviation
/// following unclassified words is taken as a hint that those words name a city.
///
/// Patterns, of which only the first applicable one is tried:
///
/// 1. "city of" followed by unclassified words ("city of industry")
/// 2. unclassified words followed by "city" ("paradise city")
/// 3. unclassified words followed by a state token ("yreka ca")
pub struct CitynameClassifier;

impl CitynameClassifier {
    fn city_of_position(sequence: &TokenSequence) -> Option<usize> {
        (0..sequence.len().saturating_sub(1))
            .find(|&idx| sequence[idx].value == "city" && sequence[idx + 1].value == "of")
    }
}

impl TokenClassifier for CitynameClassifier {
    fn name(&self) -> &'static str {
        "cityname"
    }

    fn work_to_do(&self, sequence: &TokenSequence) -> bool {
        if sequence.len() <= 1 || sequence.all_classified() {
            return false;
        }
        sequence.contains_word("city") || sequence.iter().any(|t| t.is_state())
    }

    fn classify(&self, sequence: &TokenSequence) -> TokenSequence {
        let mut augmented = sequence.clone();
        if !self.work_to_do(sequence) {
            return augmented;
        }
        let len = augmented.len();

        if Self::city_of_position(&augmented).is_some() {
            let start = (0..len.saturating_sub(2)).find(|&idx| {
                augmented[idx].value == "city"
                    && augmented[idx + 1].value == "of"
                    && !augmented[idx + 2].is_classified()
            });
            if let Some(idx) = start {
                let end = augmented.unclassified_run_end(idx + 2);
                augmented.merge_range(idx, end, TokenType::CityName);
            }
        } else if augmented.iter().any(|t| t.value == "city") {
            let city_idx = (1..len).find(|&idx| {
                augmented[idx].value == "city" && !augmented[idx - 1].is_classified()
            });
            if let Some(idx) = city_idx {
                let start = augmented.unclassified_run_start(idx);
                augmented.merge_range(start, idx + 1, TokenType::CityName);
            }
        } else {
            let mut idx = 1;
            while idx < augmented.len() {
                if augmented[idx].is_state() && !augmented[idx - 1].is_classified() {
                    let start = augmented.unclassified_run_start(idx);
                    if start == idx - 1 {
                        augmented[idx - 1].token_type = Some(TokenType::CityName);
                    } else {
                        augmented.merge_range(start, idx, TokenType::CityName);
                        break;
                    }
                }
                idx += 1;
            }
        }
        augmented
    }
}

/// Types library names: each library keyword absorbs the adjacent runs of
/// unclassified or keyword tokens on both sides.
pub struct LibrarynameClassifier;

impl LibrarynameClassifier {
    fn absorbable(sequence: &TokenSequence, idx: usize) -> bool {
        matches!(
            sequence[idx].token_type,
            None | Some(TokenType::LibraryKeyword)
        )
    }

    fn is_keyword(sequence: &TokenSequence, idx: usize) -> bool {
        let token = &sequence[idx];
        match token.token_type {
            Some(TokenType::LibraryKeyword) => true,
            None => vocabulary::is_library_keyword(&token.value),
            _ => false,
        }
    }
}

impl TokenClassifier for LibrarynameClassifier {
    fn name(&self) -> &'static str {
        "libraryname"
    }

    fn work_to_do(&self, sequence: &TokenSequence) -> bool {
        sequence.iter().any(|t| {
            t.has_type(TokenType::LibraryKeyword) || vocabulary::is_library_keyword(&t.value)
        })
    }

    fn classify(&self, sequence: &TokenSequence) -> TokenSequence {
        let mut augmented = sequence.clone();
        if !self.work_to_do(sequence) {
            return augmented;
        }

        let mut idx = 0;
        while idx < augmented.len() {
            if !Self::is_keyword(&augmented, idx) {
                idx += 1;
                continue;
            }

            let mut start = idx;
            while start > 0 && Self::absorbable(&augmented, start - 1) {
                start -= 1;
            }
            let mut end = idx + 1;
            while end < augmented.len() && Self::absorbable(&augmented, end) {
                end += 1;
            }

            if end - start >= 2 && augmented.merge_range(start, end, TokenType::LibraryName) {
                idx = start + 1;
            } else {
                idx = end;
            }
        }
        augmented
    }
}

/// The classifiers in the order a query runs them.
pub fn default_pipeline() -> Vec<Box<dyn TokenClassifier>> {
    vec![
        Box::new(SinglewordClassifier),
        Box::new(StatenameClassifier),
        Box::new(CountynameClassifier),
        Box::new(CitynameClassifier),
        Box::new(LibrarynameClassifier),
    ]
}

/// Runs `sequence` through every classifier of [`default_pipeline`].
pub fn classify_all(sequence: &TokenSequence) -> TokenSequence {
    default_pipeline()
        .iter()
        .fold(sequence.clone(), |current, classifier| {
            if classifier.work_to_do(&current) {
                let next = classifier.classify(&current);
                tracing::trace!(classifier = classifier.name(), tokens = %next, "classified");
                next
            } else {
                current
            }
        })
}
