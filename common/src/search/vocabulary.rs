//! Word lists the token classifiers match against.
//!
//! All entries are lowercase; search strings are lowercased before
//! classification.

/// Full names of US states and the District of Columbia.
pub const US_STATE_NAMES: &[&str] = &[
    "alabama",
    "alaska",
    "arizona",
    "arkansas",
    "california",
    "colorado",
    "connecticut",
    "delaware",
    "district of columbia",
    "florida",
    "georgia",
    "hawaii",
    "idaho",
    "illinois",
    "indiana",
    "iowa",
    "kansas",
    "kentucky",
    "louisiana",
    "maine",
    "maryland",
    "massachusetts",
    "michigan",
    "minnesota",
    "mississippi",
    "missouri",
    "montana",
    "nebraska",
    "nevada",
    "new hampshire",
    "new jersey",
    "new mexico",
    "new york",
    "north carolina",
    "north dakota",
    "ohio",
    "oklahoma",
    "oregon",
    "pennsylvania",
    "rhode island",
    "south carolina",
    "south dakota",
    "tennessee",
    "texas",
    "utah",
    "vermont",
    "virginia",
    "washington",
    "west virginia",
    "wisconsin",
    "wyoming",
];

/// Two-letter USPS abbreviations for the entries of [`US_STATE_NAMES`].
pub const US_STATE_ABBREVIATIONS: &[&str] = &[
    "al", "ak", "az", "ar", "ca", "co", "ct", "de", "dc", "fl", "ga", "hi", "id", "il", "in", "ia",
    "ks", "ky", "la", "me", "md", "ma", "mi", "mn", "ms", "mo", "mt", "ne", "nv", "nh", "nj", "nm",
    "ny", "nc", "nd", "oh", "ok", "or", "pa", "ri", "sc", "sd", "tn", "tx", "ut", "vt", "va", "wa",
    "wv", "wi", "wy",
];

/// Words that suggest the searcher is naming a library rather than a place.
pub const LIBRARY_KEYWORDS: &[&str] = &[
    "library",
    "libraries",
    "public",
    "memorial",
    "branch",
    "regional",
    "archive",
    "archives",
    "athenaeum",
];

/// Words that end a county name ("kern county", "natchitoches parish").
pub const COUNTY_WORDS: &[&str] = &["county", "parish"];

/// Single misspellings corrected during normalization, as `(wrong, right)`.
pub const COMMON_MISTAKES: &[(&str, &str)] = &[("libary", "library")];

pub fn is_state_name(value: &str) -> bool {
    US_STATE_NAMES.contains(&value)
}

pub fn is_state_abbreviation(value: &str) -> bool {
    US_STATE_ABBREVIATIONS.contains(&value)
}

pub fn is_library_keyword(value: &str) -> bool {
    LIBRARY_KEYWORDS.contains(&value)
}

pub fn is_county_word(value: &str) -> bool {
    COUNTY_WORDS.contains(&value)
}

/// State names made of more than one word.
pub fn multi_word_state_names() -> impl Iterator<Item = &'static str> {
    US_STATE_NAMES.iter().copied().filter(|name| name.contains(' '))
}

/// Full state name for a two-letter abbreviation.
pub fn state_name_for_abbreviation(abbr: &str) -> Option<&'static str> {
    let abbr = abbr.to_lowercase();
    US_STATE_ABBREVIATIONS
        .iter()
        .position(|a| *a == abbr)
        .map(|idx| US_STATE_NAMES[idx])
}
