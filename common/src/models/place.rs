//! Geographic places that libraries serve.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::AppError;

/// Kind of geographic place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PlaceType {
    Nation,
    State,
    County,
    City,
    PostalCode,
    LibraryServiceArea,
    Everywhere,
}

impl PlaceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaceType::Nation => "nation",
            PlaceType::State => "state",
            PlaceType::County => "county",
            PlaceType::City => "city",
            PlaceType::PostalCode => "postal_code",
            PlaceType::LibraryServiceArea => "library_service_area",
            PlaceType::Everywhere => "everywhere",
        }
    }

    /// Focus areas of this type make a library local.
    pub fn is_local(&self) -> bool {
        matches!(self, PlaceType::PostalCode | PlaceType::City | PlaceType::County)
    }

    /// Focus areas of this type make a library supralocal.
    pub fn is_supralocal(&self) -> bool {
        matches!(self, PlaceType::State | PlaceType::Nation | PlaceType::Everywhere)
    }

    /// Database values of the local place types.
    pub fn local_names() -> [&'static str; 3] {
        [
            PlaceType::PostalCode.as_str(),
            PlaceType::City.as_str(),
            PlaceType::County.as_str(),
        ]
    }

    /// Database values of the supralocal place types.
    pub fn supralocal_names() -> [&'static str; 3] {
        [
            PlaceType::State.as_str(),
            PlaceType::Nation.as_str(),
            PlaceType::Everywhere.as_str(),
        ]
    }
}

impl fmt::Display for PlaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlaceType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nation" => Ok(PlaceType::Nation),
            "state" => Ok(PlaceType::State),
            "county" => Ok(PlaceType::County),
            "city" => Ok(PlaceType::City),
            "postal_code" => Ok(PlaceType::PostalCode),
            "library_service_area" => Ok(PlaceType::LibraryServiceArea),
            "everywhere" => Ok(PlaceType::Everywhere),
            other => Err(AppError::Validation(format!("unknown place type '{other}'"))),
        }
    }
}

/// What kind of library a focus area implies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LibraryType {
    Local,
    State,
    Province,
    National,
    Universal,
}

impl LibraryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LibraryType::Local => "local",
            LibraryType::State => "state",
            LibraryType::Province => "province",
            LibraryType::National => "national",
            LibraryType::Universal => "universal",
        }
    }
}

/// Alternate name for a place ("Manhattan" for New York City).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PlaceAlias {
    pub name: String,
    #[serde(default)]
    pub language: Option<String>,
}

/// A geographic place.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Place {
    pub id: i64,
    pub external_id: String,
    pub external_name: String,
    pub place_type: PlaceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abbreviated_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
    /// Abbreviation of the parent place, used to tell states from provinces.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_abbreviation: Option<String>,
    /// GeoJSON geometry.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub geometry: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<PlaceAlias>,
}

impl Place {
    /// External id of the single place that covers the whole world.
    pub const EVERYWHERE_EXTERNAL_ID: &'static str = "everywhere";

    /// Library type implied by a focus area on this place.
    ///
    /// A state outside the US is a province. Library service areas carry no type.
    pub fn library_type(&self) -> Option<LibraryType> {
        match self.place_type {
            PlaceType::PostalCode | PlaceType::City | PlaceType::County => Some(LibraryType::Local),
            PlaceType::State => match self.parent_abbreviation.as_deref() {
                None | Some("US") => Some(LibraryType::State),
                Some(_) => Some(LibraryType::Province),
            },
            PlaceType::Nation => Some(LibraryType::National),
            PlaceType::Everywhere => Some(LibraryType::Universal),
            PlaceType::LibraryServiceArea => None,
        }
    }

    /// Whether `name` is this place's name, abbreviation or an alias.
    pub fn answers_to(&self, name: &str) -> bool {
        self.external_name.eq_ignore_ascii_case(name)
            || self
                .abbreviated_name
                .as_deref()
                .is_some_and(|abbr| abbr.eq_ignore_ascii_case(name))
            || self.aliases.iter().any(|a| a.name.eq_ignore_ascii_case(name))
    }
}
