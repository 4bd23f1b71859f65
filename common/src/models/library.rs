//! Library models.
//!
//! A library moves through stages on two independent tracks: one set by the
//! library itself and one set by the registry. It is in production only when
//! both say so.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::place::{LibraryType, Place};
use crate::errors::{AppError, AppResult};

/// Number of candidates [`random_short_name`] tries before giving up.
pub const SHORT_NAME_ATTEMPTS: usize = 20;

const URN_PREFIX: &str = "urn:uuid:";

/// Lifecycle stage of a library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LibraryStage {
    Testing,
    Production,
    Cancelled,
}

impl LibraryStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            LibraryStage::Testing => "testing",
            LibraryStage::Production => "production",
            LibraryStage::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for LibraryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LibraryStage {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "testing" => Ok(LibraryStage::Testing),
            "production" => Ok(LibraryStage::Production),
            "cancelled" => Ok(LibraryStage::Cancelled),
            other => Err(AppError::Validation(format!("unknown library stage '{other}'"))),
        }
    }
}

/// How a library relates to a place it serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ServiceAreaKind {
    /// The library concentrates on this place.
    Focus,
    /// People in this place may sign up.
    Eligibility,
}

impl ServiceAreaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceAreaKind::Focus => "focus",
            ServiceAreaKind::Eligibility => "eligibility",
        }
    }
}

impl FromStr for ServiceAreaKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "focus" => Ok(ServiceAreaKind::Focus),
            "eligibility" => Ok(ServiceAreaKind::Eligibility),
            other => Err(AppError::Validation(format!("unknown service area kind '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ServiceArea {
    pub kind: ServiceAreaKind,
    pub place: Place,
}

/// A library known to the registry.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Library {
    #[serde(skip)]
    pub id: i64,
    pub uuid: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opds_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_url: Option<String>,
    pub registry_stage: LibraryStage,
    pub library_stage: LibraryStage,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service_areas: Vec<ServiceArea>,
}

impl Library {
    /// `urn:uuid:<uuid>`, the identifier other systems know the library by.
    pub fn internal_urn(&self) -> String {
        format!("{URN_PREFIX}{}", self.uuid)
    }

    pub fn in_production(&self) -> bool {
        self.library_stage == LibraryStage::Production
            && self.registry_stage == LibraryStage::Production
    }

    pub fn set_short_name(&mut self, short_name: &str) -> AppResult<()> {
        self.short_name = Some(normalize_short_name(short_name)?);
        Ok(())
    }

    /// Changes the stage the library itself controls.
    ///
    /// Once in production, only the registry can take the library out.
    pub fn set_library_stage(&mut self, stage: LibraryStage) -> AppResult<()> {
        if self.in_production() && stage != LibraryStage::Production {
            return Err(AppError::Conflict(
                "This library is already in production; \
                 only the registry can take it out of production."
                    .to_string(),
            ));
        }
        self.library_stage = stage;
        Ok(())
    }

    /// Changes the stage the registry controls. Always allowed.
    pub fn set_registry_stage(&mut self, stage: LibraryStage) {
        self.registry_stage = stage;
    }

    /// Places the library focuses on.
    pub fn focus_areas(&self) -> impl Iterator<Item = &Place> {
        self.service_areas
            .iter()
            .filter(|area| area.kind == ServiceAreaKind::Focus)
            .map(|area| &area.place)
    }

    /// Library type implied by the focus areas.
    ///
    /// A library whose focus areas imply different types has no type.
    pub fn types(&self) -> Vec<LibraryType> {
        let distinct: HashSet<LibraryType> =
            self.focus_areas().filter_map(Place::library_type).collect();
        if distinct.len() == 1 {
            distinct.into_iter().collect()
        } else {
            Vec::new()
        }
    }
}

/// Extracts the UUID from a `urn:uuid:` identifier.
pub fn parse_urn(urn: &str) -> Option<Uuid> {
    urn.strip_prefix(URN_PREFIX)
        .and_then(|rest| Uuid::parse_str(rest).ok())
}

/// Validates a short name and returns its stored (uppercase) form.
pub fn normalize_short_name(short_name: &str) -> AppResult<String> {
    if short_name.contains('|') {
        return Err(AppError::Validation(
            "Short name cannot contain the pipe character.".to_string(),
        ));
    }
    Ok(short_name.to_uppercase())
}

/// Generates a six-letter uppercase short name not rejected by `is_duplicate`.
pub fn random_short_name<R, F>(rng: &mut R, is_duplicate: F) -> AppResult<String>
where
    R: Rng + ?Sized,
    F: Fn(&str) -> bool,
{
    for _ in 0..SHORT_NAME_ATTEMPTS {
        let candidate: String = (0..6).map(|_| rng.gen_range(b'A'..=b'Z') as char).collect();
        if !is_duplicate(&candidate) {
            return Ok(candidate);
        }
    }
    Err(AppError::Internal(format!(
        "Could not generate random short name after {SHORT_NAME_ATTEMPTS} attempts!"
    )))
}

/// Request body for registering a library.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateLibraryRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: String,
    /// Generated when omitted.
    #[validate(length(min = 1, max = 64))]
    pub short_name: Option<String>,
    pub description: Option<String>,
    #[validate(url)]
    pub opds_url: Option<String>,
    #[validate(url)]
    pub web_url: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Request body for changing a library's stages. Omitted stages are kept.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStageRequest {
    pub registry_stage: Option<LibraryStage>,
    pub library_stage: Option<LibraryStage>,
}

/// Request body for attaching a place to a library.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddServiceAreaRequest {
    #[validate(length(min = 1))]
    pub place_external_id: String,
    pub kind: ServiceAreaKind,
}

/// Request body for adding an alternate name to a library.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddAliasRequest {
    #[validate(length(min = 1, max = 255, message = "Alias must be 1-255 characters"))]
    pub name: String,
}

/// A library found by a search, with its distance from the point of interest.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LibraryMatch {
    #[serde(flatten)]
    pub library: Library,
    /// Distance in metres; zero when the point lies inside a service area.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_m: Option<f64>,
}
