//! Shared data models for the registry.

pub mod admin;
pub mod geo;
pub mod library;
pub mod place;

// Re-export commonly used types
pub use admin::{Admin, SignInRequest, SignInResponse};
pub use geo::Location;
pub use library::{
    AddAliasRequest, AddServiceAreaRequest, CreateLibraryRequest, Library, LibraryMatch,
    LibraryStage, ServiceArea, ServiceAreaKind, UpdateStageRequest,
};
pub use place::{LibraryType, Place, PlaceAlias, PlaceType};
