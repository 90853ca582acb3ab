//! # WKMP Common Library
//!
//! Shared code for the WKMP virtual layout service:
//! - Catalog object model (objects, resources, flags)
//! - Controlled metadata and resource vocabularies
//! - Bootstrap configuration loading
//! - Common error types

pub mod catalog;
pub mod config;
pub mod error;

pub use catalog::{CatalogObject, ObjectId, ObjectKind, INVALID_OBJECT_ID, ROOT_CONTAINER_ID};
pub use error::{Error, Result};
