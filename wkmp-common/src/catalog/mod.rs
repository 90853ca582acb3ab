//! Catalog object model
//!
//! Physical objects come from the import pipeline and carry a filesystem
//! location. Virtual objects are placements of a physical object inside the
//! taxonomy tree and always reference their physical origin.

pub mod object;
pub mod resource;
pub mod vocabulary;

pub use object::{CatalogObject, ContainerFields, ItemFields, ObjectData, ObjectFlags, ObjectKind};
pub use resource::Resource;
pub use vocabulary::{MetaField, ResAttr};

/// Catalog object identifier, assigned by persistence
pub type ObjectId = i64;

/// Sentinel for "no id assigned yet"
pub const INVALID_OBJECT_ID: ObjectId = -1;

/// Id of the catalog root container
pub const ROOT_CONTAINER_ID: ObjectId = 0;
