//! wkmp-vl - Virtual Layout
//!
//! Classifies imported media objects into virtual taxonomy trees. Rule code
//! runs in a classification runtime and asks for placements through a
//! per-session callback; the core resolves container chains, builds virtual
//! copies that reference the physical object, and stores them.

pub mod db;
pub mod error;
pub mod layout;
pub mod marshal;
pub mod runtime;
pub mod store;
pub mod surface;

pub use crate::error::{MarshalError, PlacementError, RuntimeFault, SessionError, StoreError};
pub use crate::layout::{Classifier, SessionReport, SessionState};
pub use crate::marshal::{Marshaller, TextConverter};
pub use crate::runtime::{ClassificationRuntime, PlaceCallback, PlacementRequest};
pub use crate::store::{CatalogStore, ContainerRef, PlacedObject};
pub use crate::surface::{Surface, SurfaceValue};
