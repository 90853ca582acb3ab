//! Persistence contract consumed by the layout core
//!
//! The core never talks to storage directly; it goes through this trait.
//! [`crate::db::SqliteCatalog`] is the production implementation.

use crate::error::StoreError;
use async_trait::async_trait;
use wkmp_common::{CatalogObject, ObjectId};

/// Container returned by get-or-create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRef {
    pub id: ObjectId,
    /// Class the container actually has (first writer wins)
    pub class: String,
    /// True when this call created the leaf container
    pub created: bool,
}

/// Result of storing an object under a container chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedObject {
    pub container: ContainerRef,
    pub id: ObjectId,
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Return the container at `path`, creating it and any missing ancestors
    ///
    /// Must be atomic: concurrent callers for the same path all receive the
    /// same id and exactly one container row exists afterwards. An
    /// implementation may report [`StoreError::Conflict`] when it lost a race
    /// and could not re-read the winner; callers retry.
    async fn get_or_create_container(
        &self,
        path: &str,
        class: &str,
        hint_source: ObjectId,
    ) -> Result<ContainerRef, StoreError>;

    /// Assign an id to `object`, persist it, and return the id
    ///
    /// A reference to an object that does not exist fails with
    /// [`StoreError::MissingReference`].
    async fn assign_and_store(&self, object: CatalogObject) -> Result<ObjectId, StoreError>;

    /// Get-or-create the chain at `path` and store `object` under its leaf
    ///
    /// Both happen in one atomic step: when the object cannot be stored
    /// (e.g. its reference target was removed) no container is left behind.
    /// The object's `parent_id` is replaced by the leaf id.
    async fn store_in_chain(
        &self,
        path: &str,
        class: &str,
        hint_source: ObjectId,
        object: CatalogObject,
    ) -> Result<PlacedObject, StoreError>;

    async fn object_exists(&self, id: ObjectId) -> Result<bool, StoreError>;
}
