//! Container Chain Resolver
//!
//! Turns an ordered chain of segment names into the id of the leaf container.
//! Creation is delegated to the store's atomic get-or-create (or its combined
//! chain-and-object store for placements); the resolver only builds the path
//! and retries when the store reports it lost a race.

use crate::error::{PlacementError, StoreError};
use crate::store::{CatalogStore, ContainerRef};
use std::sync::Arc;
use tracing::{debug, warn};
use wkmp_common::{CatalogObject, ObjectId};

/// Attempts before a persistent conflict is treated as a failure
const MAX_CONFLICT_RETRIES: usize = 5;

/// Escape one chain segment so it cannot introduce extra hierarchy levels
pub fn escape_segment(segment: &str) -> String {
    let mut escaped = String::with_capacity(segment.len());
    for c in segment.chars() {
        if c == '\\' || c == '/' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Build the slash-joined container path for a chain
///
/// `["Audio", "AC/DC"]` becomes `/Audio/AC\/DC`.
pub fn chain_path(chain: &[String]) -> String {
    let mut path = String::new();
    for segment in chain {
        path.push('/');
        path.push_str(&escape_segment(segment));
    }
    path
}

/// Split a container path back into unescaped segments
pub fn split_path(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars();
    let mut started = false;

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '/' => {
                if started {
                    segments.push(std::mem::take(&mut current));
                }
                started = true;
            }
            other => current.push(other),
        }
    }
    if started {
        segments.push(current);
    }
    segments
}

/// Every ancestor path of a container path, root-most first, leaf last
///
/// Each entry is `(path, unescaped title)`.
pub fn path_prefixes(path: &str) -> Vec<(String, String)> {
    let mut prefixes = Vec::new();
    let mut prefix = String::new();
    for segment in split_path(path) {
        prefix.push('/');
        prefix.push_str(&escape_segment(&segment));
        prefixes.push((prefix.clone(), segment));
    }
    prefixes
}

/// Resolves chains to container ids
#[derive(Clone)]
pub struct ChainResolver {
    store: Arc<dyn CatalogStore>,
}

impl ChainResolver {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    /// Return the leaf container id for `chain`, creating missing containers
    ///
    /// `source_id` is recorded as provenance on a newly created leaf.
    pub async fn resolve(
        &self,
        chain: &[String],
        leaf_class: &str,
        source_id: ObjectId,
    ) -> Result<ObjectId, PlacementError> {
        let path = validated_path(chain)?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .store
                .get_or_create_container(&path, leaf_class, source_id)
                .await
            {
                Ok(container) => {
                    report_container(&path, &container, leaf_class);
                    return Ok(container.id);
                }
                Err(StoreError::Conflict(_)) if attempt < MAX_CONFLICT_RETRIES => {
                    // Another writer won the create; re-read on the next pass
                    debug!(path = %path, attempt, "Container create raced, re-reading");
                    tokio::task::yield_now().await;
                }
                Err(e) => return Err(PlacementError::Store(e)),
            }
        }
    }

    /// Resolve `chain` and store `object` under its leaf in one atomic step
    ///
    /// Returns the new object's id. If the object cannot be stored the chain
    /// is not created either.
    pub async fn place(
        &self,
        chain: &[String],
        leaf_class: &str,
        source_id: ObjectId,
        object: CatalogObject,
    ) -> Result<ObjectId, PlacementError> {
        let path = validated_path(chain)?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .store
                .store_in_chain(&path, leaf_class, source_id, object.clone())
                .await
            {
                Ok(placed) => {
                    report_container(&path, &placed.container, leaf_class);
                    return Ok(placed.id);
                }
                Err(StoreError::Conflict(_)) if attempt < MAX_CONFLICT_RETRIES => {
                    debug!(path = %path, attempt, "Placement raced, retrying");
                    tokio::task::yield_now().await;
                }
                Err(e) => return Err(PlacementError::Store(e)),
            }
        }
    }
}

fn validated_path(chain: &[String]) -> Result<String, PlacementError> {
    if chain.is_empty() {
        return Err(PlacementError::InvalidChain("empty chain".to_string()));
    }
    if let Some(pos) = chain.iter().position(|s| s.is_empty()) {
        return Err(PlacementError::InvalidChain(format!(
            "empty segment at position {}",
            pos
        )));
    }
    Ok(chain_path(chain))
}

fn report_container(path: &str, container: &ContainerRef, leaf_class: &str) {
    if container.created {
        debug!(path = %path, id = container.id, class = %leaf_class, "Created container chain");
    } else if container.class != leaf_class {
        warn!(
            path = %path,
            existing_class = %container.class,
            requested_class = %leaf_class,
            "Container exists with a different class, keeping the existing one"
        );
    }
}
