//! Callback Bridge
//!
//! The capability a session hands to its runtime. It is bound to one source
//! object through a weak handle and is disarmed when the session ends.
//! Container-only requests create the chain and record the source as its
//! provenance without storing a copy.
//! Rule code only ever sees an id or `0`.

use super::factory::VirtualObjectFactory;
use super::resolver::{chain_path, ChainResolver};
use crate::error::{PlacementError, StoreError};
use crate::runtime::{PlaceCallback, PlacementRequest};
use crate::store::CatalogStore;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use wkmp_common::{CatalogObject, ObjectId, INVALID_OBJECT_ID};

/// Value rule code receives when a placement produced nothing
pub const PLACEMENT_FAILED: ObjectId = 0;

pub struct CallbackBridge {
    session_id: Uuid,
    source: Weak<CatalogObject>,
    source_location: String,
    resolver: ChainResolver,
    factory: VirtualObjectFactory,
    store: Arc<dyn CatalogStore>,
    shutdown: CancellationToken,
    armed: AtomicBool,
    placed: AtomicUsize,
}

impl CallbackBridge {
    pub fn new(
        session_id: Uuid,
        source: &Arc<CatalogObject>,
        resolver: ChainResolver,
        factory: VirtualObjectFactory,
        store: Arc<dyn CatalogStore>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            session_id,
            source: Arc::downgrade(source),
            source_location: source.location.display().to_string(),
            resolver,
            factory,
            store,
            shutdown,
            armed: AtomicBool::new(true),
            placed: AtomicUsize::new(0),
        }
    }

    /// Number of virtual objects stored through this bridge
    pub fn placements(&self) -> usize {
        self.placed.load(Ordering::SeqCst)
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    /// Stop accepting placements; later calls return `0`
    pub fn disarm(&self) {
        if self.armed.swap(false, Ordering::SeqCst) {
            debug!(session_id = %self.session_id, "Callback bridge torn down");
        }
    }

    /// Disarms the bridge when dropped
    pub fn guard(&self) -> BridgeGuard<'_> {
        BridgeGuard { bridge: self }
    }

    async fn try_place(&self, request: &PlacementRequest) -> Result<ObjectId, PlacementError> {
        if !self.is_armed() {
            return Err(PlacementError::BridgeClosed);
        }
        if self.shutdown.is_cancelled() {
            return Err(PlacementError::Shutdown);
        }

        // Never hold the source longer than this call
        let source = self.source.upgrade().ok_or(PlacementError::SourceExpired)?;
        if !self.store.object_exists(source.id).await? {
            return Err(PlacementError::SourceMissing(source.id));
        }

        let object = self
            .factory
            .materialize(&source, &request.fields, INVALID_OBJECT_ID)?;

        if self.shutdown.is_cancelled() {
            return Err(PlacementError::Shutdown);
        }

        // Chain and object are stored together, so a source removed after the
        // check above leaves nothing behind
        self.resolver
            .place(&request.chain, &request.leaf_class, source.id, object)
            .await
            .map_err(|e| match e {
                PlacementError::Store(StoreError::MissingReference(id)) => {
                    PlacementError::SourceMissing(id)
                }
                other => other,
            })
    }

    async fn try_add_container_tree(
        &self,
        chain: &[String],
        leaf_class: &str,
    ) -> Result<ObjectId, PlacementError> {
        if !self.is_armed() {
            return Err(PlacementError::BridgeClosed);
        }
        if self.shutdown.is_cancelled() {
            return Err(PlacementError::Shutdown);
        }

        let source_id = self.source.upgrade().ok_or(PlacementError::SourceExpired)?.id;
        self.resolver.resolve(chain, leaf_class, source_id).await
    }

    /// Log why a request produced nothing; rule code gets `0`
    fn refuse(&self, path: &str, e: PlacementError) -> ObjectId {
        match e {
            e if e.is_shutdown() => {
                warn!(
                    session_id = %self.session_id,
                    location = %self.source_location,
                    path = %path,
                    "Aborting placement due to shutdown"
                );
            }
            PlacementError::BridgeClosed => {
                warn!(
                    session_id = %self.session_id,
                    path = %path,
                    "Placement requested after its session ended"
                );
            }
            e @ (PlacementError::SourceExpired | PlacementError::SourceMissing(_)) => {
                info!(
                    session_id = %self.session_id,
                    location = %self.source_location,
                    path = %path,
                    reason = %e,
                    "Source object removed during classification, placement skipped"
                );
            }
            PlacementError::Marshal(e) => {
                warn!(
                    session_id = %self.session_id,
                    location = %self.source_location,
                    path = %path,
                    error = %e,
                    "Placement produced no object"
                );
            }
            e => {
                error!(
                    session_id = %self.session_id,
                    location = %self.source_location,
                    path = %path,
                    error = %e,
                    "Failed to place virtual object"
                );
            }
        }
        PLACEMENT_FAILED
    }
}

#[async_trait]
impl PlaceCallback for CallbackBridge {
    async fn place(&self, request: PlacementRequest) -> ObjectId {
        let path = chain_path(&request.chain);

        match self.try_place(&request).await {
            Ok(id) => {
                self.placed.fetch_add(1, Ordering::SeqCst);
                debug!(session_id = %self.session_id, id, path = %path, "Placed virtual object");
                id
            }
            Err(e) => self.refuse(&path, e),
        }
    }

    async fn add_container_tree(&self, chain: &[String], leaf_class: &str) -> ObjectId {
        let path = chain_path(chain);

        match self.try_add_container_tree(chain, leaf_class).await {
            Ok(id) => {
                debug!(session_id = %self.session_id, id, path = %path, "Container tree added");
                id
            }
            Err(e) => self.refuse(&path, e),
        }
    }
}

pub struct BridgeGuard<'a> {
    bridge: &'a CallbackBridge,
}

impl Drop for BridgeGuard<'_> {
    fn drop(&mut self) {
        self.bridge.disarm();
    }
}
