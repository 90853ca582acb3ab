//! Test Helper Utilities
//!
//! Shared catalog fixtures and scripted runtimes for wkmp-vl tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wkmp_common::catalog::vocabulary::upnp_class;
use wkmp_common::catalog::{MetaField, Resource, ResAttr};
use wkmp_common::{CatalogObject, ObjectId, ROOT_CONTAINER_ID};
use wkmp_vl::db::{init_catalog_pool, SqliteCatalog};
use wkmp_vl::{
    CatalogStore, ClassificationRuntime, ContainerRef, PlaceCallback, PlacedObject,
    PlacementRequest, RuntimeFault, StoreError, Surface,
};

/// Create a catalog in a temporary directory
///
/// Returns (TempDir, catalog) - TempDir must be kept alive for duration of test
pub async fn create_test_catalog() -> (TempDir, Arc<SqliteCatalog>) {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_catalog_pool(&temp_dir.path().join("catalog.db"), 8)
        .await
        .unwrap();
    (temp_dir, Arc::new(SqliteCatalog::new(pool)))
}

/// Physical music track with the usual tags
pub fn music_track(artist: &str, album: &str, title: &str, date: &str) -> CatalogObject {
    let mut obj = CatalogObject::new_item();
    obj.parent_id = ROOT_CONTAINER_ID;
    obj.title = format!("{}.mp3", title.to_lowercase());
    obj.class = upnp_class::MUSIC_TRACK.to_string();
    obj.location = PathBuf::from(format!("/music/{}/{}/{}.mp3", artist, album, title));
    obj.mtime = 1_613_606_400;
    obj.size_on_disk = 4096;
    obj.set_meta(MetaField::Artist, artist);
    obj.set_meta(MetaField::Album, album);
    obj.set_meta(MetaField::Title, title);
    obj.set_meta(MetaField::Date, date);
    obj.resources.push(
        Resource::new(0)
            .with_attribute(ResAttr::ProtocolInfo, "http-get:*:audio/mpeg:*")
            .with_attribute(ResAttr::Size, "4096"),
    );
    if let Some(item) = obj.item_mut() {
        item.mime_type = "audio/mpeg".to_string();
    }
    obj
}

/// Store a physical object and hand it back as the import pipeline would
pub async fn store_physical(catalog: &SqliteCatalog, mut obj: CatalogObject) -> Arc<CatalogObject> {
    obj.id = catalog.assign_and_store(obj.clone()).await.unwrap();
    Arc::new(obj)
}

pub fn chain(segments: &[&str]) -> Vec<String> {
    segments.iter().map(|s| s.to_string()).collect()
}

/// One scripted placement
#[derive(Debug, Clone)]
pub struct Step {
    pub chain: Vec<String>,
    pub class: String,
    pub title: Option<String>,
}

impl Step {
    pub fn new(segments: &[&str]) -> Self {
        Self {
            chain: chain(segments),
            class: upnp_class::CONTAINER.to_string(),
            title: None,
        }
    }

    pub fn class(mut self, class: &str) -> Self {
        self.class = class.to_string();
        self
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }
}

/// What a scripted runtime does before a given step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Fault,
    Panic,
    /// Cancel the shared shutdown token, then keep placing
    Shutdown,
}

/// Runtime that issues a fixed list of placements
pub struct ScriptedRuntime {
    steps: Vec<Step>,
    interrupt: Option<(usize, Interrupt)>,
    shutdown: Option<CancellationToken>,
    pub results: Arc<Mutex<Vec<ObjectId>>>,
}

impl ScriptedRuntime {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            interrupt: None,
            shutdown: None,
            results: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn interrupt_before(mut self, step: usize, interrupt: Interrupt) -> Self {
        self.interrupt = Some((step, interrupt));
        self
    }

    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    pub fn results_handle(&self) -> Arc<Mutex<Vec<ObjectId>>> {
        self.results.clone()
    }
}

#[async_trait]
impl ClassificationRuntime for ScriptedRuntime {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn invoke(
        &mut self,
        surface: Surface,
        _import_path: &str,
        place: &dyn PlaceCallback,
    ) -> Result<(), RuntimeFault> {
        for (index, step) in self.steps.iter().enumerate() {
            match self.interrupt {
                Some((at, Interrupt::Fault)) if at == index => {
                    return Err(RuntimeFault::rule("scripted", "unhandled condition in rule code"));
                }
                Some((at, Interrupt::Panic)) if at == index => {
                    panic!("rule code blew up");
                }
                Some((at, Interrupt::Shutdown)) if at == index => {
                    if let Some(token) = &self.shutdown {
                        token.cancel();
                    }
                }
                _ => {}
            }

            let mut fields = surface.clone();
            if let Some(title) = &step.title {
                fields.set_title(title.as_str());
            }
            let id = place
                .place(PlacementRequest::new(fields, step.chain.clone(), step.class.as_str()))
                .await;
            self.results.lock().unwrap().push(id);
        }
        Ok(())
    }
}

/// Runtime that records how many invocations overlap
pub struct OverlapCounter {
    pub active: Arc<AtomicUsize>,
    pub max_active: Arc<AtomicUsize>,
}

impl OverlapCounter {
    pub fn new() -> Self {
        Self {
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl ClassificationRuntime for OverlapCounter {
    fn name(&self) -> &str {
        "overlap"
    }

    async fn invoke(
        &mut self,
        surface: Surface,
        _import_path: &str,
        place: &dyn PlaceCallback,
    ) -> Result<(), RuntimeFault> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(5)).await;
        place
            .place(PlacementRequest::new(surface, chain(&["Overlap"]), upnp_class::CONTAINER))
            .await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Store wrapper that reports persistence as unavailable for one path
pub struct FlakyStore {
    pub inner: Arc<SqliteCatalog>,
    pub broken_path: String,
}

#[async_trait]
impl CatalogStore for FlakyStore {
    async fn get_or_create_container(
        &self,
        path: &str,
        class: &str,
        hint_source: ObjectId,
    ) -> Result<ContainerRef, StoreError> {
        if path == self.broken_path {
            return Err(StoreError::Unavailable("disk detached".to_string()));
        }
        self.inner.get_or_create_container(path, class, hint_source).await
    }

    async fn assign_and_store(&self, object: CatalogObject) -> Result<ObjectId, StoreError> {
        self.inner.assign_and_store(object).await
    }

    async fn store_in_chain(
        &self,
        path: &str,
        class: &str,
        hint_source: ObjectId,
        object: CatalogObject,
    ) -> Result<PlacedObject, StoreError> {
        if path == self.broken_path {
            return Err(StoreError::Unavailable("disk detached".to_string()));
        }
        self.inner.store_in_chain(path, class, hint_source, object).await
    }

    async fn object_exists(&self, id: ObjectId) -> Result<bool, StoreError> {
        self.inner.object_exists(id).await
    }
}

/// Store wrapper that loses the first `conflicts` creation races
pub struct RacyStore {
    pub inner: Arc<SqliteCatalog>,
    pub conflicts: AtomicUsize,
}

#[async_trait]
impl CatalogStore for RacyStore {
    async fn get_or_create_container(
        &self,
        path: &str,
        class: &str,
        hint_source: ObjectId,
    ) -> Result<ContainerRef, StoreError> {
        self.lose_race(path)?;
        self.inner.get_or_create_container(path, class, hint_source).await
    }

    async fn assign_and_store(&self, object: CatalogObject) -> Result<ObjectId, StoreError> {
        self.inner.assign_and_store(object).await
    }

    async fn store_in_chain(
        &self,
        path: &str,
        class: &str,
        hint_source: ObjectId,
        object: CatalogObject,
    ) -> Result<PlacedObject, StoreError> {
        self.lose_race(path)?;
        self.inner.store_in_chain(path, class, hint_source, object).await
    }

    async fn object_exists(&self, id: ObjectId) -> Result<bool, StoreError> {
        self.inner.object_exists(id).await
    }
}

impl RacyStore {
    fn lose_race(&self, path: &str) -> Result<(), StoreError> {
        let lost = self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if lost {
            return Err(StoreError::Conflict(path.to_string()));
        }
        Ok(())
    }
}

/// Store wrapper that deletes the source object right before storing a placement,
/// after the bridge has confirmed it exists
pub struct RemovingStore {
    pub inner: Arc<SqliteCatalog>,
    pub removals: AtomicUsize,
}

#[async_trait]
impl CatalogStore for RemovingStore {
    async fn get_or_create_container(
        &self,
        path: &str,
        class: &str,
        hint_source: ObjectId,
    ) -> Result<ContainerRef, StoreError> {
        self.inner.get_or_create_container(path, class, hint_source).await
    }

    async fn assign_and_store(&self, object: CatalogObject) -> Result<ObjectId, StoreError> {
        self.inner.assign_and_store(object).await
    }

    async fn store_in_chain(
        &self,
        path: &str,
        class: &str,
        hint_source: ObjectId,
        object: CatalogObject,
    ) -> Result<PlacedObject, StoreError> {
        if let Some(source_id) = object.ref_id {
            if self.inner.remove_object(source_id).await? {
                self.removals.fetch_add(1, Ordering::SeqCst);
            }
        }
        self.inner.store_in_chain(path, class, hint_source, object).await
    }

    async fn object_exists(&self, id: ObjectId) -> Result<bool, StoreError> {
        self.inner.object_exists(id).await
    }
}
