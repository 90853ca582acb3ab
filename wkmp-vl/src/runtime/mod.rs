//! Classification runtimes
//!
//! A runtime runs rule code against one object's surface and asks for
//! placements through the callback it is handed. It never sees the store.

pub mod builtin;
pub mod rules;

pub use builtin::BuiltinLayout;
pub use rules::{RuleError, RuleSetRuntime};

use crate::error::RuntimeFault;
use crate::surface::Surface;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use wkmp_common::config::{LayoutConfig, LayoutKind};
use wkmp_common::ObjectId;

/// One placement asked for by rule code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementRequest {
    /// Fields of the candidate object; anything missing comes from the source
    pub fields: Surface,
    /// Container names from the top level down to the leaf
    pub chain: Vec<String>,
    /// Class of the leaf container if it has to be created
    pub leaf_class: String,
}

impl PlacementRequest {
    pub fn new(fields: Surface, chain: Vec<String>, leaf_class: impl Into<String>) -> Self {
        Self {
            fields,
            chain,
            leaf_class: leaf_class.into(),
        }
    }
}

/// The only channel from rule code back to the catalog
#[async_trait]
pub trait PlaceCallback: Send + Sync {
    /// Place a virtual copy of the current object; returns its id or `0`
    async fn place(&self, request: PlacementRequest) -> ObjectId;

    /// Create the container chain without placing anything; returns the
    /// leaf id or `0`
    async fn add_container_tree(&self, chain: &[String], leaf_class: &str) -> ObjectId;
}

#[async_trait]
pub trait ClassificationRuntime: Send {
    fn name(&self) -> &str;

    /// Classify one object
    ///
    /// Called with exclusive access; the session holds the runtime lock for
    /// the whole call.
    async fn invoke(
        &mut self,
        surface: Surface,
        import_path: &str,
        place: &dyn PlaceCallback,
    ) -> Result<(), RuntimeFault>;
}

/// Build the runtime selected in the bootstrap configuration
pub fn from_config(layout: &LayoutConfig) -> anyhow::Result<Box<dyn ClassificationRuntime>> {
    match layout.kind {
        LayoutKind::Builtin => Ok(Box::new(BuiltinLayout::new())),
        LayoutKind::Rules => {
            let path = layout.rules_file.as_deref().ok_or_else(|| {
                anyhow::anyhow!("layout.kind = \"rules\" requires layout.rules_file")
            })?;
            Ok(Box::new(RuleSetRuntime::from_file(path)?))
        }
    }
}

/// Directories of `location` below `import_path`, top-down
///
/// Empty when the file sits directly in the import path or outside it.
pub fn relative_dirs(location: &str, import_path: &str) -> Vec<String> {
    let Some(dir) = Path::new(location).parent() else {
        return Vec::new();
    };
    let Ok(relative) = dir.strip_prefix(import_path) else {
        return Vec::new();
    };
    relative
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}
