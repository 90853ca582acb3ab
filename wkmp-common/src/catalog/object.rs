//! Catalog objects: items and containers

use super::resource::Resource;
use super::vocabulary::MetaField;
use super::{ObjectId, INVALID_OBJECT_ID};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Object kind as seen by rule code (`objectType`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Container,
    Item,
}

impl ObjectKind {
    /// Numeric code published on the rule surface
    pub fn code(self) -> i64 {
        match self {
            ObjectKind::Container => 1,
            ObjectKind::Item => 2,
        }
    }

    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            1 => Ok(ObjectKind::Container),
            2 => Ok(ObjectKind::Item),
            other => Err(Error::UnknownObjectType(other)),
        }
    }

    /// Symbol exposed to rule code
    pub fn symbol(self) -> &'static str {
        match self {
            ObjectKind::Container => "OBJECT_TYPE_CONTAINER",
            ObjectKind::Item => "OBJECT_TYPE_ITEM",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        [ObjectKind::Container, ObjectKind::Item]
            .into_iter()
            .find(|k| k.symbol() == symbol)
    }
}

/// Object flag bit set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectFlags(pub u32);

impl ObjectFlags {
    pub const RESTRICTED: u32 = 0x0000_0001;
    pub const SEARCHABLE: u32 = 0x0000_0002;
    /// Resources are inherited from the referenced object, not duplicated
    pub const USE_RESOURCE_REF: u32 = 0x0000_0004;
    pub const PERSISTENT_CONTAINER: u32 = 0x0000_0008;
    pub const PLAYLIST_REF: u32 = 0x0000_0010;
    pub const PROXY_URL: u32 = 0x0000_0020;
    pub const ONLINE_SERVICE: u32 = 0x0000_0040;
    pub const OGG_THEORA: u32 = 0x0000_0080;

    pub fn contains(self, bit: u32) -> bool {
        self.0 & bit == bit
    }

    pub fn insert(&mut self, bit: u32) {
        self.0 |= bit;
    }

    pub fn remove(&mut self, bit: u32) {
        self.0 &= !bit;
    }
}

/// Item-specific state
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ItemFields {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub track_number: u32,
    #[serde(default)]
    pub part_number: u32,
}

/// Container-specific state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerFields {
    /// Incremented whenever the child set changes
    #[serde(default)]
    pub update_id: u32,
    #[serde(default = "default_searchable")]
    pub searchable: bool,
}

impl Default for ContainerFields {
    fn default() -> Self {
        Self {
            update_id: 0,
            searchable: true,
        }
    }
}

fn default_searchable() -> bool {
    true
}

/// Kind-specific object state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ObjectData {
    Item(ItemFields),
    Container(ContainerFields),
}

/// A catalog object (item or container), physical or virtual
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogObject {
    #[serde(default = "invalid_id")]
    pub id: ObjectId,
    #[serde(default = "invalid_id")]
    pub parent_id: ObjectId,
    /// Physical origin; set only on virtual objects
    #[serde(default)]
    pub ref_id: Option<ObjectId>,
    #[serde(default)]
    pub title: String,
    /// Taxonomy class, e.g. `object.item.audioItem.musicTrack`
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub metadata: BTreeMap<MetaField, String>,
    #[serde(default)]
    pub aux: BTreeMap<String, String>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub flags: ObjectFlags,
    #[serde(default, rename = "virtual")]
    pub is_virtual: bool,
    /// Filesystem path; owned only by physical objects
    #[serde(default)]
    pub location: PathBuf,
    /// Modification time, seconds since the epoch
    #[serde(default)]
    pub mtime: i64,
    #[serde(default)]
    pub size_on_disk: u64,
    #[serde(default)]
    pub restricted: bool,
    #[serde(flatten)]
    pub data: ObjectData,
}

fn invalid_id() -> ObjectId {
    INVALID_OBJECT_ID
}

impl CatalogObject {
    /// Create an empty object of the given kind with no id assigned
    pub fn new(kind: ObjectKind) -> Self {
        let data = match kind {
            ObjectKind::Item => ObjectData::Item(ItemFields::default()),
            ObjectKind::Container => ObjectData::Container(ContainerFields::default()),
        };
        Self {
            id: INVALID_OBJECT_ID,
            parent_id: INVALID_OBJECT_ID,
            ref_id: None,
            title: String::new(),
            class: String::new(),
            metadata: BTreeMap::new(),
            aux: BTreeMap::new(),
            resources: Vec::new(),
            flags: ObjectFlags::default(),
            is_virtual: false,
            location: PathBuf::new(),
            mtime: 0,
            size_on_disk: 0,
            restricted: false,
            data,
        }
    }

    pub fn new_item() -> Self {
        Self::new(ObjectKind::Item)
    }

    pub fn new_container() -> Self {
        Self::new(ObjectKind::Container)
    }

    pub fn kind(&self) -> ObjectKind {
        match self.data {
            ObjectData::Item(_) => ObjectKind::Item,
            ObjectData::Container(_) => ObjectKind::Container,
        }
    }

    pub fn is_item(&self) -> bool {
        matches!(self.data, ObjectData::Item(_))
    }

    pub fn is_container(&self) -> bool {
        matches!(self.data, ObjectData::Container(_))
    }

    pub fn item(&self) -> Option<&ItemFields> {
        match &self.data {
            ObjectData::Item(item) => Some(item),
            ObjectData::Container(_) => None,
        }
    }

    pub fn item_mut(&mut self) -> Option<&mut ItemFields> {
        match &mut self.data {
            ObjectData::Item(item) => Some(item),
            ObjectData::Container(_) => None,
        }
    }

    pub fn container(&self) -> Option<&ContainerFields> {
        match &self.data {
            ObjectData::Container(cont) => Some(cont),
            ObjectData::Item(_) => None,
        }
    }

    pub fn container_mut(&mut self) -> Option<&mut ContainerFields> {
        match &mut self.data {
            ObjectData::Container(cont) => Some(cont),
            ObjectData::Item(_) => None,
        }
    }

    /// Mime type of an item, empty for containers
    pub fn mime_type(&self) -> &str {
        self.item().map(|i| i.mime_type.as_str()).unwrap_or("")
    }

    pub fn meta(&self, field: MetaField) -> Option<&str> {
        self.metadata.get(&field).map(String::as_str)
    }

    pub fn set_meta(&mut self, field: MetaField, value: impl Into<String>) {
        self.metadata.insert(field, value.into());
    }

    pub fn has_location(&self) -> bool {
        !self.location.as_os_str().is_empty()
    }

    /// Check the physical/virtual reference invariant
    pub fn validate(&self) -> Result<()> {
        match (self.is_virtual, self.ref_id) {
            (true, None) => Err(Error::InvalidObject(format!(
                "virtual object '{}' has no reference id",
                self.title
            ))),
            (false, Some(ref_id)) => Err(Error::InvalidObject(format!(
                "physical object '{}' carries reference id {}",
                self.title, ref_id
            ))),
            _ => Ok(()),
        }
    }
}
