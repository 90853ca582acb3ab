//! Rule surface: the flat key/value view of a catalog object that rule code
//! is allowed to see and edit
//!
//! Top-level scalars live in `fields`; metadata, auxiliary data and resources
//! are flat string maps. Resources use an indexed key namespace:
//!
//! | key                | meaning                                    |
//! |--------------------|--------------------------------------------|
//! | `<i>:handlerType`  | handler type of resource `i`               |
//! | `<attr>`           | attribute of resource 0                    |
//! | `<i>-<attr>`       | attribute of resource `i` (`i > 0`)        |
//! | `<i>#<key>`        | parameter of resource `i`                  |
//! | `<i>%<key>`        | option of resource `i`                     |

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Top-level surface keys
pub mod keys {
    pub const OBJECT_TYPE: &str = "objectType";
    pub const ID: &str = "id";
    pub const PARENT_ID: &str = "parentID";
    pub const REF_ID: &str = "refID";
    pub const TITLE: &str = "title";
    pub const CLASS: &str = "upnpclass";
    pub const LOCATION: &str = "location";
    pub const MTIME: &str = "mtime";
    pub const SIZE_ON_DISK: &str = "sizeOnDisk";
    pub const FLAGS: &str = "flags";
    pub const RESTRICTED: &str = "restricted";
    /// Read-only, derived from the OGG_THEORA flag
    pub const THEORA: &str = "theora";
    /// Read-only, derived from the online service aux entry
    pub const ONLINE_SERVICE: &str = "onlineservice";
    pub const MIME_TYPE: &str = "mimetype";
    pub const SERVICE_ID: &str = "serviceID";
    pub const UPDATE_ID: &str = "updateID";
    pub const SEARCHABLE: &str = "searchable";
    /// Item track number; the `upnp:originalTrackNumber` metadata entry wins when present
    pub const TRACK_NUMBER: &str = "trackNumber";
    /// Item part number; the `upnp:episodeSeason` metadata entry wins when present
    pub const PART_NUMBER: &str = "partNumber";

    /// Suffix of the handler type key of an indexed resource
    pub const HANDLER_TYPE: &str = "handlerType";
}

/// A scalar value on the surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SurfaceValue {
    Int(i64),
    Text(String),
}

impl SurfaceValue {
    /// Integer view; numeric text is accepted the way rule languages coerce it
    pub fn as_int(&self) -> Option<i64> {
        match self {
            SurfaceValue::Int(i) => Some(*i),
            SurfaceValue::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            SurfaceValue::Int(i) => i.to_string(),
            SurfaceValue::Text(s) => s.clone(),
        }
    }
}

impl From<i64> for SurfaceValue {
    fn from(value: i64) -> Self {
        SurfaceValue::Int(value)
    }
}

impl From<&str> for SurfaceValue {
    fn from(value: &str) -> Self {
        SurfaceValue::Text(value.to_string())
    }
}

impl From<String> for SurfaceValue {
    fn from(value: String) -> Self {
        SurfaceValue::Text(value)
    }
}

/// Flat object view handed to rule code
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Surface {
    #[serde(default)]
    pub fields: BTreeMap<String, SurfaceValue>,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
    #[serde(default)]
    pub aux: BTreeMap<String, String>,
    #[serde(default)]
    pub res: BTreeMap<String, String>,
    /// Native location when it is not valid UTF-8; `fields` holds its lossy text
    #[serde(skip)]
    native_location: Option<PathBuf>,
}

impl Surface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: impl Into<SurfaceValue>) {
        self.fields.insert(key.to_string(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<SurfaceValue> {
        self.fields.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&SurfaceValue> {
        self.fields.get(key)
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        self.fields.get(key).and_then(SurfaceValue::as_int)
    }

    /// Text value of a field; empty strings count as absent
    pub fn text(&self, key: &str) -> Option<String> {
        self.fields
            .get(key)
            .map(SurfaceValue::as_text)
            .filter(|s| !s.is_empty())
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.meta.get(key).map(String::as_str).filter(|s| !s.is_empty())
    }

    pub fn set_meta(&mut self, key: &str, value: impl Into<String>) {
        self.meta.insert(key.to_string(), value.into());
    }

    pub fn aux(&self, key: &str) -> Option<&str> {
        self.aux.get(key).map(String::as_str).filter(|s| !s.is_empty())
    }

    pub fn title(&self) -> String {
        self.text(keys::TITLE).unwrap_or_default()
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.set(keys::TITLE, SurfaceValue::Text(title.into()));
    }

    pub fn mime_type(&self) -> String {
        self.text(keys::MIME_TYPE).unwrap_or_default()
    }

    pub fn location(&self) -> String {
        self.text(keys::LOCATION).unwrap_or_default()
    }

    /// Set the location text, keeping the native path if the text is lossy
    pub fn set_location(&mut self, location: &Path) {
        let text = location.to_string_lossy();
        self.native_location = match &text {
            Cow::Borrowed(_) => None,
            Cow::Owned(_) => Some(location.to_path_buf()),
        };
        self.set(keys::LOCATION, text.into_owned());
    }

    /// Location as a path
    ///
    /// While the text still equals the lossy rendering of a non-UTF-8 native
    /// path, the native path is returned unchanged.
    pub fn location_path(&self) -> Option<PathBuf> {
        let text = self.text(keys::LOCATION)?;
        match &self.native_location {
            Some(native) if native.to_string_lossy() == text.as_str() => Some(native.clone()),
            _ => Some(PathBuf::from(text)),
        }
    }
}
