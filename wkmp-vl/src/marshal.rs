//! Object Marshaller
//!
//! Converts catalog objects to the rule surface and back. The surface → object
//! direction is the sandbox boundary: only controlled-vocabulary metadata keys
//! and resource attributes are imported, everything else is dropped.
//!
//! Human-readable text coming back from rule code goes through the injected
//! [`TextConverter`]. The location is never converted so paths survive
//! byte-for-byte.

use crate::error::MarshalError;
use crate::surface::{keys, Surface};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;
use wkmp_common::catalog::vocabulary::{aux_key, online_service};
use wkmp_common::catalog::{
    CatalogObject, MetaField, ObjectData, ObjectFlags, ObjectKind, ResAttr, Resource,
};
use wkmp_common::INVALID_OBJECT_ID;

/// Character-set conversion applied to text imported from rule code
pub trait TextConverter: Send + Sync {
    fn convert(&self, text: &str) -> Result<String, String>;
}

/// Converter for rule runtimes that already produce UTF-8
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8Passthrough;

impl TextConverter for Utf8Passthrough {
    fn convert(&self, text: &str) -> Result<String, String> {
        Ok(text.to_string())
    }
}

/// Two-way converter between catalog objects and rule surfaces
#[derive(Clone)]
pub struct Marshaller {
    converter: Arc<dyn TextConverter>,
}

impl Default for Marshaller {
    fn default() -> Self {
        Self::new(Arc::new(Utf8Passthrough))
    }
}

impl Marshaller {
    pub fn new(converter: Arc<dyn TextConverter>) -> Self {
        Self { converter }
    }

    /// Build the rule-visible surface of an object
    ///
    /// Empty optional fields are omitted.
    pub fn to_surface(&self, obj: &CatalogObject) -> Surface {
        let mut surface = Surface::new();

        surface.set(keys::OBJECT_TYPE, obj.kind().code());
        if obj.id != INVALID_OBJECT_ID {
            surface.set(keys::ID, obj.id);
        }
        if obj.parent_id != INVALID_OBJECT_ID {
            surface.set(keys::PARENT_ID, obj.parent_id);
        }
        if let Some(ref_id) = obj.ref_id {
            surface.set(keys::REF_ID, ref_id);
        }
        if !obj.title.is_empty() {
            surface.set(keys::TITLE, obj.title.as_str());
        }
        if !obj.class.is_empty() {
            surface.set(keys::CLASS, obj.class.as_str());
        }
        if obj.has_location() {
            surface.set_location(&obj.location);
        }

        surface.set(keys::MTIME, obj.mtime);
        surface.set(keys::SIZE_ON_DISK, obj.size_on_disk as i64);
        surface.set(keys::FLAGS, obj.flags.0 as i64);
        surface.set(keys::RESTRICTED, obj.restricted as i64);
        surface.set(
            keys::THEORA,
            obj.flags.contains(ObjectFlags::OGG_THEORA) as i64,
        );
        surface.set(keys::ONLINE_SERVICE, online_service_of(obj));

        for (field, value) in &obj.metadata {
            surface.set_meta(field.key(), value.as_str());
        }
        surface.aux = obj.aux.clone();
        surface.res = encode_resources(&obj.resources);

        match &obj.data {
            ObjectData::Item(item) => {
                if item.track_number > 0 {
                    surface.set(keys::TRACK_NUMBER, item.track_number as i64);
                }
                if item.part_number > 0 {
                    surface.set(keys::PART_NUMBER, item.part_number as i64);
                }
                if !item.mime_type.is_empty() {
                    surface.set(keys::MIME_TYPE, item.mime_type.as_str());
                }
                if !item.service_id.is_empty() {
                    surface.set(keys::SERVICE_ID, item.service_id.as_str());
                }
            }
            ObjectData::Container(cont) => {
                surface.set(keys::UPDATE_ID, cont.update_id as i64);
                surface.set(keys::SEARCHABLE, cont.searchable as i64);
            }
        }

        surface
    }

    /// Rebuild a catalog object from a surface
    ///
    /// Fields missing from the surface are taken from `fallback` when given.
    /// `objectType` is always required; `upnpclass` is required unless a
    /// fallback supplies it.
    pub fn from_surface(
        &self,
        surface: &Surface,
        fallback: Option<&CatalogObject>,
    ) -> Result<CatalogObject, MarshalError> {
        let kind = match surface.get(keys::OBJECT_TYPE) {
            None => return Err(MarshalError::MissingField(keys::OBJECT_TYPE)),
            Some(value) => value
                .as_int()
                .and_then(|code| ObjectKind::from_code(code).ok())
                .ok_or_else(|| MarshalError::InvalidField {
                    field: keys::OBJECT_TYPE,
                    value: value.as_text(),
                })?,
        };

        let mut obj = CatalogObject::new(kind);

        obj.id = id_field(surface, keys::ID)
            .or(fallback.map(|f| f.id))
            .unwrap_or(INVALID_OBJECT_ID);
        obj.parent_id = id_field(surface, keys::PARENT_ID)
            .or(fallback.map(|f| f.parent_id))
            .unwrap_or(INVALID_OBJECT_ID);
        obj.ref_id = id_field(surface, keys::REF_ID).or(fallback.and_then(|f| f.ref_id));

        obj.title = match surface.text(keys::TITLE) {
            Some(title) => self.convert(keys::TITLE, &title)?,
            None => fallback.map(|f| f.title.clone()).unwrap_or_default(),
        };

        obj.class = match surface.text(keys::CLASS) {
            Some(class) => self.convert(keys::CLASS, &class)?,
            None => match fallback {
                Some(f) if !f.class.is_empty() => f.class.clone(),
                _ => return Err(MarshalError::MissingField(keys::CLASS)),
            },
        };

        obj.mtime = match surface.int(keys::MTIME) {
            Some(mtime) if mtime > 0 => mtime,
            _ => fallback.map(|f| f.mtime).unwrap_or(0),
        };
        obj.size_on_disk = match surface.int(keys::SIZE_ON_DISK) {
            Some(size) if size >= 0 => size as u64,
            _ => fallback.map(|f| f.size_on_disk).unwrap_or(0),
        };
        obj.restricted = match surface.int(keys::RESTRICTED) {
            Some(flag) => flag != 0,
            None => fallback.map(|f| f.restricted).unwrap_or(false),
        };
        obj.flags = match surface.int(keys::FLAGS) {
            Some(flags) if flags >= 0 => ObjectFlags(flags as u32),
            _ => fallback.map(|f| f.flags).unwrap_or_default(),
        };
        obj.is_virtual = obj.ref_id.is_some();

        // Location is exempt from character conversion
        obj.location = match (surface.location_path(), fallback) {
            // Untouched lossy text of a non-UTF-8 source path
            (Some(location), Some(f))
                if f.location.to_string_lossy() == location.to_string_lossy() =>
            {
                f.location.clone()
            }
            (Some(location), _) => location,
            (None, f) => f.map(|f| f.location.clone()).unwrap_or_default(),
        };

        self.import_metadata(surface, fallback, &mut obj)?;

        obj.aux = fallback.map(|f| f.aux.clone()).unwrap_or_default();
        for (key, value) in &surface.aux {
            if !value.is_empty() {
                let value = self.convert(key, value)?;
                obj.aux.insert(key.clone(), value);
            }
        }

        let resources = self.decode_resources(&surface.res)?;
        obj.resources = if resources.is_empty() {
            fallback.map(|f| f.resources.clone()).unwrap_or_default()
        } else {
            resources
        };

        let fallback_data = fallback.map(|f| &f.data);
        match &mut obj.data {
            ObjectData::Item(item) => {
                let fallback_item = match fallback_data {
                    Some(ObjectData::Item(fi)) => Some(fi),
                    _ => None,
                };
                item.mime_type = match surface.text(keys::MIME_TYPE) {
                    Some(mime) => self.convert(keys::MIME_TYPE, &mime)?,
                    None => fallback_item.map(|fi| fi.mime_type.clone()).unwrap_or_default(),
                };
                item.service_id = match surface.text(keys::SERVICE_ID) {
                    Some(service) => self.convert(keys::SERVICE_ID, &service)?,
                    None => fallback_item.map(|fi| fi.service_id.clone()).unwrap_or_default(),
                };
                item.track_number = item_number(surface, MetaField::TrackNumber, keys::TRACK_NUMBER)
                    .or(fallback_item.map(|fi| fi.track_number))
                    .unwrap_or(0);
                item.part_number = item_number(surface, MetaField::PartNumber, keys::PART_NUMBER)
                    .or(fallback_item.map(|fi| fi.part_number))
                    .unwrap_or(0);
            }
            ObjectData::Container(cont) => {
                let fallback_cont = match fallback_data {
                    Some(ObjectData::Container(fc)) => Some(fc),
                    _ => None,
                };
                if let Some(update_id) = surface.int(keys::UPDATE_ID).filter(|u| *u >= 0) {
                    cont.update_id = update_id as u32;
                } else if let Some(fc) = fallback_cont {
                    cont.update_id = fc.update_id;
                }
                if let Some(searchable) = surface.int(keys::SEARCHABLE) {
                    cont.searchable = searchable != 0;
                } else if let Some(fc) = fallback_cont {
                    cont.searchable = fc.searchable;
                }
            }
        }

        Ok(obj)
    }

    /// Import allow-listed metadata; unknown keys are dropped silently
    fn import_metadata(
        &self,
        surface: &Surface,
        fallback: Option<&CatalogObject>,
        obj: &mut CatalogObject,
    ) -> Result<(), MarshalError> {
        obj.metadata = fallback.map(|f| f.metadata.clone()).unwrap_or_default();

        for field in MetaField::ALL {
            let Some(value) = surface.meta(field.key()) else {
                continue;
            };
            match field {
                MetaField::TrackNumber | MetaField::PartNumber => {
                    // Kept verbatim; non-positive numbers clear the field
                    match value.trim().parse::<i64>() {
                        Ok(n) if n > 0 => {
                            obj.metadata.insert(field, value.to_string());
                        }
                        _ => {
                            obj.metadata.remove(&field);
                        }
                    }
                }
                _ => {
                    let value = self.convert(field.key(), value)?;
                    obj.metadata.insert(field, value);
                }
            }
        }

        for key in surface.meta.keys() {
            if MetaField::from_key(key).is_none() {
                trace!(key = %key, "Dropping metadata key outside the controlled vocabulary");
            }
        }

        Ok(())
    }

    /// Decode the indexed resource namespace into an ordered resource list
    fn decode_resources(
        &self,
        res: &BTreeMap<String, String>,
    ) -> Result<Vec<Resource>, MarshalError> {
        let handler_suffix = format!(":{}", keys::HANDLER_TYPE);
        let mut handlers: BTreeMap<usize, i64> = BTreeMap::new();
        for (key, value) in res {
            let Some(index) = key.strip_suffix(handler_suffix.as_str()) else {
                continue;
            };
            let (Ok(index), Ok(handler)) = (index.parse::<usize>(), value.trim().parse::<i64>())
            else {
                continue;
            };
            if handler >= 0 {
                handlers.insert(index, handler);
            }
        }

        let mut resources = Vec::with_capacity(handlers.len());
        for (index, handler) in handlers {
            let mut resource = Resource::new(handler);

            for attr in ResAttr::ALL {
                let key = if index == 0 {
                    attr.key().to_string()
                } else {
                    format!("{}-{}", index, attr.key())
                };
                if let Some(value) = res.get(&key).filter(|v| !v.is_empty()) {
                    let value = self.convert(&key, value)?;
                    resource.attributes.insert(attr, value);
                }
            }

            let param_head = format!("{}#", index);
            let option_head = format!("{}%", index);
            for (key, value) in res {
                if let Some(name) = key.strip_prefix(param_head.as_str()) {
                    resource.parameters.insert(name.to_string(), value.clone());
                } else if let Some(name) = key.strip_prefix(option_head.as_str()) {
                    resource.options.insert(name.to_string(), value.clone());
                }
            }

            resources.push(resource);
        }

        Ok(resources)
    }

    fn convert(&self, field: &str, value: &str) -> Result<String, MarshalError> {
        self.converter
            .convert(value)
            .map_err(|reason| MarshalError::Conversion {
                field: field.to_string(),
                reason,
            })
    }
}

/// Encode resources into the indexed flat namespace
pub fn encode_resources(resources: &[Resource]) -> BTreeMap<String, String> {
    let mut res = BTreeMap::new();
    for (index, resource) in resources.iter().enumerate() {
        res.insert(
            format!("{}:{}", index, keys::HANDLER_TYPE),
            resource.handler_type.to_string(),
        );
        for (attr, value) in &resource.attributes {
            let key = if index == 0 {
                attr.key().to_string()
            } else {
                format!("{}-{}", index, attr.key())
            };
            res.insert(key, value.clone());
        }
        for (key, value) in &resource.parameters {
            res.insert(format!("{}#{}", index, key), value.clone());
        }
        for (key, value) in &resource.options {
            res.insert(format!("{}%{}", index, key), value.clone());
        }
    }
    res
}

fn id_field(surface: &Surface, key: &str) -> Option<i64> {
    surface.int(key).filter(|id| *id != INVALID_OBJECT_ID)
}

fn online_service_of(obj: &CatalogObject) -> i64 {
    if !obj.flags.contains(ObjectFlags::ONLINE_SERVICE) {
        return online_service::NONE;
    }
    obj.aux
        .get(aux_key::ONLINE_SERVICE_ID)
        .and_then(|s| s.parse().ok())
        .unwrap_or(online_service::NONE)
}

/// Track or part number from the surface; `Some(0)` clears it
///
/// The metadata entry wins over the top-level field.
fn item_number(surface: &Surface, field: MetaField, key: &str) -> Option<u32> {
    let number = match surface.meta(field.key()) {
        Some(value) => value.trim().parse::<i64>().unwrap_or(0),
        None => surface.int(key)?,
    };
    Some(u32::try_from(number).unwrap_or(0))
}
