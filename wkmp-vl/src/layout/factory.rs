//! Virtual Object Factory
//!
//! Builds the virtual copy of a physical object for one placement: the
//! source's fields form the baseline, fields the rule code put on the
//! request surface override them.

use crate::error::MarshalError;
use crate::marshal::Marshaller;
use crate::surface::{keys, Surface};
use tracing::warn;
use wkmp_common::catalog::ObjectFlags;
use wkmp_common::{CatalogObject, ObjectId, INVALID_OBJECT_ID};

#[derive(Clone, Default)]
pub struct VirtualObjectFactory {
    marshaller: Marshaller,
}

impl VirtualObjectFactory {
    pub fn new(marshaller: Marshaller) -> Self {
        Self { marshaller }
    }

    /// Build an unsaved virtual object referencing `source` under `parent_id`
    pub fn materialize(
        &self,
        source: &CatalogObject,
        fields: &Surface,
        parent_id: ObjectId,
    ) -> Result<CatalogObject, MarshalError> {
        let source_kind = source.kind();
        let mut fields = fields.clone();

        match fields.int(keys::OBJECT_TYPE) {
            Some(code) if code == source_kind.code() => {}
            None if fields.get(keys::OBJECT_TYPE).is_none() => {
                fields.set(keys::OBJECT_TYPE, source_kind.code());
            }
            requested => {
                warn!(
                    source_id = source.id,
                    requested = ?requested,
                    kept = source_kind.code(),
                    "Placement requested a different object type, keeping the source kind"
                );
                fields.set(keys::OBJECT_TYPE, source_kind.code());
            }
        }

        // Identity fields always come from the placement, never from rule code
        fields.remove(keys::ID);
        fields.remove(keys::PARENT_ID);
        fields.remove(keys::REF_ID);

        let mut obj = self.marshaller.from_surface(&fields, Some(source))?;

        obj.id = INVALID_OBJECT_ID;
        obj.parent_id = parent_id;
        obj.ref_id = Some(source.id);
        obj.is_virtual = true;
        obj.flags.insert(ObjectFlags::USE_RESOURCE_REF);

        Ok(obj)
    }
}
