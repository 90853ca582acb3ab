//! SQLite-backed catalog store
//!
//! Containers created by the resolver are keyed by their escaped chain path
//! (`objects.path`, UNIQUE). Every prefix of a path is upserted with
//! `ON CONFLICT(path) DO NOTHING` and re-read inside one transaction, so
//! concurrent get-or-create calls converge on one row per path.

use crate::error::StoreError;
use crate::layout::resolver::path_prefixes;
use crate::store::{CatalogStore, ContainerRef, PlacedObject};
use async_trait::async_trait;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use wkmp_common::catalog::vocabulary::upnp_class;
use wkmp_common::catalog::{
    CatalogObject, ContainerFields, ItemFields, MetaField, ObjectData, ObjectFlags, ObjectKind,
    Resource,
};
use wkmp_common::{ObjectId, ROOT_CONTAINER_ID};

/// Catalog store over a shared SQLite pool
#[derive(Clone)]
pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Load a full object (metadata, aux and resources included)
    pub async fn load_object(&self, id: ObjectId) -> Result<Option<CatalogObject>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, parent_id, ref_id, object_type, title, upnp_class, location,
                   mtime, size_on_disk, flags, restricted, is_virtual,
                   mime_type, service_id, track_number, part_number, update_id, searchable
            FROM objects WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let kind = ObjectKind::from_code(row.get::<i64, _>("object_type"))?;
        let mut obj = CatalogObject::new(kind);
        obj.id = row.get("id");
        obj.parent_id = row.get("parent_id");
        obj.ref_id = row.get("ref_id");
        obj.title = row.get("title");
        obj.class = row.get("upnp_class");
        obj.location = row
            .get::<Option<Vec<u8>>, _>("location")
            .map(decode_location)
            .unwrap_or_default();
        obj.mtime = row.get("mtime");
        obj.size_on_disk = row.get::<i64, _>("size_on_disk").max(0) as u64;
        obj.flags = ObjectFlags(row.get::<i64, _>("flags") as u32);
        obj.restricted = row.get::<i64, _>("restricted") != 0;
        obj.is_virtual = row.get::<i64, _>("is_virtual") != 0;
        obj.data = match kind {
            ObjectKind::Item => ObjectData::Item(ItemFields {
                mime_type: row.get::<Option<String>, _>("mime_type").unwrap_or_default(),
                service_id: row.get::<Option<String>, _>("service_id").unwrap_or_default(),
                track_number: row.get::<i64, _>("track_number").max(0) as u32,
                part_number: row.get::<i64, _>("part_number").max(0) as u32,
            }),
            ObjectKind::Container => ObjectData::Container(ContainerFields {
                update_id: row.get::<i64, _>("update_id").max(0) as u32,
                searchable: row.get::<i64, _>("searchable") != 0,
            }),
        };

        let meta_rows = sqlx::query("SELECT field, value FROM metadata WHERE object_id = ?")
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        for meta in meta_rows {
            let key: String = meta.get("field");
            match MetaField::from_key(&key) {
                Some(field) => {
                    obj.metadata.insert(field, meta.get("value"));
                }
                None => {
                    warn!(object_id = id, key = %key, "Ignoring stored metadata with unknown key")
                }
            }
        }

        let aux_rows = sqlx::query("SELECT key, value FROM aux_data WHERE object_id = ?")
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        for aux in aux_rows {
            obj.aux.insert(aux.get("key"), aux.get("value"));
        }

        let res_rows = sqlx::query(
            r#"
            SELECT handler_type, attributes, parameters, options
            FROM resources WHERE object_id = ? ORDER BY res_index
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        for res in res_rows {
            let mut resource = Resource::new(res.get("handler_type"));
            resource.attributes = decode_json_map(res.get("attributes"))?;
            resource.parameters = decode_json_map(res.get("parameters"))?;
            resource.options = decode_json_map(res.get("options"))?;
            obj.resources.push(resource);
        }

        Ok(Some(obj))
    }

    /// Ids of the direct children of a container, in creation order
    pub async fn children_of(&self, parent_id: ObjectId) -> Result<Vec<ObjectId>, StoreError> {
        let rows =
            sqlx::query("SELECT id FROM objects WHERE parent_id = ? AND id != ? ORDER BY id")
                .bind(parent_id)
                .bind(ROOT_CONTAINER_ID)
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(|r| r.get("id")).collect())
    }

    /// Id of the container at an escaped chain path
    pub async fn container_by_path(&self, path: &str) -> Result<Option<ObjectId>, StoreError> {
        let row = sqlx::query("SELECT id FROM objects WHERE path = ?")
            .bind(path)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(|r| r.get("id")))
    }

    /// Number of container rows at a path (at most one while the schema holds)
    pub async fn count_containers_with_path(&self, path: &str) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM objects WHERE path = ?")
            .bind(path)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(count)
    }

    /// Virtual objects referencing a physical object
    pub async fn references_to(&self, source_id: ObjectId) -> Result<Vec<ObjectId>, StoreError> {
        let rows = sqlx::query("SELECT id FROM objects WHERE ref_id = ? ORDER BY id")
            .bind(source_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(|r| r.get("id")).collect())
    }

    /// Remove an object; virtual references to it go with it
    pub async fn remove_object(&self, id: ObjectId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM objects WHERE id = ? AND id != ?")
            .bind(id)
            .bind(ROOT_CONTAINER_ID)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl CatalogStore for SqliteCatalog {
    async fn get_or_create_container(
        &self,
        path: &str,
        class: &str,
        hint_source: ObjectId,
    ) -> Result<ContainerRef, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let leaf = create_chain(&mut tx, path, class, hint_source).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(leaf)
    }

    async fn assign_and_store(&self, object: CatalogObject) -> Result<ObjectId, StoreError> {
        object.validate()?;

        // Open with a write; a read first would make the lock upgrade fail on a
        // stale WAL snapshot
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        bump_update_id(&mut tx, object.parent_id).await?;
        let id = insert_object(&mut tx, &object).await?;
        tx.commit().await.map_err(map_sqlx_error)?;

        debug!(
            id,
            parent_id = object.parent_id,
            ref_id = ?object.ref_id,
            title = %object.title,
            "Stored object"
        );
        Ok(id)
    }

    async fn store_in_chain(
        &self,
        path: &str,
        class: &str,
        hint_source: ObjectId,
        mut object: CatalogObject,
    ) -> Result<PlacedObject, StoreError> {
        object.validate()?;

        // Dropping the transaction on error rolls back the chain as well
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let container = create_chain(&mut tx, path, class, hint_source).await?;
        object.parent_id = container.id;
        bump_update_id(&mut tx, container.id).await?;
        let id = insert_object(&mut tx, &object).await?;
        tx.commit().await.map_err(map_sqlx_error)?;

        debug!(
            id,
            parent_id = container.id,
            ref_id = ?object.ref_id,
            path = %path,
            "Stored object under chain"
        );
        Ok(PlacedObject { container, id })
    }

    async fn object_exists(&self, id: ObjectId) -> Result<bool, StoreError> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM objects WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(found.is_some())
    }
}

/// Upsert every prefix of `path` inside `tx` and return the leaf
async fn create_chain(
    tx: &mut Transaction<'_, Sqlite>,
    path: &str,
    class: &str,
    hint_source: ObjectId,
) -> Result<ContainerRef, StoreError> {
    let prefixes = path_prefixes(path);
    let leaf_index = match prefixes.len() {
        0 => {
            return Err(wkmp_common::Error::InvalidObject(format!(
                "'{}' names no container",
                path
            ))
            .into())
        }
        n => n - 1,
    };

    let now = chrono::Utc::now().timestamp();
    let mut parent_id = ROOT_CONTAINER_ID;
    let mut leaf = None;

    for (index, (prefix, title)) in prefixes.iter().enumerate() {
        let is_leaf = index == leaf_index;
        let prefix_class = if is_leaf { class } else { upnp_class::CONTAINER };
        let provenance = if is_leaf { Some(hint_source) } else { None };

        let inserted = sqlx::query(
            r#"
            INSERT INTO objects (parent_id, object_type, title, upnp_class, path,
                                 flags, provenance_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(path) DO NOTHING
            "#,
        )
        .bind(parent_id)
        .bind(ObjectKind::Container.code())
        .bind(title)
        .bind(prefix_class)
        .bind(prefix)
        .bind(ObjectFlags::SEARCHABLE as i64)
        .bind(provenance)
        .bind(now)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?
        .rows_affected()
            == 1;

        let row = sqlx::query("SELECT id, upnp_class FROM objects WHERE path = ?")
            .bind(prefix)
            .fetch_optional(&mut **tx)
            .await
            .map_err(map_sqlx_error)?
            .ok_or_else(|| StoreError::Conflict(prefix.clone()))?;
        let id: ObjectId = row.get("id");

        if inserted {
            bump_update_id(tx, parent_id).await?;
            debug!(path = %prefix, id, parent_id, "Created container");
        }

        if is_leaf {
            leaf = Some(ContainerRef {
                id,
                class: row.get("upnp_class"),
                created: inserted,
            });
        }
        parent_id = id;
    }

    leaf.ok_or_else(|| StoreError::Conflict(path.to_string()))
}

/// Insert `object` with its metadata, aux data and resources
///
/// `tx` must already hold the write lock, so the reference check and the
/// insert see the same catalog state.
async fn insert_object(
    tx: &mut Transaction<'_, Sqlite>,
    object: &CatalogObject,
) -> Result<ObjectId, StoreError> {
    if let Some(ref_id) = object.ref_id {
        let target: Option<i64> = sqlx::query_scalar("SELECT is_virtual FROM objects WHERE id = ?")
            .bind(ref_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;
        match target {
            None => return Err(StoreError::MissingReference(ref_id)),
            Some(v) if v != 0 => {
                return Err(wkmp_common::Error::InvalidObject(format!(
                    "reference target {} is itself virtual",
                    ref_id
                ))
                .into())
            }
            Some(_) => {}
        }
    }

    let (mime_type, service_id, track_number, part_number, update_id, searchable) =
        match &object.data {
            ObjectData::Item(item) => (
                Some(item.mime_type.as_str()),
                Some(item.service_id.as_str()),
                item.track_number as i64,
                item.part_number as i64,
                0i64,
                true,
            ),
            ObjectData::Container(cont) => {
                (None, None, 0, 0, cont.update_id as i64, cont.searchable)
            }
        };
    let location = if object.has_location() {
        Some(encode_location(&object.location))
    } else {
        None
    };

    let result = sqlx::query(
        r#"
        INSERT INTO objects (parent_id, ref_id, object_type, title, upnp_class, location,
                             mtime, size_on_disk, flags, restricted, is_virtual,
                             mime_type, service_id, track_number, part_number,
                             update_id, searchable, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(object.parent_id)
    .bind(object.ref_id)
    .bind(object.kind().code())
    .bind(&object.title)
    .bind(&object.class)
    .bind(location)
    .bind(object.mtime)
    .bind(object.size_on_disk as i64)
    .bind(object.flags.0 as i64)
    .bind(object.restricted)
    .bind(object.is_virtual)
    .bind(mime_type)
    .bind(service_id)
    .bind(track_number)
    .bind(part_number)
    .bind(update_id)
    .bind(searchable)
    .bind(chrono::Utc::now().timestamp())
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        let dangling = matches!(&e, sqlx::Error::Database(db) if db.is_foreign_key_violation());
        match object.ref_id {
            Some(ref_id) if dangling => StoreError::MissingReference(ref_id),
            _ => map_sqlx_error(e),
        }
    })?;
    let id = result.last_insert_rowid();

    for (field, value) in &object.metadata {
        sqlx::query("INSERT INTO metadata (object_id, field, value) VALUES (?, ?, ?)")
            .bind(id)
            .bind(field.key())
            .bind(value)
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;
    }

    for (key, value) in &object.aux {
        sqlx::query("INSERT INTO aux_data (object_id, key, value) VALUES (?, ?, ?)")
            .bind(id)
            .bind(key)
            .bind(value)
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;
    }

    for (index, resource) in object.resources.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO resources
                (object_id, res_index, handler_type, attributes, parameters, options)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(index as i64)
        .bind(resource.handler_type)
        .bind(encode_json_map(&resource.attributes)?)
        .bind(encode_json_map(&resource.parameters)?)
        .bind(encode_json_map(&resource.options)?)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;
    }

    Ok(id)
}

/// Raw path bytes, so locations that are not UTF-8 survive storage
#[cfg(unix)]
fn encode_location(location: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    location.as_os_str().as_bytes().to_vec()
}

#[cfg(not(unix))]
fn encode_location(location: &Path) -> Vec<u8> {
    location.to_string_lossy().into_owned().into_bytes()
}

#[cfg(unix)]
fn decode_location(bytes: Vec<u8>) -> PathBuf {
    use std::os::unix::ffi::OsStringExt;
    PathBuf::from(std::ffi::OsString::from_vec(bytes))
}

#[cfg(not(unix))]
fn decode_location(bytes: Vec<u8>) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(&bytes).into_owned())
}

async fn bump_update_id(
    tx: &mut Transaction<'_, Sqlite>,
    container_id: ObjectId,
) -> Result<(), StoreError> {
    sqlx::query("UPDATE objects SET update_id = update_id + 1 WHERE id = ? AND object_type = ?")
        .bind(container_id)
        .bind(ObjectKind::Container.code())
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;
    Ok(())
}

fn encode_json_map<K: serde::Serialize + Ord>(
    map: &BTreeMap<K, String>,
) -> Result<String, StoreError> {
    serde_json::to_string(map)
        .map_err(|e| StoreError::Catalog(wkmp_common::Error::InvalidObject(e.to_string())))
}

fn decode_json_map<K: serde::de::DeserializeOwned + Ord>(
    text: String,
) -> Result<BTreeMap<K, String>, StoreError> {
    serde_json::from_str(&text)
        .map_err(|e| StoreError::Catalog(wkmp_common::Error::InvalidObject(e.to_string())))
}

/// Sort sqlx failures into retryable, unavailable and hard errors
fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) => {
            if db.is_unique_violation() {
                return StoreError::Conflict(db.message().to_string());
            }
            // SQLITE_BUSY (5) and SQLITE_LOCKED (6) plus their extended codes
            let busy = db
                .code()
                .and_then(|code| code.parse::<i64>().ok())
                .map(|code| matches!(code & 0xff, 5 | 6))
                .unwrap_or(false);
            if busy {
                StoreError::Conflict(db.message().to_string())
            } else {
                StoreError::Database(err)
            }
        }
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
            StoreError::Unavailable(err.to_string())
        }
        _ => StoreError::Database(err),
    }
}
