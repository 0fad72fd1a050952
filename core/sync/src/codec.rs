//! Versioned JSON encoding of persisted sync documents.
//!
//! Every document carries a `version` field. Decoding checks the version,
//! verifies the required fields of the document type up front and reports
//! the first missing or malformed field by name.

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use synctool_common::{Error, FileReference, Result};
use synctool_storage::PathFilter;

use crate::action::{SyncAction, SyncActionKind};
use crate::state::SyncActionState;
use crate::sync_point::{HistoryRange, SyncPoint};

/// Current document format.
pub const FORMAT_VERSION: u32 = 1;

const ACTION_FIELDS: &[&str] = &["version", "id", "target", "state", "syncPointId", "type"];
const SYNC_POINT_FIELDS: &[&str] = &["version", "id", "histories", "filter"];

/// Fields holding the file versions of each action type.
fn version_fields(type_name: &str) -> Result<&'static [&'static str]> {
    match type_name {
        "Add" => Ok(&["newFile"]),
        "Remove" => Ok(&["removedFile"]),
        "Replace" => Ok(&["oldVersion", "newVersion"]),
        "MultipleVersionConflict" => Ok(&["versions"]),
        "ModificationDeletionConflict" => Ok(&["deleted", "modified"]),
        other => Err(Error::Format(format!("Unknown sync action type: {}", other))),
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::Serialization(e.to_string()))
}

fn to_bytes(document: &Value) -> Result<Vec<u8>> {
    serde_json::to_vec(document).map_err(|e| Error::Serialization(e.to_string()))
}

fn parse(data: &[u8]) -> Result<Value> {
    serde_json::from_slice(data).map_err(|e| Error::Format(e.to_string()))
}

/// Check the version and required fields of a parsed document.
fn open_document<'a>(document: &'a Value, required: &[&str]) -> Result<&'a Map<String, Value>> {
    let object = document
        .as_object()
        .ok_or_else(|| Error::Format("Document is not an object".to_string()))?;

    require(object, required)?;
    let version = object
        .get("version")
        .and_then(Value::as_u64)
        .ok_or_else(|| malformed("version"))?;
    if version != u64::from(FORMAT_VERSION) {
        return Err(Error::Format(format!("Unsupported format version {}", version)));
    }
    Ok(object)
}

fn require(object: &Map<String, Value>, fields: &[&str]) -> Result<()> {
    match fields.iter().find(|f| !object.contains_key(**f)) {
        Some(missing) => Err(Error::Format(format!("Missing field '{}'", missing))),
        None => Ok(()),
    }
}

fn malformed(field: &str) -> Error {
    Error::Format(format!("Malformed field '{}'", field))
}

fn field<T: DeserializeOwned>(object: &Map<String, Value>, name: &str) -> Result<T> {
    let value = object
        .get(name)
        .ok_or_else(|| Error::Format(format!("Missing field '{}'", name)))?;
    serde_json::from_value(value.clone()).map_err(|_| malformed(name))
}

/// Encode a sync action.
pub fn encode_action(action: &SyncAction) -> Result<Vec<u8>> {
    let mut document = json!({
        "version": FORMAT_VERSION,
        "id": action.id().to_string(),
        "target": action.target(),
        "state": action.state().as_str(),
        "syncPointId": action.sync_point_id(),
        "type": action.kind().type_name(),
    });

    let versions = match action.kind() {
        SyncActionKind::Add { new_file } => vec![("newFile", to_value(new_file)?)],
        SyncActionKind::Remove { removed_file } => vec![("removedFile", to_value(removed_file)?)],
        SyncActionKind::Replace {
            old_version,
            new_version,
        } => vec![
            ("oldVersion", to_value(old_version)?),
            ("newVersion", to_value(new_version)?),
        ],
        SyncActionKind::MultipleVersionConflict { versions } => {
            vec![("versions", to_value(versions)?)]
        }
        SyncActionKind::ModificationDeletionConflict { deleted, modified } => vec![
            ("deleted", to_value(deleted)?),
            ("modified", to_value(modified)?),
        ],
    };
    if let Some(object) = document.as_object_mut() {
        for (name, value) in versions {
            object.insert(name.to_string(), value);
        }
    }

    to_bytes(&document)
}

/// Decode a sync action.
///
/// # Errors
/// - `Format` naming the first missing or malformed field
/// - `Format` for an unsupported format version or action type
pub fn decode_action(data: &[u8]) -> Result<SyncAction> {
    let document = parse(data)?;
    let object = open_document(&document, ACTION_FIELDS)?;

    let type_name: String = field(object, "type")?;
    require(object, version_fields(&type_name)?)?;

    let id: Uuid = field::<String>(object, "id")?
        .parse()
        .map_err(|_| malformed("id"))?;
    let target: String = field(object, "target")?;
    let state: SyncActionState = field::<String>(object, "state")?
        .parse()
        .map_err(|_| malformed("state"))?;
    let sync_point_id: u64 = field(object, "syncPointId")?;

    let kind = match type_name.as_str() {
        "Add" => SyncActionKind::Add {
            new_file: field(object, "newFile")?,
        },
        "Remove" => SyncActionKind::Remove {
            removed_file: field(object, "removedFile")?,
        },
        "Replace" => SyncActionKind::Replace {
            old_version: field(object, "oldVersion")?,
            new_version: field(object, "newVersion")?,
        },
        "MultipleVersionConflict" => SyncActionKind::MultipleVersionConflict {
            versions: field::<Vec<FileReference>>(object, "versions")?,
        },
        _ => SyncActionKind::ModificationDeletionConflict {
            deleted: field(object, "deleted")?,
            modified: field(object, "modified")?,
        },
    };

    SyncAction::from_parts(id, target, state, sync_point_id, kind)
        .map_err(|e| Error::Format(format!("Invalid sync action {}: {}", id, e)))
}

/// Encode a sync point.
pub fn encode_sync_point(point: &SyncPoint) -> Result<Vec<u8>> {
    let document = json!({
        "version": FORMAT_VERSION,
        "id": point.id,
        "histories": to_value(&point.histories)?,
        "filter": to_value(&point.filter)?,
    });
    to_bytes(&document)
}

/// Decode a sync point.
///
/// # Errors
/// - `Format` naming the first missing or malformed field
pub fn decode_sync_point(data: &[u8]) -> Result<SyncPoint> {
    let document = parse(data)?;
    let object = open_document(&document, SYNC_POINT_FIELDS)?;

    Ok(SyncPoint {
        id: field(object, "id")?,
        histories: field::<std::collections::BTreeMap<String, HistoryRange>>(object, "histories")?,
        filter: field::<PathFilter>(object, "filter")?,
    })
}
