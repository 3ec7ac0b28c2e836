//! Local edits applied to list values without a network round trip.
//!
//! Records are matched on an identifying field compared as strings, so an id of `5` in the
//! data matches a target of `"5"` and vice versa.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::Store;
use crate::error::SyncError;

/// Identifier field used when the caller doesn't name one.
pub const DEFAULT_ID_KEY: &str = "id";

/// Outcome of a local edit in the shape the UI bindings consume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationStatus {
  pub status: bool,
  pub message: String,
}

impl From<Result<(), SyncError>> for MutationStatus {
  fn from(result: Result<(), SyncError>) -> Self {
    match result {
      Ok(()) => Self {
        status: true,
        message: "Item updated".to_string(),
      },
      Err(e) => Self {
        status: false,
        message: e.to_string(),
      },
    }
  }
}

/// String form of an identifier; `None` for values that can't identify anything.
fn id_string(value: &Value) -> Option<String> {
  match value {
    Value::String(s) if !s.is_empty() => Some(s.clone()),
    Value::Number(n) => Some(number_string(n)),
    Value::Bool(b) => Some(b.to_string()),
    _ => None,
  }
}

/// Integral floats render like integers so `5.0` and `5` name the same record.
fn number_string(n: &serde_json::Number) -> String {
  match n.as_f64() {
    Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 9.0e15 => format!("{}", f as i64),
    _ => n.to_string(),
  }
}

/// Targets a delete ignores: null, `false`, zero and the empty string.
fn is_falsy(value: &Value) -> bool {
  match value {
    Value::Null | Value::Bool(false) => true,
    Value::String(s) => s.is_empty(),
    Value::Number(n) => n.as_f64() == Some(0.0),
    _ => false,
  }
}

fn id_matches(field: Option<&Value>, target: &str) -> bool {
  field.and_then(id_string).as_deref() == Some(target)
}

impl Store {
  /// Remove every record under `key` whose `id_key` field equals `target_id`.
  ///
  /// Does nothing for a falsy target (null, `false`, zero, empty string). A non-list
  /// value is replaced by an empty list.
  pub fn delete_local(&self, key: &str, id_key: &str, target_id: impl Into<Value>) {
    let target_id = target_id.into();
    let target = match id_string(&target_id).filter(|_| !is_falsy(&target_id)) {
      Some(target) => target,
      None => {
        debug!(key, "Local delete without a target id, ignoring");
        return;
      }
    };

    let remaining = match self.get(key) {
      Some(Value::Array(items)) => items
        .into_iter()
        .filter(|item| !id_matches(item.get(id_key), &target))
        .collect(),
      _ => {
        warn!(key, "Local delete on a value that is not a list, resetting to empty");
        Vec::new()
      }
    };

    debug!(key, id = %target, "Deleted locally");
    self.replace(key, Value::Array(remaining));
  }

  /// Shallow-merge `fields` into the record under `key` whose `id_key` equals `target_id`.
  ///
  /// The cached copy of `key` is updated too, keeping its original fetch time, so fresh
  /// reads see the edit.
  pub fn edit_local(
    &self,
    key: &str,
    id_key: &str,
    target_id: impl Into<Value>,
    fields: Value,
  ) -> Result<(), SyncError> {
    let items = match self.get(key) {
      Some(Value::Array(items)) => items,
      Some(_) => {
        warn!(key, "Local edit on a value that is not a list");
        return Err(SyncError::NotAList(key.to_string()));
      }
      None => {
        warn!(key, "Local edit on a missing value");
        return Err(SyncError::MissingValue(key.to_string()));
      }
    };

    let fields = match fields {
      Value::Object(fields) => fields,
      other => {
        return Err(SyncError::MergeFailed {
          key: key.to_string(),
          reason: format!("expected an object of fields, got {}", other),
        })
      }
    };

    let target = id_string(&target_id.into());
    let updated: Vec<Value> = items
      .into_iter()
      .map(|item| match (item, &target) {
        (Value::Object(mut record), Some(target)) if id_matches(record.get(id_key), target) => {
          record.extend(fields.clone());
          Value::Object(record)
        }
        (item, _) => item,
      })
      .collect();

    let updated = Value::Array(updated);
    self.replace(key, updated.clone());
    self.cache.replace_value(key, updated);
    debug!(key, "Edited locally");

    Ok(())
  }
}
