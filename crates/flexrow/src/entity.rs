//! In-memory records and their change tracking.

use std::collections::BTreeMap;
use std::fmt;

use flexrow_db::{DbRow, Value};
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::types::numeric_value;

/// Name of the generated primary key column.
pub const ID_FIELD: &str = "id";

/// Lifecycle state of an [`Entity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    /// Never persisted, no edits.
    New,
    /// Matches the store.
    Clean,
    /// Has edits the store has not confirmed.
    Dirty,
    /// A write is in progress; edits stay pending until it is confirmed.
    InFlight,
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityState::New => "new",
            EntityState::Clean => "clean",
            EntityState::Dirty => "dirty",
            EntityState::InFlight => "in_flight",
        };
        f.write_str(s)
    }
}

/// One record of a table.
///
/// `persisted` mirrors the last known store state; `pending` collects edits.
/// Once a field is set it stays in [`Entity::changes`] for every write until
/// a write is confirmed, even when the value equals the persisted one.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    kind: String,
    id: u64,
    persisted: BTreeMap<String, Value>,
    pending: BTreeMap<String, Value>,
    created: bool,
    changed: bool,
    in_flight: bool,
}

impl Entity {
    /// A record of `kind` that does not exist in the store yet.
    pub fn new(kind: impl Into<String>) -> Self {
        let mut persisted = BTreeMap::new();
        persisted.insert(ID_FIELD.to_string(), Value::Int(0));
        Self {
            kind: kind.into(),
            id: 0,
            persisted,
            pending: BTreeMap::new(),
            created: true,
            changed: false,
            in_flight: false,
        }
    }

    /// Materialize a query row. Rows without an id produce a new record.
    pub(crate) fn from_row(kind: &str, row: DbRow) -> Self {
        let persisted: BTreeMap<String, Value> = row.into_pairs().collect();
        let id = persisted.get(ID_FIELD).and_then(id_from_value).unwrap_or(0);
        if id == 0 {
            let mut entity = Self::new(kind);
            entity
                .persisted
                .extend(persisted.into_iter().filter(|(k, _)| k != ID_FIELD));
            return entity;
        }
        Self {
            kind: kind.to_string(),
            id,
            persisted,
            pending: BTreeMap::new(),
            created: false,
            changed: false,
            in_flight: false,
        }
    }

    /// Table this record belongs to.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Generated key, 0 until the first INSERT is confirmed.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current value of a field: the pending edit if any, else the persisted value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.pending.get(key).or_else(|| self.persisted.get(key))
    }

    /// Decode a field holding serialized JSON (or any JSON-compatible scalar).
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let json = match self.get(key) {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Text(text)) => serde_json::from_str(text)?,
            Some(Value::Bytes(bytes)) => serde_json::from_slice(bytes)?,
            Some(Value::Json(json)) => json.clone(),
            Some(Value::Bool(v)) => serde_json::Value::from(*v),
            Some(Value::Int(v)) => serde_json::Value::from(*v),
            Some(Value::Float(v)) => serde_json::Value::from(*v),
        };
        Ok(Some(serde_json::from_value(json)?))
    }

    /// Record an edit.
    ///
    /// JSON objects and arrays are stored as their serialized text. The
    /// record becomes dirty when the field is new, persisted as NULL, or
    /// differs from its persisted value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into().canonicalize();
        let differs = match self.persisted.get(&key) {
            Some(current) if !current.is_null() => !loosely_equal(current, &value),
            _ => true,
        };
        if differs {
            self.changed = true;
        }
        self.pending.insert(key, value);
    }

    /// Every pending edit, not a diff against the persisted state.
    pub fn changes(&self) -> &BTreeMap<String, Value> {
        &self.pending
    }

    pub fn persisted(&self) -> &BTreeMap<String, Value> {
        &self.persisted
    }

    /// Persisted values overlaid with pending edits.
    pub fn fields(&self) -> BTreeMap<String, Value> {
        let mut fields = self.persisted.clone();
        fields.extend(self.pending.iter().map(|(k, v)| (k.clone(), v.clone())));
        fields
    }

    /// Discard pending edits.
    pub fn revert(&mut self) {
        self.pending.clear();
        self.changed = false;
    }

    /// True until the first INSERT is confirmed.
    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn state(&self) -> EntityState {
        if self.in_flight {
            EntityState::InFlight
        } else if self.changed {
            EntityState::Dirty
        } else if self.created {
            EntityState::New
        } else {
            EntityState::Clean
        }
    }

    /// Mark a write as started. Pending edits and the dirty flag are kept
    /// until [`Entity::commit`].
    pub(crate) fn begin_write(&mut self) {
        self.in_flight = true;
    }

    /// The store confirmed the write; `id` is the key it was written under.
    pub(crate) fn commit(&mut self, id: u64) {
        if self.created {
            self.created = false;
            self.id = id;
            self.persisted.insert(ID_FIELD.to_string(), Value::Int(id as i64));
        }
        let pending = std::mem::take(&mut self.pending);
        self.persisted.extend(pending);
        self.changed = false;
        self.in_flight = false;
    }

    /// The write failed; the record stays dirty with its edits intact.
    pub(crate) fn abort(&mut self) {
        self.in_flight = false;
    }
}

fn id_from_value(value: &Value) -> Option<u64> {
    match value {
        Value::Int(v) => u64::try_from(*v).ok(),
        Value::Text(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Equality the way stores round-trip values: `5` equals `"5"`, `true`
/// equals `1`, `"10.50"` equals `10.5`.
fn loosely_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    if a.is_null() || b.is_null() {
        return false;
    }
    match (a, b) {
        (Value::Bool(x), other) | (other, Value::Bool(x)) => other.as_i64() == Some(*x as i64),
        _ => match (numeric_value(a), numeric_value(b)) {
            (Some(x), Some(y)) => x == y,
            _ => a.to_text() == b.to_text(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn clean(kind: &str, id: i64, fields: &[(&str, Value)]) -> Entity {
        let mut columns = vec![ID_FIELD.to_string()];
        let mut values = vec![Value::Int(id)];
        for (k, v) in fields {
            columns.push(k.to_string());
            values.push(v.clone());
        }
        Entity::from_row(kind, DbRow::new(columns, values))
    }

    #[test]
    fn test_new_entity() {
        let entity = Entity::new("user");
        assert_eq!(entity.kind(), "user");
        assert_eq!(entity.id(), 0);
        assert!(entity.is_created());
        assert!(!entity.is_changed());
        assert_eq!(entity.state(), EntityState::New);
        assert_eq!(entity.get(ID_FIELD), Some(&Value::Int(0)));
    }

    #[test]
    fn test_row_materializes_clean() {
        let entity = clean("user", 7, &[("name", Value::from("john"))]);
        assert_eq!(entity.id(), 7);
        assert!(!entity.is_created());
        assert_eq!(entity.state(), EntityState::Clean);
        assert_eq!(entity.get("name"), Some(&Value::from("john")));
    }

    #[test]
    fn test_row_without_id_is_new() {
        let row = DbRow::new(vec!["name".to_string()], vec![Value::from("x")]);
        let entity = Entity::from_row("user", row);
        assert!(entity.is_created());
        assert_eq!(entity.get("name"), Some(&Value::from("x")));
    }

    #[test]
    fn test_set_marks_dirty_only_on_difference() {
        let mut entity = clean("user", 1, &[("age", Value::Int(30))]);

        entity.set("age", "30");
        assert!(!entity.is_changed());
        // Still part of the outgoing change set.
        assert_eq!(entity.changes().get("age"), Some(&Value::from("30")));

        entity.set("age", 31);
        assert!(entity.is_changed());
        assert_eq!(entity.state(), EntityState::Dirty);
        assert_eq!(entity.get("age"), Some(&Value::Int(31)));
        assert_eq!(entity.persisted().get("age"), Some(&Value::Int(30)));
    }

    #[test]
    fn test_set_new_field_marks_dirty() {
        let mut entity = clean("user", 1, &[]);
        entity.set("nickname", Value::Null);
        assert!(entity.is_changed());
    }

    #[test]
    fn test_loose_equality() {
        assert!(loosely_equal(&Value::Bool(true), &Value::Int(1)));
        assert!(loosely_equal(&Value::Float(12.5), &Value::from("12.5")));
        assert!(!loosely_equal(&Value::Null, &Value::from("")));
        assert!(!loosely_equal(&Value::Int(2), &Value::from("3")));
        assert!(loosely_equal(&Value::from("10.50"), &Value::Float(10.5)));
        assert!(loosely_equal(&Value::from("12.00"), &Value::Int(12)));
        assert!(!loosely_equal(&Value::from("10.50"), &Value::Float(10.05)));
    }

    #[test]
    fn test_set_over_persisted_null_marks_dirty() {
        let mut entity = clean("user", 1, &[("nickname", Value::Null)]);
        entity.set("nickname", Value::Null);
        assert!(entity.is_changed());
        assert_eq!(entity.state(), EntityState::Dirty);
    }

    #[test]
    fn test_composite_values_are_serialized() {
        let mut entity = Entity::new("user");
        entity.set("data", json!({"city": "NY", "height": 45}));
        assert_eq!(
            entity.get("data"),
            Some(&Value::from(r#"{"city":"NY","height":45}"#))
        );

        let decoded: serde_json::Value = entity.get_json("data").unwrap().unwrap();
        assert_eq!(decoded, json!({"city": "NY", "height": 45}));
        assert_eq!(entity.get_json::<i64>("missing").unwrap(), None);
    }

    #[test]
    fn test_get_json_rejects_garbage() {
        let mut entity = Entity::new("user");
        entity.set("data", "not json");
        assert!(entity.get_json::<serde_json::Value>("data").is_err());
    }

    #[test]
    fn test_commit_merges_pending() {
        let mut entity = Entity::new("user");
        entity.set("name", "john");
        entity.begin_write();
        assert_eq!(entity.state(), EntityState::InFlight);

        entity.commit(12);
        assert_eq!(entity.id(), 12);
        assert!(!entity.is_created());
        assert_eq!(entity.state(), EntityState::Clean);
        assert!(entity.changes().is_empty());
        assert_eq!(entity.persisted().get("name"), Some(&Value::from("john")));
        assert_eq!(entity.persisted().get(ID_FIELD), Some(&Value::Int(12)));
    }

    #[test]
    fn test_abort_keeps_edits() {
        let mut entity = clean("user", 3, &[("name", Value::from("john"))]);
        entity.set("name", "jane");
        entity.begin_write();
        entity.abort();

        assert_eq!(entity.state(), EntityState::Dirty);
        assert_eq!(entity.changes().get("name"), Some(&Value::from("jane")));
        assert_eq!(entity.persisted().get("name"), Some(&Value::from("john")));
    }

    #[test]
    fn test_commit_of_existing_keeps_id() {
        let mut entity = clean("user", 3, &[]);
        entity.set("name", "jane");
        entity.begin_write();
        entity.commit(0);
        assert_eq!(entity.id(), 3);
    }

    #[test]
    fn test_revert() {
        let mut entity = clean("user", 3, &[("name", Value::from("john"))]);
        entity.set("name", "jane");
        entity.revert();
        assert_eq!(entity.state(), EntityState::Clean);
        assert_eq!(entity.get("name"), Some(&Value::from("john")));

        let mut fresh = Entity::new("user");
        fresh.set("name", "x");
        fresh.revert();
        assert_eq!(fresh.state(), EntityState::New);
    }

    #[test]
    fn test_fields_overlay() {
        let mut entity = clean("user", 3, &[("a", Value::Int(1)), ("b", Value::Int(2))]);
        entity.set("b", 20);
        entity.set("c", 30);
        let fields = entity.fields();
        assert_eq!(fields.get("a"), Some(&Value::Int(1)));
        assert_eq!(fields.get("b"), Some(&Value::Int(20)));
        assert_eq!(fields.get("c"), Some(&Value::Int(30)));
        assert_eq!(fields.get(ID_FIELD), Some(&Value::Int(3)));
    }
}
