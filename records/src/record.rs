//! Record identity: kind-prefixed ids over opaque JSON bodies.
//!
//! A record id is `"<kind>:<suffix>"`. The kind prefix is the only structure
//! the store imposes; bodies stay `serde_json::Value` so the store never
//! couples to shape internals. Typed accessors cover the handful of identity
//! fields the engine reads (`name`, `index`, `parentId`).

#[cfg(test)]
#[path = "record_test.rs"]
mod record_test;

use std::fmt;

use serde_json::{Value, json};

/// Kind prefix of a record id, e.g. the `shape` in `shape:s1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// A page of the whiteboard.
    Page,
    /// Drawn content owned by exactly one page.
    Shape,
    /// A shape-to-shape relation (e.g. an arrow pinned to a shape).
    Binding,
    /// A remote user's cursor/viewport record.
    InstancePresence,
    /// Local viewport state.
    Camera,
    /// Local editor instance state.
    Instance,
    /// Local pointer state.
    Pointer,
    /// Document-level metadata.
    Document,
    /// A prefix this engine does not recognize. Never synchronized.
    Unknown,
}

impl RecordKind {
    /// Parse a kind from an id prefix.
    #[must_use]
    pub fn from_prefix(prefix: &str) -> Self {
        match prefix {
            "page" => Self::Page,
            "shape" => Self::Shape,
            "binding" => Self::Binding,
            "instance_presence" => Self::InstancePresence,
            "camera" => Self::Camera,
            "instance" => Self::Instance,
            "pointer" => Self::Pointer,
            "document" => Self::Document,
            _ => Self::Unknown,
        }
    }
}

/// Identifier of one store record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(String);

impl RecordId {
    /// Wrap a raw id string.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Id of the page record mirroring the persisted page `page_id`.
    #[must_use]
    pub fn page(page_id: i64) -> Self {
        Self(format!("page:{page_id}"))
    }

    /// Id of the presence record for `user_id`.
    #[must_use]
    pub fn presence(user_id: &str) -> Self {
        Self(format!("instance_presence:{user_id}"))
    }

    /// Kind parsed from the prefix before the first `:`. Ids without a
    /// separator are [`RecordKind::Unknown`].
    #[must_use]
    pub fn kind(&self) -> RecordKind {
        match self.0.split_once(':') {
            Some((prefix, _)) => RecordKind::from_prefix(prefix),
            None => RecordKind::Unknown,
        }
    }

    /// Numeric page id for page record ids, e.g. `7` for `page:7`.
    #[must_use]
    pub fn page_number(&self) -> Option<i64> {
        let (prefix, suffix) = self.0.split_once(':')?;
        if prefix != "page" {
            return None;
        }
        suffix.parse().ok()
    }

    /// The raw id string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One record: an id plus its full JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Store key and kind carrier.
    pub id: RecordId,
    /// Full record body, opaque to the store.
    pub data: Value,
}

impl Record {
    /// Pair an id with its body.
    #[must_use]
    pub fn new(id: RecordId, data: Value) -> Self {
        Self { id, data }
    }

    /// Build the page record mirroring a persisted page. The fractional
    /// ordering key is derived from the numeric id, so server-assigned ids
    /// sort in creation order.
    #[must_use]
    pub fn page(page_id: i64, title: &str) -> Self {
        Self::new(
            RecordId::page(page_id),
            json!({
                "id": format!("page:{page_id}"),
                "name": title,
                "index": format!("a{page_id}"),
            }),
        )
    }

    /// Kind of this record, from the id prefix.
    #[must_use]
    pub fn kind(&self) -> RecordKind {
        self.id.kind()
    }

    /// `name` field of the body. Set on page records.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.data.get("name").and_then(Value::as_str)
    }

    /// Fractional ordering key (`index`). Set on page records.
    #[must_use]
    pub fn sort_index(&self) -> Option<&str> {
        self.data.get("index").and_then(Value::as_str)
    }

    /// Owning page (`parentId`). Set on shape and binding records.
    #[must_use]
    pub fn parent_page(&self) -> Option<RecordId> {
        self.data
            .get("parentId")
            .and_then(Value::as_str)
            .map(RecordId::new)
    }
}
