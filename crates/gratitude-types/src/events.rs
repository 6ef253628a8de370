use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{MessageRow, MessageUpdate};

/// Row operation reported by the change feed.
///
/// On the wire the provider tags operations as `INSERT`, `UPDATE` and `DELETE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    #[serde(rename = "INSERT")]
    Inserted,
    #[serde(rename = "UPDATE")]
    Updated,
    #[serde(rename = "DELETE")]
    Deleted,
}

impl ChangeKind {
    /// Parse the provider's operation tag.
    pub fn from_wire(tag: &str) -> Option<Self> {
        match tag {
            "INSERT" => Some(Self::Inserted),
            "UPDATE" => Some(Self::Updated),
            "DELETE" => Some(Self::Deleted),
            _ => None,
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::Inserted => "INSERT",
            Self::Updated => "UPDATE",
            Self::Deleted => "DELETE",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// One row-level mutation of `gratitude_messages`, as delivered by the change feed.
///
/// Produced once per remote mutation and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,

    /// Row snapshot from the provider's new-record payload.
    /// Always present for inserts and updates; usually absent for deletes.
    pub row: Option<MessageRow>,

    /// Provider's old-record payload. Deletes normally carry only the primary key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<MessageUpdate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_timestamp: Option<String>,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, row: Option<MessageRow>) -> Self {
        Self {
            kind,
            row,
            old: None,
            commit_timestamp: None,
        }
    }

    /// Returns the id of the affected row, taken from the new record when
    /// present and from the old record otherwise.
    pub fn row_id(&self) -> Option<i64> {
        self.row
            .as_ref()
            .map(|row| row.id)
            .or_else(|| self.old.as_ref().and_then(|old| old.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_tags_round_trip() {
        for kind in [ChangeKind::Inserted, ChangeKind::Updated, ChangeKind::Deleted] {
            assert_eq!(ChangeKind::from_wire(kind.as_wire()), Some(kind));
            assert_eq!(
                serde_json::to_value(kind).unwrap(),
                serde_json::Value::String(kind.as_wire().to_string())
            );
        }
        assert_eq!(ChangeKind::from_wire("TRUNCATE"), None);
        assert_eq!(ChangeKind::from_wire("insert"), None);
    }

    #[test]
    fn row_id_falls_back_to_old_record() {
        let mut event = ChangeEvent::new(ChangeKind::Deleted, None);
        assert_eq!(event.row_id(), None);

        event.old = Some(MessageUpdate {
            id: Some(7),
            ..Default::default()
        });
        assert_eq!(event.row_id(), Some(7));
    }
}
