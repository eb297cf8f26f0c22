//! Block - the domain entity whose mutations are broadcast.
//!
//! Only the fields the realtime layer needs are typed; everything else a
//! board/card/view carries travels opaquely in `fields`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::foundation::{BlockId, TeamId, Timestamp};

/// A board, card, view or any other block, in its client wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub id: BlockId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<BlockId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_id: Option<BlockId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<TeamId>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_by: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub modified_by: String,

    #[serde(default)]
    pub schema: i64,

    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub block_type: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,

    /// Unix milliseconds.
    #[serde(default)]
    pub create_at: i64,

    /// Unix milliseconds.
    #[serde(default)]
    pub update_at: i64,

    /// Unix milliseconds; zero while the block exists.
    #[serde(default)]
    pub delete_at: i64,
}

impl Block {
    /// Creates a bare block with only an ID.
    pub fn new(id: BlockId) -> Self {
        Self {
            id,
            parent_id: None,
            root_id: None,
            team_id: None,
            created_by: String::new(),
            modified_by: String::new(),
            schema: 1,
            block_type: String::new(),
            title: String::new(),
            fields: Map::new(),
            create_at: 0,
            update_at: 0,
            delete_at: 0,
        }
    }

    pub fn with_parent(mut self, parent_id: BlockId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// The value broadcast in place of a deleted block.
    ///
    /// Carries only the IDs plus update/delete times equal to `at`, so the
    /// delete travels through the ordinary update path.
    pub fn deletion_marker(id: BlockId, parent_id: Option<BlockId>, at: Timestamp) -> Self {
        let millis = at.as_millis();
        Self {
            parent_id,
            update_at: millis,
            delete_at: millis,
            ..Self::new(id)
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.delete_at > 0
    }

    /// The block IDs whose fine-grained listeners care about this block:
    /// the block itself and its parent.
    pub fn listener_keys(&self) -> Vec<BlockId> {
        let mut keys = vec![self.id.clone()];
        if let Some(parent) = &self.parent_id {
            if parent != &self.id {
                keys.push(parent.clone());
            }
        }
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(s: &str) -> BlockId {
        BlockId::new(s).unwrap()
    }

    #[test]
    fn deletion_marker_sets_equal_update_and_delete_times() {
        let at = Timestamp::from_millis(1_700_000_000_000);
        let marker = Block::deletion_marker(id("card-1"), Some(id("board-1")), at);

        assert_eq!(marker.update_at, 1_700_000_000_000);
        assert_eq!(marker.delete_at, marker.update_at);
        assert!(marker.is_deleted());
        assert_eq!(marker.parent_id, Some(id("board-1")));
        assert!(marker.title.is_empty());
    }

    #[test]
    fn listener_keys_include_parent() {
        let block = Block::new(id("card-1")).with_parent(id("board-1"));
        assert_eq!(block.listener_keys(), vec![id("card-1"), id("board-1")]);
    }

    #[test]
    fn listener_keys_skip_self_parent() {
        let block = Block::new(id("board-1")).with_parent(id("board-1"));
        assert_eq!(block.listener_keys(), vec![id("board-1")]);
    }

    #[test]
    fn serializes_in_camel_case_wire_shape() {
        let mut block = Block::new(id("card-1")).with_parent(id("board-1"));
        block.block_type = "card".to_string();
        block.update_at = 42;

        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value["id"], json!("card-1"));
        assert_eq!(value["parentId"], json!("board-1"));
        assert_eq!(value["type"], json!("card"));
        assert_eq!(value["updateAt"], json!(42));
        assert!(value.get("rootId").is_none());
    }

    #[test]
    fn deserializes_with_unknown_fields_in_fields_map() {
        let block: Block = serde_json::from_value(json!({
            "id": "card-9",
            "type": "card",
            "fields": {"icon": "x", "properties": {"a": 1}},
            "createAt": 1,
            "updateAt": 2
        }))
        .unwrap();

        assert_eq!(block.fields["icon"], json!("x"));
        assert_eq!(block.delete_at, 0);
        assert!(block.parent_id.is_none());
    }
}
