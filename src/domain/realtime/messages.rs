//! Outbound realtime messages and their cluster envelope.
//!
//! - Server → Client: `UPDATE_BLOCK` notices and client-config snapshots
//! - Node → Node: [`ClusterMessage`], the same notice plus its routing scope

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::foundation::{BlockId, TeamId, UserId};

use super::block::Block;

/// Action tag of a block update (also used for deletes).
pub const ACTION_UPDATE_BLOCK: &str = "UPDATE_BLOCK";

/// Action tag of a client configuration change.
pub const ACTION_UPDATE_CLIENT_CONFIG: &str = "UPDATE_CLIENT_CONFIG";

#[derive(Serialize)]
struct UpdateBlockPayload<'a> {
    action: &'static str,
    block: &'a Block,
}

/// A serialized mutation notice ready to be written to any connection.
///
/// `payload` is exactly what a standalone client receives as a text frame;
/// plugin hosts get `action` as the event name and `payload` as its data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub action: String,
    pub payload: Value,
}

impl OutboundMessage {
    /// `{action: "UPDATE_BLOCK", block: <block>}`.
    pub fn update_block(block: &Block) -> Result<Self, serde_json::Error> {
        let payload = serde_json::to_value(UpdateBlockPayload {
            action: ACTION_UPDATE_BLOCK,
            block,
        })?;
        Ok(Self {
            action: ACTION_UPDATE_BLOCK.to_string(),
            payload,
        })
    }

    /// The flat config map, no action wrapper in the payload.
    pub fn client_config(config: &ClientConfig) -> Result<Self, serde_json::Error> {
        Ok(Self {
            action: ACTION_UPDATE_CLIENT_CONFIG.to_string(),
            payload: serde_json::to_value(config)?,
        })
    }

    /// Text frame for the standalone transport.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.payload)
    }
}

/// Client-visible configuration snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    pub telemetry: bool,
    #[serde(rename = "telemetryid")]
    pub telemetry_id: String,
    pub enable_public_shared_boards: bool,
    pub teammate_name_display: String,
    pub feature_flags: BTreeMap<String, String>,
    pub max_file_size: i64,
}

/// Which local listeners a broadcast targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BroadcastScope {
    /// Team listeners plus listeners of any of `block_ids`.
    Team {
        team_id: TeamId,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        block_ids: Vec<BlockId>,
    },
    /// Every registered connection.
    Everyone,
}

impl BroadcastScope {
    /// Team listeners plus listeners of the block and of its parent.
    pub fn for_block(team_id: TeamId, block: &Block) -> Self {
        Self::Team {
            team_id,
            block_ids: block.listener_keys(),
        }
    }
}

/// A broadcast as replicated to peer nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterMessage {
    pub scope: BroadcastScope,
    pub message: OutboundMessage,
    /// Users whose connections receive the message even when unsubscribed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ensure_users: Vec<UserId>,
}

impl ClusterMessage {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn update_block_payload_has_action_and_block() {
        let block = Block::new(BlockId::new("b1").unwrap());
        let msg = OutboundMessage::update_block(&block).unwrap();

        assert_eq!(msg.action, "UPDATE_BLOCK");
        assert_eq!(msg.payload["action"], json!("UPDATE_BLOCK"));
        assert_eq!(msg.payload["block"]["id"], json!("b1"));
    }

    #[test]
    fn client_config_payload_is_flat() {
        let config = ClientConfig {
            telemetry: true,
            telemetry_id: "tid".to_string(),
            enable_public_shared_boards: true,
            ..Default::default()
        };
        let msg = OutboundMessage::client_config(&config).unwrap();
        let text = msg.to_text().unwrap();

        let value: Value = serde_json::from_str(&text).unwrap();
        assert!(value.get("action").is_none());
        assert_eq!(value["telemetryid"], json!("tid"));
        assert_eq!(value["enablePublicSharedBoards"], json!(true));
    }

    #[test]
    fn cluster_message_survives_byte_encoding() {
        let block = Block::new(BlockId::new("b1").unwrap());
        let original = ClusterMessage {
            scope: BroadcastScope::Team {
                team_id: TeamId::new("t1").unwrap(),
                block_ids: vec![BlockId::new("b1").unwrap()],
            },
            message: OutboundMessage::update_block(&block).unwrap(),
            ensure_users: vec![UserId::new("u1").unwrap()],
        };

        let decoded = ClusterMessage::from_bytes(&original.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn block_scope_covers_block_and_parent() {
        let block = Block::new(BlockId::new("card").unwrap())
            .with_parent(BlockId::new("board").unwrap());
        let scope = BroadcastScope::for_block(TeamId::new("t1").unwrap(), &block);

        match scope {
            BroadcastScope::Team { team_id, block_ids } => {
                assert_eq!(team_id.as_str(), "t1");
                let keys: Vec<&str> = block_ids.iter().map(|b| b.as_str()).collect();
                assert_eq!(keys, vec!["card", "board"]);
            }
            BroadcastScope::Everyone => panic!("expected team scope"),
        }
    }

    #[test]
    fn everyone_scope_is_tagged() {
        let value = serde_json::to_value(BroadcastScope::Everyone).unwrap();
        assert_eq!(value, json!({"kind": "everyone"}));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(ClusterMessage::from_bytes(b"\x00\x01nope").is_err());
    }
}
