//! Inbound client commands.
//!
//! Wire shape: `{action, teamId?, token?, readToken?, blockIds?}`. A command
//! lives for exactly one inbound-message handling call.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::foundation::{BlockId, TeamId};

/// The command verbs a client may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandAction {
    Auth,
    SubscribeTeam,
    UnsubscribeTeam,
    SubscribeBlocks,
    UnsubscribeBlocks,
}

/// Errors produced while turning a frame into a [`Command`].
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Malformed command payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Missing required field '{field}' for {action:?}")]
    MissingField {
        field: &'static str,
        action: CommandAction,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCommand {
    action: CommandAction,
    #[serde(default, alias = "workspaceId")]
    team_id: Option<TeamId>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    read_token: Option<String>,
    #[serde(default)]
    block_ids: Vec<BlockId>,
}

/// A validated inbound command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Auth {
        token: String,
    },
    SubscribeTeam {
        team_id: TeamId,
    },
    UnsubscribeTeam {
        team_id: TeamId,
    },
    SubscribeBlocks {
        team_id: TeamId,
        block_ids: Vec<BlockId>,
        read_token: Option<String>,
    },
    UnsubscribeBlocks {
        team_id: TeamId,
        block_ids: Vec<BlockId>,
        read_token: Option<String>,
    },
}

impl Command {
    /// Parses a standalone-transport text frame.
    pub fn parse(text: &str) -> Result<Self, CommandError> {
        let raw: RawCommand = serde_json::from_str(text)?;
        Self::from_raw(raw)
    }

    /// Parses a host-delivered plugin message.
    ///
    /// Returns `Ok(None)` when `action` lacks `prefix`: such traffic belongs
    /// to some other subsystem and is ignored without error.
    pub fn from_plugin_message(
        action: &str,
        data: &Value,
        prefix: &str,
    ) -> Result<Option<Self>, CommandError> {
        let Some(verb) = action.strip_prefix(prefix) else {
            return Ok(None);
        };

        let mut object = match data {
            Value::Object(map) => map.clone(),
            _ => serde_json::Map::new(),
        };
        object.insert("action".to_string(), Value::String(verb.to_string()));

        let raw: RawCommand = serde_json::from_value(Value::Object(object))?;
        Self::from_raw(raw).map(Some)
    }

    pub fn action(&self) -> CommandAction {
        match self {
            Command::Auth { .. } => CommandAction::Auth,
            Command::SubscribeTeam { .. } => CommandAction::SubscribeTeam,
            Command::UnsubscribeTeam { .. } => CommandAction::UnsubscribeTeam,
            Command::SubscribeBlocks { .. } => CommandAction::SubscribeBlocks,
            Command::UnsubscribeBlocks { .. } => CommandAction::UnsubscribeBlocks,
        }
    }

    fn from_raw(raw: RawCommand) -> Result<Self, CommandError> {
        let action = raw.action;
        let team_id = || {
            raw.team_id.clone().ok_or(CommandError::MissingField {
                field: "teamId",
                action,
            })
        };
        let read_token = raw.read_token.clone().filter(|t| !t.is_empty());

        let command = match action {
            CommandAction::Auth => Command::Auth {
                token: raw
                    .token
                    .clone()
                    .filter(|t| !t.is_empty())
                    .ok_or(CommandError::MissingField {
                        field: "token",
                        action,
                    })?,
            },
            CommandAction::SubscribeTeam => Command::SubscribeTeam { team_id: team_id()? },
            CommandAction::UnsubscribeTeam => Command::UnsubscribeTeam { team_id: team_id()? },
            CommandAction::SubscribeBlocks => Command::SubscribeBlocks {
                team_id: team_id()?,
                block_ids: raw.block_ids.clone(),
                read_token,
            },
            CommandAction::UnsubscribeBlocks => Command::UnsubscribeBlocks {
                team_id: team_id()?,
                block_ids: raw.block_ids.clone(),
                read_token,
            },
        };
        Ok(command)
    }
}
