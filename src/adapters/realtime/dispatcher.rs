//! Command dispatcher: one inbound command → one hub mutation.
//!
//! # Authorization
//!
//! | Command | Requirement |
//! |---------|-------------|
//! | `AUTH` | session token resolves to a user (failure closes the connection) |
//! | `(UN)SUBSCRIBE_TEAM` | authenticated + team access (single-user skips the check) |
//! | `(UN)SUBSCRIBE_BLOCKS` | read token valid for *every* block ID, or, with no read token, authenticated + team access |
//!
//! Denials are silent towards the client. Collaborator checks run before
//! the hub's write lock is taken.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

use crate::domain::foundation::{tokens_match, BlockId, ConnectionId, TeamId, UserId};
use crate::domain::realtime::{Command, Connection};
use crate::ports::{ReadTokenValidator, SessionValidator, TeamAccessChecker};

use super::hub::{AuthenticateOutcome, ListenerHub};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The command was authorized and applied (possibly as a no-op).
    Applied,
    /// The command was dropped without evaluation (parse error, unknown
    /// connection, re-AUTH).
    Ignored,
    /// Authorization failed; nothing changed.
    Denied,
    /// Authentication failed; the caller must close the transport.
    CloseConnection,
}

pub struct CommandDispatcher {
    hub: Arc<ListenerHub>,
    sessions: Option<Arc<dyn SessionValidator>>,
    team_access: Arc<dyn TeamAccessChecker>,
    read_tokens: Arc<dyn ReadTokenValidator>,
    single_user_token: Option<SecretString>,
}

impl CommandDispatcher {
    pub fn new(
        hub: Arc<ListenerHub>,
        team_access: Arc<dyn TeamAccessChecker>,
        read_tokens: Arc<dyn ReadTokenValidator>,
    ) -> Self {
        Self {
            hub,
            sessions: None,
            team_access,
            read_tokens,
            single_user_token: None,
        }
    }

    /// Enables `AUTH` via session lookup.
    pub fn with_session_validator(mut self, sessions: Arc<dyn SessionValidator>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Enables single-user mode: `AUTH` with this token binds the
    /// well-known single user. Empty tokens leave the mode off.
    pub fn with_single_user_token(mut self, token: Option<SecretString>) -> Self {
        self.single_user_token = token.filter(|t| !t.expose_secret().is_empty());
        self
    }

    pub fn hub(&self) -> &Arc<ListenerHub> {
        &self.hub
    }

    /// Parses a standalone text frame and dispatches it.
    ///
    /// Malformed frames are logged and ignored; the connection stays open.
    pub async fn handle_text(&self, connection_id: &ConnectionId, text: &str) -> DispatchOutcome {
        match Command::parse(text) {
            Ok(command) => self.dispatch(connection_id, command).await,
            Err(e) => {
                tracing::warn!(connection_id = %connection_id, error = %e, "Dropping malformed command");
                DispatchOutcome::Ignored
            }
        }
    }

    pub async fn dispatch(&self, connection_id: &ConnectionId, command: Command) -> DispatchOutcome {
        let Some(connection) = self.hub.lookup(connection_id).await else {
            tracing::debug!(connection_id = %connection_id, "Command for unknown connection ignored");
            return DispatchOutcome::Ignored;
        };
        let action = command.action();

        let outcome = match command {
            Command::Auth { token } => self.authenticate(&connection, &token).await,
            Command::SubscribeTeam { team_id } => {
                if !self.may_watch_team(&connection, &team_id).await {
                    DispatchOutcome::Denied
                } else {
                    self.hub.subscribe_team(connection_id, &team_id).await;
                    DispatchOutcome::Applied
                }
            }
            Command::UnsubscribeTeam { team_id } => {
                if !self.may_watch_team(&connection, &team_id).await {
                    DispatchOutcome::Denied
                } else {
                    self.hub.unsubscribe_team(connection_id, &team_id).await;
                    DispatchOutcome::Applied
                }
            }
            Command::SubscribeBlocks {
                team_id,
                block_ids,
                read_token,
            } => {
                if !self
                    .may_watch_blocks(&connection, &team_id, &block_ids, read_token.as_deref())
                    .await
                {
                    DispatchOutcome::Denied
                } else {
                    self.hub.subscribe_blocks(connection_id, &block_ids).await;
                    DispatchOutcome::Applied
                }
            }
            Command::UnsubscribeBlocks {
                team_id,
                block_ids,
                read_token,
            } => {
                if !self
                    .may_watch_blocks(&connection, &team_id, &block_ids, read_token.as_deref())
                    .await
                {
                    DispatchOutcome::Denied
                } else {
                    self.hub.unsubscribe_blocks(connection_id, &block_ids).await;
                    DispatchOutcome::Applied
                }
            }
        };

        if outcome == DispatchOutcome::Denied {
            tracing::debug!(connection_id = %connection_id, action = ?action, "Command denied");
        }
        outcome
    }

    async fn authenticate(&self, connection: &Connection, token: &str) -> DispatchOutcome {
        let connection_id = connection.id();
        if connection.is_authenticated() {
            tracing::debug!(connection_id = %connection_id, "Re-authentication ignored");
            return DispatchOutcome::Ignored;
        }

        let user_id = match self.resolve_user(token).await {
            Some(user_id) => user_id,
            None => {
                tracing::info!(connection_id = %connection_id, "Authentication failed; closing connection");
                return DispatchOutcome::CloseConnection;
            }
        };

        match self.hub.authenticate(connection_id, user_id.clone()).await {
            AuthenticateOutcome::Authenticated => {
                tracing::debug!(connection_id = %connection_id, user_id = %user_id, "Connection authenticated");
                DispatchOutcome::Applied
            }
            AuthenticateOutcome::AlreadyAuthenticated | AuthenticateOutcome::UnknownConnection => {
                DispatchOutcome::Ignored
            }
        }
    }

    async fn resolve_user(&self, token: &str) -> Option<UserId> {
        if let Some(single) = &self.single_user_token {
            if tokens_match(single.expose_secret(), token) {
                return Some(UserId::single_user());
            }
        }
        let sessions = self.sessions.as_ref()?;
        match sessions.validate(token).await {
            Ok(user_id) => Some(user_id),
            Err(e) => {
                if e.is_transient() {
                    tracing::warn!(error = %e, "Session lookup unavailable");
                } else {
                    tracing::debug!(error = %e, "Session token rejected");
                }
                None
            }
        }
    }

    fn is_single_user_mode(&self) -> bool {
        self.single_user_token.is_some()
    }

    async fn may_watch_team(&self, connection: &Connection, team_id: &TeamId) -> bool {
        let Some(user_id) = connection.user_id() else {
            return false;
        };
        if self.is_single_user_mode() && user_id.is_single_user() {
            return true;
        }
        match self.team_access.has_access(user_id, team_id).await {
            Ok(allowed) => allowed,
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    team_id = %team_id,
                    error = %e,
                    "Team access check failed; denying"
                );
                false
            }
        }
    }

    async fn may_watch_blocks(
        &self,
        connection: &Connection,
        team_id: &TeamId,
        block_ids: &[BlockId],
        read_token: Option<&str>,
    ) -> bool {
        let Some(token) = read_token else {
            return self.may_watch_team(connection, team_id).await;
        };
        for block_id in block_ids {
            match self
                .read_tokens
                .is_valid_read_token(team_id, block_id, token)
                .await
            {
                Ok(true) => {}
                Ok(false) => return false,
                Err(e) => {
                    tracing::warn!(
                        block_id = %block_id,
                        error = %e,
                        "Read token check failed; denying batch"
                    );
                    return false;
                }
            }
        }
        true
    }
}
