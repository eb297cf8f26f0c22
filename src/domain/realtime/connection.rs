//! Connection - one logical client attachment to the realtime channel.

use std::collections::HashSet;
use std::time::Duration;

use crate::domain::foundation::{BlockId, ConnectionId, TeamId, Timestamp, UserId};

/// State of one realtime connection.
///
/// The subscription sets are the connection's own view of what it listens
/// to; the listener hub keeps its reverse indexes in lockstep with them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    id: ConnectionId,
    user_id: Option<UserId>,
    teams: HashSet<TeamId>,
    blocks: HashSet<BlockId>,
    inactive_since: Option<Timestamp>,
}

impl Connection {
    /// Creates an active connection with no subscriptions.
    pub fn new(id: ConnectionId, user_id: Option<UserId>) -> Self {
        Self {
            id,
            user_id,
            teams: HashSet::new(),
            blocks: HashSet::new(),
            inactive_since: None,
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.user_id.as_ref()
    }

    pub fn teams(&self) -> &HashSet<TeamId> {
        &self.teams
    }

    pub fn blocks(&self) -> &HashSet<BlockId> {
        &self.blocks
    }

    pub fn inactive_since(&self) -> Option<Timestamp> {
        self.inactive_since
    }

    /// True once a user ID is bound (AUTH succeeded or host-bound identity).
    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.inactive_since.is_none()
    }

    /// Binds a user to an unauthenticated connection.
    ///
    /// Returns false (and changes nothing) if a user is already bound;
    /// identity never changes mid-session.
    pub fn authenticate(&mut self, user_id: UserId) -> bool {
        if self.user_id.is_some() {
            return false;
        }
        self.user_id = Some(user_id);
        true
    }

    pub fn mark_inactive(&mut self, at: Timestamp) {
        self.inactive_since = Some(at);
    }

    /// Clears the inactive marker. Returns true if the connection was inactive.
    pub fn reactivate(&mut self) -> bool {
        self.inactive_since.take().is_some()
    }

    /// True if inactive for at least `threshold` as of `now`.
    ///
    /// A zero threshold treats any inactive connection as expired.
    pub fn has_expired(&self, threshold: Duration, now: Timestamp) -> bool {
        match self.inactive_since {
            Some(since) => since <= now.minus(threshold),
            None => false,
        }
    }

    pub fn is_subscribed_to_team(&self, team_id: &TeamId) -> bool {
        self.teams.contains(team_id)
    }

    pub fn is_subscribed_to_block(&self, block_id: &BlockId) -> bool {
        self.blocks.contains(block_id)
    }

    pub(crate) fn add_team(&mut self, team_id: TeamId) -> bool {
        self.teams.insert(team_id)
    }

    pub(crate) fn remove_team(&mut self, team_id: &TeamId) -> bool {
        self.teams.remove(team_id)
    }

    pub(crate) fn add_block(&mut self, block_id: BlockId) -> bool {
        self.blocks.insert(block_id)
    }

    pub(crate) fn remove_block(&mut self, block_id: &BlockId) -> bool {
        self.blocks.remove(block_id)
    }

    /// Empties both subscription sets, returning what was held.
    pub(crate) fn take_subscriptions(&mut self) -> (HashSet<TeamId>, HashSet<BlockId>) {
        (
            std::mem::take(&mut self.teams),
            std::mem::take(&mut self.blocks),
        )
    }
}
