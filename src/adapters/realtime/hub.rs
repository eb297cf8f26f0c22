//! Listener hub: the connection registry and its subscription indexes.
//!
//! Every registered connection lives in one map; three reverse indexes
//! answer "who listens to team X / block Y / belongs to user Z". All four
//! structures sit behind one `RwLock` and are only ever mutated together.
//!
//! # Architecture
//!
//! ```text
//! connections: conn-a ──► {user: u1, teams: [t1], blocks: [b7]}
//!              conn-b ──► {user: u2, teams: [t1], blocks: []}
//!
//! by_team:  t1 ──► {conn-a, conn-b}
//! by_block: b7 ──► {conn-a}
//! by_user:  u1 ──► {conn-a}   u2 ──► {conn-b}
//! ```
//!
//! # Thread Safety
//!
//! Listener resolution (broadcasts) takes the read lock; every structural
//! change takes the write lock. Resolution returns owned [`Listener`]s so
//! transport writes happen after the lock is released.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::domain::foundation::{BlockId, ConnectionId, TeamId, Timestamp, UserId};
use crate::domain::realtime::{BroadcastScope, Connection};
use crate::ports::ConnectionSink;

/// A resolved recipient: who to write to and how.
#[derive(Clone)]
pub struct Listener {
    pub connection_id: ConnectionId,
    pub sink: Arc<dyn ConnectionSink>,
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("connection_id", &self.connection_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Created,
    /// An entry with this ID already existed; its subscriptions were kept.
    Reactivated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthenticateOutcome {
    Authenticated,
    AlreadyAuthenticated,
    UnknownConnection,
}

/// Point-in-time hub counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub connections: usize,
    pub active_connections: usize,
    pub teams: usize,
    pub blocks: usize,
}

/// A forward/reverse index mismatch found by [`ListenerHub::verify_consistency`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("hub invariant violated: {0}")]
pub struct InvariantViolation(pub String);

struct Entry {
    connection: Connection,
    sink: Arc<dyn ConnectionSink>,
}

impl Entry {
    fn listener(&self) -> Listener {
        Listener {
            connection_id: self.connection.id().clone(),
            sink: Arc::clone(&self.sink),
        }
    }
}

#[derive(Default)]
struct HubState {
    connections: HashMap<ConnectionId, Entry>,
    by_team: HashMap<TeamId, HashSet<ConnectionId>>,
    by_block: HashMap<BlockId, HashSet<ConnectionId>>,
    by_user: HashMap<UserId, HashSet<ConnectionId>>,
}

impl HubState {
    fn active_listeners<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a ConnectionId>,
        out: &mut Vec<Listener>,
    ) {
        for id in ids {
            if let Some(entry) = self.connections.get(id) {
                if entry.connection.is_active() {
                    out.push(entry.listener());
                }
            }
        }
    }

    fn purge(&mut self, connection_id: &ConnectionId) -> Option<Connection> {
        let mut entry = self.connections.remove(connection_id)?;
        let (teams, blocks) = entry.connection.take_subscriptions();
        for team_id in &teams {
            remove_from_index(&mut self.by_team, team_id, connection_id);
        }
        for block_id in &blocks {
            remove_from_index(&mut self.by_block, block_id, connection_id);
        }
        if let Some(user_id) = entry.connection.user_id() {
            remove_from_index(&mut self.by_user, user_id, connection_id);
        }
        Some(entry.connection)
    }
}

fn remove_from_index<K: Eq + Hash>(
    index: &mut HashMap<K, HashSet<ConnectionId>>,
    key: &K,
    connection_id: &ConnectionId,
) {
    if let Some(set) = index.get_mut(key) {
        set.remove(connection_id);
        if set.is_empty() {
            index.remove(key);
        }
    }
}

/// Registry + subscription index for the connections attached to this node.
///
/// Constructed explicitly and shared by `Arc`; there is no process-wide
/// instance.
#[derive(Default)]
pub struct ListenerHub {
    state: RwLock<HubState>,
}

impl ListenerHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the connection, or reactivates an existing entry with the same
    /// ID, keeping its subscriptions and swapping in the new sink.
    ///
    /// A user supplied for an existing unauthenticated entry is bound to it;
    /// an already-bound identity is never replaced.
    pub async fn register(
        &self,
        connection_id: ConnectionId,
        user_id: Option<UserId>,
        sink: Arc<dyn ConnectionSink>,
    ) -> RegisterOutcome {
        let mut state = self.state.write().await;

        if let Some(entry) = state.connections.get_mut(&connection_id) {
            entry.connection.reactivate();
            entry.sink = sink;
            let mut newly_bound = None;
            if let Some(user_id) = user_id {
                match entry.connection.user_id() {
                    Some(existing) if existing != &user_id => {
                        tracing::warn!(
                            connection_id = %connection_id,
                            user_id = %existing,
                            attempted_user_id = %user_id,
                            "Reconnect presented a different user; keeping original identity"
                        );
                    }
                    Some(_) => {}
                    None => {
                        entry.connection.authenticate(user_id.clone());
                        newly_bound = Some(user_id);
                    }
                }
            }
            if let Some(user_id) = newly_bound {
                state
                    .by_user
                    .entry(user_id)
                    .or_default()
                    .insert(connection_id.clone());
            }
            tracing::debug!(connection_id = %connection_id, "Connection reactivated");
            return RegisterOutcome::Reactivated;
        }

        if let Some(user_id) = &user_id {
            state
                .by_user
                .entry(user_id.clone())
                .or_default()
                .insert(connection_id.clone());
        }
        let connection = Connection::new(connection_id.clone(), user_id);
        state
            .connections
            .insert(connection_id.clone(), Entry { connection, sink });
        tracing::debug!(connection_id = %connection_id, "Connection registered");
        RegisterOutcome::Created
    }

    /// Returns false for unknown IDs (a duplicate disconnect racing a purge).
    pub async fn mark_inactive(&self, connection_id: &ConnectionId) -> bool {
        let mut state = self.state.write().await;
        match state.connections.get_mut(connection_id) {
            Some(entry) => {
                entry.connection.mark_inactive(Timestamp::now());
                true
            }
            None => {
                tracing::debug!(
                    connection_id = %connection_id,
                    "Disconnect for unknown connection ignored"
                );
                false
            }
        }
    }

    /// Removes the connection and every index entry pointing at it.
    ///
    /// The returned connection has empty subscription sets.
    pub async fn purge(&self, connection_id: &ConnectionId) -> Option<Connection> {
        let purged = self.state.write().await.purge(connection_id);
        if purged.is_none() {
            tracing::debug!(connection_id = %connection_id, "Purge of unknown connection ignored");
        }
        purged
    }

    /// Purges the connection only while `sink` is still the one registered
    /// for it.
    ///
    /// A write that failed on a sink which a reconnect has since replaced
    /// leaves the connection alone.
    pub async fn purge_if_sink(
        &self,
        connection_id: &ConnectionId,
        sink: &Arc<dyn ConnectionSink>,
    ) -> Option<Connection> {
        let mut state = self.state.write().await;
        let current = state
            .connections
            .get(connection_id)
            .is_some_and(|entry| Arc::ptr_eq(&entry.sink, sink));
        if !current {
            tracing::debug!(connection_id = %connection_id, "Sink replaced or gone; purge skipped");
            return None;
        }
        state.purge(connection_id)
    }

    pub async fn lookup(&self, connection_id: &ConnectionId) -> Option<Connection> {
        self.state
            .read()
            .await
            .connections
            .get(connection_id)
            .map(|entry| entry.connection.clone())
    }

    pub async fn authenticate(
        &self,
        connection_id: &ConnectionId,
        user_id: UserId,
    ) -> AuthenticateOutcome {
        let mut state = self.state.write().await;
        let Some(entry) = state.connections.get_mut(connection_id) else {
            return AuthenticateOutcome::UnknownConnection;
        };
        if !entry.connection.authenticate(user_id.clone()) {
            return AuthenticateOutcome::AlreadyAuthenticated;
        }
        state
            .by_user
            .entry(user_id)
            .or_default()
            .insert(connection_id.clone());
        AuthenticateOutcome::Authenticated
    }

    /// Returns true if the subscription was added.
    pub async fn subscribe_team(&self, connection_id: &ConnectionId, team_id: &TeamId) -> bool {
        let mut state = self.state.write().await;
        let Some(entry) = state.connections.get_mut(connection_id) else {
            return false;
        };
        if !entry.connection.add_team(team_id.clone()) {
            return false;
        }
        state
            .by_team
            .entry(team_id.clone())
            .or_default()
            .insert(connection_id.clone());
        true
    }

    /// Returns true if a subscription was removed.
    pub async fn unsubscribe_team(&self, connection_id: &ConnectionId, team_id: &TeamId) -> bool {
        let mut state = self.state.write().await;
        let Some(entry) = state.connections.get_mut(connection_id) else {
            return false;
        };
        if !entry.connection.remove_team(team_id) {
            return false;
        }
        remove_from_index(&mut state.by_team, team_id, connection_id);
        true
    }

    /// Returns how many of `block_ids` were newly subscribed.
    pub async fn subscribe_blocks(
        &self,
        connection_id: &ConnectionId,
        block_ids: &[BlockId],
    ) -> usize {
        let mut state = self.state.write().await;
        let state = &mut *state;
        let Some(entry) = state.connections.get_mut(connection_id) else {
            return 0;
        };
        let mut added = 0;
        for block_id in block_ids {
            if entry.connection.add_block(block_id.clone()) {
                state
                    .by_block
                    .entry(block_id.clone())
                    .or_default()
                    .insert(connection_id.clone());
                added += 1;
            }
        }
        added
    }

    /// Returns how many of `block_ids` were removed.
    pub async fn unsubscribe_blocks(
        &self,
        connection_id: &ConnectionId,
        block_ids: &[BlockId],
    ) -> usize {
        let mut state = self.state.write().await;
        let state = &mut *state;
        let Some(entry) = state.connections.get_mut(connection_id) else {
            return 0;
        };
        let mut removed = 0;
        for block_id in block_ids {
            if entry.connection.remove_block(block_id) {
                remove_from_index(&mut state.by_block, block_id, connection_id);
                removed += 1;
            }
        }
        removed
    }

    pub async fn listeners_for_team(&self, team_id: &TeamId) -> Vec<Listener> {
        let state = self.state.read().await;
        let mut out = Vec::new();
        if let Some(ids) = state.by_team.get(team_id) {
            state.active_listeners(ids, &mut out);
        }
        out
    }

    pub async fn listeners_for_block(&self, block_id: &BlockId) -> Vec<Listener> {
        let state = self.state.read().await;
        let mut out = Vec::new();
        if let Some(ids) = state.by_block.get(block_id) {
            state.active_listeners(ids, &mut out);
        }
        out
    }

    /// Every active connection of any of `user_ids`.
    pub async fn listeners_for_users(&self, user_ids: &[UserId]) -> Vec<Listener> {
        let state = self.state.read().await;
        let mut out = Vec::new();
        for user_id in user_ids {
            if let Some(ids) = state.by_user.get(user_id) {
                state.active_listeners(ids, &mut out);
            }
        }
        out
    }

    pub async fn all_listeners(&self) -> Vec<Listener> {
        let state = self.state.read().await;
        let mut out = Vec::new();
        state.active_listeners(state.connections.keys(), &mut out);
        out
    }

    /// Resolves a broadcast scope in one read-lock acquisition.
    ///
    /// Team scope yields team listeners, then block listeners per key, then
    /// ensure-user connections. A connection matching several of these
    /// appears once per match.
    pub async fn listeners_for_scope(
        &self,
        scope: &BroadcastScope,
        ensure_users: &[UserId],
    ) -> Vec<Listener> {
        let state = self.state.read().await;
        let mut out = Vec::new();
        match scope {
            BroadcastScope::Everyone => {
                state.active_listeners(state.connections.keys(), &mut out);
                return out;
            }
            BroadcastScope::Team { team_id, block_ids } => {
                if let Some(ids) = state.by_team.get(team_id) {
                    state.active_listeners(ids, &mut out);
                }
                for block_id in block_ids {
                    if let Some(ids) = state.by_block.get(block_id) {
                        state.active_listeners(ids, &mut out);
                    }
                }
            }
        }
        for user_id in ensure_users {
            if let Some(ids) = state.by_user.get(user_id) {
                state.active_listeners(ids, &mut out);
            }
        }
        out
    }

    /// Purges `user_id`'s other connections that have been inactive for at
    /// least `threshold`. Active siblings are left alone.
    pub async fn reap_stale_for_user(
        &self,
        user_id: &UserId,
        threshold: Duration,
        except: &ConnectionId,
    ) -> Vec<ConnectionId> {
        let now = Timestamp::now();
        let mut state = self.state.write().await;
        let stale: Vec<ConnectionId> = state
            .by_user
            .get(user_id)
            .into_iter()
            .flatten()
            .filter(|id| *id != except)
            .filter(|id| {
                state
                    .connections
                    .get(*id)
                    .is_some_and(|entry| entry.connection.has_expired(threshold, now))
            })
            .cloned()
            .collect();
        for id in &stale {
            state.purge(id);
        }
        stale
    }

    /// Purges every connection inactive for at least `threshold`.
    pub async fn reap_stale(&self, threshold: Duration) -> Vec<ConnectionId> {
        let now = Timestamp::now();
        let mut state = self.state.write().await;
        let stale: Vec<ConnectionId> = state
            .connections
            .values()
            .filter(|entry| entry.connection.has_expired(threshold, now))
            .map(|entry| entry.connection.id().clone())
            .collect();
        for id in &stale {
            state.purge(id);
        }
        stale
    }

    pub async fn stats(&self) -> HubStats {
        let state = self.state.read().await;
        HubStats {
            connections: state.connections.len(),
            active_connections: state
                .connections
                .values()
                .filter(|entry| entry.connection.is_active())
                .count(),
            teams: state.by_team.len(),
            blocks: state.by_block.len(),
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }

    /// Checks that every forward subscription has its reverse index entry and
    /// vice versa, and that no reverse index holds an empty set.
    pub async fn verify_consistency(&self) -> Result<(), InvariantViolation> {
        let state = self.state.read().await;

        for (id, entry) in &state.connections {
            let conn = &entry.connection;
            for team_id in conn.teams() {
                if !state.by_team.get(team_id).is_some_and(|s| s.contains(id)) {
                    return Err(InvariantViolation(format!(
                        "{id} subscribed to team {team_id} but missing from index"
                    )));
                }
            }
            for block_id in conn.blocks() {
                if !state.by_block.get(block_id).is_some_and(|s| s.contains(id)) {
                    return Err(InvariantViolation(format!(
                        "{id} subscribed to block {block_id} but missing from index"
                    )));
                }
            }
            if let Some(user_id) = conn.user_id() {
                if !state.by_user.get(user_id).is_some_and(|s| s.contains(id)) {
                    return Err(InvariantViolation(format!(
                        "{id} belongs to {user_id} but missing from user index"
                    )));
                }
            }
        }

        check_reverse(&state, &state.by_team, "team", |c, k| c.is_subscribed_to_team(k))?;
        check_reverse(&state, &state.by_block, "block", |c, k| c.is_subscribed_to_block(k))?;
        check_reverse(&state, &state.by_user, "user", |c, k| c.user_id() == Some(k))?;
        Ok(())
    }
}

fn check_reverse<K: std::fmt::Display>(
    state: &HubState,
    index: &HashMap<K, HashSet<ConnectionId>>,
    kind: &str,
    holds: impl Fn(&Connection, &K) -> bool,
) -> Result<(), InvariantViolation> {
    for (key, ids) in index {
        if ids.is_empty() {
            return Err(InvariantViolation(format!("empty {kind} entry {key}")));
        }
        for id in ids {
            match state.connections.get(id) {
                Some(entry) if holds(&entry.connection, key) => {}
                Some(_) => {
                    return Err(InvariantViolation(format!(
                        "{kind} index lists {id} under {key} but connection disagrees"
                    )))
                }
                None => {
                    return Err(InvariantViolation(format!(
                        "{kind} index lists unknown connection {id} under {key}"
                    )))
                }
            }
        }
    }
    Ok(())
}
