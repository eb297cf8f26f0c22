//! Standalone-mode wiring.
//!
//! Assembles the dispatcher, socket server and stale sweep the binary
//! serves. The database is optional; without it only the single-user token
//! can authenticate.

use std::sync::Arc;

use axum::Router;
use sqlx::postgres::PgPoolOptions;

use crate::adapters::access::{PostgresReadTokenValidator, SingleTeamAccess, StaticReadTokens};
use crate::adapters::auth::PostgresSessionValidator;
use crate::adapters::realtime::{
    realtime_router, CommandDispatcher, ListenerHub, StaleConnectionReaper, StandaloneServer,
};
use crate::config::{DatabaseConfig, RealtimeConfig};
use crate::ports::{ReadTokenValidator, SessionValidator};

pub struct StandaloneRuntime {
    server: Arc<StandaloneServer>,
    reaper: StaleConnectionReaper,
}

impl StandaloneRuntime {
    /// Connects the boards database (when configured) and assembles the
    /// engine around it.
    pub async fn connect(
        realtime: &RealtimeConfig,
        database: Option<&DatabaseConfig>,
    ) -> Result<Self, sqlx::Error> {
        let Some(db) = database else {
            tracing::warn!("No database configured; only the single-user token can authenticate");
            return Ok(Self::assemble(realtime, Arc::new(StaticReadTokens::new()), None));
        };

        let pool = PgPoolOptions::new()
            .min_connections(db.min_connections)
            .max_connections(db.max_connections)
            .acquire_timeout(db.acquire_timeout())
            .idle_timeout(db.idle_timeout())
            .connect(&db.url)
            .await?;
        tracing::info!(table_prefix = %db.table_prefix, "Connected to boards database");

        let sessions = PostgresSessionValidator::new(pool.clone(), &db.table_prefix)
            .with_expiry(db.session_expiry());
        let read_tokens = PostgresReadTokenValidator::new(pool, &db.table_prefix);
        Ok(Self::assemble(
            realtime,
            Arc::new(read_tokens),
            Some(Arc::new(sessions)),
        ))
    }

    /// Wires the engine from already-built collaborators.
    pub fn assemble(
        realtime: &RealtimeConfig,
        read_tokens: Arc<dyn ReadTokenValidator>,
        sessions: Option<Arc<dyn SessionValidator>>,
    ) -> Self {
        let hub = Arc::new(ListenerHub::new());
        let mut dispatcher = CommandDispatcher::new(
            Arc::clone(&hub),
            Arc::new(SingleTeamAccess::default()),
            read_tokens,
        )
        .with_single_user_token(realtime.single_user_token.clone());
        if let Some(sessions) = sessions {
            dispatcher = dispatcher.with_session_validator(sessions);
        }

        let reaper = StaleConnectionReaper::new(
            hub,
            realtime.stale_threshold(),
            realtime.reap_interval(),
        );
        Self {
            server: Arc::new(StandaloneServer::new(Arc::new(dispatcher))),
            reaper,
        }
    }

    pub fn server(&self) -> &Arc<StandaloneServer> {
        &self.server
    }

    pub fn reaper(&self) -> &StaleConnectionReaper {
        &self.reaper
    }

    pub fn router(&self) -> Router {
        realtime_router(Arc::clone(&self.server))
    }

    pub fn into_reaper(self) -> StaleConnectionReaper {
        self.reaper
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use secrecy::SecretString;

    use crate::adapters::auth::MockSessionValidator;
    use crate::adapters::realtime::{DispatchOutcome, RecordingSink};
    use crate::domain::foundation::UserId;

    fn realtime(token: Option<&str>) -> RealtimeConfig {
        RealtimeConfig {
            single_user_token: token.map(|t| SecretString::new(t.to_string())),
            stale_threshold_secs: 42,
            ..RealtimeConfig::default()
        }
    }

    #[tokio::test]
    async fn single_user_token_and_sweep_settings_both_reach_the_engine() {
        let config = realtime(Some("local-secret"));
        let runtime = StandaloneRuntime::assemble(&config, Arc::new(StaticReadTokens::new()), None);

        let conn = runtime.server().open_connection(RecordingSink::new()).await;
        let auth = runtime
            .server()
            .handle_text(&conn, r#"{"action":"AUTH","token":"local-secret"}"#)
            .await;
        let subscribe = runtime
            .server()
            .handle_text(&conn, r#"{"action":"SUBSCRIBE_TEAM","teamId":"0"}"#)
            .await;

        assert_eq!(auth, DispatchOutcome::Applied);
        assert_eq!(subscribe, DispatchOutcome::Applied);
        assert_eq!(runtime.reaper().threshold(), Duration::from_secs(42));
        assert!(config.single_user_token.is_some());
    }

    #[tokio::test]
    async fn without_token_or_sessions_auth_closes_the_connection() {
        let runtime =
            StandaloneRuntime::assemble(&realtime(None), Arc::new(StaticReadTokens::new()), None);

        let conn = runtime.server().open_connection(RecordingSink::new()).await;
        let outcome = runtime
            .server()
            .handle_text(&conn, r#"{"action":"AUTH","token":"anything"}"#)
            .await;

        assert_eq!(outcome, DispatchOutcome::CloseConnection);
    }

    #[tokio::test]
    async fn session_validator_is_consulted_when_supplied() {
        let sessions = MockSessionValidator::new().with_user("valid", UserId::new("u1").unwrap());
        let runtime = StandaloneRuntime::assemble(
            &realtime(None),
            Arc::new(StaticReadTokens::new()),
            Some(Arc::new(sessions)),
        );

        let conn = runtime.server().open_connection(RecordingSink::new()).await;
        let outcome = runtime
            .server()
            .handle_text(&conn, r#"{"action":"AUTH","token":"valid"}"#)
            .await;

        assert_eq!(outcome, DispatchOutcome::Applied);
        let connection = runtime.server().hub().lookup(&conn).await.unwrap();
        assert!(connection.is_authenticated());
    }

    #[tokio::test]
    async fn missing_database_falls_back_to_static_collaborators() {
        let runtime = StandaloneRuntime::connect(&realtime(Some("t")), None)
            .await
            .unwrap();

        assert_eq!(runtime.server().hub().connection_count().await, 0);
        let _router = runtime.router();
    }
}
