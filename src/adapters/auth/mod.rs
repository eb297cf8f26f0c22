//! Authentication adapters.
//!
//! Implementations of the `SessionValidator` port:
//!
//! - `mock` - Test implementation that doesn't require a session store
//! - `postgres` - Production lookup against the boards `sessions` table

mod mock;
mod postgres;

pub use mock::MockSessionValidator;
pub use postgres::{PostgresSessionValidator, DEFAULT_SESSION_EXPIRY};
