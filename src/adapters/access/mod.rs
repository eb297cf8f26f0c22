//! Access adapters.
//!
//! Implementations of the `TeamAccessChecker` and `ReadTokenValidator` ports:
//!
//! - `single_team` - Standalone deployments with one implicit team
//! - `postgres` - Share-token lookup against the boards `sharing` table
//! - `mock` - Static grants for tests

mod mock;
mod postgres;
mod single_team;

pub use mock::{StaticReadTokens, StaticTeamAccess};
pub use postgres::PostgresReadTokenValidator;
pub use single_team::{SingleTeamAccess, DEFAULT_TEAM_ID};
