//! User and team directory.
//!
//! Authentication and identity issuance live outside the engine; this module
//! only holds what the tournament rules read: the global score, the ban flag,
//! staff status, contact details for notifications, and team rosters.

pub mod errors;
pub mod models;

pub use errors::{UserError, UserResult};
pub use models::{NewUser, Team, TeamId, User, UserId};
