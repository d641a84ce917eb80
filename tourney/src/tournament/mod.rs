//! Tournament lifecycle: creation, enrollment, brackets, standings and the
//! credential-release countdown.
//!
//! Every operation lives on [`TournamentManager`]; the submodules split it
//! by lifecycle stage. Match arbitration and settlement build on the same
//! storage and are found in [`crate::matches`] and [`crate::settlement`].
//!
//! ## Example
//!
//! ```no_run
//! use tourney::db::Database;
//! use tourney::notifications::{LogNotifier, NotificationDispatcher};
//! use tourney::tournament::{NewTournament, TournamentManager};
//! use tourney::verification::SqlVerificationProvider;
//! use chrono::{Duration, Utc};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::in_memory().await?;
//!     let pool = Arc::new(db.pool().clone());
//!     let manager = TournamentManager::new(
//!         Arc::clone(&pool),
//!         Arc::new(SqlVerificationProvider::new(db.pool().clone())),
//!         NotificationDispatcher::new(Arc::new(LogNotifier)),
//!     );
//!
//!     let game = manager.create_game("Chess", "Blitz").await?;
//!     let start = Utc::now() + Duration::days(1);
//!     let tournament = manager
//!         .create_tournament(
//!             &NewTournament::individual("Open", game.id, start, start + Duration::hours(4))
//!                 .with_entry_fee(50),
//!         )
//!         .await?;
//!     println!("Created tournament {}", tournament.id);
//!     Ok(())
//! }
//! ```

pub mod bracket;
pub mod config;
pub mod countdown;
pub mod enrollment;
pub mod errors;
pub mod manager;
pub mod models;
pub mod standings;

pub use bracket::{Pairing, pair_entrants};
pub use config::{RELEASE_CREDENTIALS_ACTION, TournamentSettings};
pub use countdown::{CredentialRelease, ReleasePayload, release_key};
pub use errors::{TournamentError, TournamentResult};
pub use manager::TournamentManager;
pub use models::{
    BracketOutcome, Enrollment, Entrant, Game, GameId, MatchId, NewTournament, Participant,
    ParticipantStatus, PrizeStructure, ReportId, Scoring, Standing, SubmissionId, TeamRegistration,
    TopTournaments, Tournament, TournamentId, TournamentKind,
};
