//! Tournament manager: catalog, tournament records and shared lookups.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection, SqlitePool, sqlite::SqliteRow};
use std::sync::Arc;

use super::{
    config::TournamentSettings,
    errors::{TournamentError, TournamentResult},
    models::{
        Entrant, Game, GameId, NewTournament, TopTournaments, Tournament, TournamentId,
        TournamentKind,
    },
};
use crate::db::{begin_write, repository::load_user};
use crate::notifications::NotificationDispatcher;
use crate::scheduler::TaskScheduler;
use crate::users::{User, UserId};
use crate::verification::VerificationProvider;
use crate::wallet::WalletManager;

/// Number of tournaments returned per list by `top_tournaments`
const TOP_TOURNAMENTS_LIMIT: i64 = 10;

pub(crate) const TOURNAMENT_COLUMNS: &str = "id, name, game_id, kind, start_date, end_date, is_free, \
     entry_fee, required_verification_level, max_entrants, prize_distribution, rules, creator_id, \
     countdown_start_time, credentials_released_at, entry_code, room_id, completed_at, \
     champion_user_id, champion_team_id, created_at";

pub(crate) fn tournament_from_row(row: &SqliteRow) -> TournamentResult<Tournament> {
    let prizes: String = row.get("prize_distribution");
    let champion = match (
        row.get::<Option<i64>, _>("champion_user_id"),
        row.get::<Option<i64>, _>("champion_team_id"),
    ) {
        (Some(user), _) => Some(Entrant::User(user)),
        (None, Some(team)) => Some(Entrant::Team(team)),
        (None, None) => None,
    };

    Ok(Tournament {
        id: row.get("id"),
        name: row.get("name"),
        game_id: row.get("game_id"),
        kind: TournamentKind::parse(&row.get::<String, _>("kind")),
        start_date: row.get("start_date"),
        end_date: row.get("end_date"),
        is_free: row.get("is_free"),
        entry_fee: row.get("entry_fee"),
        required_verification_level: row.get("required_verification_level"),
        max_entrants: row.get("max_entrants"),
        prize_distribution: serde_json::from_str(&prizes)?,
        rules: row.get("rules"),
        creator_id: row.get("creator_id"),
        countdown_start_time: row.get("countdown_start_time"),
        credentials_released_at: row.get("credentials_released_at"),
        entry_code: row.get("entry_code"),
        room_id: row.get("room_id"),
        completed_at: row.get("completed_at"),
        champion,
        created_at: row.get("created_at"),
    })
}

/// Load a tournament on an existing connection or transaction
pub(crate) async fn load_tournament(
    conn: &mut SqliteConnection,
    tournament_id: TournamentId,
) -> TournamentResult<Tournament> {
    let row = sqlx::query(&format!(
        "SELECT {TOURNAMENT_COLUMNS} FROM tournaments WHERE id = ?1"
    ))
    .bind(tournament_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(TournamentError::TournamentNotFound(tournament_id))?;

    tournament_from_row(&row)
}

/// Load a user that must exist
pub(crate) async fn require_user(
    conn: &mut SqliteConnection,
    user_id: UserId,
) -> TournamentResult<User> {
    load_user(conn, user_id)
        .await?
        .ok_or(TournamentError::UserNotFound(user_id))
}

/// Load a user that must exist and be staff
pub(crate) async fn require_staff(
    conn: &mut SqliteConnection,
    user_id: UserId,
) -> TournamentResult<User> {
    let user = require_user(conn, user_id).await?;
    if !user.is_staff || !user.is_active {
        log::warn!("Staff operation attempted by non-staff user {}", user_id);
        return Err(TournamentError::PermissionDenied(
            "staff privileges required".to_string(),
        ));
    }
    Ok(user)
}

/// Tournament manager
///
/// Owns the ports the lifecycle operations need. Enrollment, bracket,
/// standings and countdown operations are implemented in their own modules
/// on this type.
#[derive(Clone)]
pub struct TournamentManager {
    pub(crate) pool: Arc<SqlitePool>,
    pub(crate) wallet: WalletManager,
    pub(crate) verifier: Arc<dyn VerificationProvider>,
    pub(crate) dispatcher: NotificationDispatcher,
    pub(crate) scheduler: TaskScheduler,
    pub(crate) settings: TournamentSettings,
}

impl TournamentManager {
    /// Create a new tournament manager
    pub fn new(
        pool: Arc<SqlitePool>,
        verifier: Arc<dyn VerificationProvider>,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self {
            wallet: WalletManager::new(Arc::clone(&pool)),
            scheduler: TaskScheduler::new(pool.as_ref().clone()),
            pool,
            verifier,
            dispatcher,
            settings: TournamentSettings::default(),
        }
    }

    /// Replace the default settings
    pub fn with_settings(mut self, settings: TournamentSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &TournamentSettings {
        &self.settings
    }

    pub fn wallet(&self) -> &WalletManager {
        &self.wallet
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    /// Add a game to the catalog
    pub async fn create_game(&self, name: &str, description: &str) -> TournamentResult<Game> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TournamentError::Validation("Game name must not be empty.".to_string()));
        }

        let id = sqlx::query("INSERT INTO games (name, description) VALUES (?1, ?2)")
            .bind(name)
            .bind(description)
            .execute(self.pool.as_ref())
            .await?
            .last_insert_rowid();

        Ok(Game {
            id,
            name: name.to_string(),
            description: description.to_string(),
        })
    }

    /// List the game catalog
    pub async fn list_games(&self) -> TournamentResult<Vec<Game>> {
        let rows = sqlx::query("SELECT id, name, description FROM games ORDER BY name, id")
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(rows
            .iter()
            .map(|row| Game {
                id: row.get("id"),
                name: row.get("name"),
                description: row.get("description"),
            })
            .collect())
    }

    /// Create a new tournament
    ///
    /// # Errors
    ///
    /// * `TournamentError::Validation` - Schedule, fee policy, verification level
    ///   or prize table is invalid, or the game does not exist
    pub async fn create_tournament(&self, new: &NewTournament) -> TournamentResult<Tournament> {
        new.validate().map_err(TournamentError::Validation)?;

        let mut tx = begin_write(&self.pool).await?;

        let game: Option<GameId> = sqlx::query("SELECT id FROM games WHERE id = ?1")
            .bind(new.game_id)
            .fetch_optional(&mut *tx)
            .await?
            .map(|r| r.get("id"));
        if game.is_none() {
            return Err(TournamentError::Validation(format!(
                "Unknown game: {}",
                new.game_id
            )));
        }

        if let Some(creator) = new.creator_id {
            require_user(&mut tx, creator).await?;
        }

        let id = sqlx::query(
            r#"
            INSERT INTO tournaments (name, game_id, kind, start_date, end_date, is_free, entry_fee,
                                     required_verification_level, max_entrants, prize_distribution,
                                     rules, creator_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(new.name.trim())
        .bind(new.game_id)
        .bind(new.kind.as_str())
        .bind(new.start_date)
        .bind(new.end_date)
        .bind(new.is_free)
        .bind(new.entry_fee)
        .bind(new.required_verification_level)
        .bind(new.max_entrants)
        .bind(serde_json::to_string(&new.prize_distribution)?)
        .bind(&new.rules)
        .bind(new.creator_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        let tournament = load_tournament(&mut tx, id).await?;
        tx.commit().await?;

        log::info!(
            "Created {} tournament {} '{}' (fee {})",
            tournament.kind,
            tournament.id,
            tournament.name,
            tournament.fee()
        );

        Ok(tournament)
    }

    /// Get a tournament by id
    pub async fn get_tournament(&self, tournament_id: TournamentId) -> TournamentResult<Tournament> {
        let mut conn = self.pool.acquire().await?;
        load_tournament(&mut conn, tournament_id).await
    }

    /// List all tournaments by start date
    pub async fn list_tournaments(&self) -> TournamentResult<Vec<Tournament>> {
        let rows = sqlx::query(&format!(
            "SELECT {TOURNAMENT_COLUMNS} FROM tournaments ORDER BY start_date, id"
        ))
        .fetch_all(self.pool.as_ref())
        .await?;

        rows.iter().map(tournament_from_row).collect()
    }

    /// Highest-stakes finished and upcoming tournaments relative to `now`
    pub async fn top_tournaments(&self, now: DateTime<Utc>) -> TournamentResult<TopTournaments> {
        let past = sqlx::query(&format!(
            "SELECT {TOURNAMENT_COLUMNS} FROM tournaments
             WHERE end_date < ?1
             ORDER BY COALESCE(entry_fee, 0) DESC, id
             LIMIT ?2"
        ))
        .bind(now)
        .bind(TOP_TOURNAMENTS_LIMIT)
        .fetch_all(self.pool.as_ref())
        .await?;

        let future = sqlx::query(&format!(
            "SELECT {TOURNAMENT_COLUMNS} FROM tournaments
             WHERE start_date > ?1
             ORDER BY COALESCE(entry_fee, 0) DESC, id
             LIMIT ?2"
        ))
        .bind(now)
        .bind(TOP_TOURNAMENTS_LIMIT)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(TopTournaments {
            past: past.iter().map(tournament_from_row).collect::<TournamentResult<_>>()?,
            future: future.iter().map(tournament_from_row).collect::<TournamentResult<_>>()?,
        })
    }

    /// Total number of tournaments
    pub async fn total_tournaments(&self) -> TournamentResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM tournaments")
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(row.get("total"))
    }
}
