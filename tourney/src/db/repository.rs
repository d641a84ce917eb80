//! Repository trait definitions for the user and team directory.
//!
//! Trait-based abstractions keep the directory swappable. The engine's own
//! transactional code uses the `load_*` helpers directly on a transaction
//! connection so that reads and writes share one atomic unit.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqliteConnection, SqlitePool, sqlite::SqliteRow};

use super::is_unique_violation;
use crate::users::{NewUser, Team, TeamId, User, UserError, UserId, UserResult};

/// Trait for user directory operations
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user
    async fn create_user(&self, user: &NewUser) -> UserResult<User>;

    /// Find user by ID
    async fn find_by_id(&self, user_id: UserId) -> UserResult<Option<User>>;

    /// Find user by username
    async fn find_by_username(&self, username: &str) -> UserResult<Option<User>>;

    /// Update the user's global score
    async fn set_score(&self, user_id: UserId, score: i64) -> UserResult<()>;

    /// Deactivate user account
    async fn deactivate_user(&self, user_id: UserId) -> UserResult<()>;
}

/// Trait for team directory operations
#[async_trait]
pub trait TeamRepository: Send + Sync {
    /// Create a team with its captain and standing members
    async fn create_team(
        &self,
        name: &str,
        captain_id: UserId,
        members: &[UserId],
    ) -> UserResult<Team>;

    /// Find team by ID
    async fn find_by_id(&self, team_id: TeamId) -> UserResult<Option<Team>>;

    /// Add a standing member
    async fn add_member(&self, team_id: TeamId, user_id: UserId) -> UserResult<()>;
}

pub(crate) const USER_COLUMNS: &str =
    "id, username, email, phone_number, score, is_active, is_staff, created_at";

pub(crate) fn user_from_row(row: &SqliteRow) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        phone_number: row.get("phone_number"),
        score: row.get("score"),
        is_active: row.get("is_active"),
        is_staff: row.get("is_staff"),
        created_at: row.get("created_at"),
    }
}

/// Load a user on an existing connection or transaction
pub(crate) async fn load_user(
    conn: &mut SqliteConnection,
    user_id: UserId,
) -> Result<Option<User>, sqlx::Error> {
    let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.as_ref().map(user_from_row))
}

/// Load a team and its standing members on an existing connection
pub(crate) async fn load_team(
    conn: &mut SqliteConnection,
    team_id: TeamId,
) -> Result<Option<Team>, sqlx::Error> {
    let Some(row) = sqlx::query("SELECT id, name, captain_id, created_at FROM teams WHERE id = ?1")
        .bind(team_id)
        .fetch_optional(&mut *conn)
        .await?
    else {
        return Ok(None);
    };

    let members = sqlx::query("SELECT user_id FROM team_members WHERE team_id = ?1 ORDER BY user_id")
        .bind(team_id)
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(|r| r.get::<i64, _>("user_id"))
        .collect();

    Ok(Some(Team {
        id: row.get("id"),
        name: row.get("name"),
        captain_id: row.get("captain_id"),
        members,
        created_at: row.get("created_at"),
    }))
}

/// Default SQLite implementation of `UserRepository`
#[derive(Clone)]
pub struct SqlUserRepository {
    pool: SqlitePool,
}

impl SqlUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for SqlUserRepository {
    async fn create_user(&self, user: &NewUser) -> UserResult<User> {
        let username = user.username.trim();
        if username.is_empty() || username.len() > 150 {
            return Err(UserError::InvalidUsername(user.username.clone()));
        }

        let result = sqlx::query(
            "INSERT INTO users (username, email, phone_number, score, is_staff, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(username)
        .bind(&user.email)
        .bind(&user.phone_number)
        .bind(user.score)
        .bind(user.is_staff)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                UserError::UsernameTaken
            } else {
                UserError::Database(e)
            }
        })?;

        let user_id = result.last_insert_rowid();
        self.find_by_id(user_id)
            .await?
            .ok_or(UserError::UserNotFound(user_id))
    }

    async fn find_by_id(&self, user_id: UserId) -> UserResult<Option<User>> {
        let mut conn = self.pool.acquire().await?;
        Ok(load_user(&mut conn, user_id).await?)
    }

    async fn find_by_username(&self, username: &str) -> UserResult<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = ?1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    async fn set_score(&self, user_id: UserId, score: i64) -> UserResult<()> {
        let result = sqlx::query("UPDATE users SET score = ?1 WHERE id = ?2")
            .bind(score)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(UserError::UserNotFound(user_id));
        }
        Ok(())
    }

    async fn deactivate_user(&self, user_id: UserId) -> UserResult<()> {
        let result = sqlx::query("UPDATE users SET is_active = 0 WHERE id = ?1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(UserError::UserNotFound(user_id));
        }
        Ok(())
    }
}

/// Default SQLite implementation of `TeamRepository`
#[derive(Clone)]
pub struct SqlTeamRepository {
    pool: SqlitePool,
}

impl SqlTeamRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TeamRepository for SqlTeamRepository {
    async fn create_team(
        &self,
        name: &str,
        captain_id: UserId,
        members: &[UserId],
    ) -> UserResult<Team> {
        let mut tx = super::begin_write(&self.pool).await?;

        if load_user(&mut tx, captain_id).await?.is_none() {
            return Err(UserError::UserNotFound(captain_id));
        }

        let team_id = sqlx::query("INSERT INTO teams (name, captain_id, created_at) VALUES (?1, ?2, ?3)")
            .bind(name)
            .bind(captain_id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

        for &member in members {
            if load_user(&mut tx, member).await?.is_none() {
                return Err(UserError::UserNotFound(member));
            }
            sqlx::query("INSERT OR IGNORE INTO team_members (team_id, user_id) VALUES (?1, ?2)")
                .bind(team_id)
                .bind(member)
                .execute(&mut *tx)
                .await?;
        }

        let team = load_team(&mut tx, team_id)
            .await?
            .ok_or(UserError::TeamNotFound(team_id))?;
        tx.commit().await?;

        Ok(team)
    }

    async fn find_by_id(&self, team_id: TeamId) -> UserResult<Option<Team>> {
        let mut conn = self.pool.acquire().await?;
        Ok(load_team(&mut conn, team_id).await?)
    }

    async fn add_member(&self, team_id: TeamId, user_id: UserId) -> UserResult<()> {
        let mut conn = self.pool.acquire().await?;
        if load_team(&mut conn, team_id).await?.is_none() {
            return Err(UserError::TeamNotFound(team_id));
        }
        if load_user(&mut conn, user_id).await?.is_none() {
            return Err(UserError::UserNotFound(user_id));
        }

        sqlx::query("INSERT OR IGNORE INTO team_members (team_id, user_id) VALUES (?1, ?2)")
            .bind(team_id)
            .bind(user_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}
