//! Standings and winner selection.

use sqlx::{Row, SqliteConnection};

use super::{
    errors::TournamentResult,
    manager::{TournamentManager, load_tournament, require_staff, require_user},
    models::{Scoring, Standing, TournamentId},
};
use crate::db::begin_write;
use crate::users::UserId;

/// Ranked scorings of a tournament, best first
///
/// Ties go to the earlier enrollment; users without a participant row (team
/// tournaments) follow enrolled users on a tie, in scoring order.
pub(crate) async fn top_standings(
    conn: &mut SqliteConnection,
    tournament_id: TournamentId,
    limit: usize,
) -> Result<Vec<Standing>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT s.user_id, s.score
         FROM scorings s
         LEFT JOIN participants p
                ON p.tournament_id = s.tournament_id AND p.user_id = s.user_id
         WHERE s.tournament_id = ?1
         ORDER BY s.score DESC, p.id IS NULL, p.id, s.id
         LIMIT ?2",
    )
    .bind(tournament_id)
    .bind(i64::try_from(limit).unwrap_or(i64::MAX))
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .iter()
        .enumerate()
        .map(|(i, row)| Standing {
            rank: i + 1,
            user_id: row.get("user_id"),
            score: row.get("score"),
        })
        .collect())
}

impl TournamentManager {
    /// Top ranked users, at most `settings.top_n` of them
    pub async fn get_tournament_winners(&self, tournament_id: TournamentId) -> TournamentResult<Vec<Standing>> {
        let mut conn = self.pool.acquire().await?;
        load_tournament(&mut conn, tournament_id).await?;
        Ok(top_standings(&mut conn, tournament_id, self.settings.top_n).await?)
    }

    /// Record a user's score in a tournament (staff only)
    pub async fn set_score(
        &self,
        tournament_id: TournamentId,
        staff_id: UserId,
        user_id: UserId,
        score: i64,
    ) -> TournamentResult<Scoring> {
        let mut tx = begin_write(&self.pool).await?;
        require_staff(&mut tx, staff_id).await?;
        load_tournament(&mut tx, tournament_id).await?;
        require_user(&mut tx, user_id).await?;

        sqlx::query(
            "INSERT INTO scorings (tournament_id, user_id, score) VALUES (?1, ?2, ?3)
             ON CONFLICT (tournament_id, user_id) DO UPDATE SET score = excluded.score",
        )
        .bind(tournament_id)
        .bind(user_id)
        .bind(score)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Scoring {
            tournament_id,
            user_id,
            score,
        })
    }

    /// All scorings of a tournament in ranking order
    pub async fn scores(&self, tournament_id: TournamentId) -> TournamentResult<Vec<Scoring>> {
        let mut conn = self.pool.acquire().await?;
        let standings = top_standings(&mut conn, tournament_id, usize::MAX).await?;

        Ok(standings
            .into_iter()
            .map(|s| Scoring {
                tournament_id,
                user_id: s.user_id,
                score: s.score,
            })
            .collect())
    }
}
