//! Single-elimination bracket generation.

use chrono::Utc;
use log::info;
use sqlx::{Row, SqliteConnection};

use super::{
    errors::{TournamentError, TournamentResult},
    manager::{TournamentManager, load_tournament},
    models::{BracketOutcome, Entrant, MatchId, Tournament, TournamentId, TournamentKind},
};
use crate::db::{begin_write, is_unique_violation};
use crate::matches::models::{MATCH_COLUMNS, Match, entrant_columns, match_from_row};

/// One pairing produced for a round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pairing {
    pub first: Entrant,
    /// `None` gives `first` a bye
    pub second: Option<Entrant>,
}

/// Pair entrants sequentially: 1v2, 3v4, ...; an odd entrant out gets a bye
pub fn pair_entrants(pool: &[Entrant]) -> Vec<Pairing> {
    pool.chunks(2)
        .map(|pair| Pairing {
            first: pair[0],
            second: pair.get(1).copied(),
        })
        .collect()
}

/// Round 1 pool: eligible entrants in enrollment order
async fn initial_pool(conn: &mut SqliteConnection, tournament: &Tournament) -> TournamentResult<Vec<Entrant>> {
    let pool = match tournament.kind {
        TournamentKind::Individual => sqlx::query(
            "SELECT user_id FROM participants
             WHERE tournament_id = ?1 AND status IN ('registered', 'checked_in')
             ORDER BY id",
        )
        .bind(tournament.id)
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(|r| Entrant::User(r.get("user_id")))
        .collect(),
        TournamentKind::Team => sqlx::query(
            "SELECT team_id FROM tournament_teams WHERE tournament_id = ?1 ORDER BY id",
        )
        .bind(tournament.id)
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(|r| Entrant::Team(r.get("team_id")))
        .collect(),
    };
    Ok(pool)
}

async fn round_matches(
    conn: &mut SqliteConnection,
    tournament_id: TournamentId,
    round: i64,
) -> TournamentResult<Vec<Match>> {
    let rows = sqlx::query(&format!(
        "SELECT {MATCH_COLUMNS} FROM matches WHERE tournament_id = ?1 AND round = ?2 ORDER BY slot"
    ))
    .bind(tournament_id)
    .bind(round)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .iter()
        .map(match_from_row)
        .collect::<Result<Vec<_>, _>>()?)
}

async fn insert_match(
    conn: &mut SqliteConnection,
    tournament: &Tournament,
    round: i64,
    slot: i64,
    pairing: Pairing,
) -> TournamentResult<MatchId> {
    let (p1_user, p1_team) = entrant_columns(Some(pairing.first));
    let (p2_user, p2_team) = entrant_columns(pairing.second);
    // A bye is decided on creation
    let (winner_user, winner_team) = if pairing.second.is_none() {
        (p1_user, p1_team)
    } else {
        (None, None)
    };

    let id = sqlx::query(
        r#"
        INSERT INTO matches (tournament_id, match_type, round, slot,
                             participant1_user, participant2_user, participant1_team, participant2_team,
                             winner_user, winner_team, is_confirmed, is_disputed, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 0, ?12)
        "#,
    )
    .bind(tournament.id)
    .bind(tournament.kind.as_str())
    .bind(round)
    .bind(slot)
    .bind(p1_user)
    .bind(p2_user)
    .bind(p1_team)
    .bind(p2_team)
    .bind(winner_user)
    .bind(winner_team)
    .bind(pairing.second.is_none())
    .bind(Utc::now())
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        // Another caller generated this round first
        if is_unique_violation(&e) {
            TournamentError::RoundInProgress(round)
        } else {
            TournamentError::Database(e)
        }
    })?
    .last_insert_rowid();

    Ok(id)
}

impl TournamentManager {
    /// Generate the next round of the bracket
    ///
    /// The first call pairs the enrolled entrants. Each later call requires
    /// every match of the current round to be confirmed and undisputed, then
    /// pairs that round's winners in match order and eliminates the losers.
    /// When a single entrant remains the tournament is completed with that
    /// champion, and every further call reports the same outcome.
    ///
    /// # Errors
    ///
    /// * `TournamentError::NotEnoughParticipants` - Fewer than 2 eligible entrants for round 1
    /// * `TournamentError::RoundInProgress` - Current round has unconfirmed or disputed matches
    pub async fn generate_matches(&self, tournament_id: TournamentId) -> TournamentResult<BracketOutcome> {
        let mut tx = begin_write(&self.pool).await?;
        let tournament = load_tournament(&mut tx, tournament_id).await?;

        if let Some(champion) = tournament.champion {
            return Ok(BracketOutcome::Complete { champion });
        }

        let current_round: Option<i64> =
            sqlx::query("SELECT MAX(round) AS round FROM matches WHERE tournament_id = ?1")
                .bind(tournament_id)
                .fetch_one(&mut *tx)
                .await?
                .get("round");

        let (round, pool) = match current_round {
            None => {
                let pool = initial_pool(&mut tx, &tournament).await?;
                if pool.len() < 2 {
                    return Err(TournamentError::NotEnoughParticipants {
                        needed: 2,
                        current: pool.len(),
                    });
                }
                (1, pool)
            }
            Some(round) => {
                let matches = round_matches(&mut tx, tournament_id, round).await?;
                if matches.iter().any(|m| !m.is_settled()) {
                    return Err(TournamentError::RoundInProgress(round));
                }

                let mut winners = Vec::with_capacity(matches.len());
                for m in &matches {
                    let winner = m.winner.ok_or(TournamentError::RoundInProgress(round))?;
                    winners.push(winner);

                    if let Some(Entrant::User(loser)) = m.opponent_of(winner) {
                        sqlx::query(
                            "UPDATE participants SET status = 'eliminated'
                             WHERE tournament_id = ?1 AND user_id = ?2 AND status != 'eliminated'",
                        )
                        .bind(tournament_id)
                        .bind(loser)
                        .execute(&mut *tx)
                        .await?;
                    }
                }

                if let [champion] = *winners.as_slice() {
                    let (champion_user, champion_team) = entrant_columns(Some(champion));
                    sqlx::query(
                        "UPDATE tournaments
                         SET completed_at = ?1, champion_user_id = ?2, champion_team_id = ?3
                         WHERE id = ?4 AND completed_at IS NULL",
                    )
                    .bind(Utc::now())
                    .bind(champion_user)
                    .bind(champion_team)
                    .bind(tournament_id)
                    .execute(&mut *tx)
                    .await?;
                    tx.commit().await?;

                    info!(
                        "Tournament {} complete after round {}, champion {:?}",
                        tournament_id, round, champion
                    );
                    return Ok(BracketOutcome::Complete { champion });
                }

                (round + 1, winners)
            }
        };

        let pairings = pair_entrants(&pool);
        let byes = pairings.iter().filter(|p| p.second.is_none()).count();
        let mut match_ids = Vec::with_capacity(pairings.len());
        for (slot, pairing) in pairings.into_iter().enumerate() {
            match_ids.push(insert_match(&mut tx, &tournament, round, slot as i64, pairing).await?);
        }

        tx.commit().await?;

        info!(
            "Generated round {} of tournament {}: {} match(es), {} bye(s)",
            round,
            tournament_id,
            match_ids.len(),
            byes
        );

        Ok(BracketOutcome::Round {
            round,
            match_ids,
            byes,
        })
    }
}
