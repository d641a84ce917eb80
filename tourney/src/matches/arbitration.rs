//! Match arbitration: result confirmation, disputes and result proofs.
//!
//! A match moves between three observable states: open (neither flag set),
//! confirmed (winner recorded) and disputed (winner cleared, report opened).
//! Transitions are conditional updates on the match row, so two actors
//! racing on the same match cannot both succeed with different outcomes.

use chrono::Utc;
use log::{info, warn};
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;

use super::{
    evidence::EvidenceStore,
    models::{
        MATCH_COLUMNS, Match, REPORT_COLUMNS, Report, entrant_columns, load_match,
        match_from_row, report_from_row,
    },
};
use crate::db::{begin_write, repository::load_team};
use crate::notifications::{Notification, NotificationDispatcher, NotificationKind, Outbound};
use crate::tournament::{
    Entrant, MatchId, TournamentError, TournamentId, TournamentResult,
    manager::require_user,
};
use crate::users::UserId;

/// Whether `user_id` acts for `side`: the user itself, or the captain,
/// a standing member, or a tournament roster member of the team
pub(crate) async fn acts_for(
    conn: &mut SqliteConnection,
    tournament_id: TournamentId,
    side: Entrant,
    user_id: UserId,
) -> TournamentResult<bool> {
    match side {
        Entrant::User(id) => Ok(id == user_id),
        Entrant::Team(team_id) => {
            if let Some(team) = load_team(conn, team_id).await? {
                if team.includes(user_id) {
                    return Ok(true);
                }
            }
            let on_roster = sqlx::query(
                "SELECT 1 FROM tournament_team_members
                 WHERE tournament_id = ?1 AND team_id = ?2 AND user_id = ?3",
            )
            .bind(tournament_id)
            .bind(team_id)
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await?;
            Ok(on_roster.is_some())
        }
    }
}

/// The side `actor` plays for, or `PermissionDenied`
pub(crate) async fn side_of(
    conn: &mut SqliteConnection,
    m: &Match,
    actor: UserId,
) -> TournamentResult<Entrant> {
    for side in m.sides() {
        if acts_for(conn, m.tournament_id, side, actor).await? {
            return Ok(side);
        }
    }
    Err(TournamentError::PermissionDenied(
        "not a participant of this match".to_string(),
    ))
}

/// User answerable for a side: the user, or the team captain
pub(crate) async fn representative_of(conn: &mut SqliteConnection, side: Entrant) -> TournamentResult<UserId> {
    match side {
        Entrant::User(id) => Ok(id),
        Entrant::Team(team_id) => Ok(load_team(conn, team_id)
            .await?
            .ok_or(TournamentError::TeamNotFound(team_id))?
            .captain_id),
    }
}

pub(crate) async fn insert_report(
    conn: &mut SqliteConnection,
    reporter_id: UserId,
    reported_user_id: UserId,
    match_id: MatchId,
    description: &str,
    evidence: Option<&str>,
) -> TournamentResult<Report> {
    let row = sqlx::query(&format!(
        "INSERT INTO reports (reporter_id, reported_user_id, match_id, description, evidence, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6)
         RETURNING {REPORT_COLUMNS}"
    ))
    .bind(reporter_id)
    .bind(reported_user_id)
    .bind(match_id)
    .bind(description.trim())
    .bind(evidence)
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await?;

    Ok(report_from_row(&row))
}

/// A confirmed, disputed or conflicting match blocks a new confirmation;
/// `Ok` means the requested result is already in place
fn existing_result(m: &Match, winner: Entrant) -> TournamentResult<()> {
    if m.is_disputed {
        Err(TournamentError::MatchDisputed(m.id))
    } else if m.winner == Some(winner) {
        Ok(())
    } else {
        Err(TournamentError::ResultAlreadyConfirmed(m.id))
    }
}

/// Match arbiter
#[derive(Clone)]
pub struct MatchArbiter {
    pub(crate) pool: Arc<SqlitePool>,
    pub(crate) dispatcher: NotificationDispatcher,
    pub(crate) evidence: Arc<dyn EvidenceStore>,
}

impl MatchArbiter {
    pub fn new(
        pool: Arc<SqlitePool>,
        dispatcher: NotificationDispatcher,
        evidence: Arc<dyn EvidenceStore>,
    ) -> Self {
        Self {
            pool,
            dispatcher,
            evidence,
        }
    }

    /// Get a match by id
    pub async fn get_match(&self, match_id: MatchId) -> TournamentResult<Match> {
        let mut conn = self.pool.acquire().await?;
        load_match(&mut conn, match_id)
            .await?
            .ok_or(TournamentError::MatchNotFound(match_id))
    }

    /// Matches of a tournament, optionally restricted to one round
    pub async fn matches_for(
        &self,
        tournament_id: TournamentId,
        round: Option<i64>,
    ) -> TournamentResult<Vec<Match>> {
        let rows = sqlx::query(&format!(
            "SELECT {MATCH_COLUMNS} FROM matches
             WHERE tournament_id = ?1 AND (?2 IS NULL OR round = ?2)
             ORDER BY round, slot"
        ))
        .bind(tournament_id)
        .bind(round)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows
            .iter()
            .map(match_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    /// Confirm the winner of a match
    ///
    /// Confirming the winner already on record succeeds without change.
    ///
    /// # Errors
    ///
    /// * `TournamentError::PermissionDenied` - Actor does not play in the match
    /// * `TournamentError::InvalidWinner` - Winner is not one of the sides
    /// * `TournamentError::MatchDisputed` - Match is under dispute
    /// * `TournamentError::ResultAlreadyConfirmed` - A different winner is on record
    pub async fn confirm_result(
        &self,
        match_id: MatchId,
        actor: UserId,
        winner: Entrant,
    ) -> TournamentResult<Match> {
        let mut tx = begin_write(&self.pool).await?;

        let m = load_match(&mut tx, match_id)
            .await?
            .ok_or(TournamentError::MatchNotFound(match_id))?;
        side_of(&mut tx, &m, actor).await?;

        if !m.has_side(winner) {
            return Err(TournamentError::InvalidWinner);
        }
        if m.is_disputed || m.is_confirmed {
            existing_result(&m, winner)?;
            return Ok(m);
        }

        let (winner_user, winner_team) = entrant_columns(Some(winner));
        let result = sqlx::query(
            "UPDATE matches SET winner_user = ?1, winner_team = ?2, is_confirmed = 1
             WHERE id = ?3 AND is_confirmed = 0 AND is_disputed = 0",
        )
        .bind(winner_user)
        .bind(winner_team)
        .bind(match_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let current = load_match(&mut tx, match_id)
                .await?
                .ok_or(TournamentError::MatchNotFound(match_id))?;
            existing_result(&current, winner)?;
            return Ok(current);
        }

        let confirmed = load_match(&mut tx, match_id)
            .await?
            .ok_or(TournamentError::MatchNotFound(match_id))?;
        tx.commit().await?;

        info!(
            "Match {} confirmed by user {}: winner {:?}",
            match_id, actor, winner
        );
        Ok(confirmed)
    }

    /// Dispute a match result
    ///
    /// Clears any confirmed result, flags the match and opens a pending
    /// report against the opposing side (its captain for team matches).
    ///
    /// # Errors
    ///
    /// * `TournamentError::EmptyReason` - Reason is blank
    /// * `TournamentError::PermissionDenied` - Actor does not play in the match, or the match is a bye
    /// * `TournamentError::MatchDisputed` - Match is already disputed
    pub async fn dispute_result(
        &self,
        match_id: MatchId,
        actor: UserId,
        reason: &str,
    ) -> TournamentResult<Report> {
        if reason.trim().is_empty() {
            return Err(TournamentError::EmptyReason);
        }

        let mut tx = begin_write(&self.pool).await?;

        let m = load_match(&mut tx, match_id)
            .await?
            .ok_or(TournamentError::MatchNotFound(match_id))?;
        if m.is_bye() {
            return Err(TournamentError::PermissionDenied(
                "a bye cannot be disputed".to_string(),
            ));
        }
        let side = side_of(&mut tx, &m, actor).await?;
        let opponent = m
            .opponent_of(side)
            .ok_or_else(|| {
                TournamentError::PermissionDenied("match has no opponent".to_string())
            })?;
        let reported = representative_of(&mut tx, opponent).await?;

        let result = sqlx::query(
            "UPDATE matches
             SET is_disputed = 1, is_confirmed = 0, winner_user = NULL, winner_team = NULL
             WHERE id = ?1 AND is_disputed = 0",
        )
        .bind(match_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(TournamentError::MatchDisputed(match_id));
        }

        let report = insert_report(&mut tx, actor, reported, match_id, reason, None).await?;
        tx.commit().await?;

        warn!(
            "Match {} disputed by user {} (report {} against user {})",
            match_id, actor, report.id, reported
        );
        self.dispatcher.dispatch(vec![Outbound::InApp(Notification::new(
            reported,
            NotificationKind::ReportNew,
            format!("A result you were part of was disputed: {}", report.description),
        ))]);

        Ok(report)
    }

    /// Attach an evidence reference to the match
    pub async fn attach_result_proof(
        &self,
        match_id: MatchId,
        actor: UserId,
        reference: &str,
    ) -> TournamentResult<Match> {
        if reference.trim().is_empty() {
            return Err(TournamentError::Validation(
                "Evidence reference must not be empty.".to_string(),
            ));
        }

        let mut tx = begin_write(&self.pool).await?;
        let m = load_match(&mut tx, match_id)
            .await?
            .ok_or(TournamentError::MatchNotFound(match_id))?;
        side_of(&mut tx, &m, actor).await?;

        sqlx::query("UPDATE matches SET result_proof = ?1 WHERE id = ?2")
            .bind(reference.trim())
            .bind(match_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Match {
            result_proof: Some(reference.trim().to_string()),
            ..m
        })
    }

    /// Fetch the result proof bytes; match participants and staff only
    pub async fn result_proof(&self, match_id: MatchId, viewer: UserId) -> TournamentResult<Vec<u8>> {
        let reference = {
            let mut conn = self.pool.acquire().await?;
            let m = load_match(&mut conn, match_id)
                .await?
                .ok_or(TournamentError::MatchNotFound(match_id))?;
            let user = require_user(&mut conn, viewer).await?;
            if !user.is_staff {
                side_of(&mut conn, &m, viewer).await?;
            }
            m.result_proof.ok_or_else(|| {
                TournamentError::Validation("No result proof attached.".to_string())
            })?
        };

        Ok(self.evidence.fetch(&reference).await?)
    }
}
