//! Settlement engine: prizes, refunds and winner-submission review.
//!
//! Every payout first inserts a row into `settlements`, unique per
//! (tournament, user, kind), inside the transaction that credits the
//! wallet. A replay hits the constraint and fails with `AlreadySettled`
//! before any money moves. An entry settles one way: a refunded entry
//! collects no prize, and an entry holding a prize cannot be refunded.

use chrono::Utc;
use log::info;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::sync::Arc;

use super::models::{
    Review, SETTLEMENT_COLUMNS, SUBMISSION_COLUMNS, Settlement, SettlementKind, SubmissionStatus,
    WinnerSubmission, settlement_from_row, submission_from_row,
};
use crate::db::{begin_write, is_unique_violation};
use crate::notifications::{Notification, NotificationDispatcher, NotificationKind, Outbound};
use crate::tournament::{
    SubmissionId, Tournament, TournamentError, TournamentId, TournamentResult, TournamentSettings,
    manager::{load_tournament, require_staff, require_user},
    standings::top_standings,
};
use crate::users::UserId;
use crate::wallet::{EntryType, Posting, WalletManager};

async fn insert_marker(
    conn: &mut SqliteConnection,
    tournament_id: TournamentId,
    user_id: UserId,
    kind: SettlementKind,
    amount: i64,
    submission_id: Option<SubmissionId>,
) -> TournamentResult<Settlement> {
    let sql = format!(
        "INSERT INTO settlements (tournament_id, user_id, kind, amount, submission_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         RETURNING {SETTLEMENT_COLUMNS}"
    );
    let row = sqlx::query(&sql)
        .bind(tournament_id)
        .bind(user_id)
        .bind(kind.as_str())
        .bind(amount)
        .bind(submission_id)
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                TournamentError::AlreadySettled {
                    tournament_id,
                    user_id,
                    kind: kind.to_string(),
                }
            } else {
                TournamentError::Database(e)
            }
        })?;

    Ok(settlement_from_row(&row))
}

async fn find_marker(
    conn: &mut SqliteConnection,
    tournament_id: TournamentId,
    user_id: UserId,
    kind: SettlementKind,
) -> TournamentResult<Option<Settlement>> {
    let sql = format!(
        "SELECT {SETTLEMENT_COLUMNS} FROM settlements
         WHERE tournament_id = ?1 AND user_id = ?2 AND kind = ?3"
    );
    let row = sqlx::query(&sql)
        .bind(tournament_id)
        .bind(user_id)
        .bind(kind.as_str())
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.as_ref().map(settlement_from_row))
}

/// A prize already paid to anyone covered by `payer`'s entry: the payer
/// themselves, or a roster member of the team they paid for
async fn prize_for_entry(
    conn: &mut SqliteConnection,
    tournament_id: TournamentId,
    payer: UserId,
) -> TournamentResult<Option<Settlement>> {
    let sql = format!(
        "SELECT {SETTLEMENT_COLUMNS} FROM settlements
         WHERE tournament_id = ?1 AND kind = 'prize'
           AND (user_id = ?2
                OR user_id IN (SELECT m.user_id
                               FROM tournament_team_members m
                               JOIN tournament_teams tt
                                 ON tt.tournament_id = m.tournament_id AND tt.team_id = m.team_id
                               WHERE tt.tournament_id = ?1 AND tt.paid_by = ?2))
         ORDER BY id
         LIMIT 1"
    );
    let row = sqlx::query(&sql)
        .bind(tournament_id)
        .bind(payer)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.as_ref().map(settlement_from_row))
}

fn already_settled(settlement: &Settlement) -> TournamentError {
    TournamentError::AlreadySettled {
        tournament_id: settlement.tournament_id,
        user_id: settlement.user_id,
        kind: settlement.kind.to_string(),
    }
}

/// Entries that paid a fee: participants plus registered teams
async fn paying_entries(conn: &mut SqliteConnection, tournament_id: TournamentId) -> TournamentResult<usize> {
    let count: i64 = sqlx::query(
        "SELECT (SELECT COUNT(*) FROM participants WHERE tournament_id = ?1 AND fee_paid > 0)
              + (SELECT COUNT(*) FROM tournament_teams WHERE tournament_id = ?1 AND fee_paid > 0)
              AS paying",
    )
    .bind(tournament_id)
    .fetch_one(&mut *conn)
    .await?
    .get("paying");

    Ok(usize::try_from(count).unwrap_or(0))
}

/// Who paid for `user_id`'s entry, and how much
///
/// Individual entrants paid for themselves; team entrants (captain or
/// roster member) were paid for by the captain.
async fn payer_of(
    conn: &mut SqliteConnection,
    tournament_id: TournamentId,
    user_id: UserId,
) -> TournamentResult<Option<(UserId, i64)>> {
    let own = sqlx::query("SELECT fee_paid FROM participants WHERE tournament_id = ?1 AND user_id = ?2")
        .bind(tournament_id)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;
    if let Some(row) = own {
        return Ok(Some((user_id, row.get("fee_paid"))));
    }

    let team = sqlx::query(
        "SELECT tt.paid_by, tt.fee_paid
         FROM tournament_teams tt
         WHERE tt.tournament_id = ?1
           AND (tt.paid_by = ?2
                OR EXISTS (SELECT 1 FROM tournament_team_members m
                           WHERE m.tournament_id = tt.tournament_id
                             AND m.team_id = tt.team_id
                             AND m.user_id = ?2))
         LIMIT 1",
    )
    .bind(tournament_id)
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(team.map(|row| (row.get("paid_by"), row.get("fee_paid"))))
}

async fn load_submission(
    conn: &mut SqliteConnection,
    submission_id: SubmissionId,
) -> TournamentResult<WinnerSubmission> {
    let sql = format!("SELECT {SUBMISSION_COLUMNS} FROM winner_submissions WHERE id = ?1");
    sqlx::query(&sql)
        .bind(submission_id)
        .fetch_optional(&mut *conn)
        .await?
        .as_ref()
        .map(submission_from_row)
        .ok_or(TournamentError::SubmissionNotFound(submission_id))
}

fn submission_notice(submission: &WinnerSubmission, message: String) -> Outbound {
    Outbound::InApp(Notification::new(
        submission.winner_id,
        NotificationKind::WinnerSubmissionStatusChange,
        message,
    ))
}

/// Settlement engine
#[derive(Clone)]
pub struct SettlementEngine {
    pool: Arc<SqlitePool>,
    wallet: WalletManager,
    dispatcher: NotificationDispatcher,
    settings: TournamentSettings,
}

impl SettlementEngine {
    pub fn new(pool: Arc<SqlitePool>, dispatcher: NotificationDispatcher) -> Self {
        Self {
            wallet: WalletManager::new(Arc::clone(&pool)),
            pool,
            dispatcher,
            settings: TournamentSettings::default(),
        }
    }

    /// Replace the default settings (only `top_n` is used here)
    pub fn with_settings(mut self, settings: TournamentSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Pay the prize for the winner's current rank
    ///
    /// # Errors
    ///
    /// * `TournamentError::PermissionDenied` - Winner is not in the top N
    /// * `TournamentError::AlreadySettled` - Prize was already paid, or the entry was refunded
    pub async fn pay_prize(&self, tournament_id: TournamentId, winner_id: UserId) -> TournamentResult<Settlement> {
        let mut tx = begin_write(&self.pool).await?;
        let tournament = load_tournament(&mut tx, tournament_id).await?;
        let settlement = self.pay_prize_in(&mut tx, &tournament, winner_id, None).await?;
        tx.commit().await?;
        Ok(settlement)
    }

    async fn pay_prize_in(
        &self,
        conn: &mut SqliteConnection,
        tournament: &Tournament,
        winner_id: UserId,
        submission_id: Option<SubmissionId>,
    ) -> TournamentResult<Settlement> {
        let standings = top_standings(conn, tournament.id, self.settings.top_n).await?;
        let rank = standings
            .iter()
            .find(|s| s.user_id == winner_id)
            .map(|s| s.rank)
            .ok_or_else(|| {
                TournamentError::PermissionDenied(format!(
                    "user is not one of the top {} winners",
                    self.settings.top_n
                ))
            })?;

        // A refunded entry cannot also collect a prize
        if let Some((payer, _)) = payer_of(conn, tournament.id, winner_id).await? {
            if let Some(refund) = find_marker(conn, tournament.id, payer, SettlementKind::Refund).await? {
                return Err(already_settled(&refund));
            }
        }

        let paying = paying_entries(conn, tournament.id).await?;
        let amount = tournament
            .prize_structure(paying)
            .payout_for_rank(rank)
            .unwrap_or(0)
            .max(0);

        let settlement = insert_marker(
            conn,
            tournament.id,
            winner_id,
            SettlementKind::Prize,
            amount,
            submission_id,
        )
        .await?;

        if amount > 0 {
            self.wallet
                .credit(conn, &Posting::prize(winner_id, tournament.id, amount, rank))
                .await?;
        }

        info!(
            "Prize settled for user {} in tournament {}: rank {}, amount {}",
            winner_id, tournament.id, rank, amount
        );
        Ok(settlement)
    }

    /// Refund the entry fee paid for `user_id`
    ///
    /// Team members are refunded through their captain, who paid the fee.
    ///
    /// # Errors
    ///
    /// * `TournamentError::PermissionDenied` - User is not enrolled
    /// * `TournamentError::AlreadySettled` - The payer was already refunded, or the entry holds a prize
    pub async fn refund_entry_fees(
        &self,
        tournament_id: TournamentId,
        user_id: UserId,
    ) -> TournamentResult<Settlement> {
        let mut tx = begin_write(&self.pool).await?;
        load_tournament(&mut tx, tournament_id).await?;
        let settlement = self.refund_in(&mut tx, tournament_id, user_id, None).await?;
        tx.commit().await?;
        Ok(settlement)
    }

    async fn refund_in(
        &self,
        conn: &mut SqliteConnection,
        tournament_id: TournamentId,
        user_id: UserId,
        submission_id: Option<SubmissionId>,
    ) -> TournamentResult<Settlement> {
        let (payer, paid) = payer_of(conn, tournament_id, user_id)
            .await?
            .ok_or_else(|| {
                TournamentError::PermissionDenied("user is not enrolled in this tournament".to_string())
            })?;

        if let Some(prize) = prize_for_entry(conn, tournament_id, payer).await? {
            return Err(already_settled(&prize));
        }

        let settlement = insert_marker(
            conn,
            tournament_id,
            payer,
            SettlementKind::Refund,
            paid,
            submission_id,
        )
        .await?;

        if paid > 0 {
            self.wallet
                .credit(conn, &Posting::refund(payer, tournament_id, paid))
                .await?;
        }

        info!(
            "Refunded {} to user {} for tournament {} (requested for user {})",
            paid, payer, tournament_id, user_id
        );
        Ok(settlement)
    }

    /// Refund marker already recorded for whoever paid `user_id`'s entry
    async fn settled_refund(
        &self,
        conn: &mut SqliteConnection,
        tournament_id: TournamentId,
        user_id: UserId,
    ) -> TournamentResult<Option<Settlement>> {
        match payer_of(conn, tournament_id, user_id).await? {
            Some((payer, _)) => find_marker(conn, tournament_id, payer, SettlementKind::Refund).await,
            None => Ok(None),
        }
    }

    /// Submit proof of victory; only users currently in the top N may submit
    ///
    /// # Errors
    ///
    /// * `TournamentError::PermissionDenied` - User is not in the top N
    /// * `TournamentError::SubmissionExists` - User already submitted for this tournament
    pub async fn submit_winner(
        &self,
        tournament_id: TournamentId,
        user_id: UserId,
        video: &str,
    ) -> TournamentResult<WinnerSubmission> {
        if video.trim().is_empty() {
            return Err(TournamentError::Validation(
                "Video reference must not be empty.".to_string(),
            ));
        }

        let mut tx = begin_write(&self.pool).await?;
        let tournament = load_tournament(&mut tx, tournament_id).await?;
        require_user(&mut tx, user_id).await?;

        let standings = top_standings(&mut tx, tournament_id, self.settings.top_n).await?;
        if !standings.iter().any(|s| s.user_id == user_id) {
            return Err(TournamentError::PermissionDenied(format!(
                "user is not one of the top {} winners",
                self.settings.top_n
            )));
        }

        let sql = format!(
            "INSERT INTO winner_submissions (winner_id, tournament_id, video, status, created_at)
             VALUES (?1, ?2, ?3, 'pending', ?4)
             RETURNING {SUBMISSION_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(tournament_id)
            .bind(video.trim())
            .bind(Utc::now())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    TournamentError::SubmissionExists {
                        tournament_id,
                        user_id,
                    }
                } else {
                    TournamentError::Database(e)
                }
            })?;
        let submission = submission_from_row(&row);
        tx.commit().await?;

        info!(
            "Winner submission {} received from user {} for tournament {}",
            submission.id, user_id, tournament_id
        );
        self.dispatcher.dispatch(vec![submission_notice(
            &submission,
            format!("Your winner submission for {} has been received.", tournament.name),
        )]);

        Ok(submission)
    }

    /// Approve a pending submission and pay the prize in the same transaction
    pub async fn approve(&self, submission_id: SubmissionId, staff_id: UserId) -> TournamentResult<Review> {
        self.review(submission_id, staff_id, SubmissionStatus::Approved).await
    }

    /// Reject a pending submission and refund the entry fee in the same transaction
    ///
    /// When the entry was already refunded (a teammate's rejection, or a
    /// direct refund) the submission closes against that existing marker.
    pub async fn reject(&self, submission_id: SubmissionId, staff_id: UserId) -> TournamentResult<Review> {
        self.review(submission_id, staff_id, SubmissionStatus::Rejected).await
    }

    async fn review(
        &self,
        submission_id: SubmissionId,
        staff_id: UserId,
        decision: SubmissionStatus,
    ) -> TournamentResult<Review> {
        let mut tx = begin_write(&self.pool).await?;
        require_staff(&mut tx, staff_id).await?;

        let pending = load_submission(&mut tx, submission_id).await?;
        if pending.status != SubmissionStatus::Pending {
            return Err(TournamentError::InvalidSubmissionState {
                id: submission_id,
                status: pending.status.to_string(),
            });
        }

        let result = sqlx::query(
            "UPDATE winner_submissions SET status = ?1, decided_by = ?2, decided_at = ?3
             WHERE id = ?4 AND status = 'pending'",
        )
        .bind(decision.as_str())
        .bind(staff_id)
        .bind(Utc::now())
        .bind(submission_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let current = load_submission(&mut tx, submission_id).await?;
            return Err(TournamentError::InvalidSubmissionState {
                id: submission_id,
                status: current.status.to_string(),
            });
        }

        let tournament = load_tournament(&mut tx, pending.tournament_id).await?;
        let settlement = match decision {
            SubmissionStatus::Rejected => {
                match self
                    .settled_refund(&mut tx, tournament.id, pending.winner_id)
                    .await?
                {
                    Some(refund) => refund,
                    None => {
                        self.refund_in(&mut tx, tournament.id, pending.winner_id, Some(submission_id))
                            .await?
                    }
                }
            }
            _ => {
                self.pay_prize_in(&mut tx, &tournament, pending.winner_id, Some(submission_id))
                    .await?
            }
        };

        let submission = load_submission(&mut tx, submission_id).await?;
        tx.commit().await?;

        info!(
            "Winner submission {} {} by staff {}",
            submission_id, decision, staff_id
        );
        self.dispatcher.dispatch(vec![submission_notice(
            &submission,
            format!(
                "Your submission for {} has been {}.",
                tournament.name, submission.status
            ),
        )]);

        Ok(Review {
            submission,
            settlement,
        })
    }

    /// Submissions visible to `viewer`: all for staff, otherwise their own
    pub async fn submissions_for(&self, viewer: UserId) -> TournamentResult<Vec<WinnerSubmission>> {
        let mut conn = self.pool.acquire().await?;
        let user = require_user(&mut conn, viewer).await?;

        let sql = format!(
            "SELECT {SUBMISSION_COLUMNS} FROM winner_submissions
             WHERE ?1 OR winner_id = ?2
             ORDER BY id"
        );
        let rows = sqlx::query(&sql)
            .bind(user.is_staff)
            .bind(viewer)
            .fetch_all(&mut *conn)
            .await?;

        Ok(rows.iter().map(submission_from_row).collect())
    }

    /// Settlement markers recorded for a tournament
    pub async fn settlements(&self, tournament_id: TournamentId) -> TournamentResult<Vec<Settlement>> {
        let sql = format!("SELECT {SETTLEMENT_COLUMNS} FROM settlements WHERE tournament_id = ?1 ORDER BY id");
        let rows = sqlx::query(&sql)
            .bind(tournament_id)
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(rows.iter().map(settlement_from_row).collect())
    }

    /// Sum of every prize credited through the ledger
    pub async fn total_prize_money(&self) -> TournamentResult<i64> {
        Ok(self.wallet.total_credited(EntryType::Prize).await?)
    }
}
