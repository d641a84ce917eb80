//! Settlement data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, sqlite::SqliteRow};

use crate::tournament::{SubmissionId, TournamentId};
use crate::users::UserId;

/// Kind of money movement a settlement marker guards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementKind {
    Prize,
    Refund,
}

impl SettlementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementKind::Prize => "prize",
            SettlementKind::Refund => "refund",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "refund" => SettlementKind::Refund,
            _ => SettlementKind::Prize,
        }
    }
}

impl std::fmt::Display for SettlementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exactly-once marker for a prize or refund
///
/// A zero `amount` records that the settlement happened without a ledger
/// credit (no payout for the rank, or nothing was paid in).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub id: i64,
    pub tournament_id: TournamentId,
    /// Wallet that received the money
    pub user_id: UserId,
    pub kind: SettlementKind,
    pub amount: i64,
    pub submission_id: Option<SubmissionId>,
    pub created_at: DateTime<Utc>,
}

pub(crate) const SETTLEMENT_COLUMNS: &str =
    "id, tournament_id, user_id, kind, amount, submission_id, created_at";

pub(crate) fn settlement_from_row(row: &SqliteRow) -> Settlement {
    Settlement {
        id: row.get("id"),
        tournament_id: row.get("tournament_id"),
        user_id: row.get("user_id"),
        kind: SettlementKind::parse(&row.get::<String, _>("kind")),
        amount: row.get("amount"),
        submission_id: row.get("submission_id"),
        created_at: row.get("created_at"),
    }
}

/// Submission review status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Rejected,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Approved => "approved",
            SubmissionStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "approved" => SubmissionStatus::Approved,
            "rejected" => SubmissionStatus::Rejected,
            _ => SubmissionStatus::Pending,
        }
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Proof of victory submitted by a top-ranked user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinnerSubmission {
    pub id: SubmissionId,
    pub winner_id: UserId,
    pub tournament_id: TournamentId,
    /// Evidence reference of the video
    pub video: String,
    pub status: SubmissionStatus,
    pub decided_by: Option<UserId>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

pub(crate) const SUBMISSION_COLUMNS: &str =
    "id, winner_id, tournament_id, video, status, decided_by, decided_at, created_at";

pub(crate) fn submission_from_row(row: &SqliteRow) -> WinnerSubmission {
    WinnerSubmission {
        id: row.get("id"),
        winner_id: row.get("winner_id"),
        tournament_id: row.get("tournament_id"),
        video: row.get("video"),
        status: SubmissionStatus::parse(&row.get::<String, _>("status")),
        decided_by: row.get("decided_by"),
        decided_at: row.get("decided_at"),
        created_at: row.get("created_at"),
    }
}

/// Result of a staff review: the updated submission and the money it moved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub submission: WinnerSubmission,
    pub settlement: Settlement,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statuses_parse_their_storage_text() {
        for status in [
            SubmissionStatus::Pending,
            SubmissionStatus::Approved,
            SubmissionStatus::Rejected,
        ] {
            assert_eq!(SubmissionStatus::parse(status.as_str()), status);
        }
        assert_eq!(SettlementKind::parse("refund"), SettlementKind::Refund);
        assert_eq!(SettlementKind::Prize.to_string(), "prize");
    }
}
