//! Match and report models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqliteConnection, sqlite::SqliteRow};

use crate::tournament::{Entrant, MatchId, ReportId, TournamentId, TournamentKind};
use crate::users::UserId;

/// One bracket pairing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub tournament_id: TournamentId,
    pub kind: TournamentKind,
    pub round: i64,
    /// Position within the round, 0-based
    pub slot: i64,
    pub participant1: Entrant,
    /// `None` for a bye
    pub participant2: Option<Entrant>,
    pub winner: Option<Entrant>,
    /// Opaque evidence reference
    pub result_proof: Option<String>,
    pub is_confirmed: bool,
    pub is_disputed: bool,
    pub created_at: DateTime<Utc>,
}

impl Match {
    pub fn is_bye(&self) -> bool {
        self.participant2.is_none()
    }

    /// Both sides, first side first
    pub fn sides(&self) -> impl Iterator<Item = Entrant> + '_ {
        std::iter::once(self.participant1).chain(self.participant2)
    }

    pub fn has_side(&self, entrant: Entrant) -> bool {
        self.sides().any(|side| side == entrant)
    }

    /// The other side of `entrant`, if both sides exist
    pub fn opponent_of(&self, entrant: Entrant) -> Option<Entrant> {
        match self.participant2 {
            Some(second) if self.participant1 == entrant => Some(second),
            Some(second) if second == entrant => Some(self.participant1),
            _ => None,
        }
    }

    /// Confirmed and undisputed
    pub fn is_settled(&self) -> bool {
        self.is_confirmed && !self.is_disputed
    }
}

pub(crate) const MATCH_COLUMNS: &str = "id, tournament_id, match_type, round, slot, \
     participant1_user, participant2_user, participant1_team, participant2_team, \
     winner_user, winner_team, result_proof, is_confirmed, is_disputed, created_at";

fn entrant(kind: TournamentKind, user: Option<i64>, team: Option<i64>) -> Option<Entrant> {
    match kind {
        TournamentKind::Individual => user.map(Entrant::User),
        TournamentKind::Team => team.map(Entrant::Team),
    }
}

pub(crate) fn match_from_row(row: &SqliteRow) -> Result<Match, sqlx::Error> {
    let kind = TournamentKind::parse(&row.get::<String, _>("match_type"));
    let participant1 = entrant(kind, row.get("participant1_user"), row.get("participant1_team"))
        .ok_or_else(|| sqlx::Error::Protocol("match row without a first participant".to_string()))?;

    Ok(Match {
        id: row.get("id"),
        tournament_id: row.get("tournament_id"),
        kind,
        round: row.get("round"),
        slot: row.get("slot"),
        participant1,
        participant2: entrant(kind, row.get("participant2_user"), row.get("participant2_team")),
        winner: entrant(kind, row.get("winner_user"), row.get("winner_team")),
        result_proof: row.get("result_proof"),
        is_confirmed: row.get("is_confirmed"),
        is_disputed: row.get("is_disputed"),
        created_at: row.get("created_at"),
    })
}

pub(crate) async fn load_match(
    conn: &mut SqliteConnection,
    match_id: MatchId,
) -> Result<Option<Match>, sqlx::Error> {
    let row = sqlx::query(&format!("SELECT {MATCH_COLUMNS} FROM matches WHERE id = ?1"))
        .bind(match_id)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(match_from_row).transpose()
}

/// Splits an entrant into its (user, team) columns
pub(crate) fn entrant_columns(entrant: Option<Entrant>) -> (Option<i64>, Option<i64>) {
    match entrant {
        Some(Entrant::User(id)) => (Some(id), None),
        Some(Entrant::Team(id)) => (None, Some(id)),
        None => (None, None),
    }
}

/// Report status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Resolved,
    Rejected,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Resolved => "resolved",
            ReportStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "resolved" => ReportStatus::Resolved,
            "rejected" => ReportStatus::Rejected,
            _ => ReportStatus::Pending,
        }
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Misconduct report against a match opponent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,
    pub reporter_id: UserId,
    pub reported_user_id: UserId,
    pub match_id: MatchId,
    pub description: String,
    pub evidence: Option<String>,
    pub status: ReportStatus,
    pub banned_user: bool,
    pub resolved_by: Option<UserId>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

pub(crate) const REPORT_COLUMNS: &str = "id, reporter_id, reported_user_id, match_id, description, \
     evidence, status, banned_user, resolved_by, resolved_at, created_at";

pub(crate) fn report_from_row(row: &SqliteRow) -> Report {
    Report {
        id: row.get("id"),
        reporter_id: row.get("reporter_id"),
        reported_user_id: row.get("reported_user_id"),
        match_id: row.get("match_id"),
        description: row.get("description"),
        evidence: row.get("evidence"),
        status: ReportStatus::parse(&row.get::<String, _>("status")),
        banned_user: row.get("banned_user"),
        resolved_by: row.get("resolved_by"),
        resolved_at: row.get("resolved_at"),
        created_at: row.get("created_at"),
    }
}

pub(crate) async fn load_report(
    conn: &mut SqliteConnection,
    report_id: ReportId,
) -> Result<Option<Report>, sqlx::Error> {
    let row = sqlx::query(&format!("SELECT {REPORT_COLUMNS} FROM reports WHERE id = ?1"))
        .bind(report_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.as_ref().map(report_from_row))
}
