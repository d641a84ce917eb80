//! Tournament data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::users::{TeamId, UserId};

/// Tournament ID type
pub type TournamentId = i64;

/// Game ID type
pub type GameId = i64;

/// Match ID type
pub type MatchId = i64;

/// Report ID type
pub type ReportId = i64;

/// Winner submission ID type
pub type SubmissionId = i64;

/// Maximum verification level a tournament may require
pub const MAX_VERIFICATION_LEVEL: i64 = 3;

/// Largest entry fee or prize amount a tournament may configure
pub const MAX_AMOUNT: i64 = 1_000_000_000_000;

/// Tournament kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TournamentKind {
    /// Users enroll one by one
    Individual,
    /// Captains enroll teams
    Team,
}

impl TournamentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TournamentKind::Individual => "individual",
            TournamentKind::Team => "team",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "team" => TournamentKind::Team,
            _ => TournamentKind::Individual,
        }
    }
}

impl std::fmt::Display for TournamentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bracket entrant: a user in individual tournaments, a team otherwise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type", content = "id")]
pub enum Entrant {
    User(UserId),
    Team(TeamId),
}

impl Entrant {
    pub fn kind(&self) -> TournamentKind {
        match self {
            Entrant::User(_) => TournamentKind::Individual,
            Entrant::Team(_) => TournamentKind::Team,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Entrant::User(id) | Entrant::Team(id) => *id,
        }
    }
}

/// Game catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    pub name: String,
    pub description: String,
}

/// Tournament creation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTournament {
    pub name: String,
    pub game_id: GameId,
    pub kind: TournamentKind,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_free: bool,
    pub entry_fee: Option<i64>,
    pub required_verification_level: i64,
    /// Capacity in entrants (users or teams); `None` is unlimited
    pub max_entrants: Option<i64>,
    /// Prize amount by rank, first place first; empty uses the standard split
    pub prize_distribution: Vec<i64>,
    pub rules: String,
    pub creator_id: Option<UserId>,
}

impl NewTournament {
    /// Free individual tournament requiring verification level 1
    pub fn individual(name: impl Into<String>, game_id: GameId, start_date: DateTime<Utc>, end_date: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            game_id,
            kind: TournamentKind::Individual,
            start_date,
            end_date,
            is_free: true,
            entry_fee: None,
            required_verification_level: 1,
            max_entrants: None,
            prize_distribution: Vec::new(),
            rules: String::new(),
            creator_id: None,
        }
    }

    /// Free team tournament requiring verification level 1
    pub fn team(name: impl Into<String>, game_id: GameId, start_date: DateTime<Utc>, end_date: DateTime<Utc>) -> Self {
        Self {
            kind: TournamentKind::Team,
            ..Self::individual(name, game_id, start_date, end_date)
        }
    }

    /// Builder-style entry fee; marks the tournament as paid
    pub fn with_entry_fee(mut self, fee: i64) -> Self {
        self.is_free = false;
        self.entry_fee = Some(fee);
        self
    }

    /// Builder-style prize table
    pub fn with_prizes(mut self, prizes: Vec<i64>) -> Self {
        self.prize_distribution = prizes;
        self
    }

    /// Builder-style verification requirement
    pub fn with_verification_level(mut self, level: i64) -> Self {
        self.required_verification_level = level;
        self
    }

    /// Builder-style capacity
    pub fn with_capacity(mut self, max_entrants: i64) -> Self {
        self.max_entrants = Some(max_entrants);
        self
    }

    /// Cross-field validation run before the row is written
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Name must not be empty.".to_string());
        }
        if self.start_date >= self.end_date {
            return Err("End date must be after start date.".to_string());
        }
        match (self.is_free, self.entry_fee) {
            (false, None) => return Err("Entry fee must be set for paid tournaments.".to_string()),
            (false, Some(fee)) if fee <= 0 => {
                return Err("Entry fee must be positive.".to_string());
            }
            (false, Some(fee)) if fee > MAX_AMOUNT => {
                return Err(format!("Entry fee must not exceed {MAX_AMOUNT}."));
            }
            (true, Some(_)) => return Err("Free tournaments cannot charge an entry fee.".to_string()),
            _ => {}
        }
        if !(0..=MAX_VERIFICATION_LEVEL).contains(&self.required_verification_level) {
            return Err(format!(
                "Required verification level must be between 0 and {MAX_VERIFICATION_LEVEL}."
            ));
        }
        if let Some(max) = self.max_entrants {
            if max < 2 {
                return Err("Capacity must allow at least 2 entrants.".to_string());
            }
        }
        if self.prize_distribution.iter().any(|p| *p < 0) {
            return Err("Prize amounts must not be negative.".to_string());
        }
        if self.prize_distribution.iter().any(|p| *p > MAX_AMOUNT) {
            return Err(format!("Prize amounts must not exceed {MAX_AMOUNT}."));
        }
        Ok(())
    }
}

/// Tournament (root aggregate)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tournament {
    pub id: TournamentId,
    pub name: String,
    pub game_id: GameId,
    pub kind: TournamentKind,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_free: bool,
    pub entry_fee: Option<i64>,
    pub required_verification_level: i64,
    pub max_entrants: Option<i64>,
    pub prize_distribution: Vec<i64>,
    pub rules: String,
    pub creator_id: Option<UserId>,
    pub countdown_start_time: Option<DateTime<Utc>>,
    pub credentials_released_at: Option<DateTime<Utc>>,
    pub entry_code: Option<String>,
    pub room_id: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub champion: Option<Entrant>,
    pub created_at: DateTime<Utc>,
}

impl Tournament {
    /// Fee charged per entry, zero for free tournaments
    pub fn fee(&self) -> i64 {
        if self.is_free {
            0
        } else {
            self.entry_fee.unwrap_or(0)
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Prize table given the number of fee-paying entries
    pub fn prize_structure(&self, paying_entries: usize) -> PrizeStructure {
        if self.prize_distribution.is_empty() {
            PrizeStructure::standard(paying_entries, self.fee())
        } else {
            PrizeStructure::fixed(self.prize_distribution.clone())
        }
    }
}

/// Participant status; moves forward only
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    Registered,
    CheckedIn,
    Eliminated,
}

impl ParticipantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantStatus::Registered => "registered",
            ParticipantStatus::CheckedIn => "checked_in",
            ParticipantStatus::Eliminated => "eliminated",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "checked_in" => ParticipantStatus::CheckedIn,
            "eliminated" => ParticipantStatus::Eliminated,
            _ => ParticipantStatus::Registered,
        }
    }

    /// Statuses only advance; nothing leaves `Eliminated`
    pub fn can_advance_to(&self, next: ParticipantStatus) -> bool {
        next > *self
    }

    /// Whether the participant is placed in brackets
    pub fn is_eligible(&self) -> bool {
        !matches!(self, ParticipantStatus::Eliminated)
    }
}

impl std::fmt::Display for ParticipantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Enrollment of a user in an individual tournament
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: i64,
    pub tournament_id: TournamentId,
    pub user_id: UserId,
    pub status: ParticipantStatus,
    pub fee_paid: i64,
    pub registered_at: DateTime<Utc>,
}

/// Enrollment of a team in a team tournament
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRegistration {
    pub id: i64,
    pub tournament_id: TournamentId,
    pub team_id: TeamId,
    /// Captain who paid the entry fee
    pub paid_by: UserId,
    pub fee_paid: i64,
    /// Members selected for this tournament
    pub roster: Vec<UserId>,
    pub registered_at: DateTime<Utc>,
}

/// Result of a successful join
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Enrollment {
    Individual(Participant),
    Team(TeamRegistration),
}

/// Prize structure for tournament
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrizeStructure {
    /// Total prize pool
    pub total_pool: i64,
    /// Payouts by rank (1st, 2nd, 3rd, etc.)
    pub payouts: Vec<i64>,
}

impl PrizeStructure {
    /// Standard split of the collected entry fees
    ///
    /// - up to 5 entries: winner takes all
    /// - 6-9 entries: 60/40
    /// - 10+ entries: 50/30/20
    ///
    /// Rounding remainders go to first place so payouts sum to the pool.
    /// The pool saturates at `i64::MAX` instead of overflowing.
    pub fn standard(paying_entries: usize, fee: i64) -> Self {
        let total_pool = i64::try_from(paying_entries)
            .unwrap_or(i64::MAX)
            .saturating_mul(fee.max(0));

        let percentages: &[i64] = match paying_entries {
            0..=5 => &[100],
            6..=9 => &[60, 40],
            _ => &[50, 30, 20],
        };

        let mut payouts: Vec<i64> = percentages
            .iter()
            .map(|pct| {
                let share = i128::from(total_pool) * i128::from(*pct) / 100;
                i64::try_from(share).unwrap_or(total_pool)
            })
            .collect();
        let distributed: i64 = payouts.iter().sum();
        payouts[0] += total_pool - distributed;

        Self {
            total_pool,
            payouts,
        }
    }

    /// Fixed prize amounts configured on the tournament
    pub fn fixed(payouts: Vec<i64>) -> Self {
        Self {
            total_pool: payouts.iter().fold(0i64, |sum, p| sum.saturating_add(*p)),
            payouts,
        }
    }

    /// Get payout for a specific rank (1-indexed)
    pub fn payout_for_rank(&self, rank: usize) -> Option<i64> {
        if rank == 0 {
            None
        } else {
            self.payouts.get(rank - 1).copied()
        }
    }
}

/// Per-tournament score row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scoring {
    pub tournament_id: TournamentId,
    pub user_id: UserId,
    pub score: i64,
}

/// One row of the top-N standings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    /// 1-indexed
    pub rank: usize,
    pub user_id: UserId,
    pub score: i64,
}

/// Outcome of a bracket generation call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BracketOutcome {
    /// A new round was created
    Round {
        round: i64,
        match_ids: Vec<MatchId>,
        byes: usize,
    },
    /// One entrant remains; nothing further to generate
    Complete { champion: Entrant },
}

/// Past and upcoming tournaments ordered by entry fee
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopTournaments {
    pub past: Vec<Tournament>,
    pub future: Vec<Tournament>,
}
