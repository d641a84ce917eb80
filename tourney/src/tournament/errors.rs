//! Tournament engine error types.
//!
//! Business-rule violations are typed variants. Infrastructure faults
//! (database, ledger, serialization, scheduler, evidence storage) are fatal
//! for the request and leave entity state untouched because every operation
//! is one transaction.

use thiserror::Error;

use crate::matches::evidence::EvidenceError;
use crate::scheduler::SchedulerError;
use crate::users::{TeamId, UserError, UserId};
use crate::wallet::WalletError;

use super::models::{MatchId, ParticipantStatus, ReportId, SubmissionId, TournamentId};

/// Tournament engine errors
#[derive(Debug, Error)]
pub enum TournamentError {
    #[error("Verification level {required} required (current level {actual})")]
    VerificationInsufficient { required: i64, actual: i64 },

    #[error("Operation does not match the tournament type: {0}")]
    InvalidTournamentType(String),

    #[error("Already enrolled in this tournament")]
    AlreadyEnrolled,

    #[error("Only the team captain can join a tournament")]
    NotTeamCaptain,

    #[error("Too many members: at most {max} allowed, got {got}")]
    TooManyMembers { max: usize, got: usize },

    #[error("Invalid member ID: {0}")]
    InvalidMember(UserId),

    #[error("Insufficient funds: available {available}, required {required}")]
    InsufficientFunds { available: i64, required: i64 },

    #[error("Not enough participants: need {needed}, have {current}")]
    NotEnoughParticipants { needed: usize, current: usize },

    #[error("Round {0} still has unresolved matches")]
    RoundInProgress(i64),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Winner must be one of the match participants")]
    InvalidWinner,

    #[error("Match {0} is disputed")]
    MatchDisputed(MatchId),

    #[error("Match {0} already has a different confirmed winner")]
    ResultAlreadyConfirmed(MatchId),

    #[error("Submission {id} is already {status}")]
    InvalidSubmissionState { id: SubmissionId, status: String },

    #[error("Already settled: {kind} for user {user_id} in tournament {tournament_id}")]
    AlreadySettled {
        tournament_id: TournamentId,
        user_id: UserId,
        kind: String,
    },

    #[error("User {user_id} already submitted for tournament {tournament_id}")]
    SubmissionExists {
        tournament_id: TournamentId,
        user_id: UserId,
    },

    #[error("Tournament not found: {0}")]
    TournamentNotFound(TournamentId),

    #[error("Match not found: {0}")]
    MatchNotFound(MatchId),

    #[error("Report not found: {0}")]
    ReportNotFound(ReportId),

    #[error("Winner submission not found: {0}")]
    SubmissionNotFound(SubmissionId),

    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("Team not found: {0}")]
    TeamNotFound(TeamId),

    #[error("Tournament is full")]
    TournamentFull,

    #[error("Enrollment is closed once matches have been generated")]
    EnrollmentClosed,

    #[error("Participant status cannot move from {from} to {to}")]
    InvalidStatusTransition {
        from: ParticipantStatus,
        to: ParticipantStatus,
    },

    #[error("Report {id} is already {status}")]
    InvalidReportState { id: ReportId, status: String },

    #[error("A reason is required")]
    EmptyReason,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Ledger error: {0}")]
    Ledger(WalletError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Evidence error: {0}")]
    Evidence(#[from] EvidenceError),
}

impl TournamentError {
    /// Stable machine-readable code for the transport layer
    pub fn kind(&self) -> &'static str {
        match self {
            TournamentError::VerificationInsufficient { .. } => "verification_insufficient",
            TournamentError::InvalidTournamentType(_) => "invalid_tournament_type",
            TournamentError::AlreadyEnrolled => "already_enrolled",
            TournamentError::NotTeamCaptain => "not_team_captain",
            TournamentError::TooManyMembers { .. } => "too_many_members",
            TournamentError::InvalidMember(_) => "invalid_member",
            TournamentError::InsufficientFunds { .. } => "insufficient_funds",
            TournamentError::NotEnoughParticipants { .. } => "not_enough_participants",
            TournamentError::RoundInProgress(_) => "round_in_progress",
            TournamentError::PermissionDenied(_) => "permission_denied",
            TournamentError::InvalidWinner => "invalid_winner",
            TournamentError::MatchDisputed(_) => "match_disputed",
            TournamentError::ResultAlreadyConfirmed(_) => "result_already_confirmed",
            TournamentError::InvalidSubmissionState { .. } => "invalid_submission_state",
            TournamentError::AlreadySettled { .. } => "already_settled",
            TournamentError::SubmissionExists { .. } => "submission_exists",
            TournamentError::TournamentNotFound(_)
            | TournamentError::MatchNotFound(_)
            | TournamentError::ReportNotFound(_)
            | TournamentError::SubmissionNotFound(_)
            | TournamentError::UserNotFound(_)
            | TournamentError::TeamNotFound(_) => "not_found",
            TournamentError::TournamentFull => "tournament_full",
            TournamentError::EnrollmentClosed => "enrollment_closed",
            TournamentError::InvalidStatusTransition { .. } => "invalid_status_transition",
            TournamentError::InvalidReportState { .. } => "invalid_report_state",
            TournamentError::EmptyReason => "empty_reason",
            TournamentError::Validation(_) => "validation",
            TournamentError::Database(_)
            | TournamentError::Ledger(_)
            | TournamentError::Serialization(_)
            | TournamentError::Scheduler(_)
            | TournamentError::Evidence(_) => "internal",
        }
    }

    /// Whether the failure is an infrastructure fault rather than a rule violation
    pub fn is_infrastructure(&self) -> bool {
        self.kind() == "internal"
    }

    /// Get a client-safe error message that doesn't leak sensitive information
    pub fn client_message(&self) -> String {
        if self.is_infrastructure() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        }
    }
}

impl From<WalletError> for TournamentError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::InsufficientBalance {
                available,
                required,
                ..
            } => TournamentError::InsufficientFunds {
                available,
                required,
            },
            WalletError::Database(e) => TournamentError::Database(e),
            other => TournamentError::Ledger(other),
        }
    }
}

impl From<UserError> for TournamentError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::UserNotFound(id) => TournamentError::UserNotFound(id),
            UserError::TeamNotFound(id) => TournamentError::TeamNotFound(id),
            UserError::Database(e) => TournamentError::Database(e),
            other => TournamentError::Validation(other.to_string()),
        }
    }
}

/// Result type for tournament engine operations
pub type TournamentResult<T> = Result<T, TournamentError>;
