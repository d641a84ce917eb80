//! Enrollment: joining tournaments, participant status, rosters.

use chrono::Utc;
use log::info;
use sqlx::{Row, SqliteConnection, sqlite::SqliteRow};

use super::{
    errors::{TournamentError, TournamentResult},
    manager::{TournamentManager, load_tournament, require_user},
    models::{
        Enrollment, Participant, ParticipantStatus, TeamRegistration, Tournament, TournamentId,
        TournamentKind,
    },
};
use crate::db::{
    begin_write, is_unique_violation,
    repository::{load_team, load_user},
};
use crate::notifications::{Notification, NotificationKind, Outbound};
use crate::users::{TeamId, User, UserId};
use crate::verification::admit;
use crate::wallet::Posting;

const PARTICIPANT_COLUMNS: &str = "id, tournament_id, user_id, status, fee_paid, registered_at";

fn participant_from_row(row: &SqliteRow) -> Participant {
    Participant {
        id: row.get("id"),
        tournament_id: row.get("tournament_id"),
        user_id: row.get("user_id"),
        status: ParticipantStatus::parse(&row.get::<String, _>("status")),
        fee_paid: row.get("fee_paid"),
        registered_at: row.get("registered_at"),
    }
}

pub(crate) async fn load_participant(
    conn: &mut SqliteConnection,
    tournament_id: TournamentId,
    user_id: UserId,
) -> Result<Option<Participant>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE tournament_id = ?1 AND user_id = ?2"
    ))
    .bind(tournament_id)
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.as_ref().map(participant_from_row))
}

pub(crate) async fn load_registration(
    conn: &mut SqliteConnection,
    tournament_id: TournamentId,
    team_id: TeamId,
) -> Result<Option<TeamRegistration>, sqlx::Error> {
    let Some(row) = sqlx::query(
        "SELECT id, tournament_id, team_id, paid_by, fee_paid, registered_at
         FROM tournament_teams WHERE tournament_id = ?1 AND team_id = ?2",
    )
    .bind(tournament_id)
    .bind(team_id)
    .fetch_optional(&mut *conn)
    .await?
    else {
        return Ok(None);
    };

    let roster = roster_of(conn, tournament_id, team_id).await?;

    Ok(Some(TeamRegistration {
        id: row.get("id"),
        tournament_id: row.get("tournament_id"),
        team_id: row.get("team_id"),
        paid_by: row.get("paid_by"),
        fee_paid: row.get("fee_paid"),
        roster,
        registered_at: row.get("registered_at"),
    }))
}

async fn roster_of(
    conn: &mut SqliteConnection,
    tournament_id: TournamentId,
    team_id: TeamId,
) -> Result<Vec<UserId>, sqlx::Error> {
    Ok(sqlx::query(
        "SELECT user_id FROM tournament_team_members
         WHERE tournament_id = ?1 AND team_id = ?2 ORDER BY rowid",
    )
    .bind(tournament_id)
    .bind(team_id)
    .fetch_all(&mut *conn)
    .await?
    .iter()
    .map(|r| r.get("user_id"))
    .collect())
}

/// Enrollment closes once round 1 exists
async fn ensure_open(conn: &mut SqliteConnection, tournament_id: TournamentId) -> TournamentResult<()> {
    let started = sqlx::query("SELECT 1 FROM matches WHERE tournament_id = ?1 LIMIT 1")
        .bind(tournament_id)
        .fetch_optional(&mut *conn)
        .await?;

    if started.is_some() {
        return Err(TournamentError::EnrollmentClosed);
    }
    Ok(())
}

async fn ensure_capacity(
    conn: &mut SqliteConnection,
    tournament: &Tournament,
    table: &str,
) -> TournamentResult<()> {
    let Some(max) = tournament.max_entrants else {
        return Ok(());
    };

    let entrants: i64 = sqlx::query(&format!(
        "SELECT COUNT(*) AS entrants FROM {table} WHERE tournament_id = ?1"
    ))
    .bind(tournament.id)
    .fetch_one(&mut *conn)
    .await?
    .get("entrants");

    if entrants >= max {
        return Err(TournamentError::TournamentFull);
    }
    Ok(())
}

/// In-app, email and SMS messages confirming enrollment
fn joined_messages(tournament: &Tournament, recipients: &[User]) -> Vec<Outbound> {
    let body = format!("You have joined the tournament '{}'.", tournament.name);
    let mut messages = Vec::new();

    for user in recipients {
        messages.push(Outbound::InApp(Notification::new(
            user.id,
            NotificationKind::TournamentJoined,
            body.clone(),
        )));
        if let Some(email) = user.email.as_deref().filter(|e| !e.is_empty()) {
            messages.push(Outbound::Email {
                to: email.to_string(),
                subject: "Tournament Joined".to_string(),
                body: body.clone(),
            });
        }
        if let Some(phone) = user.phone_number.as_deref().filter(|p| !p.is_empty()) {
            messages.push(Outbound::Sms {
                to: phone.to_string(),
                body: body.clone(),
            });
        }
    }

    messages
}

impl TournamentManager {
    /// Enroll a user, or a team through its captain
    ///
    /// For individual tournaments `team_id` must be `None`; for team
    /// tournaments it must name a team captained by `user_id`, and `members`
    /// is the roster selected for this tournament. The entry fee debit and
    /// the enrollment rows commit together. Notifications go out after
    /// commit and never affect the outcome.
    ///
    /// Re-joining with an already registered team returns the existing
    /// registration without a second debit.
    ///
    /// # Errors
    ///
    /// * `TournamentError::VerificationInsufficient` - Gate rejected the user
    /// * `TournamentError::InvalidTournamentType` - Team given for an individual tournament or vice versa
    /// * `TournamentError::AlreadyEnrolled` - User (or roster member) already enrolled
    /// * `TournamentError::NotTeamCaptain` - User does not captain the team
    /// * `TournamentError::TooManyMembers` - Roster exceeds the configured limit
    /// * `TournamentError::InvalidMember` - A roster id does not resolve to a user
    /// * `TournamentError::InsufficientFunds` - Payer cannot cover the entry fee
    /// * `TournamentError::EnrollmentClosed` - Matches have already been generated
    /// * `TournamentError::TournamentFull` - Capacity reached
    pub async fn join(
        &self,
        tournament_id: TournamentId,
        user_id: UserId,
        team_id: Option<TeamId>,
        members: Option<&[UserId]>,
    ) -> TournamentResult<Enrollment> {
        // Read-only checks run on a short-lived connection, released before
        // the verification port is consulted.
        let (tournament, user) = {
            let mut conn = self.pool.acquire().await?;
            let tournament = load_tournament(&mut conn, tournament_id).await?;
            let user = require_user(&mut conn, user_id).await?;
            (tournament, user)
        };

        if !user.is_active {
            return Err(TournamentError::PermissionDenied(
                "account is suspended".to_string(),
            ));
        }

        let verification = self.verifier.get_verification(user_id).await?;
        admit(
            verification.as_ref(),
            user.score,
            tournament.required_verification_level,
        )
        .map_err(|rejected| TournamentError::VerificationInsufficient {
            required: rejected.required,
            actual: rejected.actual,
        })?;

        match (tournament.kind, team_id) {
            (TournamentKind::Individual, None) => self.join_individual(&tournament, user).await,
            (TournamentKind::Team, Some(team_id)) => {
                self.join_team(&tournament, user, team_id, members.unwrap_or(&[]))
                    .await
            }
            (TournamentKind::Individual, Some(_)) => Err(TournamentError::InvalidTournamentType(
                "individual tournaments do not accept teams".to_string(),
            )),
            (TournamentKind::Team, None) => Err(TournamentError::InvalidTournamentType(
                "team tournaments require a team".to_string(),
            )),
        }
    }

    async fn join_individual(&self, tournament: &Tournament, user: User) -> TournamentResult<Enrollment> {
        let mut tx = begin_write(&self.pool).await?;

        ensure_open(&mut tx, tournament.id).await?;
        if load_participant(&mut tx, tournament.id, user.id).await?.is_some() {
            return Err(TournamentError::AlreadyEnrolled);
        }
        ensure_capacity(&mut tx, tournament, "participants").await?;

        let fee = tournament.fee();
        let registered_at = Utc::now();

        let id = sqlx::query(
            "INSERT INTO participants (tournament_id, user_id, status, fee_paid, registered_at)
             VALUES (?1, ?2, 'registered', ?3, ?4)",
        )
        .bind(tournament.id)
        .bind(user.id)
        .bind(fee)
        .bind(registered_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                TournamentError::AlreadyEnrolled
            } else {
                TournamentError::Database(e)
            }
        })?
        .last_insert_rowid();

        if fee > 0 {
            self.wallet
                .debit(&mut tx, &Posting::entry_fee(user.id, tournament.id, fee))
                .await?;
        }

        tx.commit().await?;

        info!(
            "User {} joined tournament {} (fee {})",
            user.id, tournament.id, fee
        );
        self.dispatcher
            .dispatch(joined_messages(tournament, std::slice::from_ref(&user)));

        Ok(Enrollment::Individual(Participant {
            id,
            tournament_id: tournament.id,
            user_id: user.id,
            status: ParticipantStatus::Registered,
            fee_paid: fee,
            registered_at,
        }))
    }

    async fn join_team(
        &self,
        tournament: &Tournament,
        captain: User,
        team_id: TeamId,
        members: &[UserId],
    ) -> TournamentResult<Enrollment> {
        let mut tx = begin_write(&self.pool).await?;

        let team = load_team(&mut tx, team_id)
            .await?
            .ok_or(TournamentError::TeamNotFound(team_id))?;
        if team.captain_id != captain.id {
            return Err(TournamentError::NotTeamCaptain);
        }

        if members.len() > self.settings.max_team_members {
            return Err(TournamentError::TooManyMembers {
                max: self.settings.max_team_members,
                got: members.len(),
            });
        }

        let mut roster: Vec<UserId> = Vec::with_capacity(members.len());
        for &member in members {
            if roster.contains(&member) {
                return Err(TournamentError::InvalidMember(member));
            }
            roster.push(member);
        }

        let mut roster_users = Vec::with_capacity(roster.len());
        for &member in &roster {
            let user = load_user(&mut tx, member)
                .await?
                .ok_or(TournamentError::InvalidMember(member))?;
            roster_users.push(user);
        }

        if let Some(existing) = load_registration(&mut tx, tournament.id, team_id).await? {
            return Ok(Enrollment::Team(existing));
        }

        ensure_open(&mut tx, tournament.id).await?;
        ensure_capacity(&mut tx, tournament, "tournament_teams").await?;

        let fee = tournament.fee();
        let registered_at = Utc::now();

        let id = sqlx::query(
            "INSERT INTO tournament_teams (tournament_id, team_id, paid_by, fee_paid, registered_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(tournament.id)
        .bind(team_id)
        .bind(captain.id)
        .bind(fee)
        .bind(registered_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                TournamentError::AlreadyEnrolled
            } else {
                TournamentError::Database(e)
            }
        })?
        .last_insert_rowid();

        for &member in &roster {
            sqlx::query(
                "INSERT INTO tournament_team_members (tournament_id, team_id, user_id)
                 VALUES (?1, ?2, ?3)",
            )
            .bind(tournament.id)
            .bind(team_id)
            .bind(member)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    TournamentError::AlreadyEnrolled
                } else {
                    TournamentError::Database(e)
                }
            })?;
        }

        if fee > 0 {
            self.wallet
                .debit(&mut tx, &Posting::entry_fee(captain.id, tournament.id, fee))
                .await?;
        }

        tx.commit().await?;

        info!(
            "Team {} joined tournament {} with {} member(s), fee {} paid by {}",
            team_id,
            tournament.id,
            roster.len(),
            fee,
            captain.id
        );
        self.dispatcher
            .dispatch(joined_messages(tournament, &roster_users));

        Ok(Enrollment::Team(TeamRegistration {
            id,
            tournament_id: tournament.id,
            team_id,
            paid_by: captain.id,
            fee_paid: fee,
            roster,
            registered_at,
        }))
    }

    /// Move a participant from registered to checked in
    pub async fn check_in(
        &self,
        tournament_id: TournamentId,
        user_id: UserId,
    ) -> TournamentResult<Participant> {
        self.advance_status(tournament_id, user_id, ParticipantStatus::CheckedIn)
            .await
    }

    /// Mark a participant eliminated
    pub async fn eliminate(
        &self,
        tournament_id: TournamentId,
        user_id: UserId,
    ) -> TournamentResult<Participant> {
        self.advance_status(tournament_id, user_id, ParticipantStatus::Eliminated)
            .await
    }

    async fn advance_status(
        &self,
        tournament_id: TournamentId,
        user_id: UserId,
        to: ParticipantStatus,
    ) -> TournamentResult<Participant> {
        let mut tx = begin_write(&self.pool).await?;

        let participant = load_participant(&mut tx, tournament_id, user_id)
            .await?
            .ok_or_else(|| {
                TournamentError::PermissionDenied("not enrolled in this tournament".to_string())
            })?;

        if !participant.status.can_advance_to(to) {
            return Err(TournamentError::InvalidStatusTransition {
                from: participant.status,
                to,
            });
        }

        let result = sqlx::query("UPDATE participants SET status = ?1 WHERE id = ?2 AND status = ?3")
            .bind(to.as_str())
            .bind(participant.id)
            .bind(participant.status.as_str())
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            let current = load_participant(&mut tx, tournament_id, user_id)
                .await?
                .map_or(participant.status, |p| p.status);
            return Err(TournamentError::InvalidStatusTransition { from: current, to });
        }

        tx.commit().await?;

        Ok(Participant {
            status: to,
            ..participant
        })
    }

    /// Participants in enrollment order
    pub async fn participants(&self, tournament_id: TournamentId) -> TournamentResult<Vec<Participant>> {
        let rows = sqlx::query(&format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE tournament_id = ?1 ORDER BY id"
        ))
        .bind(tournament_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.iter().map(participant_from_row).collect())
    }

    /// Registered teams in enrollment order, with their rosters
    pub async fn team_registrations(
        &self,
        tournament_id: TournamentId,
    ) -> TournamentResult<Vec<TeamRegistration>> {
        let mut conn = self.pool.acquire().await?;

        let team_ids: Vec<TeamId> = sqlx::query(
            "SELECT team_id FROM tournament_teams WHERE tournament_id = ?1 ORDER BY id",
        )
        .bind(tournament_id)
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(|r| r.get("team_id"))
        .collect();

        let mut registrations = Vec::with_capacity(team_ids.len());
        for team_id in team_ids {
            if let Some(registration) = load_registration(&mut conn, tournament_id, team_id).await? {
                registrations.push(registration);
            }
        }
        Ok(registrations)
    }
}
