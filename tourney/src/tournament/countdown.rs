//! Countdown and deferred credential release.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

use super::{
    config::RELEASE_CREDENTIALS_ACTION,
    errors::{TournamentError, TournamentResult},
    manager::{TournamentManager, load_tournament},
    models::TournamentId,
};
use crate::db::{begin_write, repository::load_user};
use crate::notifications::{Notification, NotificationDispatcher, NotificationKind, Outbound};
use crate::scheduler::{HandlerError, ScheduledTask, TaskHandle, TaskHandler};
use crate::users::User;

/// Payload of a credential release task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleasePayload {
    pub tournament_id: TournamentId,
}

/// Dedupe key shared by every countdown of one tournament
pub fn release_key(tournament_id: TournamentId) -> String {
    format!("{RELEASE_CREDENTIALS_ACTION}:{tournament_id}")
}

impl TournamentManager {
    /// Start (or restart) the countdown
    ///
    /// Sets the countdown start to now and schedules credential release
    /// after `settings.countdown_delay`. Restarting replaces the pending
    /// release rather than adding another.
    pub async fn start_countdown(&self, tournament_id: TournamentId) -> TournamentResult<TaskHandle> {
        self.start_countdown_at(tournament_id, Utc::now()).await
    }

    /// Start the countdown as of `now`
    pub async fn start_countdown_at(
        &self,
        tournament_id: TournamentId,
        now: DateTime<Utc>,
    ) -> TournamentResult<TaskHandle> {
        let result = sqlx::query("UPDATE tournaments SET countdown_start_time = ?1 WHERE id = ?2")
            .bind(now)
            .bind(tournament_id)
            .execute(self.pool.as_ref())
            .await?;
        if result.rows_affected() == 0 {
            return Err(TournamentError::TournamentNotFound(tournament_id));
        }

        let delay = chrono::Duration::from_std(self.settings.countdown_delay)
            .map_err(|e| TournamentError::Validation(format!("Invalid countdown delay: {e}")))?;
        let payload = serde_json::to_value(ReleasePayload { tournament_id })?;

        let handle = self
            .scheduler
            .schedule_at(
                now + delay,
                RELEASE_CREDENTIALS_ACTION,
                &release_key(tournament_id),
                &payload,
            )
            .await?;

        info!(
            "Countdown started for tournament {}, credentials release at {}",
            tournament_id, handle.run_at
        );
        Ok(handle)
    }

    /// Consumer for the release tasks scheduled by this manager
    pub fn credential_release(&self) -> CredentialRelease {
        CredentialRelease::new(Arc::clone(&self.pool), self.dispatcher.clone())
    }
}

/// Releases room credentials to every entrant
pub struct CredentialRelease {
    pool: Arc<SqlitePool>,
    dispatcher: NotificationDispatcher,
}

impl CredentialRelease {
    pub fn new(pool: Arc<SqlitePool>, dispatcher: NotificationDispatcher) -> Self {
        Self { pool, dispatcher }
    }

    /// Release credentials once
    ///
    /// Returns false when they were already released, so a redelivered
    /// task sends nothing.
    pub async fn release(&self, tournament_id: TournamentId) -> TournamentResult<bool> {
        let mut tx = begin_write(&self.pool).await?;
        let tournament = load_tournament(&mut tx, tournament_id).await?;

        let entry_code = tournament
            .entry_code
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string()[..8].to_uppercase());
        let room_id = tournament
            .room_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let result = sqlx::query(
            "UPDATE tournaments
             SET credentials_released_at = ?1, entry_code = ?2, room_id = ?3
             WHERE id = ?4 AND credentials_released_at IS NULL",
        )
        .bind(Utc::now())
        .bind(&entry_code)
        .bind(&room_id)
        .bind(tournament_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        let entrant_ids: Vec<i64> = sqlx::query(
            "SELECT user_id FROM participants WHERE tournament_id = ?1
             UNION
             SELECT user_id FROM tournament_team_members WHERE tournament_id = ?1
             UNION
             SELECT paid_by FROM tournament_teams WHERE tournament_id = ?1
             ORDER BY 1",
        )
        .bind(tournament_id)
        .fetch_all(&mut *tx)
        .await?
        .iter()
        .map(|r| r.get(0))
        .collect();

        let mut entrants: Vec<User> = Vec::with_capacity(entrant_ids.len());
        for id in entrant_ids {
            if let Some(user) = load_user(&mut tx, id).await? {
                entrants.push(user);
            }
        }

        tx.commit().await?;

        info!(
            "Released credentials for tournament {} to {} entrant(s)",
            tournament_id,
            entrants.len()
        );

        let body = format!(
            "Tournament '{}' is about to start. Room ID: {}, entry code: {}",
            tournament.name, room_id, entry_code
        );
        let mut messages = Vec::with_capacity(entrants.len() * 2);
        for user in &entrants {
            messages.push(Outbound::InApp(Notification::new(
                user.id,
                NotificationKind::TournamentCredentials,
                body.clone(),
            )));
            if let Some(email) = user.email.as_deref().filter(|e| !e.is_empty()) {
                messages.push(Outbound::Email {
                    to: email.to_string(),
                    subject: "Tournament Credentials".to_string(),
                    body: body.clone(),
                });
            }
        }
        self.dispatcher.dispatch(messages);

        Ok(true)
    }
}

#[async_trait]
impl TaskHandler for CredentialRelease {
    async fn handle(&self, task: &ScheduledTask) -> Result<(), HandlerError> {
        let payload: ReleasePayload = serde_json::from_value(task.payload.clone())?;

        match self.release(payload.tournament_id).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                info!(
                    "Credentials for tournament {} already released, skipping",
                    payload.tournament_id
                );
                Ok(())
            }
            Err(TournamentError::TournamentNotFound(id)) => {
                warn!("Dropping credential release for deleted tournament {}", id);
                Ok(())
            }
            Err(e) => Err(Box::new(e)),
        }
    }
}
