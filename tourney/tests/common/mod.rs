//! Shared fixtures for engine integration tests.
//!
//! Each harness owns a private database with the schema applied: in memory
//! on a single connection by default, or a WAL file shared by a pool of
//! connections for tests that race operations against each other.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tourney::db::{
    Database, DatabaseConfig, SqlTeamRepository, SqlUserRepository, TeamRepository, UserRepository,
};
use tourney::matches::{FsEvidenceStore, MatchArbiter};
use tourney::notifications::{Notification, NotificationDispatcher, Notifier, NotifyResult, Outbound};
use tourney::settlement::SettlementEngine;
use tourney::tournament::{Game, NewTournament, Tournament, TournamentManager};
use tourney::users::{NewUser, Team, User, UserId};
use tourney::verification::SqlVerificationProvider;

/// Notifier that keeps every delivered message
#[derive(Default)]
pub struct RecordingNotifier {
    delivered: Mutex<Vec<Outbound>>,
}

impl RecordingNotifier {
    pub fn delivered(&self) -> Vec<Outbound> {
        self.delivered.lock().unwrap().clone()
    }

    /// In-app notifications delivered to `user_id`
    pub fn in_app_for(&self, user_id: UserId) -> Vec<Notification> {
        self.delivered()
            .into_iter()
            .filter_map(|m| match m {
                Outbound::InApp(n) if n.user_id == user_id => Some(n),
                _ => None,
            })
            .collect()
    }

    /// Wait until at least `count` messages were delivered
    pub async fn wait_for(&self, count: usize) -> Vec<Outbound> {
        for _ in 0..200 {
            let delivered = self.delivered();
            if delivered.len() >= count {
                return delivered;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!(
            "expected {} notification(s), got {:?}",
            count,
            self.delivered()
        );
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> NotifyResult<()> {
        self.delivered
            .lock()
            .unwrap()
            .push(Outbound::InApp(notification.clone()));
        Ok(())
    }

    async fn send_email(&self, to: &str, subject: &str, body: &str) -> NotifyResult<()> {
        self.delivered.lock().unwrap().push(Outbound::Email {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }

    async fn send_sms(&self, to: &str, body: &str) -> NotifyResult<()> {
        self.delivered.lock().unwrap().push(Outbound::Sms {
            to: to.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

pub struct Harness {
    pub db: Database,
    pub pool: Arc<SqlitePool>,
    pub manager: TournamentManager,
    pub arbiter: MatchArbiter,
    pub settlement: SettlementEngine,
    pub notifier: Arc<RecordingNotifier>,
    pub users: SqlUserRepository,
    pub teams: SqlTeamRepository,
    pub verifier: SqlVerificationProvider,
    pub evidence_root: PathBuf,
    scratch: PathBuf,
}

impl Harness {
    pub async fn new() -> Self {
        let db = Database::in_memory()
            .await
            .expect("Failed to create test database");
        Self::with_database(db, scratch_dir())
    }

    /// Harness over a database file served by `connections` pooled connections
    pub async fn file_backed(connections: u32) -> Self {
        let scratch = scratch_dir();
        let config = DatabaseConfig {
            database_url: format!("sqlite://{}", scratch.join("engine.db").display()),
            max_connections: connections,
            min_connections: 1,
            ..DatabaseConfig::development()
        };
        let db = Database::new(&config)
            .await
            .expect("Failed to open test database file");
        db.migrate().await.expect("Failed to apply schema");
        Self::with_database(db, scratch)
    }

    fn with_database(db: Database, scratch: PathBuf) -> Self {
        let pool = Arc::new(db.pool().clone());
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = NotificationDispatcher::new(notifier.clone());

        let verifier = SqlVerificationProvider::new(db.pool().clone());
        let manager = TournamentManager::new(
            Arc::clone(&pool),
            Arc::new(verifier.clone()),
            dispatcher.clone(),
        );

        let evidence_root = scratch.join("evidence");
        std::fs::create_dir_all(&evidence_root).unwrap();
        let arbiter = MatchArbiter::new(
            Arc::clone(&pool),
            dispatcher.clone(),
            Arc::new(FsEvidenceStore::new(&evidence_root)),
        );

        let settlement = SettlementEngine::new(Arc::clone(&pool), dispatcher);

        Self {
            users: SqlUserRepository::new(db.pool().clone()),
            teams: SqlTeamRepository::new(db.pool().clone()),
            db,
            pool,
            manager,
            arbiter,
            settlement,
            notifier,
            verifier,
            evidence_root,
            scratch,
        }
    }

    /// Active user verified at level 1
    pub async fn user(&self, name: &str) -> User {
        self.verified(NewUser::named(name), 1).await
    }

    pub async fn verified(&self, new_user: NewUser, level: i64) -> User {
        let user = self.users.create_user(&new_user).await.unwrap();
        self.verifier.record(user.id, level, true).await.unwrap();
        user
    }

    pub async fn staff(&self, name: &str) -> User {
        self.verified(NewUser::named(name).staff(), 1).await
    }

    pub async fn fund(&self, user_id: UserId, amount: i64) {
        self.manager
            .wallet()
            .deposit(user_id, amount, format!("deposit:{user_id}:{}", uuid::Uuid::new_v4()))
            .await
            .unwrap();
    }

    pub async fn balance(&self, user_id: UserId) -> i64 {
        self.manager.wallet().balance(user_id).await.unwrap()
    }

    pub async fn team(&self, name: &str, captain: &User, members: &[&User]) -> Team {
        let ids: Vec<UserId> = members.iter().map(|m| m.id).collect();
        self.teams.create_team(name, captain.id, &ids).await.unwrap()
    }

    pub async fn game(&self) -> Game {
        self.manager.create_game("Chess", "Rapid").await.unwrap()
    }

    pub async fn tournament(&self, new: NewTournament) -> Tournament {
        self.manager.create_tournament(&new).await.unwrap()
    }

    /// Individual tournament starting tomorrow; `fee` of 0 makes it free
    pub async fn individual(&self, fee: i64) -> Tournament {
        let game = self.game().await;
        let start = Utc::now() + Duration::days(1);
        let mut new = NewTournament::individual("Weekly Open", game.id, start, start + Duration::hours(3));
        if fee > 0 {
            new = new.with_entry_fee(fee);
        }
        self.tournament(new).await
    }

    pub async fn team_tournament(&self, fee: i64) -> Tournament {
        let game = self.game().await;
        let start = Utc::now() + Duration::days(1);
        let mut new = NewTournament::team("Team Cup", game.id, start, start + Duration::hours(3));
        if fee > 0 {
            new = new.with_entry_fee(fee);
        }
        self.tournament(new).await
    }

    /// Enroll users in an individual tournament, in order
    pub async fn enroll(&self, tournament: &Tournament, users: &[&User]) {
        for user in users {
            self.manager
                .join(tournament.id, user.id, None, None)
                .await
                .unwrap();
        }
    }
}

fn scratch_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tourney-tests-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.scratch);
    }
}
