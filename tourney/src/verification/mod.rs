//! Verification gate and identity-verification port.
//!
//! The gate is a pure function of (verification record, user score,
//! tournament requirement). Records are read through [`VerificationProvider`];
//! issuing them is the identity service's job.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

use crate::users::UserId;

/// Score at which level 2 becomes mandatory
pub const LEVEL_2_SCORE_THRESHOLD: i64 = 1000;

/// Score at which level 3 becomes mandatory
pub const LEVEL_3_SCORE_THRESHOLD: i64 = 2000;

/// Identity verification record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub user_id: UserId,
    pub level: i64,
    pub is_active: bool,
    pub verified_at: DateTime<Utc>,
}

impl Verification {
    /// Level that counts toward admission; inactive records count as 0
    pub fn effective_level(&self) -> i64 {
        if self.is_active { self.level } else { 0 }
    }
}

/// Gate rejection carrying the level that was not met
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Insufficient {
    pub required: i64,
    pub actual: i64,
}

/// Effective requirement once the score thresholds are applied
pub fn required_level(base_requirement: i64, score: i64) -> i64 {
    let mut required = base_requirement;
    if score >= LEVEL_2_SCORE_THRESHOLD {
        required = required.max(2);
    }
    if score >= LEVEL_3_SCORE_THRESHOLD {
        required = required.max(3);
    }
    required
}

/// Decide whether a user may enter a tournament requiring `base_requirement`.
///
/// A missing record is level 0.
pub fn admit(
    verification: Option<&Verification>,
    score: i64,
    base_requirement: i64,
) -> Result<(), Insufficient> {
    let actual = verification.map_or(0, Verification::effective_level);

    // Checked in order so the error names the first rule that failed
    for required in [
        base_requirement,
        required_level(base_requirement, score.min(LEVEL_3_SCORE_THRESHOLD - 1)),
        required_level(base_requirement, score),
    ] {
        if actual < required {
            return Err(Insufficient { required, actual });
        }
    }
    Ok(())
}

/// Identity/verification port
#[async_trait]
pub trait VerificationProvider: Send + Sync {
    /// Current verification record for a user, if any
    async fn get_verification(&self, user_id: UserId) -> Result<Option<Verification>, sqlx::Error>;
}

/// Verification records stored in the engine's own database
#[derive(Clone)]
pub struct SqlVerificationProvider {
    pool: SqlitePool,
}

impl SqlVerificationProvider {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace a user's verification record
    pub async fn record(
        &self,
        user_id: UserId,
        level: i64,
        is_active: bool,
    ) -> Result<Verification, sqlx::Error> {
        let verified_at = Utc::now();
        sqlx::query(
            "INSERT INTO verifications (user_id, level, is_active, verified_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (user_id) DO UPDATE SET
                level = excluded.level,
                is_active = excluded.is_active,
                verified_at = excluded.verified_at",
        )
        .bind(user_id)
        .bind(level)
        .bind(is_active)
        .bind(verified_at)
        .execute(&self.pool)
        .await?;

        Ok(Verification {
            user_id,
            level,
            is_active,
            verified_at,
        })
    }
}

#[async_trait]
impl VerificationProvider for SqlVerificationProvider {
    async fn get_verification(&self, user_id: UserId) -> Result<Option<Verification>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT user_id, level, is_active, verified_at FROM verifications WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Verification {
            user_id: r.get("user_id"),
            level: r.get("level"),
            is_active: r.get("is_active"),
            verified_at: r.get("verified_at"),
        }))
    }
}
