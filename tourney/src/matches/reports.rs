//! Misconduct reports and their staff review.

use chrono::Utc;
use log::{info, warn};
use sqlx::SqliteConnection;

use super::{
    arbitration::{MatchArbiter, acts_for, insert_report, side_of},
    models::{REPORT_COLUMNS, Report, ReportStatus, load_match, load_report, report_from_row},
};
use crate::db::begin_write;
use crate::notifications::{Notification, NotificationKind, Outbound};
use crate::tournament::{
    MatchId, ReportId, TournamentError, TournamentResult,
    manager::{require_staff, require_user},
};
use crate::users::UserId;

/// Close a pending report; the conditional update makes a concurrent
/// second review lose
async fn close_report(
    conn: &mut SqliteConnection,
    report_id: ReportId,
    staff_id: UserId,
    status: ReportStatus,
    banned_user: bool,
) -> TournamentResult<Report> {
    let report = load_report(conn, report_id)
        .await?
        .ok_or(TournamentError::ReportNotFound(report_id))?;
    if report.status != ReportStatus::Pending {
        return Err(TournamentError::InvalidReportState {
            id: report_id,
            status: report.status.to_string(),
        });
    }

    let result = sqlx::query(
        "UPDATE reports
         SET status = ?1, banned_user = ?2, resolved_by = ?3, resolved_at = ?4
         WHERE id = ?5 AND status = 'pending'",
    )
    .bind(status.as_str())
    .bind(banned_user)
    .bind(staff_id)
    .bind(Utc::now())
    .bind(report_id)
    .execute(&mut *conn)
    .await?;

    let current = load_report(conn, report_id)
        .await?
        .ok_or(TournamentError::ReportNotFound(report_id))?;
    if result.rows_affected() == 0 {
        return Err(TournamentError::InvalidReportState {
            id: report_id,
            status: current.status.to_string(),
        });
    }
    Ok(current)
}

fn status_change(user_id: UserId, report: &Report) -> Outbound {
    Outbound::InApp(Notification::new(
        user_id,
        NotificationKind::ReportStatusChange,
        format!("Report #{} has been {}.", report.id, report.status),
    ))
}

impl MatchArbiter {
    /// File a report against an opponent in a match
    ///
    /// # Errors
    ///
    /// * `TournamentError::EmptyReason` - Description is blank
    /// * `TournamentError::PermissionDenied` - Reporter does not play in the match,
    ///   or the reported user is not on the opposing side
    pub async fn create_report(
        &self,
        match_id: MatchId,
        reporter_id: UserId,
        reported_user_id: UserId,
        description: &str,
        evidence: Option<&str>,
    ) -> TournamentResult<Report> {
        if description.trim().is_empty() {
            return Err(TournamentError::EmptyReason);
        }

        let mut tx = begin_write(&self.pool).await?;

        let m = load_match(&mut tx, match_id)
            .await?
            .ok_or(TournamentError::MatchNotFound(match_id))?;
        let side = side_of(&mut tx, &m, reporter_id).await?;
        require_user(&mut tx, reported_user_id).await?;

        let opposing = match m.opponent_of(side) {
            Some(opponent) => acts_for(&mut tx, m.tournament_id, opponent, reported_user_id).await?,
            None => false,
        };
        if !opposing {
            return Err(TournamentError::PermissionDenied(
                "reported user is not an opponent in this match".to_string(),
            ));
        }

        let report = insert_report(
            &mut tx,
            reporter_id,
            reported_user_id,
            match_id,
            description,
            evidence,
        )
        .await?;
        tx.commit().await?;

        info!(
            "Report {} filed by user {} against user {} (match {})",
            report.id, reporter_id, reported_user_id, match_id
        );
        self.dispatcher.dispatch(vec![Outbound::InApp(Notification::new(
            reported_user_id,
            NotificationKind::ReportNew,
            format!("A report has been filed against you: {}", report.description),
        ))]);

        Ok(report)
    }

    /// Resolve a pending report, optionally banning the reported user
    pub async fn resolve_report(
        &self,
        report_id: ReportId,
        staff_id: UserId,
        ban_user: bool,
    ) -> TournamentResult<Report> {
        let mut tx = begin_write(&self.pool).await?;
        require_staff(&mut tx, staff_id).await?;

        let report = close_report(&mut tx, report_id, staff_id, ReportStatus::Resolved, ban_user).await?;

        if ban_user {
            sqlx::query("UPDATE users SET is_active = 0 WHERE id = ?1")
                .bind(report.reported_user_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        if ban_user {
            warn!(
                "User {} banned by staff {} (report {})",
                report.reported_user_id, staff_id, report_id
            );
        } else {
            info!("Report {} resolved by staff {}", report_id, staff_id);
        }
        self.dispatcher.dispatch(vec![
            status_change(report.reporter_id, &report),
            status_change(report.reported_user_id, &report),
        ]);

        Ok(report)
    }

    /// Reject a pending report
    pub async fn reject_report(&self, report_id: ReportId, staff_id: UserId) -> TournamentResult<Report> {
        let mut tx = begin_write(&self.pool).await?;
        require_staff(&mut tx, staff_id).await?;

        let report = close_report(&mut tx, report_id, staff_id, ReportStatus::Rejected, false).await?;
        tx.commit().await?;

        info!("Report {} rejected by staff {}", report_id, staff_id);
        self.dispatcher
            .dispatch(vec![status_change(report.reporter_id, &report)]);

        Ok(report)
    }

    /// Reports visible to `viewer`: every report for staff, otherwise the
    /// ones the viewer filed or is named in
    pub async fn reports_for(&self, viewer: UserId) -> TournamentResult<Vec<Report>> {
        let mut conn = self.pool.acquire().await?;
        let user = require_user(&mut conn, viewer).await?;

        let rows = if user.is_staff {
            sqlx::query(&format!("SELECT {REPORT_COLUMNS} FROM reports ORDER BY id"))
                .fetch_all(&mut *conn)
                .await?
        } else {
            sqlx::query(&format!(
                "SELECT {REPORT_COLUMNS} FROM reports
                 WHERE reporter_id = ?1 OR reported_user_id = ?1
                 ORDER BY id"
            ))
            .bind(viewer)
            .fetch_all(&mut *conn)
            .await?
        };

        Ok(rows.iter().map(report_from_row).collect())
    }
}
