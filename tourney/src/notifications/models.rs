//! Notification payloads.

use serde::{Deserialize, Serialize};

use crate::users::UserId;

/// In-app notification type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    TournamentJoined,
    ReportNew,
    ReportStatusChange,
    WinnerSubmissionStatusChange,
    TournamentCredentials,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::TournamentJoined => "tournament_joined",
            NotificationKind::ReportNew => "report_new",
            NotificationKind::ReportStatusChange => "report_status_change",
            NotificationKind::WinnerSubmissionStatusChange => "winner_submission_status_change",
            NotificationKind::TournamentCredentials => "tournament_credentials",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-app notification addressed to one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub message: String,
}

impl Notification {
    pub fn new(user_id: UserId, kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            user_id,
            kind,
            message: message.into(),
        }
    }
}

/// One message handed to the dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "lowercase")]
pub enum Outbound {
    InApp(Notification),
    Email {
        to: String,
        subject: String,
        body: String,
    },
    Sms {
        to: String,
        body: String,
    },
}

impl Outbound {
    pub fn channel(&self) -> &'static str {
        match self {
            Outbound::InApp(_) => "in_app",
            Outbound::Email { .. } => "email",
            Outbound::Sms { .. } => "sms",
        }
    }
}
