//! Tournament engine tunables.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Action name of the deferred credential release
pub const RELEASE_CREDENTIALS_ACTION: &str = "release_credentials";

/// Engine settings shared by enrollment, standings and the countdown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentSettings {
    /// Delay between countdown start and credential release (default: 5 minutes)
    pub countdown_delay: Duration,

    /// Maximum members on a team roster (default: 4)
    pub max_team_members: usize,

    /// Number of ranked winners eligible for prizes (default: 5)
    pub top_n: usize,
}

impl Default for TournamentSettings {
    fn default() -> Self {
        Self {
            countdown_delay: Duration::from_secs(300),
            max_team_members: 4,
            top_n: 5,
        }
    }
}

impl TournamentSettings {
    /// Read overrides from the environment
    ///
    /// - `COUNTDOWN_RELEASE_DELAY_SECS`
    /// - `TOURNAMENT_MAX_TEAM_MEMBERS`
    /// - `TOURNAMENT_TOP_N`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            countdown_delay: env::var("COUNTDOWN_RELEASE_DELAY_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map_or(defaults.countdown_delay, Duration::from_secs),
            max_team_members: env::var("TOURNAMENT_MAX_TEAM_MEMBERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_team_members),
            top_n: env::var("TOURNAMENT_TOP_N")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.top_n),
        }
    }

    /// Builder-style countdown delay
    pub fn with_countdown_delay(mut self, delay: Duration) -> Self {
        self.countdown_delay = delay;
        self
    }
}
