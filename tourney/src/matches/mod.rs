//! Matches: result confirmation, disputes, misconduct reports and result
//! proofs.

pub mod arbitration;
pub mod evidence;
pub mod models;
pub mod reports;

pub use arbitration::MatchArbiter;
pub use evidence::{EvidenceError, EvidenceStore, FsEvidenceStore};
pub use models::{Match, Report, ReportStatus};
