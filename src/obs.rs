//! Optional observability helpers for session operations.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `hrdesk_session.op` with the `op` and
//!   `stage` fields, plus one event per session lifecycle change.
//! - Enable `metrics` to increment `hrdesk_session_op_total` (labeled by `op` + `outcome`) and
//!   `hrdesk_session_event_total` (labeled by `event`).

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operations observed by the session core.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
	/// Credential exchange.
	Login,
	/// Session teardown.
	Logout,
	/// Access token refresh.
	Refresh,
	/// Authorized request dispatch.
	Authorize,
}
impl OpKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpKind::Login => "login",
			OpKind::Logout => "logout",
			OpKind::Refresh => "refresh",
			OpKind::Authorize => "authorize",
		}
	}
}
impl Display for OpKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpOutcome {
	/// Entry to an operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl OpOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpOutcome::Attempt => "attempt",
			OpOutcome::Success => "success",
			OpOutcome::Failure => "failure",
		}
	}
}
impl Display for OpOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Lifecycle changes of the persisted session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionEvent {
	/// A new session was persisted after login.
	Saved,
	/// A persisted session was restored at startup.
	Restored,
	/// The access token was rotated in place.
	Refreshed,
	/// The session was removed.
	Cleared,
	/// A restored session had already expired.
	Expired,
	/// Persisted state could not be parsed.
	Malformed,
}
impl SessionEvent {
	/// Returns a stable label suitable for event or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			SessionEvent::Saved => "saved",
			SessionEvent::Restored => "restored",
			SessionEvent::Refreshed => "refreshed",
			SessionEvent::Cleared => "cleared",
			SessionEvent::Expired => "expired",
			SessionEvent::Malformed => "malformed",
		}
	}
}
impl Display for SessionEvent {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
