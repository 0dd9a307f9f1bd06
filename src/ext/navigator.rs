//! Navigation collaborator invoked when the session becomes unusable.

// self
use crate::_prelude::*;

/// Why the user is being sent back to the unauthenticated entry point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnauthenticatedReason {
	/// The user signed out explicitly.
	LoggedOut,
	/// The refresh call failed and the session was cleared.
	RefreshFailed,
	/// A request was rejected and no refresh path existed.
	Rejected,
}
impl UnauthenticatedReason {
	/// Returns a stable label for logs and metrics.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::LoggedOut => "logged_out",
			Self::RefreshFailed => "refresh_failed",
			Self::Rejected => "rejected",
		}
	}
}
impl Display for UnauthenticatedReason {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Routes the user to the login screen.
///
/// Called after the session has already been cleared, outside of any lock. Implementations
/// should return quickly; queue UI work instead of blocking.
pub trait Navigator
where
	Self: Send + Sync,
{
	/// Redirects to the unauthenticated entry point.
	fn redirect_to_login(&self, reason: UnauthenticatedReason);
}
impl<F> Navigator for F
where
	F: Send + Sync + Fn(UnauthenticatedReason),
{
	fn redirect_to_login(&self, reason: UnauthenticatedReason) {
		self(reason)
	}
}

/// Navigator for headless hosts that only watch the session observable.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNavigator;
impl Navigator for NoopNavigator {
	fn redirect_to_login(&self, _: UnauthenticatedReason) {}
}
