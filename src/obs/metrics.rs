// self
use crate::obs::{OpKind, OpOutcome, SessionEvent};

/// Records an operation outcome via the global metrics recorder (when enabled).
pub fn record_op_outcome(kind: OpKind, outcome: OpOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"hrdesk_session_op_total",
			"op" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Records a session lifecycle change via the global metrics recorder (when enabled).
pub fn record_session_event(event: SessionEvent) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("hrdesk_session_event_total", "event" => event.as_str()).increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = event;
	}
}
