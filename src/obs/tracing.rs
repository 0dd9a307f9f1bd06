// self
use crate::{
	_prelude::*,
	obs::{OpKind, SessionEvent},
};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedOp<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedOp<F> = F;

/// A span builder used by session operations.
#[derive(Clone, Debug)]
pub struct OpSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl OpSpan {
	/// Creates a new span tagged with the provided operation + stage.
	pub fn new(kind: OpKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("hrdesk_session.op", op = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedOp<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Emits a lifecycle event for the session; `detail` must never contain token material.
pub fn trace_session_event(event: SessionEvent, detail: &str) {
	#[cfg(feature = "tracing")]
	{
		match event {
			SessionEvent::Malformed =>
				tracing::warn!(event = event.as_str(), detail, "discarding persisted session"),
			SessionEvent::Cleared | SessionEvent::Expired =>
				tracing::info!(event = event.as_str(), detail, "session ended"),
			_ => tracing::debug!(event = event.as_str(), detail, "session updated"),
		}
	}

	#[cfg(not(feature = "tracing"))]
	{
		let _ = (event, detail);
	}
}

/// Emits a warning that does not change session state (ignored logout failures, retries).
pub fn trace_warning(kind: OpKind, detail: &str) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(op = kind.as_str(), detail);
	}

	#[cfg(not(feature = "tracing"))]
	{
		let _ = (kind, detail);
	}
}
