// self
use crate::{_prelude::*, coordinator::EpisodeId, obs::OperationKind};

/// Future returned by [`OperationSpan::instrument`]; a plain passthrough without `tracing`.
#[cfg(feature = "tracing")]
pub type InstrumentedOperation<F> = tracing::instrument::Instrumented<F>;
/// Future returned by [`OperationSpan::instrument`]; a plain passthrough without `tracing`.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedOperation<F> = F;

/// `session_broker.op` span carrying the operation, its call site, and the refresh episode once
/// one is known.
#[derive(Clone, Debug)]
pub struct OperationSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl OperationSpan {
	/// Opens a span for `kind` at `stage`.
	pub fn new(kind: OperationKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			Self {
				span: tracing::info_span!(
					"session_broker.op",
					op = kind.as_str(),
					stage,
					episode = tracing::field::Empty
				),
			}
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Opens a span already tagged with `episode`.
	pub fn for_episode(kind: OperationKind, stage: &'static str, episode: EpisodeId) -> Self {
		let span = Self::new(kind, stage);

		span.record_episode(episode);

		span
	}

	/// Tags the span with the episode the operation joined.
	pub fn record_episode(&self, episode: EpisodeId) {
		#[cfg(feature = "tracing")]
		self.span.record("episode", episode.get());
		#[cfg(not(feature = "tracing"))]
		let _ = episode;
	}

	/// Runs `fut` inside the span; the span is entered per poll, never across `.await`.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedOperation<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			tracing::Instrument::instrument(fut, self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}
