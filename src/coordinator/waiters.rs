// crates.io
use tokio::sync::oneshot;
// self
use crate::{
	_prelude::*,
	coordinator::{EpisodeId, EpisodeOutcome},
};

/// Position of a waiter in the arena; allocation order is FIFO order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(super) struct WaiterId(u64);

/// Completion handle of one caller suspended on an episode.
#[derive(Debug)]
pub(super) struct Waiter {
	pub(super) episode: EpisodeId,
	handle: oneshot::Sender<EpisodeOutcome>,
}
impl Waiter {
	/// Delivers the outcome; returns `false` when the caller already went away.
	pub(super) fn settle(self, outcome: EpisodeOutcome) -> bool {
		self.handle.send(outcome).is_ok()
	}
}

#[derive(Debug, Default)]
pub(super) struct WaiterArena {
	next: u64,
	waiters: BTreeMap<WaiterId, Waiter>,
}
impl WaiterArena {
	pub(super) fn register(
		&mut self,
		episode: EpisodeId,
	) -> (WaiterId, oneshot::Receiver<EpisodeOutcome>) {
		let id = WaiterId(self.next);
		let (handle, receiver) = oneshot::channel();

		self.next += 1;
		self.waiters.insert(id, Waiter { episode, handle });

		(id, receiver)
	}

	/// Drops a waiter without invoking its handle.
	pub(super) fn remove(&mut self, id: WaiterId) -> bool {
		self.waiters.remove(&id).is_some()
	}

	pub(super) fn len(&self) -> usize {
		self.waiters.len()
	}

	/// Takes every waiter in registration order, leaving an empty arena behind.
	pub(super) fn drain(&mut self) -> impl Iterator<Item = Waiter> + use<> {
		std::mem::take(&mut self.waiters).into_values()
	}
}
