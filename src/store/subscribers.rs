//! Observer list used to broadcast state changes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::trace;

use super::State;

/// Callback invoked with the full state after every change.
pub type Callback = Arc<dyn Fn(&State) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

#[derive(Default)]
struct List {
  next_id: AtomicU64,
  callbacks: Mutex<Vec<(SubscriberId, Callback)>>,
}

impl List {
  fn callbacks(&self) -> MutexGuard<'_, Vec<(SubscriberId, Callback)>> {
    self.callbacks.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

/// Subscribers, called in the order they subscribed.
#[derive(Clone, Default)]
pub(crate) struct Subscribers {
  list: Arc<List>,
}

impl Subscribers {
  pub(crate) fn subscribe(&self, callback: Callback) -> Subscription {
    let id = SubscriberId(self.list.next_id.fetch_add(1, Ordering::Relaxed));
    self.list.callbacks().push((id, callback));
    trace!(id = id.0, "Subscriber added");
    Subscription {
      id,
      list: Arc::downgrade(&self.list),
    }
  }

  /// Call every subscriber with `state`.
  ///
  /// The list is snapshotted first and no lock is held while callbacks run, so a
  /// callback may subscribe, unsubscribe or mutate the store. Re-entrant mutation
  /// triggers a nested broadcast; keeping that finite is up to the callback.
  pub(crate) fn notify(&self, state: &State) {
    let callbacks: Vec<Callback> = self
      .list
      .callbacks()
      .iter()
      .map(|(_, cb)| Arc::clone(cb))
      .collect();

    for callback in callbacks {
      callback(state);
    }
  }

  pub(crate) fn len(&self) -> usize {
    self.list.callbacks().len()
  }
}

/// Handle returned by [`Store::subscribe`](super::Store::subscribe).
///
/// Dropping the handle does not unsubscribe; call [`Subscription::unsubscribe`].
#[derive(Debug)]
pub struct Subscription {
  id: SubscriberId,
  list: Weak<List>,
}

impl Subscription {
  pub fn id(&self) -> SubscriberId {
    self.id
  }

  /// Stop receiving broadcasts. Returns false if the store is already gone.
  pub fn unsubscribe(self) -> bool {
    match self.list.upgrade() {
      Some(list) => {
        list.callbacks().retain(|(id, _)| *id != self.id);
        trace!(id = self.id.0, "Subscriber removed");
        true
      }
      None => false,
    }
  }
}

impl std::fmt::Debug for List {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("List")
      .field("subscribers", &self.callbacks().len())
      .finish()
  }
}
