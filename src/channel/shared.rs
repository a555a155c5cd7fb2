use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_utils::CachePadded;
use parking_lot::{Condvar, Mutex};

use crate::channel::handoff::HandoffQueue;
use crate::channel::{Consumer, Producer};
use crate::config::ErrorPolicy;
use crate::error::DeliveryError;
use crate::message::Delivery;

pub(crate) type ConsumerCallback = Box<dyn FnMut(&Consumer, Delivery) + Send + 'static>;
pub(crate) type ErrorCallback = Box<dyn FnMut(&Consumer, DeliveryError) + Send + 'static>;
pub(crate) type ProducerTask = Box<dyn FnOnce(&Producer) + Send + 'static>;
pub(crate) type AllocProbe = Arc<dyn Fn(usize) -> bool + Send + Sync + 'static>;

/// The shared core of a channel: immutable parameters, the single mutex
/// guarding every mutable field, and the condition variables.
///
/// Shared by the [`Channel`](crate::Channel) owner handle, the consumer
/// thread, and every producer worker thread through an `Arc`.
pub(crate) struct Shared {
  pub(crate) buffer_size: usize,
  pub(crate) max_producers: usize,
  pub(crate) policy: ErrorPolicy,
  pub(crate) alloc_probe: Option<AllocProbe>,

  pub(crate) state: CachePadded<Mutex<State>>,
  /// Wakes the consumer thread when a message lands or the channel closes.
  pub(crate) consumer_cv: Condvar,
  /// One condition variable per producer slot. A producer blocked in `send`
  /// only ever waits on its own, so exactly one waiter is woken per
  /// election and closure can address each waiter individually.
  pub(crate) producer_cvs: Box<[Condvar]>,
}

/// Mutable channel state. Every field is guarded by `Shared::state`.
pub(crate) struct State {
  pub(crate) slot: Box<[u8]>,
  pub(crate) slot_len: usize,
  pub(crate) pending: bool,
  pub(crate) closed: bool,
  pub(crate) joined: bool,

  /// One entry per registered producer; the length is the registered count.
  /// Never reallocates: capacity is reserved for `max_producers` up front.
  pub(crate) producers: Vec<ProducerMeta>,
  pub(crate) producers_done: usize,
  /// Worker thread handles, in registration order.
  pub(crate) threads: Vec<JoinHandle<()>>,
  pub(crate) handoff: HandoffQueue,
}

pub(crate) struct ProducerMeta {
  pub(crate) done: bool,
}

impl Shared {
  /// Marks the channel closed and wakes everything that may be parked on
  /// it: the consumer, and every producer currently in the wait queue.
  ///
  /// A pending message survives closure; the consumer loop delivers it
  /// before the terminal callback.
  pub(crate) fn close_locked(&self, state: &mut State) {
    state.closed = true;
    self.consumer_cv.notify_one();
    for index in state.handoff.waiters() {
      self.producer_cvs[index].notify_one();
    }
  }

  /// Counts a returned producer task. When `join` has begun and this was
  /// the last outstanding task, the channel closes and the consumer is
  /// woken to deliver the terminal callback.
  pub(crate) fn producer_done(&self, index: usize) {
    let mut state = self.state.lock();
    let meta = &mut state.producers[index];
    if meta.done {
      return;
    }
    meta.done = true;
    state.producers_done += 1;
    debug_assert!(state.producers_done <= state.producers.len());
    if state.joined && state.producers_done == state.producers.len() {
      state.closed = true;
      self.consumer_cv.notify_one();
    }
  }
}

impl fmt::Debug for Shared {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.state.lock();
    f.debug_struct("Shared")
      .field("buffer_size", &self.buffer_size)
      .field("max_producers", &self.max_producers)
      .field("policy", &self.policy)
      .field("pending", &state.pending)
      .field("closed", &state.closed)
      .field("joined", &state.joined)
      .field("producers", &state.producers.len())
      .field("producers_done", &state.producers_done)
      .field("waiting", &state.handoff.len())
      .finish_non_exhaustive()
  }
}

/// Ensures a producer is counted as done even when its task panics, so
/// `join` can never hang on an uncounted producer.
pub(crate) struct DoneGuard {
  pub(crate) shared: Arc<Shared>,
  pub(crate) index: usize,
}

impl Drop for DoneGuard {
  fn drop(&mut self) {
    self.shared.producer_done(self.index);
  }
}
