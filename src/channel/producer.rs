use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::channel::shared::Shared;
use crate::channel;
use crate::error::{fatal, RegisterError};
use crate::telemetry;

const LOC_SEND: &str = "Producer::send";
const EVT_SEND_CLOSED: &str = "P:SendClosed";
const EVT_SUBSCRIBE: &str = "P:Subscribe";
const EVT_ELECTED: &str = "P:Elected";
const EVT_DEPOSIT: &str = "P:Deposit";
const CTR_SUBSCRIPTIONS: &str = "SendSubscriptions";

/// A registered producer, passed by reference to its task on the dedicated
/// worker thread.
///
/// The handle stays valid for the duration of the task; the channel itself
/// outlives every handle through shared ownership.
pub struct Producer {
  shared: Arc<Shared>,
  index: usize,
  context: Box<dyn Any + Send>,
}

impl Producer {
  pub(crate) fn new(shared: Arc<Shared>, index: usize, context: Box<dyn Any + Send>) -> Self {
    Self {
      shared,
      index,
      context,
    }
  }

  /// Sends a payload to the consumer, blocking while the slot is occupied
  /// or while earlier-arrived producers are still being served.
  ///
  /// Returns `true` once the payload has been copied into the slot and the
  /// consumer signaled; the caller's buffer may be reused immediately.
  /// Returns `false` iff the channel was observed closed before the payload
  /// could be deposited, in which case it will never be delivered.
  ///
  /// A payload larger than the channel's `buffer_size` is a programming bug
  /// and aborts the process regardless of the error policy.
  pub fn send(&self, data: &[u8]) -> bool {
    let shared = &self.shared;
    if data.len() > shared.buffer_size {
      fatal!(
        "message of {} bytes exceeds buffer_size of {}",
        data.len(),
        shared.buffer_size
      );
    }
    let mut state = shared.state.lock();
    if state.closed {
      telemetry::log_event(Some(self.index), LOC_SEND, EVT_SEND_CLOSED, None);
      return false;
    }
    if state.pending || state.handoff.elected().is_some() {
      // The slot is taken, or the consumer has already promised it to a
      // queued producer. Either way this arrival must not overtake the
      // queue: it subscribes and parks on its own condition variable until
      // elected. Checking the open election here is what keeps a fresh
      // arrival from racing past waiters the moment `pending` clears.
      state.handoff.subscribe(self.index);
      telemetry::log_event(Some(self.index), LOC_SEND, EVT_SUBSCRIBE, None);
      telemetry::increment_counter(LOC_SEND, CTR_SUBSCRIPTIONS);
      while !state.closed && state.handoff.elected() != Some(self.index) {
        shared.producer_cvs[self.index].wait(&mut state);
      }
      if state.closed {
        // Woken by closure, not election. The queue entry is left behind;
        // closed is terminal and the queue is never consulted again.
        telemetry::log_event(Some(self.index), LOC_SEND, EVT_SEND_CLOSED, None);
        return false;
      }
      state.handoff.admit(self.index);
      telemetry::log_event(Some(self.index), LOC_SEND, EVT_ELECTED, None);
    }
    state.slot[..data.len()].copy_from_slice(data);
    state.slot_len = data.len();
    state.pending = true;
    shared.consumer_cv.notify_one();
    telemetry::log_event(
      Some(self.index),
      LOC_SEND,
      EVT_DEPOSIT,
      Some(format!("{} bytes", data.len())),
    );
    true
  }

  /// Sends a payload-free message. Exactly `send(&[])`.
  pub fn send_empty(&self) -> bool {
    self.send(&[])
  }

  /// `true` while the channel is open.
  ///
  /// A task performing long computation should call this periodically and
  /// return promptly once it reports `false`, so `join` does not hang on
  /// it.
  pub fn ping(&self) -> bool {
    !self.shared.state.lock().closed
  }

  /// The opaque context supplied at registration.
  ///
  /// Downcast to the concrete type with `downcast_ref`.
  pub fn context(&self) -> &(dyn Any + Send) {
    &*self.context
  }

  /// Registers another producer on the owning channel, up to its
  /// `max_producers` capacity. Alias for
  /// [`Channel::register_producer`](crate::Channel::register_producer).
  pub fn register_producer<F, C>(&self, task: F, context: C) -> Result<(), RegisterError>
  where
    F: FnOnce(&Producer) + Send + 'static,
    C: Any + Send,
  {
    channel::register(&self.shared, Box::new(task), Box::new(context))
  }
}

impl fmt::Debug for Producer {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Producer")
      .field("index", &self.index)
      .field("shared", &self.shared)
      .finish_non_exhaustive()
  }
}
