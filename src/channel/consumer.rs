use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::channel::shared::{ConsumerCallback, ErrorCallback, Shared};
use crate::channel::{self, Producer};
use crate::config::ErrorPolicy;
use crate::error::{fatal, DeliveryError, RegisterError};
use crate::message::{self, Delivery};
use crate::telemetry;

const LOC_LOOP: &str = "consumer::run";
const EVT_DELIVER: &str = "C:Deliver";
const EVT_ELECT: &str = "C:Elect";
const EVT_COPY_FAILED: &str = "C:CopyFailedDrop";
const EVT_TERMINAL: &str = "C:Terminal";
const CTR_DELIVERIES: &str = "Deliveries";
const CTR_DROPPED: &str = "DroppedOnCopyFailure";

/// The single consumer of a channel, passed by reference to every consumer
/// callback invocation.
pub struct Consumer {
  shared: Arc<Shared>,
}

impl Consumer {
  pub(crate) fn new(shared: Arc<Shared>) -> Self {
    Self { shared }
  }

  /// Requests the channel's closure. Meant to be called from inside the
  /// consumer callback.
  ///
  /// Every producer currently blocked in `send` is woken to observe the
  /// closure and return `false`. A message that was already pending is not
  /// discarded: it is delivered before the terminal
  /// [`Delivery::Closed`] callback.
  pub fn close(&self) {
    let mut state = self.shared.state.lock();
    self.shared.close_locked(&mut state);
  }

  /// Registers another producer on the owning channel; exists so the
  /// consumer callback can grow the producer set. Alias for
  /// [`Channel::register_producer`](crate::Channel::register_producer).
  pub fn register_producer<F, C>(&self, task: F, context: C) -> Result<(), RegisterError>
  where
    F: FnOnce(&Producer) + Send + 'static,
    C: Any + Send,
  {
    channel::register(&self.shared, Box::new(task), Box::new(context))
  }
}

impl fmt::Debug for Consumer {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Consumer")
      .field("shared", &self.shared)
      .finish()
  }
}

/// The consumer thread's main loop.
///
/// The protocol's single most important property lives here: the lock is
/// released before every callback invocation, so the callback may block
/// arbitrarily without wedging producers, and producer wakeups happen
/// before the callback runs, so a slow consumer overlaps with the next
/// producer's copy into the slot.
pub(crate) fn run(
  shared: Arc<Shared>,
  mut on_delivery: ConsumerCallback,
  mut on_error: Option<ErrorCallback>,
) {
  let consumer = Consumer::new(Arc::clone(&shared));
  loop {
    let mut state = shared.state.lock();
    while !state.pending && !state.closed {
      shared.consumer_cv.wait(&mut state);
    }
    if state.closed && !state.pending {
      // A pending message always wins over closure; only a drained slot
      // lets the loop exit.
      drop(state);
      break;
    }
    let n = state.slot_len;
    debug_assert!(n <= shared.buffer_size);
    let copied = if n == 0 {
      Ok(Delivery::Empty)
    } else {
      message::copy_payload(&state.slot[..n], shared.alloc_probe.as_deref()).map(Delivery::Bytes)
    };
    state.slot_len = 0;
    state.pending = false;
    // The slot is free on both the success and the failure path, so the
    // longest-waiting producer is elected either way; skipping the election
    // after a failed copy would strand the queue until the next send.
    if !state.closed {
      if let Some(next) = state.handoff.elect_front() {
        shared.producer_cvs[next].notify_one();
        telemetry::log_event(Some(next), LOC_LOOP, EVT_ELECT, None);
      }
    }
    drop(state);
    match copied {
      Ok(delivery) => {
        telemetry::log_event(
          None,
          LOC_LOOP,
          EVT_DELIVER,
          Some(format!("{} bytes", delivery.len())),
        );
        telemetry::increment_counter(LOC_LOOP, CTR_DELIVERIES);
        on_delivery(&consumer, delivery);
      }
      Err(err) => {
        let err = DeliveryError::new(n, err);
        telemetry::log_event(None, LOC_LOOP, EVT_COPY_FAILED, Some(err.to_string()));
        telemetry::increment_counter(LOC_LOOP, CTR_DROPPED);
        match (shared.policy, on_error.as_mut()) {
          (ErrorPolicy::Report, Some(callback)) => callback(&consumer, err),
          _ => fatal!("{}", err),
        }
      }
    }
  }
  telemetry::log_event(None, LOC_LOOP, EVT_TERMINAL, None);
  on_delivery(&consumer, Delivery::Closed);
}
