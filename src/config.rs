use std::fmt;

use crate::channel::shared::{AllocProbe, ErrorCallback};
use crate::channel::{Channel, Consumer};
use crate::error::{CreateError, DeliveryError};
use crate::message::Delivery;

/// How the channel reacts to recoverable resource errors (allocation
/// failure, thread-spawn failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
  /// Print a diagnostic to stderr and terminate the process. Trades
  /// recoverability for simplicity; the default.
  #[default]
  Abort,
  /// Surface resource errors to the caller ([`CreateError`],
  /// [`RegisterError::ResourceExhausted`](crate::RegisterError::ResourceExhausted))
  /// or, for a failed consumer-side message copy, to the delivery-error
  /// callback. Requires one to be set via [`Builder::on_delivery_error`].
  Report,
}

/// A builder for [`Channel`] instances.
///
/// ```no_run
/// use strand::{Channel, ErrorPolicy};
///
/// let channel = Channel::builder()
///   .buffer_size(256)
///   .max_producers(8)
///   .error_policy(ErrorPolicy::Report)
///   .on_delivery_error(|_consumer, err| eprintln!("{err}"))
///   .create(|_consumer, delivery| {
///     if !delivery.is_closed() {
///       println!("{} bytes", delivery.len());
///     }
///   })
///   .expect("create channel");
/// # channel.register_producer(|p| { p.send_empty(); }, ()).unwrap();
/// # channel.join();
/// ```
pub struct Builder {
  pub(crate) buffer_size: usize,
  pub(crate) max_producers: usize,
  pub(crate) policy: ErrorPolicy,
  pub(crate) thread_safety_check: bool,
  pub(crate) on_error: Option<ErrorCallback>,
  pub(crate) alloc_probe: Option<AllocProbe>,
}

impl fmt::Debug for Builder {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Builder")
      .field("buffer_size", &self.buffer_size)
      .field("max_producers", &self.max_producers)
      .field("policy", &self.policy)
      .field("thread_safety_check", &self.thread_safety_check)
      .field("has_error_callback", &self.on_error.is_some())
      .finish_non_exhaustive()
  }
}

impl Default for Builder {
  fn default() -> Self {
    Self::new()
  }
}

impl Builder {
  /// Starts a builder with a zero-byte buffer (empty messages only), a
  /// single producer slot, and the [`Abort`](ErrorPolicy::Abort) policy.
  pub fn new() -> Self {
    Self {
      buffer_size: 0,
      max_producers: 1,
      policy: ErrorPolicy::Abort,
      thread_safety_check: true,
      on_error: None,
      alloc_probe: None,
    }
  }

  /// Maximum payload size in bytes. A `send` with a larger payload is a
  /// programming bug and aborts the process.
  ///
  /// Zero is valid when the application only needs empty messages. This is
  /// the size of the single transfer slot, not a queue depth: the channel
  /// holds at most one in-flight message.
  pub fn buffer_size(mut self, bytes: usize) -> Self {
    self.buffer_size = bytes;
    self
  }

  /// Upper bound on registered producers, fixed for the channel's lifetime.
  /// Must be at least 1; validated at [`create`](Builder::create).
  pub fn max_producers(mut self, count: usize) -> Self {
    self.max_producers = count;
    self
  }

  /// Selects the [`ErrorPolicy`].
  pub fn error_policy(mut self, policy: ErrorPolicy) -> Self {
    self.policy = policy;
    self
  }

  /// Enables or disables the check that [`Channel::join`] runs on the same
  /// thread that created the channel. Enabled by default.
  pub fn thread_safety_check(mut self, enabled: bool) -> Self {
    self.thread_safety_check = enabled;
    self
  }

  /// Callback invoked (never under the channel lock) when the consumer
  /// thread fails to allocate the copy of a pending message under the
  /// [`Report`](ErrorPolicy::Report) policy. The message is dropped and the
  /// channel stays open.
  pub fn on_delivery_error<F>(mut self, callback: F) -> Self
  where
    F: FnMut(&Consumer, DeliveryError) + Send + 'static,
  {
    self.on_error = Some(Box::new(callback));
    self
  }

  /// Test seam: consulted with the payload length before every
  /// consumer-side copy reservation; `false` forces the reservation to
  /// fail.
  #[cfg(test)]
  pub(crate) fn alloc_probe<F>(mut self, probe: F) -> Self
  where
    F: Fn(usize) -> bool + Send + Sync + 'static,
  {
    self.alloc_probe = Some(std::sync::Arc::new(probe));
    self
  }

  /// Finalizes the channel: allocates the slot and producer tables and
  /// spawns the consumer thread, which invokes `on_delivery` for every
  /// message and once more with [`Delivery::Closed`] when the channel
  /// closes.
  ///
  /// Fatal (aborts regardless of policy): `max_producers == 0`, or the
  /// [`Report`](ErrorPolicy::Report) policy without a delivery-error
  /// callback.
  pub fn create<F>(self, on_delivery: F) -> Result<Channel, CreateError>
  where
    F: FnMut(&Consumer, Delivery) + Send + 'static,
  {
    Channel::create(self, Box::new(on_delivery))
  }
}
