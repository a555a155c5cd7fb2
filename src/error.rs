//! Error types for channel construction, producer registration, and
//! consumer-side delivery.

use std::collections::TryReserveError;
use std::fmt;
use std::io;

/// Unrecoverable condition: print a diagnostic and terminate the process.
///
/// Used for programming bugs (oversized payloads, invariant violations) and,
/// under [`ErrorPolicy::Abort`](crate::ErrorPolicy::Abort), for resource
/// exhaustion as well.
macro_rules! fatal {
  ($($arg:tt)*) => {{
    eprintln!("strand: fatal error: {}", format_args!($($arg)*));
    std::process::abort()
  }};
}

pub(crate) use fatal;

/// Reasons a channel could not be created under the
/// [`Report`](crate::ErrorPolicy::Report) policy.
///
/// Under the [`Abort`](crate::ErrorPolicy::Abort) policy the same conditions
/// print a diagnostic and terminate the process instead, so `create` never
/// returns this error.
#[derive(Debug)]
pub enum CreateError {
  /// Reserving the slot buffer or one of the fixed-size producer tables
  /// failed.
  OutOfMemory(TryReserveError),
  /// The consumer thread could not be spawned.
  ResourceExhausted(io::Error),
}

impl fmt::Display for CreateError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CreateError::OutOfMemory(_) => f.write_str("channel resources could not be allocated"),
      CreateError::ResourceExhausted(_) => f.write_str("consumer thread could not be spawned"),
    }
  }
}

impl std::error::Error for CreateError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      CreateError::OutOfMemory(err) => Some(err),
      CreateError::ResourceExhausted(err) => Some(err),
    }
  }
}

/// Reasons a producer could not be registered.
#[derive(Debug)]
pub enum RegisterError {
  /// The channel already holds `max_producers` registered producers.
  MaxProducersReached,
  /// The channel is closed, or `join` has begun.
  Closed,
  /// The worker thread could not be spawned. Only returned under the
  /// [`Report`](crate::ErrorPolicy::Report) policy; fatal otherwise.
  ResourceExhausted(io::Error),
}

impl fmt::Display for RegisterError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RegisterError::MaxProducersReached => f.write_str("producer capacity reached"),
      RegisterError::Closed => f.write_str("channel is closed"),
      RegisterError::ResourceExhausted(_) => f.write_str("worker thread could not be spawned"),
    }
  }
}

impl std::error::Error for RegisterError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      RegisterError::ResourceExhausted(err) => Some(err),
      _ => None,
    }
  }
}

/// Handed to the delivery-error callback when the consumer thread could not
/// allocate the per-message copy of a pending payload.
///
/// The message it refers to has been dropped; the producer's `send` already
/// returned `true` and is not notified. The channel stays open.
#[derive(Debug)]
pub struct DeliveryError {
  message_len: usize,
  source: TryReserveError,
}

impl DeliveryError {
  pub(crate) fn new(message_len: usize, source: TryReserveError) -> Self {
    Self {
      message_len,
      source,
    }
  }

  /// Length in bytes of the message that was dropped.
  pub fn message_len(&self) -> usize {
    self.message_len
  }
}

impl fmt::Display for DeliveryError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "dropped a {}-byte message: copy allocation failed",
      self.message_len
    )
  }
}

impl std::error::Error for DeliveryError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    Some(&self.source)
  }
}
