use std::collections::TryReserveError;
use std::fmt;

/// A single delivery handed to the consumer callback.
///
/// For [`Delivery::Bytes`] the buffer is a freshly allocated copy of the
/// producer's payload and ownership transfers to the callback; it is
/// released by dropping it. The zero-length case is the distinct
/// [`Delivery::Empty`] variant, and [`Delivery::Closed`] is delivered
/// exactly once per channel as the final invocation.
#[derive(Clone, PartialEq, Eq)]
pub enum Delivery {
  /// An owned copy of a producer's payload.
  Bytes(Box<[u8]>),
  /// A payload-free message sent via `send_empty` (or `send` with an empty
  /// slice).
  Empty,
  /// Terminal notification: the channel is closed and no further callback
  /// invocations will occur.
  Closed,
}

impl Delivery {
  /// The payload, when this delivery carries one.
  pub fn bytes(&self) -> Option<&[u8]> {
    match self {
      Delivery::Bytes(bytes) => Some(bytes),
      _ => None,
    }
  }

  /// Consumes the delivery, returning the owned payload when present.
  pub fn into_bytes(self) -> Option<Box<[u8]>> {
    match self {
      Delivery::Bytes(bytes) => Some(bytes),
      _ => None,
    }
  }

  /// Payload length in bytes; zero for `Empty` and `Closed`.
  pub fn len(&self) -> usize {
    match self {
      Delivery::Bytes(bytes) => bytes.len(),
      _ => 0,
    }
  }

  /// `true` iff this delivery carries no payload bytes.
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// `true` iff this is the terminal notification.
  pub fn is_closed(&self) -> bool {
    matches!(self, Delivery::Closed)
  }
}

impl fmt::Debug for Delivery {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Delivery::Bytes(bytes) => write!(f, "Delivery::Bytes({} bytes)", bytes.len()),
      Delivery::Empty => f.write_str("Delivery::Empty"),
      Delivery::Closed => f.write_str("Delivery::Closed"),
    }
  }
}

/// Copies `src` into a freshly reserved owned buffer.
///
/// The reservation goes through `try_reserve_exact` so exhaustion surfaces
/// as an error instead of aborting the process. `probe`, when present, is
/// consulted first; a `false` answer is converted into a real reservation
/// failure (`TryReserveError` has no public constructor).
pub(crate) fn copy_payload(
  src: &[u8],
  probe: Option<&(dyn Fn(usize) -> bool + Send + Sync)>,
) -> Result<Box<[u8]>, TryReserveError> {
  let mut buf: Vec<u8> = Vec::new();
  if let Some(probe) = probe {
    if !probe(src.len()) {
      buf.try_reserve_exact(usize::MAX)?;
    }
  }
  buf.try_reserve_exact(src.len())?;
  buf.extend_from_slice(src);
  Ok(buf.into_boxed_slice())
}
