#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

//! Callback-driven MPSC rendezvous channel over dedicated OS threads.
//!
//! A [`Channel`] owns one consumer thread plus one worker thread per
//! registered producer. Producers hand opaque byte payloads to the consumer
//! one at a time through a single shared slot guarded by a mutex; producers
//! that find the slot busy park on their own condition variable in a FIFO
//! wait queue and are admitted one by one through an explicit election step,
//! so waiters are served strictly in arrival order and a late arrival can
//! never overtake them.
//!
//! The consumer thread drains the slot and invokes an application callback
//! with an owning copy of each payload ([`Delivery`]). No user callback is
//! ever invoked while the channel lock is held, so the callback may block
//! arbitrarily without deadlocking producers.
//!
//! Closure is cooperative: the consumer callback may call
//! [`Consumer::close`], and long-running producer tasks are expected to poll
//! [`Producer::ping`] and return promptly once it reports `false`.
//! [`Channel::join`] then drains everything and tears the channel down.
//!
//! ```no_run
//! let channel = strand::Channel::builder()
//!   .buffer_size(64)
//!   .max_producers(4)
//!   .create(|_consumer, delivery| {
//!     if let Some(bytes) = delivery.bytes() {
//!       println!("got {} bytes", bytes.len());
//!     }
//!   })
//!   .expect("create channel");
//!
//! for id in 0u32..4 {
//!   channel
//!     .register_producer(
//!       move |producer| {
//!         producer.send(&id.to_le_bytes());
//!       },
//!       (),
//!     )
//!     .expect("register producer");
//! }
//!
//! channel.join();
//! ```

mod channel;
mod config;
mod message;

pub mod error;
pub mod telemetry;

pub use channel::{Channel, Consumer, Producer};
pub use config::{Builder, ErrorPolicy};
pub use error::{CreateError, DeliveryError, RegisterError};
pub use message::Delivery;
