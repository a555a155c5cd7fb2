//! The channel owner handle and its lifecycle: construction with fallible
//! resource acquisition, producer registration, and `join` teardown.

mod consumer;
mod handoff;
mod producer;
pub(crate) mod shared;

pub use consumer::Consumer;
pub use producer::Producer;

use std::any::Any;
use std::collections::TryReserveError;
use std::fmt;
use std::mem;
use std::panic;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use crossbeam_utils::CachePadded;
use parking_lot::{Condvar, Mutex};

use crate::config::{Builder, ErrorPolicy};
use crate::error::{fatal, CreateError, RegisterError};
use crate::telemetry;

use shared::{ConsumerCallback, DoneGuard, ProducerMeta, ProducerTask, Shared, State};

use self::handoff::HandoffQueue;

const LOC_CHANNEL: &str = "Channel";
const EVT_REGISTER: &str = "Ch:RegisterProducer";
const EVT_JOIN: &str = "Ch:Join";

/// An open MPSC channel: one consumer thread, up to `max_producers` worker
/// threads, and a single-slot transfer buffer between them.
///
/// Created through [`Channel::builder`]. The handle is owned by the creating
/// thread; worker and consumer threads share the channel internals by
/// reference. Terminate with [`Channel::join`], which blocks until every
/// producer task has returned and the consumer has delivered its terminal
/// callback.
///
/// Dropping the handle without joining closes the channel so the threads
/// run down, but detaches them instead of blocking.
pub struct Channel {
  shared: Arc<Shared>,
  consumer_thread: Option<thread::JoinHandle<()>>,
  parent_thread: ThreadId,
  thread_safety_check: bool,
}

impl Channel {
  /// Starts configuring a new channel.
  pub fn builder() -> Builder {
    Builder::new()
  }

  pub(crate) fn create(
    cfg: Builder,
    on_delivery: ConsumerCallback,
  ) -> Result<Channel, CreateError> {
    if cfg.max_producers == 0 {
      fatal!("max_producers must be at least 1");
    }
    if cfg.policy == ErrorPolicy::Report && cfg.on_error.is_none() {
      fatal!("error_policy = Report requires a delivery-error callback");
    }
    let policy = cfg.policy;

    // Each acquisition below can fail under memory pressure; everything
    // reserved so far is released by drop glue on the early return, newest
    // first. The consumer thread is spawned last so a spawn failure leaks
    // nothing.
    let slot = reserve_zeroed(cfg.buffer_size).map_err(|err| oom(policy, "slot buffer", err))?;

    let mut producer_cvs: Vec<Condvar> = Vec::new();
    producer_cvs
      .try_reserve_exact(cfg.max_producers)
      .map_err(|err| oom(policy, "producer condition variables", err))?;
    producer_cvs.resize_with(cfg.max_producers, Condvar::new);

    let mut producers: Vec<ProducerMeta> = Vec::new();
    producers
      .try_reserve_exact(cfg.max_producers)
      .map_err(|err| oom(policy, "producer table", err))?;

    let mut threads: Vec<thread::JoinHandle<()>> = Vec::new();
    threads
      .try_reserve_exact(cfg.max_producers)
      .map_err(|err| oom(policy, "worker handle table", err))?;

    let handoff = HandoffQueue::with_capacity(cfg.max_producers)
      .map_err(|err| oom(policy, "wait queue", err))?;

    let shared = Arc::new(Shared {
      buffer_size: cfg.buffer_size,
      max_producers: cfg.max_producers,
      policy,
      alloc_probe: cfg.alloc_probe,
      state: CachePadded::new(Mutex::new(State {
        slot,
        slot_len: 0,
        pending: false,
        closed: false,
        joined: false,
        producers,
        producers_done: 0,
        threads,
        handoff,
      })),
      consumer_cv: Condvar::new(),
      producer_cvs: producer_cvs.into_boxed_slice(),
    });

    let thread_shared = Arc::clone(&shared);
    let on_error = cfg.on_error;
    let consumer_thread = thread::Builder::new()
      .name("strand-consumer".into())
      .spawn(move || consumer::run(thread_shared, on_delivery, on_error))
      .map_err(|err| match policy {
        ErrorPolicy::Report => CreateError::ResourceExhausted(err),
        ErrorPolicy::Abort => fatal!("spawning the consumer thread: {}", err),
      })?;

    Ok(Channel {
      shared,
      consumer_thread: Some(consumer_thread),
      parent_thread: thread::current().id(),
      thread_safety_check: cfg.thread_safety_check,
    })
  }

  /// Registers a producer: spawns a dedicated worker thread that runs
  /// `task` with its [`Producer`] handle. `context` is retrievable inside
  /// the task via [`Producer::context`].
  ///
  /// Tasks may themselves register further producers (through
  /// [`Producer::register_producer`] or
  /// [`Consumer::register_producer`]) up to `max_producers`.
  pub fn register_producer<F, C>(&self, task: F, context: C) -> Result<(), RegisterError>
  where
    F: FnOnce(&Producer) + Send + 'static,
    C: Any + Send,
  {
    register(&self.shared, Box::new(task), Box::new(context))
  }

  /// Blocks until the channel has fully drained, then tears it down.
  ///
  /// Waits for the consumer thread (which exits once the channel is closed,
  /// either by [`Consumer::close`] or by the last producer task returning
  /// after `join` began), marks the channel closed, then joins every worker
  /// thread in registration order. If any thread panicked, the first panic
  /// is re-raised here after all joins complete.
  ///
  /// Fatal (aborts): calling from a thread other than the creator while the
  /// thread-safety check is enabled, or joining with no registered
  /// producers. Calling `join` twice is impossible; it consumes the handle.
  pub fn join(mut self) {
    if self.thread_safety_check && thread::current().id() != self.parent_thread {
      fatal!("join called from a thread other than the channel's creator");
    }
    telemetry::log_event(None, LOC_CHANNEL, EVT_JOIN, None);
    {
      let mut state = self.shared.state.lock();
      if state.producers.is_empty() {
        fatal!("join requires at least one registered producer");
      }
      state.joined = true;
      if state.producers_done == state.producers.len() {
        state.closed = true;
        self.shared.consumer_cv.notify_one();
      }
    }
    let consumer_thread = self
      .consumer_thread
      .take()
      .expect("consumer thread handle present until join");
    let consumer_result = consumer_thread.join();
    let workers = {
      let mut state = self.shared.state.lock();
      // Closed is terminal past this point no matter how the consumer
      // returned; anything still parked in `send` must observe it.
      self.shared.close_locked(&mut state);
      mem::take(&mut state.threads)
    };
    let mut first_panic = consumer_result.err();
    for handle in workers {
      if let Err(payload) = handle.join() {
        first_panic.get_or_insert(payload);
      }
    }
    if let Some(payload) = first_panic {
      panic::resume_unwind(payload);
    }
  }
}

impl Drop for Channel {
  fn drop(&mut self) {
    if self.consumer_thread.is_none() {
      // Already joined.
      return;
    }
    // Dropped without `join`: close so the threads run down, detach them.
    let mut state = self.shared.state.lock();
    self.shared.close_locked(&mut state);
  }
}

impl fmt::Debug for Channel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Channel")
      .field("shared", &self.shared)
      .field("joined", &self.consumer_thread.is_none())
      .finish_non_exhaustive()
  }
}

/// Registration routine shared by [`Channel::register_producer`] and its
/// [`Consumer`]/[`Producer`] aliases.
pub(crate) fn register(
  shared: &Arc<Shared>,
  task: ProducerTask,
  context: Box<dyn Any + Send>,
) -> Result<(), RegisterError> {
  let mut state = shared.state.lock();
  if state.producers.len() == shared.max_producers {
    return Err(RegisterError::MaxProducersReached);
  }
  if state.closed || state.joined {
    return Err(RegisterError::Closed);
  }
  let index = state.producers.len();
  let handle = Producer::new(Arc::clone(shared), index, context);
  let guard_shared = Arc::clone(shared);
  let spawned = thread::Builder::new()
    .name(format!("strand-producer-{index}"))
    .spawn(move || {
      // The guard counts the producer as done even if the task panics, so
      // `join` cannot hang on it.
      let _done = DoneGuard {
        shared: guard_shared,
        index,
      };
      task(&handle);
    });
  match spawned {
    Ok(thread_handle) => {
      state.producers.push(ProducerMeta { done: false });
      state.threads.push(thread_handle);
      telemetry::log_event(Some(index), LOC_CHANNEL, EVT_REGISTER, None);
      Ok(())
    }
    Err(err) => match shared.policy {
      ErrorPolicy::Report => Err(RegisterError::ResourceExhausted(err)),
      ErrorPolicy::Abort => fatal!("spawning worker thread {}: {}", index, err),
    },
  }
}

fn reserve_zeroed(len: usize) -> Result<Box<[u8]>, TryReserveError> {
  let mut buf: Vec<u8> = Vec::new();
  buf.try_reserve_exact(len)?;
  buf.resize(len, 0);
  Ok(buf.into_boxed_slice())
}

fn oom(policy: ErrorPolicy, what: &str, err: TryReserveError) -> CreateError {
  match policy {
    ErrorPolicy::Report => CreateError::OutOfMemory(err),
    ErrorPolicy::Abort => fatal!("allocating the {}: {}", what, err),
  }
}
