//! Optional protocol event collection, compiled in behind the
//! `strand_telemetry` feature and reduced to no-ops otherwise.
//!
//! Events record the interleaving of subscriptions, elections, deposits,
//! and deliveries across the consumer and worker threads; counters
//! aggregate hot-path occurrences. Intended for debugging scheduling
//! interleavings, not for production metrics.

#[cfg(feature = "strand_telemetry")]
mod enabled {
  use std::collections::HashMap;
  use std::fmt;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Mutex;
  use std::thread::{self, ThreadId};
  use std::time::Instant;

  use once_cell::sync::Lazy;

  static NEXT_EVENT_SEQUENCE_ID: AtomicUsize = AtomicUsize::new(0);

  /// One recorded protocol event.
  #[derive(Clone)]
  pub struct TelemetryEvent {
    /// Global sequence number, totally ordering all events.
    pub seq_id: usize,
    /// When the event was recorded.
    pub timestamp: Instant,
    /// The OS thread that recorded it.
    pub os_thread_id: ThreadId,
    /// The producer slot the event concerns, when it concerns one.
    pub producer_index: Option<usize>,
    /// Code location, e.g. `Producer::send`.
    pub location: String,
    /// Event tag, e.g. `P:Deposit`.
    pub event_type: String,
    /// Optional human-readable detail.
    pub message: Option<String>,
  }

  impl fmt::Debug for TelemetryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("TelemetryEvent")
        .field("seq", &self.seq_id)
        .field("os_tid", &self.os_thread_id)
        .field("producer", &self.producer_index)
        .field("loc", &self.location)
        .field("evt", &self.event_type)
        .field("msg", &self.message.as_deref().unwrap_or(""))
        .finish()
    }
  }

  type CounterKey = (String, String); // (location, counter_name)

  struct CollectorData {
    events: Vec<TelemetryEvent>,
    counters: HashMap<CounterKey, usize>,
    start_time: Instant,
  }

  impl CollectorData {
    fn new() -> Self {
      CollectorData {
        events: Vec::new(),
        counters: HashMap::new(),
        start_time: Instant::now(),
      }
    }
  }

  static GLOBAL_COLLECTOR: Lazy<Mutex<CollectorData>> =
    Lazy::new(|| Mutex::new(CollectorData::new()));

  /// Records a protocol event.
  pub fn log_event_fn(
    producer_index: Option<usize>,
    location: &str,
    event_type: &str,
    message: Option<String>,
  ) {
    let event = TelemetryEvent {
      seq_id: NEXT_EVENT_SEQUENCE_ID.fetch_add(1, Ordering::Relaxed),
      timestamp: Instant::now(),
      os_thread_id: thread::current().id(),
      producer_index,
      location: location.to_string(),
      event_type: event_type.to_string(),
      message,
    };
    if let Ok(mut collector) = GLOBAL_COLLECTOR.lock() {
      collector.events.push(event);
    } else {
      eprintln!("[strand telemetry] collector mutex poisoned while recording event");
    }
  }

  /// Bumps a named counter.
  pub fn increment_counter_fn(location: &'static str, counter_name: &str) {
    let key = (location.to_string(), counter_name.to_string());
    if let Ok(mut collector) = GLOBAL_COLLECTOR.lock() {
      *collector.counters.entry(key).or_insert(0) += 1;
    } else {
      eprintln!("[strand telemetry] collector mutex poisoned while incrementing counter");
    }
  }

  /// Prints every recorded event (in sequence order) and all counters to
  /// stdout.
  pub fn print_telemetry_report_fn() {
    if let Ok(collector) = GLOBAL_COLLECTOR.lock() {
      println!("\n--- Strand Telemetry Report (feature: strand_telemetry) ---");

      if collector.events.is_empty() {
        println!("\n[Events] none recorded");
      } else {
        println!("\n[Events] {} recorded:", collector.events.len());
        let mut sorted_events = collector.events.clone();
        sorted_events.sort_by_key(|e| e.seq_id);
        for event in sorted_events.iter() {
          let since_start = event.timestamp.duration_since(collector.start_time);
          let producer = event
            .producer_index
            .map_or_else(|| "-".to_string(), |i| i.to_string());
          println!(
            "  +{:<10.6}s [Seq:{:<5}] TID:{:<14} P:{:<4} Loc:{:<22} Evt:{:<22} {}",
            since_start.as_secs_f64(),
            event.seq_id,
            format!("{:?}", event.os_thread_id),
            producer,
            event.location,
            event.event_type,
            event.message.as_deref().unwrap_or("")
          );
        }
      }

      if collector.counters.is_empty() {
        println!("\n[Counters] none recorded");
      } else {
        println!("\n[Counters] {} recorded:", collector.counters.len());
        let mut sorted_counters: Vec<_> = collector.counters.iter().collect();
        sorted_counters.sort_by_key(|(k, _v)| *k);
        for ((loc, name), count) in sorted_counters {
          println!("  Loc:{:<22} Counter:{:<26} Value: {}", loc, name, count);
        }
      }
      println!("\n--- End of Telemetry Report ---");
    } else {
      eprintln!("[strand telemetry] collector mutex poisoned, cannot print report");
    }
  }

  /// Clears events, counters, and the sequence numbering.
  pub fn clear_telemetry_fn() {
    if let Ok(mut collector) = GLOBAL_COLLECTOR.lock() {
      collector.events.clear();
      collector.counters.clear();
      collector.start_time = Instant::now();
    }
    NEXT_EVENT_SEQUENCE_ID.store(0, Ordering::Relaxed);
  }
}

#[cfg(not(feature = "strand_telemetry"))]
mod disabled {
  /// No-op without the `strand_telemetry` feature.
  #[inline(always)]
  pub fn log_event_fn(
    _producer_index: Option<usize>,
    _location: &'static str,
    _event_type: &'static str,
    _message: Option<String>,
  ) {
  }
  /// No-op without the `strand_telemetry` feature.
  #[inline(always)]
  pub fn increment_counter_fn(_location: &'static str, _counter_name: &'static str) {}
  /// No-op without the `strand_telemetry` feature.
  #[inline(always)]
  pub fn print_telemetry_report_fn() {}
  /// No-op without the `strand_telemetry` feature.
  #[inline(always)]
  pub fn clear_telemetry_fn() {}
}

#[cfg(feature = "strand_telemetry")]
pub use enabled::{
  clear_telemetry_fn as clear_telemetry, increment_counter_fn as increment_counter,
  log_event_fn as log_event, print_telemetry_report_fn as print_telemetry_report, TelemetryEvent,
};

#[cfg(not(feature = "strand_telemetry"))]
pub use disabled::{
  clear_telemetry_fn as clear_telemetry, increment_counter_fn as increment_counter,
  log_event_fn as log_event, print_telemetry_report_fn as print_telemetry_report,
};
