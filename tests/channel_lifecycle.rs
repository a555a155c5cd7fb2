mod common;
use common::*;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use strand::{Channel, Delivery, RegisterError};

#[test]
fn hello_eight() {
  let delivered: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
  let terminals = Arc::new(AtomicUsize::new(0));

  let cb_delivered = Arc::clone(&delivered);
  let cb_terminals = Arc::clone(&terminals);
  let channel = Channel::builder()
    .buffer_size(100)
    .max_producers(8)
    .create(move |_consumer, delivery| match delivery {
      Delivery::Bytes(bytes) => {
        let text = String::from_utf8(bytes.into_vec()).expect("utf8 payload");
        cb_delivered.lock().unwrap().push(text);
      }
      Delivery::Empty => unreachable!("every producer sends a payload"),
      Delivery::Closed => {
        cb_terminals.fetch_add(1, Ordering::SeqCst);
      }
    })
    .expect("create channel");

  for i in 0..8usize {
    channel
      .register_producer(
        move |producer| {
          let text = format!("hello from worker number {i:02}");
          assert!(producer.send(text.as_bytes()));
        },
        (),
      )
      .expect("register producer");
  }

  channel.join();

  let mut got = delivered.lock().unwrap().clone();
  got.sort();
  let mut expected: Vec<String> = (0..8)
    .map(|i| format!("hello from worker number {i:02}"))
    .collect();
  expected.sort();
  assert_eq!(got, expected);
  assert_eq!(terminals.load(Ordering::SeqCst), 1);
}

#[test]
fn empty_messages_until_threshold() {
  use rand::Rng;

  const THRESHOLD: usize = 20;

  let received = Arc::new(AtomicUsize::new(0));
  let accepted = Arc::new(AtomicUsize::new(0));
  let terminals = Arc::new(AtomicUsize::new(0));

  let cb_received = Arc::clone(&received);
  let cb_terminals = Arc::clone(&terminals);
  let channel = Channel::builder()
    .buffer_size(0)
    .max_producers(4)
    .create(move |consumer, delivery| {
      if delivery.is_closed() {
        cb_terminals.fetch_add(1, Ordering::SeqCst);
        return;
      }
      assert_eq!(delivery, Delivery::Empty);
      if cb_received.fetch_add(1, Ordering::SeqCst) + 1 == THRESHOLD {
        consumer.close();
      }
    })
    .expect("create channel");

  for _ in 0..4 {
    let task_accepted = Arc::clone(&accepted);
    channel
      .register_producer(
        move |producer| {
          // At least 5 each so the four producers always clear the
          // threshold together.
          let quota = rand::thread_rng().gen_range(5..=15);
          for _ in 0..quota {
            if !producer.send_empty() {
              break;
            }
            task_accepted.fetch_add(1, Ordering::SeqCst);
          }
        },
        (),
      )
      .expect("register producer");
  }

  channel.join();

  let received = received.load(Ordering::SeqCst);
  assert!(received >= THRESHOLD);
  assert_eq!(received, accepted.load(Ordering::SeqCst));
  assert_eq!(terminals.load(Ordering::SeqCst), 1);
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct GameResult {
  player_id: u64,
  elapsed_ms: u64,
}

impl GameResult {
  const ENCODED_LEN: usize = 16;

  fn encode(&self) -> [u8; Self::ENCODED_LEN] {
    let mut out = [0u8; Self::ENCODED_LEN];
    out[..8].copy_from_slice(&self.player_id.to_le_bytes());
    out[8..].copy_from_slice(&self.elapsed_ms.to_le_bytes());
    out
  }

  fn decode(bytes: &[u8]) -> Self {
    Self {
      player_id: u64::from_le_bytes(bytes[..8].try_into().unwrap()),
      elapsed_ms: u64::from_le_bytes(bytes[8..].try_into().unwrap()),
    }
  }
}

struct Player {
  id: u64,
  must_sleep: Duration,
}

#[test]
fn the_first_message_wins() {
  let winner: Arc<Mutex<Option<GameResult>>> = Arc::new(Mutex::new(None));
  let non_terminal = Arc::new(AtomicUsize::new(0));
  let early_exits = Arc::new(AtomicUsize::new(0));

  let cb_winner = Arc::clone(&winner);
  let cb_non_terminal = Arc::clone(&non_terminal);
  let channel = Channel::builder()
    .buffer_size(GameResult::ENCODED_LEN)
    .max_producers(4)
    .create(move |consumer, delivery| {
      if let Some(bytes) = delivery.bytes() {
        cb_non_terminal.fetch_add(1, Ordering::SeqCst);
        *cb_winner.lock().unwrap() = Some(GameResult::decode(bytes));
        consumer.close();
      }
    })
    .expect("create channel");

  // Distinct sleeps with a wide gap: player 1 finishes long before the
  // rest, the rest observe closure through `ping` and bow out.
  let sleeps = [50u64, 1_500, 1_600, 1_700];
  for (i, sleep_ms) in sleeps.into_iter().enumerate() {
    let task_early_exits = Arc::clone(&early_exits);
    channel
      .register_producer(
        move |producer| {
          let player = producer
            .context()
            .downcast_ref::<Player>()
            .expect("player context");
          let start = Instant::now();
          while start.elapsed() < player.must_sleep {
            if !producer.ping() {
              task_early_exits.fetch_add(1, Ordering::SeqCst);
              return;
            }
            thread::sleep(Duration::from_millis(10));
          }
          let result = GameResult {
            player_id: player.id,
            elapsed_ms: start.elapsed().as_millis() as u64,
          };
          producer.send(&result.encode());
        },
        Player {
          id: i as u64 + 1,
          must_sleep: Duration::from_millis(sleep_ms),
        },
      )
      .expect("register producer");
  }

  let start = Instant::now();
  channel.join();
  assert!(start.elapsed() < LONG_TIMEOUT, "join must return promptly");

  assert_eq!(non_terminal.load(Ordering::SeqCst), 1);
  assert_eq!(early_exits.load(Ordering::SeqCst), 3);
  let winner = (*winner.lock().unwrap()).expect("one winner");
  assert_eq!(winner.player_id, 1);
}

#[test]
fn sends_stay_bounded_under_a_sleeping_consumer() {
  const NAP: Duration = Duration::from_millis(250);

  let received = Arc::new(AtomicUsize::new(0));
  let cb_received = Arc::clone(&received);
  let channel = Channel::builder()
    .buffer_size(0)
    .max_producers(1)
    .create(move |_consumer, delivery| {
      if !delivery.is_closed() {
        cb_received.fetch_add(1, Ordering::SeqCst);
        thread::sleep(NAP);
      }
    })
    .expect("create channel");

  let producer_elapsed = Arc::new(Mutex::new(Duration::ZERO));
  let task_elapsed = Arc::clone(&producer_elapsed);
  channel
    .register_producer(
      move |producer| {
        let start = Instant::now();
        for _ in 0..3 {
          assert!(producer.send_empty());
        }
        *task_elapsed.lock().unwrap() = start.elapsed();
      },
      (),
    )
    .expect("register producer");

  channel.join();

  assert_eq!(received.load(Ordering::SeqCst), 3);
  let elapsed = *producer_elapsed.lock().unwrap();
  // The third send has to wait for the first delivery to finish, but never
  // longer than the consumer naps: blocking, not spinning or overflowing.
  assert!(elapsed >= Duration::from_millis(200), "send must block: {elapsed:?}");
  assert!(elapsed < Duration::from_secs(2), "send over-blocked: {elapsed:?}");
}

#[test]
fn message_pending_at_close_still_delivered() {
  let delivered: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
  let terminals = Arc::new(AtomicUsize::new(0));
  let send_results: Arc<Mutex<Vec<bool>>> = Arc::new(Mutex::new(Vec::new()));

  let cb_delivered = Arc::clone(&delivered);
  let cb_terminals = Arc::clone(&terminals);
  let channel = Channel::builder()
    .buffer_size(1)
    .max_producers(1)
    .create(move |consumer, delivery| match delivery {
      Delivery::Bytes(bytes) => {
        cb_delivered.lock().unwrap().push(bytes[0]);
        if bytes[0] == 1 {
          // Give the producer time to park its next two messages, then
          // close with one of them pending.
          thread::sleep(Duration::from_millis(200));
          consumer.close();
        }
      }
      Delivery::Empty => unreachable!(),
      Delivery::Closed => {
        cb_terminals.fetch_add(1, Ordering::SeqCst);
      }
    })
    .expect("create channel");

  let task_results = Arc::clone(&send_results);
  channel
    .register_producer(
      move |producer| {
        let mut results = Vec::new();
        for value in 1u8..=3 {
          results.push(producer.send(&[value]));
        }
        *task_results.lock().unwrap() = results;
      },
      (),
    )
    .expect("register producer");

  channel.join();

  assert_eq!(*send_results.lock().unwrap(), vec![true, true, false]);
  assert_eq!(*delivered.lock().unwrap(), vec![1, 2]);
  assert_eq!(terminals.load(Ordering::SeqCst), 1);
}

#[test]
fn consumer_callback_can_register_producers() {
  let delivered: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
  let grown_registered = Arc::new(AtomicBool::new(false));

  let cb_delivered = Arc::clone(&delivered);
  let cb_registered = Arc::clone(&grown_registered);
  let channel = Channel::builder()
    .buffer_size(16)
    .max_producers(2)
    .create(move |consumer, delivery| {
      if let Some(bytes) = delivery.bytes() {
        let text = String::from_utf8_lossy(bytes).into_owned();
        if text == "seed" {
          // Taking the channel lock from inside the callback must not
          // deadlock: the consumer loop released it before calling us.
          consumer
            .register_producer(
              |producer| {
                producer.send(b"grown");
              },
              (),
            )
            .expect("nested registration");
          cb_registered.store(true, Ordering::SeqCst);
        }
        cb_delivered.lock().unwrap().push(text);
      }
    })
    .expect("create channel");

  let task_registered = Arc::clone(&grown_registered);
  channel
    .register_producer(
      move |producer| {
        producer.send(b"seed");
        // Hold this producer slot open until the nested registration has
        // happened, so the channel cannot close early.
        let start = Instant::now();
        while !task_registered.load(Ordering::SeqCst) && start.elapsed() < LONG_TIMEOUT {
          thread::sleep(Duration::from_millis(2));
        }
      },
      (),
    )
    .expect("register producer");

  channel.join();

  assert_eq!(*delivered.lock().unwrap(), vec!["seed", "grown"]);
}

#[test]
fn producer_task_can_register_producers() {
  let received = Arc::new(AtomicUsize::new(0));
  let cb_received = Arc::clone(&received);
  let channel = Channel::builder()
    .buffer_size(0)
    .max_producers(2)
    .create(move |_consumer, delivery| {
      if !delivery.is_closed() {
        cb_received.fetch_add(1, Ordering::SeqCst);
      }
    })
    .expect("create channel");

  channel
    .register_producer(
      |producer| {
        producer
          .register_producer(
            |nested| {
              nested.send_empty();
            },
            (),
          )
          .expect("nested registration from a task");
        producer.send_empty();
      },
      (),
    )
    .expect("register producer");

  channel.join();
  assert_eq!(received.load(Ordering::SeqCst), 2);
}

#[test]
fn registration_rejected_after_close() {
  let closed_seen = Arc::new(AtomicBool::new(false));
  let cb_closed_seen = Arc::clone(&closed_seen);
  let channel = Channel::builder()
    .buffer_size(0)
    .max_producers(2)
    .create(move |consumer, delivery| {
      if !delivery.is_closed() {
        consumer.close();
        cb_closed_seen.store(true, Ordering::SeqCst);
      }
    })
    .expect("create channel");

  channel
    .register_producer(
      |producer| {
        producer.send_empty();
      },
      (),
    )
    .expect("register producer");

  assert!(
    wait_until(LONG_TIMEOUT, || closed_seen.load(Ordering::SeqCst)),
    "consumer must observe and request closure"
  );
  let late = channel.register_producer(|_| {}, ());
  assert!(matches!(late, Err(RegisterError::Closed)));

  channel.join();
}

#[test]
fn terminal_callback_fires_exactly_once() {
  let terminals = Arc::new(AtomicUsize::new(0));
  let cb_terminals = Arc::clone(&terminals);
  let channel = Channel::builder()
    .buffer_size(0)
    .max_producers(3)
    .create(move |consumer, delivery| {
      if delivery.is_closed() {
        cb_terminals.fetch_add(1, Ordering::SeqCst);
      } else {
        // Redundant closure requests must collapse into one terminal call.
        consumer.close();
        consumer.close();
      }
    })
    .expect("create channel");

  for _ in 0..3 {
    channel
      .register_producer(
        |producer| {
          producer.send_empty();
        },
        (),
      )
      .expect("register producer");
  }

  channel.join();
  assert_eq!(terminals.load(Ordering::SeqCst), 1);
}
