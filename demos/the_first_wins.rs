//! Four players sleep for random durations and race to deliver their
//! result; the consumer keeps the first one and closes the channel. The
//! losers notice through `ping` and bow out, so `join` returns promptly.

use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;
use strand::Channel;

const N_PLAYERS: usize = 4;
const SLEEP_UPPER_BOUND_MS: u64 = 3_000;
const WAKE_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy)]
struct GameResult {
  player_id: u64,
  time_elapsed_ms: u64,
}

impl GameResult {
  const ENCODED_LEN: usize = 16;

  fn encode(&self) -> [u8; Self::ENCODED_LEN] {
    let mut out = [0u8; Self::ENCODED_LEN];
    out[..8].copy_from_slice(&self.player_id.to_le_bytes());
    out[8..].copy_from_slice(&self.time_elapsed_ms.to_le_bytes());
    out
  }

  fn decode(bytes: &[u8]) -> Self {
    Self {
      player_id: u64::from_le_bytes(bytes[..8].try_into().unwrap()),
      time_elapsed_ms: u64::from_le_bytes(bytes[8..].try_into().unwrap()),
    }
  }
}

struct Player {
  id: u64,
  must_sleep: Duration,
}

static WINNER: Mutex<Option<GameResult>> = Mutex::new(None);

fn main() {
  let channel = Channel::builder()
    .buffer_size(GameResult::ENCODED_LEN)
    .max_producers(N_PLAYERS)
    .create(|consumer, delivery| {
      if let Some(bytes) = delivery.bytes() {
        let result = GameResult::decode(bytes);
        let mut winner = WINNER.lock().unwrap();
        if winner.is_none() {
          *winner = Some(result);
          consumer.close();
        }
      }
    })
    .expect("create channel");

  let mut rng = rand::thread_rng();
  for id in 1..=N_PLAYERS as u64 {
    let player = Player {
      id,
      must_sleep: Duration::from_millis(rng.gen_range(0..SLEEP_UPPER_BOUND_MS)),
    };
    println!(
      "[Main] player {} will take {:?}",
      player.id, player.must_sleep
    );
    channel
      .register_producer(
        |producer| {
          let player = producer
            .context()
            .downcast_ref::<Player>()
            .expect("player context");
          let start = Instant::now();
          while start.elapsed() < player.must_sleep {
            if !producer.ping() {
              println!("[Player {}] too slow, giving up", player.id);
              return;
            }
            thread::sleep(WAKE_INTERVAL);
          }
          let result = GameResult {
            player_id: player.id,
            time_elapsed_ms: start.elapsed().as_millis() as u64,
          };
          if producer.send(&result.encode()) {
            println!("[Player {}] submitted a result", player.id);
          }
        },
        player,
      )
      .expect("register producer");
  }

  channel.join();

  let winner = (*WINNER.lock().unwrap()).expect("someone must win");
  println!(
    "[Main] player {} wins after {} ms (out of {} players)",
    winner.player_id, winner.time_elapsed_ms, N_PLAYERS
  );
}
