//! A deliberately slow consumer. The producer's sends block while the slot
//! is occupied, so its pace is dictated by the consumer's naps: no
//! busy-waiting, no queue growth, no stack growth.

use std::thread;
use std::time::{Duration, Instant};

use strand::Channel;

const NAP: Duration = Duration::from_secs(1);

fn main() {
  let channel = Channel::builder()
    .buffer_size(0)
    .max_producers(1)
    .create(|_consumer, delivery| {
      if delivery.is_closed() {
        println!("[Consumer] closed");
        return;
      }
      println!("[Consumer] got a message, napping {NAP:?}");
      thread::sleep(NAP);
    })
    .expect("create channel");

  channel
    .register_producer(
      |producer| {
        let start = Instant::now();
        for i in 1..=3 {
          producer.send_empty();
          println!("[Producer] message {i} accepted at {:?}", start.elapsed());
        }
      },
      (),
    )
    .expect("register producer");

  channel.join();
  println!("[Main] joined");
}
