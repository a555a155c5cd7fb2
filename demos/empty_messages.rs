//! A channel carrying only empty messages (`buffer_size = 0`). Each
//! producer sends a random number of them; once the consumer has counted
//! twenty it requests closure, and producers observe the closure through
//! the rejected send.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rand::Rng;
use strand::Channel;

const N_PRODUCERS: usize = 4;
const MESSAGE_THRESHOLD: usize = 20;

struct ProducerPlan {
  id: usize,
  quota: usize,
}

fn main() {
  let received = Arc::new(AtomicUsize::new(0));

  let cb_received = Arc::clone(&received);
  let channel = Channel::builder()
    .buffer_size(0)
    .max_producers(N_PRODUCERS)
    .create(move |consumer, delivery| {
      if delivery.is_closed() {
        println!("[Consumer] closed");
        return;
      }
      let count = cb_received.fetch_add(1, Ordering::SeqCst) + 1;
      println!("[Consumer] empty message {count}");
      if count == MESSAGE_THRESHOLD {
        println!("[Consumer] threshold reached, closing");
        consumer.close();
      }
    })
    .expect("create channel");

  let mut rng = rand::thread_rng();
  for id in 1..=N_PRODUCERS {
    let plan = ProducerPlan {
      id,
      quota: rng.gen_range(5..=15),
    };
    channel
      .register_producer(
        |producer| {
          let plan = producer
            .context()
            .downcast_ref::<ProducerPlan>()
            .expect("producer plan context");
          let mut sent = 0;
          while sent < plan.quota {
            if !producer.send_empty() {
              println!(
                "[Producer {}] channel closed after {} of {} messages",
                plan.id, sent, plan.quota
              );
              return;
            }
            sent += 1;
          }
          println!("[Producer {}] quota of {} exhausted", plan.id, plan.quota);
        },
        plan,
      )
      .expect("register producer");
  }

  channel.join();
  println!(
    "[Main] consumer counted {} messages in total",
    received.load(Ordering::SeqCst)
  );
}
