//! Minimal tour: three producers each send one greeting, the consumer
//! prints everything it receives.

use strand::Channel;

fn main() {
  let channel = Channel::builder()
    .buffer_size(128)
    .max_producers(3)
    .create(|_consumer, delivery| {
      if let Some(bytes) = delivery.bytes() {
        println!("[Consumer] received: {}", String::from_utf8_lossy(bytes));
      } else if delivery.is_closed() {
        println!("[Consumer] channel closed");
      }
    })
    .expect("create channel");

  for i in 1..=3u32 {
    channel
      .register_producer(
        move |producer| {
          let message = format!("greeting number {i}");
          println!("[Producer {i}] sending");
          producer.send(message.as_bytes());
        },
        (),
      )
      .expect("register producer");
  }

  channel.join();
  println!("[Main] all done");
}
