use std::time::Duration;

pub const SHORT_TIMEOUT: Duration = Duration::from_millis(500);
pub const LONG_TIMEOUT: Duration = Duration::from_secs(5);
pub const STRESS_TIMEOUT: Duration = Duration::from_secs(30);

pub const CONTENTION_PRODUCERS: usize = 16;
pub const CONTENTION_MESSAGES: usize = 1_000;

/// Polls `condition` until it holds or `deadline` elapses.
pub fn wait_until(deadline: Duration, condition: impl Fn() -> bool) -> bool {
  let start = std::time::Instant::now();
  while start.elapsed() < deadline {
    if condition() {
      return true;
    }
    std::thread::sleep(Duration::from_millis(2));
  }
  condition()
}

