//! Timed-release scheduler
//!
//! The worker replays a batch against a monotonic clock. The first message
//! defines the origin of replay time: message `i` is released once
//! `now - start >= time_received(i) - time_received(0)`, so absolute capture
//! timestamps never need to be near the current wall time, and wall-clock
//! adjustments cannot skew playback. No catch-up is attempted when
//! publishing runs slow; lag accumulates instead of compressing intervals.
//!
//! The between-message wait is a condition wait with timeout, not a plain
//! sleep, so a concurrent `stop()` wakes the worker promptly.

use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::store::Message;

use super::registry::PublisherRegistry;
use super::session::SessionShared;

/// Marks the session finished and wakes all waiters. Runs on every worker
/// exit path, including unwinding.
struct Teardown<'a>(&'a SessionShared);

impl Drop for Teardown<'_> {
    fn drop(&mut self) {
        {
            let _guard = self.0.wait_lock.lock();
            self.0.finished.store(true, Ordering::Release);
            self.0.stop.store(true, Ordering::Release);
        }
        self.0.wait_cv.notify_all();
    }
}

pub(super) fn run(
    shared: &SessionShared,
    registry: &PublisherRegistry,
    batch: impl Iterator<Item = Message>,
) {
    let teardown = Teardown(shared);
    // Held for the whole iteration: nothing else in the session may touch
    // the log cursor while the worker drains it.
    let _batch_guard = shared.batch_lock.lock();

    let start = Instant::now();
    let mut first_msg_time: Option<i64> = None;

    for msg in batch {
        if shared.stop.load(Ordering::Acquire) {
            break;
        }

        // The first message goes out right away and defines time zero.
        match first_msg_time {
            None => first_msg_time = Some(msg.time_received),
            Some(origin) => {
                let offset = msg.time_received.saturating_sub(origin).max(0);
                wait_until(shared, start, Duration::from_nanos(offset as u64));
            }
        }

        publish(registry, &msg);
    }

    drop(teardown);
}

/// Block until `start + target` on the monotonic clock, or until `stop` is
/// raised, whichever comes first. Spurious wakeups re-evaluate both.
fn wait_until(shared: &SessionShared, start: Instant, target: Duration) {
    loop {
        let now = start.elapsed();
        if now >= target || shared.stop.load(Ordering::Acquire) {
            return;
        }
        let mut guard = shared.sleep_lock.lock();
        // stop() flips the flag under this lock before notifying, so a
        // re-check here cannot miss the wakeup.
        if shared.stop.load(Ordering::Acquire) {
            return;
        }
        let _ = shared.sleep_cv.wait_for(&mut guard, target - now);
    }
}

fn publish(registry: &PublisherRegistry, msg: &Message) {
    match registry.get(&msg.topic, &msg.type_name) {
        Some(publisher) => {
            if let Err(e) = publisher.publish_raw(&msg.data, &msg.type_name) {
                warn!(topic = %msg.topic, error = %e, "failed to publish message");
            } else {
                debug!(topic = %msg.topic, type_name = %msg.type_name, "publishing");
            }
        }
        None => {
            // Advertisement failed or the pair was never advertised.
            debug!(topic = %msg.topic, type_name = %msg.type_name, "no publisher; dropping message");
        }
    }
}
