//! Demo services hosted by `svcbus serve`.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, Stream};
use svcbus_service::ServiceDescriptor;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::info;

/// Integer and floating point arithmetic.
#[derive(Debug, Default)]
pub struct Math;

pub fn math() -> ServiceDescriptor<Math> {
    ServiceDescriptor::new("math")
        .method("add", |_math: Arc<Math>, (a, b): (i64, i64)| async move {
            a.checked_add(b).ok_or("integer overflow")
        })
        .method("multiply", |_math: Arc<Math>, (a, b): (i64, i64)| async move {
            a.checked_mul(b).ok_or("integer overflow")
        })
        .method("divide", |_math: Arc<Math>, (a, b): (f64, f64)| async move {
            if b == 0.0 {
                Err("division by zero")
            } else {
                Ok(a / b)
            }
        })
}

/// Emits an increasing counter at a fixed interval.
#[derive(Debug)]
pub struct Clock {
    interval: Duration,
    ticks: Option<u64>,
}

impl Clock {
    pub fn new(interval: Duration, ticks: Option<u64>) -> Self {
        Self { interval, ticks }
    }

    fn ticks(&self) -> impl Stream<Item = u64> + Send + 'static {
        let mut timer = interval_at(Instant::now() + self.interval, self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let limit = self.ticks;

        stream::unfold((timer, 0u64), move |(mut timer, count)| async move {
            if limit.is_some_and(|limit| count >= limit) {
                return None;
            }
            timer.tick().await;
            let next = count + 1;
            Some((next, (timer, next)))
        })
    }
}

pub fn clock() -> ServiceDescriptor<Clock> {
    ServiceDescriptor::new("clock")
        .method("interval_ms", |clock: Arc<Clock>, (): ()| async move {
            Ok::<_, Infallible>(clock.interval.as_millis() as u64)
        })
        .event("tick", Clock::ticks)
        .on_dispose(|clock: &Clock| info!(interval = ?clock.interval, "clock stopped"))
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;

    use super::*;

    #[tokio::test]
    async fn clock_stops_after_limit() {
        let clock = Clock::new(Duration::from_millis(1), Some(3));
        let ticks: Vec<u64> = clock.ticks().collect().await;
        assert_eq!(ticks, [1, 2, 3]);
    }

    #[test]
    fn descriptors_list_demo_members() {
        let math = math();
        assert_eq!(math.method_names().collect::<Vec<_>>(), ["add", "multiply", "divide"]);
        let clock = clock();
        assert_eq!(clock.event_names().collect::<Vec<_>>(), ["tick"]);
    }
}
