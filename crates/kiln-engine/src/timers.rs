//! One-shot timers
//!
//! Timers are ordered by due time, then by creation, so timers with equal
//! delays fire in the order they were set.

use crate::context::Context;
use crate::value::Value;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Longest delay a timer can be scheduled with; larger delays are clamped
pub const MAX_TIMER_DELAY: Duration = Duration::from_millis(i32::MAX as u64);

/// A pending timer callback
pub(crate) struct Timer {
    pub(crate) callback: Value,
    pub(crate) args: Vec<Value>,
}

#[derive(Default)]
pub(crate) struct TimerQueue {
    pending: BTreeMap<(Instant, u64), Timer>,
    due_by_id: FxHashMap<u64, Instant>,
    next_id: u64,
}

impl TimerQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&mut self, delay: Duration, timer: Timer) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        let now = Instant::now();
        let due = now
            .checked_add(delay.min(MAX_TIMER_DELAY))
            .unwrap_or(now);
        self.pending.insert((due, id), timer);
        self.due_by_id.insert(id, due);
        id
    }

    pub(crate) fn cancel(&mut self, id: u64) -> bool {
        match self.due_by_id.remove(&id) {
            Some(due) => self.pending.remove(&(due, id)).is_some(),
            None => false,
        }
    }

    /// Remove the timer that is due first
    pub(crate) fn pop_next(&mut self) -> Option<(Instant, Timer)> {
        let ((due, id), timer) = self.pending.pop_first()?;
        self.due_by_id.remove(&id);
        Some((due, timer))
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn clear(&mut self) {
        self.pending.clear();
        self.due_by_id.clear();
    }
}

impl Context {
    /// Schedule `callback(...args)` to run after `delay_ms` milliseconds.
    ///
    /// The callback runs as a job once the job queue is empty and the delay
    /// has passed. Negative or NaN delays mean zero; delays past
    /// [`MAX_TIMER_DELAY`] are clamped to it. Returns the timer id.
    pub fn set_timeout(&mut self, callback: Value, delay_ms: f64, args: Vec<Value>) -> u64 {
        let delay = if delay_ms > 0.0 {
            Duration::try_from_secs_f64(delay_ms / 1000.0)
                .map_or(MAX_TIMER_DELAY, |delay| delay.min(MAX_TIMER_DELAY))
        } else {
            Duration::ZERO
        };
        let id = self.timers.add(delay, Timer { callback, args });
        debug!(context = self.id().as_u64(), timer = id, ?delay, "timer set");
        id
    }

    /// Cancel a pending timer; unknown ids are ignored
    pub fn clear_timeout(&mut self, id: u64) -> bool {
        self.timers.cancel(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobLoop;
    use crate::runtime::{Runtime, RuntimeOptions};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn timer() -> Timer {
        Timer {
            callback: Value::Undefined,
            args: Vec::new(),
        }
    }

    #[test]
    fn test_equal_delays_keep_creation_order() {
        let mut queue = TimerQueue::new();
        let first = queue.add(Duration::ZERO, timer());
        let second = queue.add(Duration::ZERO, timer());
        assert!(first < second);
        assert_eq!(queue.len(), 2);
        let (due_a, _) = queue.pop_next().unwrap();
        let (due_b, _) = queue.pop_next().unwrap();
        assert!(due_a <= due_b);
        assert!(queue.pop_next().is_none());
    }

    #[test]
    fn test_cancel() {
        let mut queue = TimerQueue::new();
        let id = queue.add(Duration::from_millis(5), timer());
        assert!(queue.cancel(id));
        assert!(!queue.cancel(id));
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_oversized_delay_is_clamped() {
        let mut queue = TimerQueue::new();
        let before = Instant::now();
        queue.add(Duration::MAX, timer());
        let (due, _) = queue.pop_next().unwrap();
        assert!(due > before);
        assert!(due <= Instant::now() + MAX_TIMER_DELAY);
    }

    #[test]
    fn test_huge_delays_schedule_without_firing() {
        let runtime = Runtime::new(RuntimeOptions::default()).unwrap();
        let mut ctx = Context::new_raw(&runtime).unwrap();
        let fired = Rc::new(RefCell::new(0));
        let counter = fired.clone();
        let callback = Value::Object(ctx.new_function("late", move |_, _, _| {
            *counter.borrow_mut() += 1;
            Ok(Value::Undefined)
        }));

        let ids: Vec<u64> = [1e30, f64::MAX, f64::INFINITY, 1e19]
            .into_iter()
            .map(|delay| ctx.set_timeout(callback.clone(), delay, Vec::new()))
            .collect();
        assert_eq!(ctx.pending_timers(), 4);

        for id in ids {
            assert!(ctx.clear_timeout(id));
        }
        let report = JobLoop::drain(&mut ctx);
        assert_eq!(report.timers_fired, 0);
        assert_eq!(*fired.borrow(), 0);
    }

    #[test]
    fn test_negative_and_nan_delays_fire_immediately() {
        let runtime = Runtime::new(RuntimeOptions::default()).unwrap();
        let mut ctx = Context::new_raw(&runtime).unwrap();
        ctx.set_timeout(Value::Undefined, -5.0, Vec::new());
        ctx.set_timeout(Value::Undefined, f64::NAN, Vec::new());
        ctx.set_timeout(Value::Undefined, f64::NEG_INFINITY, Vec::new());
        assert_eq!(ctx.pending_timers(), 3);
        let (due, _) = ctx.timers.pop_next().unwrap();
        assert!(due <= Instant::now());
    }

    #[test]
    fn test_timers_fire_after_jobs_in_due_order() {
        let runtime = Runtime::new(RuntimeOptions::default()).unwrap();
        let mut ctx = Context::new_raw(&runtime).unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));

        let record = |ctx: &mut Context, tag: &'static str, log: &Rc<RefCell<Vec<&'static str>>>| {
            let log = log.clone();
            Value::Object(ctx.new_function(tag, move |_, _, _| {
                log.borrow_mut().push(tag);
                Ok(Value::Undefined)
            }))
        };

        let slow = record(&mut ctx, "slow", &log);
        let fast = record(&mut ctx, "fast", &log);
        let job = record(&mut ctx, "job", &log);
        let cancelled = record(&mut ctx, "cancelled", &log);

        ctx.set_timeout(slow, 20.0, Vec::new());
        ctx.set_timeout(fast, 1.0, Vec::new());
        let id = ctx.set_timeout(cancelled, 0.0, Vec::new());
        ctx.clear_timeout(id);
        ctx.enqueue_call(job, Value::Undefined, Vec::new());

        let report = JobLoop::drain(&mut ctx);
        assert_eq!(*log.borrow(), vec!["job", "fast", "slow"]);
        assert_eq!(report.timers_fired, 2);
        assert_eq!(ctx.pending_timers(), 0);
    }
}
