//! Deferred work and the job loop
//!
//! Jobs run strictly in enqueue order. Timers and worker messages only
//! feed the queue once it is empty, so a chain of promise reactions always
//! settles before the next timer fires.

use crate::capability::promise;
use crate::context::Context;
use crate::error::ScriptFailure;
use crate::value::{ScriptResult, Value};
use crate::worker;
use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;
use tracing::{debug, error, warn};

type JobFn = Box<dyn FnOnce(&mut Context) -> ScriptResult<()>>;

/// A deferred unit of work
pub struct Job {
    label: &'static str,
    run: JobFn,
}

impl Job {
    /// Create a job from a closure
    pub fn new<F>(label: &'static str, run: F) -> Self
    where
        F: FnOnce(&mut Context) -> ScriptResult<()> + 'static,
    {
        Self {
            label,
            run: Box::new(run),
        }
    }

    /// A job that calls `function` with `this` and `args`
    pub fn call(function: Value, this: Value, args: Vec<Value>) -> Self {
        Self::new("call", move |ctx| ctx.call(&function, &this, &args).map(|_| ()))
    }

    /// Short description used in diagnostics
    pub fn label(&self) -> &'static str {
        self.label
    }

    pub(crate) fn run(self, ctx: &mut Context) -> ScriptResult<()> {
        (self.run)(ctx)
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job").field("label", &self.label).finish()
    }
}

/// FIFO queue of pending jobs
#[derive(Default)]
pub(crate) struct JobQueue {
    jobs: VecDeque<Job>,
}

impl JobQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, job: Job) {
        self.jobs.push_back(job);
    }

    pub(crate) fn pop(&mut self) -> Option<Job> {
        self.jobs.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.jobs.len()
    }

    pub(crate) fn clear(&mut self) {
        self.jobs.clear();
    }
}

/// What one `drain` call did
#[derive(Debug, Default)]
pub struct DrainReport {
    /// Jobs executed, including timer callbacks and message handlers
    pub jobs_run: usize,
    /// Timers that fired
    pub timers_fired: usize,
    /// Worker messages delivered in either direction
    pub messages_delivered: usize,
    /// Exceptions that escaped jobs, in the order they happened
    pub failures: Vec<ScriptFailure>,
    /// Promises still rejected without a handler when the loop finished
    pub unhandled_rejections: usize,
}

impl DrainReport {
    /// Whether every job completed without an uncaught exception
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub(crate) fn absorb(&mut self, other: DrainReport) {
        self.jobs_run += other.jobs_run;
        self.timers_fired += other.timers_fired;
        self.messages_delivered += other.messages_delivered;
        self.failures.extend(other.failures);
        self.unhandled_rejections += other.unhandled_rejections;
    }
}

/// Drains a context's deferred work
pub struct JobLoop;

impl JobLoop {
    /// Run jobs oldest-first until the queue, worker traffic and timers are
    /// all exhausted, or the script requested an exit.
    ///
    /// A job's uncaught exception is logged and recorded; the loop moves on
    /// to the next job. A job that re-enqueues itself forever keeps this
    /// call from returning.
    pub fn drain(ctx: &mut Context) -> DrainReport {
        let mut report = DrainReport::default();
        debug!(
            context = ctx.id().as_u64(),
            jobs = ctx.pending_jobs(),
            timers = ctx.pending_timers(),
            "draining"
        );

        loop {
            if let Some(code) = ctx.exit_request() {
                debug!(context = ctx.id().as_u64(), code, "exit requested, leaving job loop");
                break;
            }

            if let Some(job) = ctx.jobs.pop() {
                ctx.enter_execution();
                report.jobs_run += 1;
                let label = job.label();
                if let Err(thrown) = job.run(ctx) {
                    let failure = ctx.failure_of(&thrown);
                    error!(
                        context = ctx.id().as_u64(),
                        job = label,
                        "uncaught exception in job: {}",
                        failure
                    );
                    report.failures.push(failure);
                }
                continue;
            }

            let delivered = worker::deliver_from_parent(ctx) + worker::pump_workers(ctx, &mut report);
            if delivered > 0 {
                report.messages_delivered += delivered;
                continue;
            }

            if let Some((due, timer)) = ctx.timers.pop_next() {
                let now = Instant::now();
                if due > now {
                    std::thread::sleep(due - now);
                }
                report.timers_fired += 1;
                ctx.enqueue_job(Job::new("timer", move |ctx| {
                    ctx.call(&timer.callback, &Value::Undefined, &timer.args)
                        .map(|_| ())
                }));
                continue;
            }

            break;
        }

        for reason in promise::take_unhandled_rejections(ctx) {
            warn!(
                context = ctx.id().as_u64(),
                "unhandled promise rejection: {}",
                ctx.failure_of(&reason)
            );
            report.unhandled_rejections += 1;
        }

        debug!(
            context = ctx.id().as_u64(),
            jobs = report.jobs_run,
            timers = report.timers_fired,
            messages = report.messages_delivered,
            failures = report.failures.len(),
            "job loop finished"
        );
        report
    }
}
