//! Completion queue: runs capture callbacks outside the notification
//! context.
//!
//! The notification handler only ever calls [`CompletionQueue::submit`],
//! which never blocks. Jobs run later, in submission order, from whatever
//! drains the queue: the embassy task on target, `run_pending` in a
//! superloop or tests.

use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex,
    channel::{
        Channel,
        TrySendError,
    },
};

use crate::stream::{
    Callback,
    Completion,
};

/// Completed captures that may wait for dispatch at once.
pub const QUEUE_DEPTH: usize = 4;

/// A completion handler paired with its filled destination.
#[derive(Debug)]
pub struct Job {
    handler: Callback,
    completion: Completion,
}

impl Job {
    pub(crate) const fn new(handler: Callback, completion: Completion) -> Self {
        Self {
            handler,
            completion,
        }
    }

    pub fn completion(&self) -> &Completion {
        &self.completion
    }

    /// Drop the handler and take the filled destination back.
    pub fn into_completion(self) -> Completion {
        self.completion
    }

    /// Invoke the handler, consuming the job.
    pub fn run(self) {
        (self.handler)(self.completion);
    }
}

pub struct CompletionQueue {
    jobs: Channel<CriticalSectionRawMutex, Job, QUEUE_DEPTH>,
}

impl CompletionQueue {
    pub const fn new() -> Self {
        Self {
            jobs: Channel::new(),
        }
    }

    /// Queue a job without blocking. Hands the job back when full.
    pub fn submit(&self, job: Job) -> Result<(), Job> {
        self.jobs.try_send(job).map_err(|TrySendError::Full(job)| job)
    }

    /// Jobs waiting to run.
    pub fn pending(&self) -> usize {
        self.jobs.len()
    }

    /// Run every queued job now. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.jobs.try_receive() {
            job.run();
            ran += 1;
        }
        ran
    }

    /// Wait for the next job and run it.
    pub async fn dispatch_next(&self) {
        self.jobs.receive().await.run();
    }

    /// Dispatch jobs forever.
    pub async fn run(&self) -> ! {
        loop {
            self.dispatch_next().await;
        }
    }
}

impl Default for CompletionQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Completion dispatcher for the embassy executor.
#[cfg(feature = "esp32s3")]
#[embassy_executor::task]
pub async fn completion_task(queue: &'static CompletionQueue) -> ! {
    queue.run().await
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::{
        AtomicUsize,
        Ordering,
    };

    use super::*;

    fn job(len: usize, handler: Callback) -> Job {
        let samples: &'static mut [u16] = Box::leak(vec![7u16; len].into_boxed_slice());
        Job::new(handler, Completion::new(samples))
    }

    #[test]
    fn test_runs_in_submission_order() {
        static ORDER: AtomicUsize = AtomicUsize::new(0);
        fn record(done: Completion) {
            // Encode the destination length as the next digit.
            let prev = ORDER.load(Ordering::SeqCst);
            ORDER.store(prev * 10 + done.samples().len(), Ordering::SeqCst);
        }

        let queue = CompletionQueue::new();
        queue.submit(job(1, record)).unwrap();
        queue.submit(job(2, record)).unwrap();
        queue.submit(job(3, record)).unwrap();
        assert_eq!(queue.pending(), 3);
        assert_eq!(ORDER.load(Ordering::SeqCst), 0);

        assert_eq!(queue.run_pending(), 3);
        assert_eq!(ORDER.load(Ordering::SeqCst), 123);
        assert_eq!(queue.run_pending(), 0);
    }

    #[test]
    fn test_full_queue_returns_job() {
        fn nothing(_: Completion) {}

        let queue = CompletionQueue::new();
        for _ in 0..QUEUE_DEPTH {
            queue.submit(job(1, nothing)).unwrap();
        }
        let rejected = queue.submit(job(5, nothing)).unwrap_err();
        assert_eq!(rejected.completion().samples().len(), 5);
        assert_eq!(queue.pending(), QUEUE_DEPTH);
    }

    #[test]
    fn test_dispatch_next_runs_one_job() {
        static SEEN: AtomicUsize = AtomicUsize::new(0);
        fn count(done: Completion) {
            let total: usize = done.into_samples().iter().map(|&s| usize::from(s)).sum();
            SEEN.fetch_add(total, Ordering::SeqCst);
        }

        let queue = CompletionQueue::new();
        queue.submit(job(2, count)).unwrap();
        queue.submit(job(1, count)).unwrap();

        embassy_futures::block_on(queue.dispatch_next());
        assert_eq!(SEEN.load(Ordering::SeqCst), 14);
        assert_eq!(queue.pending(), 1);
    }
}
