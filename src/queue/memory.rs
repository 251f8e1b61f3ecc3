use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{Queue, QueueError, QueueResult};
use crate::models::BuildJob;

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<BuildJob>,
    in_flight: HashMap<String, BuildJob>,
    enqueued: Vec<String>,
    acked: Vec<String>,
    nacked: Vec<String>,
}

/// FIFO in-memory [`Queue`].
///
/// A nacked job goes back to the front of the queue. Every enqueue, ack and
/// nack is recorded for inspection.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    state: Mutex<QueueState>,
    dequeue_failures: AtomicUsize,
    enqueue_failures: AtomicUsize,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    /// Ids passed to `enqueue`, oldest first
    pub fn enqueued_ids(&self) -> Vec<String> {
        self.state.lock().enqueued.clone()
    }

    pub fn pending_jobs(&self) -> Vec<BuildJob> {
        self.state.lock().pending.iter().cloned().collect()
    }

    pub fn acked_ids(&self) -> Vec<String> {
        self.state.lock().acked.clone()
    }

    pub fn nacked_ids(&self) -> Vec<String> {
        self.state.lock().nacked.clone()
    }

    /// Fail the next `count` dequeues with a backend error
    pub fn fail_next_dequeues(&self, count: usize) {
        self.dequeue_failures.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` enqueues with a backend error
    pub fn fail_next_enqueues(&self, count: usize) {
        self.enqueue_failures.store(count, Ordering::SeqCst);
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn enqueue(&self, job: &BuildJob) -> QueueResult<()> {
        if Self::take_failure(&self.enqueue_failures) {
            return Err(QueueError::backend("enqueue", "queue unavailable"));
        }
        let mut state = self.state.lock();
        state.enqueued.push(job.id.clone());
        state.pending.push_back(job.clone());
        Ok(())
    }

    async fn dequeue(&self) -> QueueResult<BuildJob> {
        if Self::take_failure(&self.dequeue_failures) {
            return Err(QueueError::backend("dequeue", "queue unavailable"));
        }
        let mut state = self.state.lock();
        let job = state.pending.pop_front().ok_or(QueueError::NoJobs)?;
        state.in_flight.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    async fn ack(&self, job_id: &str) -> QueueResult<()> {
        let mut state = self.state.lock();
        state
            .in_flight
            .remove(job_id)
            .ok_or_else(|| QueueError::JobNotFound {
                job_id: job_id.to_string(),
            })?;
        state.acked.push(job_id.to_string());
        Ok(())
    }

    async fn nack(&self, job_id: &str) -> QueueResult<()> {
        let mut state = self.state.lock();
        let job = state
            .in_flight
            .remove(job_id)
            .ok_or_else(|| QueueError::JobNotFound {
                job_id: job_id.to_string(),
            })?;
        state.nacked.push(job_id.to_string());
        state.pending.push_front(job);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BuildType;

    fn job(id: &str) -> BuildJob {
        BuildJob::new(id, "dep-1", "app-1", BuildType::PureNix)
    }

    #[tokio::test]
    async fn test_fifo_with_ack_and_nack() {
        let queue = MemoryQueue::new();
        assert_eq!(queue.dequeue().await.unwrap_err(), QueueError::NoJobs);

        queue.enqueue(&job("a")).await.unwrap();
        queue.enqueue(&job("b")).await.unwrap();

        let first = queue.dequeue().await.unwrap();
        assert_eq!(first.id, "a");
        queue.nack(&first.id).await.unwrap();

        let again = queue.dequeue().await.unwrap();
        assert_eq!(again.id, "a");
        queue.ack(&again.id).await.unwrap();

        assert_eq!(queue.acked_ids(), vec!["a"]);
        assert_eq!(queue.nacked_ids(), vec!["a"]);
        assert_eq!(queue.pending_len(), 1);
        assert!(queue.ack("a").await.is_err());
    }

    #[tokio::test]
    async fn test_injected_dequeue_failures() {
        let queue = MemoryQueue::new();
        queue.enqueue(&job("a")).await.unwrap();
        queue.fail_next_dequeues(1);

        assert!(matches!(queue.dequeue().await, Err(QueueError::Backend { .. })));
        assert_eq!(queue.dequeue().await.unwrap().id, "a");
    }
}
