use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{debug, warn};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// One finished task, tagged with the index `submit` returned for it.
#[derive(Debug)]
pub struct Completion<R> {
    pub index: usize,
    pub outcome: std::result::Result<R, String>,
}

/// Fixed-size pool of OS threads running one handler over submitted tasks.
///
/// Lifecycle: `new` → `submit`* → `drain` → `shutdown`. Dropping the pool closes the
/// task queue and joins every worker, so threads never outlive their owner.
pub struct WorkerPool<T, R> {
    task_tx: Option<Sender<(usize, T)>>,
    result_rx: Receiver<Completion<R>>,
    handles: Vec<JoinHandle<()>>,
    submitted: usize,
    received: usize,
}

impl<T, R> WorkerPool<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    /// `queue_capacity` bounds how many submitted tasks may wait for a worker.
    pub fn new<F>(size: usize, queue_capacity: usize, handler: F) -> Result<Self>
    where
        F: Fn(T) -> R + Send + Sync + 'static,
    {
        let size = size.max(1);
        let (task_tx, task_rx): (Sender<(usize, T)>, Receiver<(usize, T)>) =
            bounded(queue_capacity.max(1));
        let (result_tx, result_rx): (Sender<Completion<R>>, Receiver<Completion<R>>) =
            unbounded();
        let handler = Arc::new(handler);

        let mut handles = Vec::with_capacity(size);
        for worker_id in 0..size {
            let task_rx = task_rx.clone();
            let result_tx = result_tx.clone();
            let handler = Arc::clone(&handler);

            let handle = thread::Builder::new()
                .name(format!("sweep-worker-{}", worker_id))
                .spawn(move || {
                    while let Ok((index, task)) = task_rx.recv() {
                        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (*handler)(task)))
                            .map_err(|payload| panic_message(payload.as_ref()));
                        if result_tx.send(Completion { index, outcome }).is_err() {
                            break;
                        }
                    }
                    debug!("Worker {} exiting", worker_id);
                })
                .map_err(|error| anyhow!("Failed to spawn worker {}: {}", worker_id, error))?;
            handles.push(handle);
        }

        Ok(Self {
            task_tx: Some(task_tx),
            result_rx,
            handles,
            submitted: 0,
            received: 0,
        })
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    pub fn submitted(&self) -> usize {
        self.submitted
    }

    /// Queue a task; blocks while the queue is full. Returns the task's index.
    pub fn submit(&mut self, task: T) -> Result<usize> {
        let sender = self
            .task_tx
            .as_ref()
            .ok_or_else(|| anyhow!("Worker pool no longer accepts tasks"))?;
        let index = self.submitted;
        sender
            .send((index, task))
            .map_err(|_| anyhow!("All workers exited before task {} was queued", index))?;
        self.submitted += 1;
        Ok(index)
    }

    /// Stop accepting tasks and yield completions in the order workers finish them.
    pub fn drain(&mut self) -> Drain<'_, T, R> {
        self.task_tx.take();
        Drain { pool: self }
    }

    /// Join every worker. Returns an error naming how many threads died abnormally.
    pub fn shutdown(mut self) -> Result<()> {
        self.task_tx.take();
        let failed = self.join_workers();
        if failed > 0 {
            return Err(anyhow!("{} worker thread(s) terminated abnormally", failed));
        }
        Ok(())
    }

    fn join_workers(&mut self) -> usize {
        let mut failed = 0;
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                failed += 1;
            }
        }
        failed
    }
}

impl<T, R> Drop for WorkerPool<T, R> {
    fn drop(&mut self) {
        self.task_tx.take();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("Worker thread panicked during pool teardown");
            }
        }
    }
}

pub struct Drain<'a, T, R> {
    pool: &'a mut WorkerPool<T, R>,
}

impl<T, R> Iterator for Drain<'_, T, R> {
    type Item = Completion<R>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pool.received >= self.pool.submitted {
            return None;
        }
        match self.pool.result_rx.recv() {
            Ok(completion) => {
                self.pool.received += 1;
                Some(completion)
            }
            Err(_) => {
                warn!(
                    "Result channel closed with {} of {} tasks outstanding",
                    self.pool.submitted - self.pool.received,
                    self.pool.submitted
                );
                None
            }
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panic: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panic: {}", message)
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_submitted_task_completes_once() {
        let mut pool = WorkerPool::new(3, 4, |n: u64| n * n).unwrap();
        assert_eq!(pool.size(), 3);
        for n in 0..20u64 {
            pool.submit(n).unwrap();
        }

        let completions: Vec<_> = pool.drain().collect();
        assert_eq!(completions.len(), 20);
        let indices: HashSet<_> = completions.iter().map(|c| c.index).collect();
        assert_eq!(indices.len(), 20);
        for completion in &completions {
            let n = completion.index as u64;
            assert_eq!(completion.outcome.as_ref().unwrap(), &(n * n));
        }
        pool.shutdown().unwrap();
    }

    #[test]
    fn handler_panics_become_failed_completions() {
        let mut pool = WorkerPool::new(2, 8, |n: u32| {
            if n == 3 {
                panic!("bad input {}", n);
            }
            n
        })
        .unwrap();
        for n in 0..6u32 {
            pool.submit(n).unwrap();
        }

        let mut failures = 0;
        for completion in pool.drain() {
            match completion.outcome {
                Ok(value) => assert_eq!(value as usize, completion.index),
                Err(message) => {
                    failures += 1;
                    assert_eq!(completion.index, 3);
                    assert!(message.contains("bad input 3"));
                }
            }
        }
        assert_eq!(failures, 1);
        pool.shutdown().unwrap();
    }

    #[test]
    fn submit_after_drain_is_rejected() {
        let mut pool = WorkerPool::new(1, 1, |n: i32| n).unwrap();
        pool.submit(1).unwrap();
        assert_eq!(pool.drain().count(), 1);
        assert!(pool.submit(2).is_err());
    }
}
