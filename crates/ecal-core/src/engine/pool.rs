//! Worker pool of the processor.
//!
//! A fixed set of workers draining a FIFO channel. Shutting down drops the
//! sender and joins the workers, which drain all queued tasks first. With
//! a single worker the pool executes tasks strictly in submission order,
//! which makes event cascades deterministic.

use std::thread;

use crossbeam::channel::{self, Sender};

type Task = Box<dyn FnOnce() + Send + 'static>;

pub struct TaskPool {
    sender: Option<Sender<Task>>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl TaskPool {
    pub fn new(worker_count: usize) -> TaskPool {
        let worker_count = worker_count.max(1);
        let (sender, receiver) = channel::unbounded::<Task>();

        let workers = (0..worker_count)
            .map(|i| {
                let receiver = receiver.clone();
                thread::Builder::new()
                    .name(format!("ecal-worker-{}", i))
                    .spawn(move || {
                        while let Ok(task) = receiver.recv() {
                            task();
                        }
                    })
                    .expect("failed to spawn worker thread")
            })
            .collect();

        TaskPool {
            sender: Some(sender),
            workers,
        }
    }

    /// Queue a task. Fails if the pool has been shut down.
    pub fn submit<F: FnOnce() + Send + 'static>(&self, task: F) -> Result<(), ()> {
        match self.sender {
            Some(ref s) => s.send(Box::new(task)).map_err(|_| ()),
            None => Err(()),
        }
    }

    /// Drain all queued tasks and stop the workers.
    pub fn shutdown(mut self) {
        self.sender.take();

        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.sender.take();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_tasks_run() {
        let pool = TaskPool::new(2);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let counter = counter.clone();
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_single_worker_ordering() {
        let pool = TaskPool::new(1);
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for i in 0..5 {
            let log = log.clone();
            pool.submit(move || log.lock().push(i)).unwrap();
        }

        pool.shutdown();
        assert_eq!(*log.lock(), vec![0, 1, 2, 3, 4]);
    }
}
