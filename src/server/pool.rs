use crossbeam::channel::{self, Receiver, Sender};
use std::{
    io,
    sync::Arc,
    thread::{self, JoinHandle},
};

/// Item travelling through the worker queue.
#[derive(Debug)]
pub(crate) enum Job<T> {
    Run(T),
    /// Taken by exactly one worker, which then exits.
    Stop,
}

/// Fixed set of threads draining one unbounded queue.
///
/// ```text
///   producer --Job::Run--> [ unbounded channel ] --recv--> worker 0..N
///   shutdown --Job::Stop x N------^
/// ```
///
/// Each worker exits after receiving one [`Job::Stop`], so pushing one stop
/// signal per worker terminates all of them. Jobs queued before the stop
/// signals are still processed.
pub(crate) struct WorkerPool<T> {
    sender: Sender<Job<T>>,
    workers: Vec<JoinHandle<()>>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Spawns `count` workers (at least one), each calling `handler` for
    /// every job it takes.
    pub(crate) fn start<F>(count: usize, name: &str, handler: F) -> io::Result<Self>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let (sender, receiver) = channel::unbounded();
        let handler = Arc::new(handler);

        let mut pool = Self {
            sender,
            workers: Vec::with_capacity(count.max(1)),
        };

        for index in 0..count.max(1) {
            let receiver = receiver.clone();
            let handler = handler.clone();

            let spawned = thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || Self::work(&receiver, &*handler));

            match spawned {
                Ok(handle) => pool.workers.push(handle),
                Err(err) => {
                    pool.shutdown();
                    return Err(err);
                }
            }
        }

        Ok(pool)
    }

    fn work<F: Fn(T)>(receiver: &Receiver<Job<T>>, handler: &F) {
        while let Ok(Job::Run(item)) = receiver.recv() {
            handler(item);
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.workers.len()
    }

    /// Handle for producers on other threads.
    #[inline]
    pub(crate) fn sender(&self) -> Sender<Job<T>> {
        self.sender.clone()
    }

    #[inline]
    pub(crate) fn submit(&self, item: T) -> bool {
        self.sender.send(Job::Run(item)).is_ok()
    }

    /// Pushes one stop signal per worker and joins them all.
    pub(crate) fn shutdown(&mut self) {
        for _ in 0..self.workers.len() {
            // Fails only once every worker is gone already.
            let _ = self.sender.send(Job::Stop);
        }

        self.join();
    }

    /// Waits for every worker to exit, without signalling them.
    pub(crate) fn join(&mut self) {
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::error!("worker thread panicked");
            }
        }
    }
}

impl<T> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        for _ in 0..self.workers.len() {
            let _ = self.sender.send(Job::Stop);
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Barrier,
        },
        time::Duration,
    };

    #[test]
    fn runs_queued_jobs_before_stopping() {
        let done = Arc::new(AtomicUsize::new(0));
        let counter = done.clone();

        let mut pool = WorkerPool::start(4, "test", move |n: usize| {
            counter.fetch_add(n, Ordering::SeqCst);
        })
        .unwrap();

        for n in 1..=100 {
            assert!(pool.submit(n));
        }
        pool.shutdown();

        assert_eq!(done.load(Ordering::SeqCst), 5050);
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn one_stop_per_worker() {
        const WORKERS: usize = 8;

        // Every worker blocks on the barrier, so all of them are alive and
        // inside the pool when the stop signals arrive.
        let barrier = Arc::new(Barrier::new(WORKERS + 1));
        let gate = barrier.clone();
        let pool = WorkerPool::start(WORKERS, "stop", move |_: ()| {
            gate.wait();
        })
        .unwrap();
        assert_eq!(pool.len(), WORKERS);

        for _ in 0..WORKERS {
            pool.submit(());
        }
        barrier.wait();

        let sender = pool.sender();
        for _ in 0..WORKERS {
            sender.send(Job::Stop).unwrap();
        }

        let (joined_tx, joined_rx) = channel::bounded(1);
        thread::spawn(move || {
            let mut pool = pool;
            pool.join();
            joined_tx.send(pool.len()).unwrap();
        });

        assert_eq!(joined_rx.recv_timeout(Duration::from_secs(5)), Ok(0));
        assert!(sender.is_empty());
    }

    #[test]
    fn zero_workers_means_one() {
        let mut pool = WorkerPool::start(0, "zero", |_: ()| {}).unwrap();
        assert_eq!(pool.len(), 1);
        pool.shutdown();
    }
}
