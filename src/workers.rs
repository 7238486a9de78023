//! Fixed-size worker pool: a single FIFO task queue guarded by a mutex and
//! condvar, mirroring `examples/original_source/code/pool/threadpool.h`.
//! Task bodies run without holding the pool's mutex.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

type Task = Box<dyn FnOnce() + Send + 'static>;

struct Shared {
    queue: Mutex<VecDeque<Task>>,
    condvar: Condvar,
    closed: Mutex<bool>,
}

pub struct WorkerPool {
    shared: Arc<Shared>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(thread_count: usize) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
            closed: Mutex::new(false),
        });

        let handles = (0..thread_count.max(1))
            .map(|i| {
                let shared = Arc::clone(&shared);
                thread::Builder::new()
                    .name(format!("worker-{i}"))
                    .spawn(move || worker_loop(shared))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self { shared, handles }
    }

    pub fn add_task<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut queue = self.shared.queue.lock().unwrap();
        queue.push_back(Box::new(task));
        self.shared.condvar.notify_one();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        *self.shared.closed.lock().unwrap() = true;
        self.shared.condvar.notify_all();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let mut queue = shared.queue.lock().unwrap();
        loop {
            if let Some(task) = queue.pop_front() {
                drop(queue);
                task();
                break;
            }
            if *shared.closed.lock().unwrap() {
                // Drain preferred: exit only once the queue is empty too.
                return;
            }
            queue = shared.condvar.wait(queue).unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    #[test]
    fn tasks_all_run_exactly_once() {
        let pool = WorkerPool::new(4);
        let counter = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(33));

        for _ in 0..32 {
            let counter = Arc::clone(&counter);
            let barrier = Arc::clone(&barrier);
            pool.add_task(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                barrier.wait();
            });
        }
        barrier.wait();
        assert_eq!(counter.load(Ordering::SeqCst), 32);
    }

    #[test]
    fn drop_drains_pending_tasks_before_exit() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = WorkerPool::new(2);
            for _ in 0..16 {
                let counter = Arc::clone(&counter);
                pool.add_task(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            }
        } // Drop joins here, after draining.
        assert_eq!(counter.load(Ordering::SeqCst), 16);
    }
}
