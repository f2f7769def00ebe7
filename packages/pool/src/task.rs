//! Single-sequence task posting
//!
//! All pool state belongs to one logical sequence. Anything asynchronous
//! (connection attempt completions, deferred failure reporting, pending
//! job resumption) is a task posted to this queue and run in FIFO order.
//! A method that can complete asynchronously never fails synchronously;
//! it posts the failure instead.
//!
//! Callbacks that target a pool object capture a `Weak` handle and do
//! nothing if the target was destroyed before the task ran.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

type Task = Box<dyn FnOnce()>;

/// A single-threaded FIFO task queue shared by everything in one pool.
pub struct SequencedTaskRunner {
    queue: RefCell<VecDeque<Task>>,
    running: Cell<bool>,
}

impl SequencedTaskRunner {
    pub fn new() -> Rc<SequencedTaskRunner> {
        Rc::new(SequencedTaskRunner {
            queue: RefCell::new(VecDeque::new()),
            running: Cell::new(false),
        })
    }

    /// Enqueue `task` to run after every previously posted task.
    pub fn post_task(&self, task: impl FnOnce() + 'static) {
        self.queue.borrow_mut().push_back(Box::new(task));
    }

    pub fn has_pending_tasks(&self) -> bool {
        !self.queue.borrow().is_empty()
    }

    /// Run posted tasks until the queue drains, including tasks posted by
    /// tasks. Reentrant calls from within a running task are no-ops; the
    /// outer loop picks the new work up. Returns how many tasks ran.
    pub fn run_until_idle(&self) -> usize {
        if self.running.get() {
            return 0;
        }
        self.running.set(true);
        let mut ran = 0usize;
        loop {
            // Release the borrow before running: tasks post tasks.
            let task = self.queue.borrow_mut().pop_front();
            match task {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => break,
            }
        }
        self.running.set(false);
        if ran > 0 {
            tracing::trace!(target: "streampool::task", tasks = ran, "sequence drained");
        }
        ran
    }
}
