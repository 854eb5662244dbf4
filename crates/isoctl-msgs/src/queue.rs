//! Diagnostics queued by collaborator subsystems.
//!
//! Image, burn and filter libraries report asynchronously: they enqueue
//! messages which the status engine drains at each checkpoint.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use isoctl_types::severity::Severity;

/// One pending diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    pub error_code: i32,
    pub text: String,
    pub os_errno: i32,
    pub severity: Severity,
}

impl QueuedMessage {
    pub fn new(severity: Severity, text: impl Into<String>) -> Self {
        Self {
            error_code: 0,
            text: text.into(),
            os_errno: 0,
            severity,
        }
    }
}

/// Source of pending collaborator diagnostics.
pub trait MessageQueue {
    /// Remove and return everything currently pending, oldest first.
    fn drain(&mut self) -> Vec<QueuedMessage>;
}

/// A queue that never has anything pending.
#[derive(Debug, Default)]
pub struct EmptyQueue;

impl MessageQueue for EmptyQueue {
    fn drain(&mut self) -> Vec<QueuedMessage> {
        Vec::new()
    }
}

/// In-process queue. Clones share the same pending messages, so a
/// collaborator can keep one clone while the engine drains another.
#[derive(Debug, Clone, Default)]
pub struct SharedQueue {
    pending: Rc<RefCell<VecDeque<QueuedMessage>>>,
}

impl SharedQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, msg: QueuedMessage) {
        self.pending.borrow_mut().push_back(msg);
    }

    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }
}

impl MessageQueue for SharedQueue {
    fn drain(&mut self) -> Vec<QueuedMessage> {
        self.pending.borrow_mut().drain(..).collect()
    }
}
