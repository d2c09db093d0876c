//! Priority-ordered command queue
//!
//! Blocking multi-producer/single-consumer queue. `Quit` commands are
//! inserted behind any already queued `Quit` and ahead of everything
//! else; all other commands keep arrival order.
//!
//! The queue also counts outstanding commands: pushed but not yet
//! consumed (executed or discarded). The pooled worker uses the 0 → 1
//! transition of this count to decide when a target needs a worker.

use super::command::Command;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

struct QueueInner {
    commands: VecDeque<Command>,
    /// Set once a quit has been executed; further pushes are rejected
    exiting: bool,
}

/// Command queue for one target
pub struct CommandQueue {
    inner: Mutex<QueueInner>,
    available: Condvar,
    outstanding: AtomicUsize,
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                commands: VecDeque::new(),
                exiting: false,
            }),
            available: Condvar::new(),
            outstanding: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert with priority ordering
    ///
    /// Returns the outstanding count before this push, or hands the
    /// command back when the queue is already exiting.
    pub fn push(&self, command: Command) -> Result<usize, Command> {
        let mut inner = self.lock();
        if inner.exiting {
            return Err(command);
        }

        if command.kind().preempts() {
            // Quits form a prefix; insert at its end to stay FIFO among quits
            let at = inner
                .commands
                .iter()
                .position(|queued| !queued.kind().preempts())
                .unwrap_or(inner.commands.len());
            inner.commands.insert(at, command);
        } else {
            inner.commands.push_back(command);
        }

        // Counted under the queue lock so the count never lags the contents
        let previous = self.outstanding.fetch_add(1, Ordering::SeqCst);
        drop(inner);

        self.available.notify_one();
        Ok(previous)
    }

    /// Pop the next command, blocking up to `timeout` (forever if `None`)
    pub fn pop(&self, timeout: Option<Duration>) -> Option<Command> {
        let mut inner = self.lock();
        match timeout {
            None => loop {
                if let Some(command) = inner.commands.pop_front() {
                    return Some(command);
                }
                inner = self
                    .available
                    .wait(inner)
                    .unwrap_or_else(PoisonError::into_inner);
            },
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                loop {
                    if let Some(command) = inner.commands.pop_front() {
                        return Some(command);
                    }
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    inner = self
                        .available
                        .wait_timeout(inner, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
    }

    /// Mark the queue exiting and remove every pending command atomically
    pub fn close_and_drain(&self) -> Vec<Command> {
        let mut inner = self.lock();
        inner.exiting = true;
        inner.commands.drain(..).collect()
    }

    /// Record `count` commands as consumed; returns the remaining count
    pub fn consumed(&self, count: usize) -> usize {
        let previous = self.outstanding.fetch_sub(count, Ordering::SeqCst);
        debug_assert!(previous >= count, "outstanding count underflow");
        previous.saturating_sub(count)
    }

    /// Pending (queued, not yet popped) commands
    pub fn len(&self) -> usize {
        self.lock().commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_exiting(&self) -> bool {
        self.lock().exiting
    }

    /// Commands pushed but not yet executed or discarded
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("CommandQueue")
            .field("len", &inner.commands.len())
            .field("exiting", &inner.exiting)
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::command::CommandKind;
    use std::sync::Arc;

    fn cmd(kind: CommandKind) -> Command {
        Command::new(kind, None, None, false)
    }

    fn drain_kinds(queue: &CommandQueue) -> Vec<CommandKind> {
        std::iter::from_fn(|| queue.pop(Some(Duration::ZERO)))
            .map(|c| c.kind())
            .collect()
    }

    #[test]
    fn test_fifo_among_equal_priority() {
        let queue = CommandQueue::new();
        for kind in [CommandKind::Start, CommandKind::Pause, CommandKind::Stop, CommandKind::Start] {
            queue.push(cmd(kind)).unwrap();
        }
        assert_eq!(
            drain_kinds(&queue),
            vec![CommandKind::Start, CommandKind::Pause, CommandKind::Stop, CommandKind::Start]
        );
    }

    #[test]
    fn test_quit_jumps_ahead_of_queued_commands() {
        let queue = CommandQueue::new();
        queue.push(cmd(CommandKind::Start)).unwrap();
        queue.push(cmd(CommandKind::Pause)).unwrap();
        queue.push(cmd(CommandKind::Quit)).unwrap();

        assert_eq!(queue.pop(None).unwrap().kind(), CommandKind::Quit);
    }

    #[test]
    fn test_back_to_back_quits_keep_arrival_order() {
        let queue = CommandQueue::new();
        let first = cmd(CommandKind::Quit);
        let second = cmd(CommandKind::Quit);
        let (first_id, second_id) = (first.id(), second.id());

        queue.push(cmd(CommandKind::Start)).unwrap();
        queue.push(first).unwrap();
        queue.push(second).unwrap();

        assert_eq!(queue.pop(None).unwrap().id(), first_id);
        assert_eq!(queue.pop(None).unwrap().id(), second_id);
        assert_eq!(queue.pop(None).unwrap().kind(), CommandKind::Start);
    }

    #[test]
    fn test_pop_times_out_on_empty_queue() {
        let queue = CommandQueue::new();
        let started = Instant::now();
        assert!(queue.pop(Some(Duration::from_millis(20))).is_none());
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_pop_wakes_on_push_from_other_thread() {
        let queue = Arc::new(CommandQueue::new());
        let producer = Arc::clone(&queue);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            producer.push(cmd(CommandKind::Pause)).unwrap();
        });

        let popped = queue.pop(None).unwrap();
        assert_eq!(popped.kind(), CommandKind::Pause);
        handle.join().unwrap();
    }

    #[test]
    fn test_drain_closes_queue_and_rejects_pushes() {
        let queue = CommandQueue::new();
        queue.push(cmd(CommandKind::Start)).unwrap();
        queue.push(cmd(CommandKind::Pause)).unwrap();

        let drained = queue.close_and_drain();
        assert_eq!(drained.len(), 2);
        assert!(queue.is_exiting());
        assert!(queue.is_empty());

        let rejected = queue.push(cmd(CommandKind::Start)).unwrap_err();
        assert_eq!(rejected.kind(), CommandKind::Start);
        assert_eq!(queue.outstanding(), 2, "rejected pushes are not counted");
    }

    #[test]
    fn test_outstanding_counts_until_consumed() {
        let queue = CommandQueue::new();
        assert_eq!(queue.push(cmd(CommandKind::Start)).unwrap(), 0);
        assert_eq!(queue.push(cmd(CommandKind::Pause)).unwrap(), 1);

        let _ = queue.pop(None);
        assert_eq!(queue.outstanding(), 2, "popping alone does not consume");
        assert_eq!(queue.consumed(1), 1);
        assert_eq!(queue.consumed(1), 0);
    }
}
