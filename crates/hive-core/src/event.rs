//! Event stream (spec §4.4): a single bounded queue with deterministic
//! coalescing and non-droppable backpressure, guarded by mutex + condvar
//! (spec §9 "Stream buffering" — no async cancellation of in-flight
//! enqueues, drain on termination).

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use serde_json::Value;

use crate::ids::{AttemptId, EventId, NodeId, RunId, TaskId};

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    RunStarted { thread_id: String },
    RunFinished,
    RunInterrupted { interrupt_id: String },
    RunResumed { interrupt_id: String },
    RunCancelled,

    StepStarted { step_index: u32, frontier_count: u32 },
    StepFinished { step_index: u32, next_frontier_count: u32 },

    TaskStarted { node_id: NodeId, task_id: TaskId },
    TaskFinished { node_id: NodeId, task_id: TaskId },
    TaskFailed { node_id: NodeId, task_id: TaskId, error_description: String },

    WriteApplied { channel_id: String, payload_hash: String, metadata: Option<Value> },

    CheckpointSaved { checkpoint_id: String },
    CheckpointLoaded { checkpoint_id: String },

    StoreSnapshot { snapshot: Value },
    ChannelUpdates { updates: Value },

    ModelInvocationStarted { node_id: NodeId },
    /// Droppable; subject to coalescing.
    ModelToken { node_id: NodeId, text: String },
    ModelInvocationFinished { node_id: NodeId },
    ToolInvocationStarted { tool_name: String },
    ToolInvocationFinished { tool_name: String },

    StreamBackpressure { dropped_model_tokens: u64, dropped_debug: u64 },

    /// Droppable.
    CustomDebug { name: String, payload: Option<Value> },

    CoalescedModelToken { node_id: NodeId, text: String },
}

impl EventKind {
    pub fn is_droppable(&self) -> bool {
        matches!(self, EventKind::ModelToken { .. } | EventKind::CustomDebug { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Event {
    pub id: EventId,
    pub step_index: Option<u32>,
    pub task_ordinal: Option<u32>,
    pub kind: EventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    Coalesced,
    DroppedModelToken,
    DroppedDebug,
    Terminated,
}

struct Inner {
    queue: VecDeque<Event>,
    terminated: bool,
    next_index: u64,
    dropped_model_tokens: u64,
    dropped_debug: u64,
}

/// Bounded, ordered event queue with condvar-based flow control. One
/// instance serves one attempt's main stream; deterministic-mode tasks get
/// their own private instance of the same capacity (spec §4.4).
pub struct EventBuffer {
    capacity: usize,
    state: Mutex<Inner>,
    not_full: Condvar,
    not_empty: Condvar,
}

impl EventBuffer {
    pub fn new(capacity: usize, run_id: RunId, attempt_id: AttemptId) -> Self {
        let _ = (run_id, attempt_id);
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(Inner {
                queue: VecDeque::new(),
                terminated: false,
                next_index: 0,
                dropped_model_tokens: 0,
                dropped_debug: 0,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    /// Blocking enqueue used by producers on synchronous worker threads.
    /// Async callers should wrap this in `spawn_blocking` or prefer
    /// `try_enqueue` from inside a tokio task.
    pub fn enqueue(
        &self,
        run_id: RunId,
        attempt_id: AttemptId,
        step_index: Option<u32>,
        task_ordinal: Option<u32>,
        kind: EventKind,
    ) -> EnqueueOutcome {
        let mut guard = self.state.lock().unwrap();
        loop {
            if guard.terminated {
                return EnqueueOutcome::Terminated;
            }

            if guard.queue.len() < self.capacity {
                let index = guard.next_index;
                guard.next_index += 1;
                guard.queue.push_back(Event {
                    id: EventId {
                        run_id,
                        attempt_id,
                        event_index: index,
                        step_index,
                        task_ordinal,
                    },
                    step_index,
                    task_ordinal,
                    kind,
                });
                self.not_empty.notify_all();
                return EnqueueOutcome::Enqueued;
            }

            if kind.is_droppable() {
                if let EventKind::ModelToken { node_id, text } = &kind {
                    if let Some(last) = guard.queue.back_mut() {
                        if last.step_index == step_index
                            && last.task_ordinal == task_ordinal
                        {
                            match &mut last.kind {
                                EventKind::ModelToken { text: existing, .. }
                                | EventKind::CoalescedModelToken { text: existing, .. } => {
                                    existing.push_str(text);
                                    let merged_text = existing.clone();
                                    last.kind = EventKind::CoalescedModelToken {
                                        node_id: node_id.clone(),
                                        text: merged_text,
                                    };
                                    return EnqueueOutcome::Coalesced;
                                }
                                _ => {}
                            }
                        }
                    }
                }
                match &kind {
                    EventKind::ModelToken { .. } => guard.dropped_model_tokens += 1,
                    _ => guard.dropped_debug += 1,
                }
                return if matches!(kind, EventKind::ModelToken { .. }) {
                    EnqueueOutcome::DroppedModelToken
                } else {
                    EnqueueOutcome::DroppedDebug
                };
            }

            guard = self.not_full.wait(guard).unwrap();
        }
    }

    pub fn dequeue(&self) -> Option<Event> {
        let mut guard = self.state.lock().unwrap();
        loop {
            if let Some(event) = guard.queue.pop_front() {
                self.not_full.notify_all();
                return Some(event);
            }
            if guard.terminated {
                return None;
            }
            guard = self.not_empty.wait(guard).unwrap();
        }
    }

    /// Drains remaining events (termination semantics: wake producers, let
    /// consumers finish reading what was already queued).
    pub fn terminate(&self) {
        let mut guard = self.state.lock().unwrap();
        guard.terminated = true;
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    pub fn take_drop_counts(&self) -> (u64, u64) {
        let mut guard = self.state.lock().unwrap();
        let counts = (guard.dropped_model_tokens, guard.dropped_debug);
        guard.dropped_model_tokens = 0;
        guard.dropped_debug = 0;
        counts
    }

    pub fn has_drops(&self) -> bool {
        let guard = self.state.lock().unwrap();
        guard.dropped_model_tokens > 0 || guard.dropped_debug > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn buf(capacity: usize) -> EventBuffer {
        EventBuffer::new(capacity, Uuid::nil(), Uuid::nil())
    }

    #[test]
    fn enqueue_dequeue_preserves_fifo_order() {
        let b = buf(8);
        b.enqueue(Uuid::nil(), Uuid::nil(), None, None, EventKind::RunStarted { thread_id: "t".into() });
        b.enqueue(Uuid::nil(), Uuid::nil(), None, None, EventKind::RunFinished);
        let first = b.dequeue().unwrap();
        assert!(matches!(first.kind, EventKind::RunStarted { .. }));
        let second = b.dequeue().unwrap();
        assert!(matches!(second.kind, EventKind::RunFinished));
    }

    #[test]
    fn model_tokens_coalesce_when_full_and_same_task() {
        let b = buf(1);
        b.enqueue(
            Uuid::nil(),
            Uuid::nil(),
            Some(1),
            Some(0),
            EventKind::ModelToken { node_id: "n".into(), text: "He".into() },
        );
        let outcome = b.enqueue(
            Uuid::nil(),
            Uuid::nil(),
            Some(1),
            Some(0),
            EventKind::ModelToken { node_id: "n".into(), text: "llo".into() },
        );
        assert_eq!(outcome, EnqueueOutcome::Coalesced);
        let event = b.dequeue().unwrap();
        match event.kind {
            EventKind::CoalescedModelToken { text, .. } => assert_eq!(text, "Hello"),
            other => panic!("expected coalesced token, got {other:?}"),
        }
    }

    #[test]
    fn non_droppable_event_is_never_dropped_it_blocks() {
        let b = buf(1);
        b.enqueue(Uuid::nil(), Uuid::nil(), None, None, EventKind::RunStarted { thread_id: "t".into() });
        assert!(b.dequeue().is_some());
    }

    #[test]
    fn debug_events_drop_when_full() {
        let b = buf(1);
        b.enqueue(Uuid::nil(), Uuid::nil(), None, None, EventKind::RunStarted { thread_id: "t".into() });
        let outcome = b.enqueue(
            Uuid::nil(),
            Uuid::nil(),
            None,
            None,
            EventKind::CustomDebug { name: "x".into(), payload: None },
        );
        assert_eq!(outcome, EnqueueOutcome::DroppedDebug);
    }

    #[test]
    fn terminate_wakes_and_drains() {
        let b = buf(1);
        b.terminate();
        assert_eq!(
            b.enqueue(Uuid::nil(), Uuid::nil(), None, None, EventKind::RunFinished),
            EnqueueOutcome::Terminated
        );
        assert!(b.dequeue().is_none());
    }
}
