//! Run options and outcomes (spec §6.1, §6.3).

use std::collections::HashMap;

use crate::ids::ChannelId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckpointPolicy {
    #[default]
    Disabled,
    EveryStep,
    Every(u32),
    OnInterrupt,
}

impl CheckpointPolicy {
    pub fn matches(&self, step_index: u32) -> bool {
        match self {
            CheckpointPolicy::Disabled => false,
            CheckpointPolicy::EveryStep => true,
            CheckpointPolicy::Every(n) => *n > 0 && step_index % n == 0,
            CheckpointPolicy::OnInterrupt => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamingMode {
    #[default]
    Events,
    Values,
    Updates,
    Combined,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub max_steps: u32,
    pub max_concurrent_tasks: u32,
    pub checkpoint_policy: CheckpointPolicy,
    pub debug_payloads: bool,
    pub deterministic_token_streaming: bool,
    pub event_buffer_capacity: usize,
    pub output_projection_override: Option<Vec<ChannelId>>,
    pub streaming_mode: StreamingMode,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_steps: 100,
            max_concurrent_tasks: 8,
            checkpoint_policy: CheckpointPolicy::default(),
            debug_payloads: false,
            deterministic_token_streaming: false,
            event_buffer_capacity: 4096,
            output_projection_override: None,
            streaming_mode: StreamingMode::default(),
        }
    }
}

impl RunOptions {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent_tasks < 1 {
            return Err("maxConcurrentTasks must be >= 1".to_string());
        }
        if self.event_buffer_capacity < 1 {
            return Err("eventBufferCapacity must be >= 1".to_string());
        }
        if let CheckpointPolicy::Every(n) = self.checkpoint_policy {
            if n < 1 {
                return Err("checkpointPolicy.every(steps) requires steps >= 1".to_string());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum Output {
    FullStore(HashMap<ChannelId, serde_json::Value>),
    Channels(Vec<serde_json::Value>),
}

#[derive(Debug, Clone)]
pub enum Outcome {
    Finished { output: Output, checkpoint_id: Option<String> },
    Interrupted { interrupt_id: String, payload: serde_json::Value, checkpoint_id: String },
    OutOfSteps { max_steps: u32, output: Output, checkpoint_id: Option<String> },
    Cancelled { output: Output, checkpoint_id: Option<String> },
}
