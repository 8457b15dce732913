//! Writes emitted by a node (spec §3.5).

use serde_json::Value;

use crate::ids::ChannelId;

/// One write emitted by a node. Runtime-validated against the registry at
/// commit time (`UnknownChannelID`, `ChannelTypeMismatch`).
#[derive(Debug, Clone)]
pub struct Write {
    pub channel_id: ChannelId,
    pub value: Value,
}

impl Write {
    pub fn new(channel_id: impl Into<ChannelId>, value: Value) -> Self {
        Self {
            channel_id: channel_id.into(),
            value,
        }
    }
}

/// A write tagged with the ordering keys the commit phase folds by
/// (`taskOrdinal`, `emissionIndex`; spec §4.5.2).
#[derive(Debug, Clone)]
pub struct OrderedWrite {
    pub task_ordinal: u32,
    pub emission_index: u32,
    pub write: Write,
}
