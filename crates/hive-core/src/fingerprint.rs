//! Fingerprints and identifier derivation (spec §4.3). Byte layouts here are
//! normative — tests must reproduce them exactly.

use sha2::{Digest, Sha256};

use crate::error::{HiveError, Result};
use crate::ids::RunId;
use crate::schema::ChannelRegistry;
use crate::store::Overlay;
use crate::value::Codec;

/// SHA-256 over concatenated records, one per task-local channel spec in
/// registry-sorted order: `channelID || 0x00 || codec.encode(value or initial())`.
pub fn task_local_fingerprint(registry: &ChannelRegistry, overlay: &Overlay) -> Result<[u8; 32]> {
    let mut hasher = Sha256::new();
    for spec in registry.task_local_sorted() {
        let codec: &dyn Codec = spec
            .codec
            .as_deref()
            .ok_or_else(|| HiveError::TaskLocalFingerprintEncodeFailed(spec.id.clone()))?;
        let value = overlay
            .get(&spec.id)
            .cloned()
            .unwrap_or_else(|| spec.initial_value());
        let encoded = codec
            .encode(&value)
            .map_err(|_| HiveError::TaskLocalFingerprintEncodeFailed(spec.id.clone()))?;
        hasher.update(spec.id.as_bytes());
        hasher.update([0u8]);
        hasher.update(&encoded);
    }
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    Ok(out)
}

/// `SHA-256(runID_16bytes || stepIndex_u32_be || 0x00 || nodeID_utf8 || 0x00 || ordinal_u32_be || fingerprint_32bytes)`.
pub fn task_id(run_id: RunId, step_index: u32, node_id: &str, ordinal: u32, fingerprint: &[u8; 32]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(run_id.as_bytes());
    hasher.update(step_index.to_be_bytes());
    hasher.update([0u8]);
    hasher.update(node_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(ordinal.to_be_bytes());
    hasher.update(fingerprint);
    hex::encode(hasher.finalize())
}

/// `SHA-256("HCP1" || runID_16bytes || stepIndex_u32_be)`.
pub fn checkpoint_id(run_id: RunId, step_index: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"HCP1");
    hasher.update(run_id.as_bytes());
    hasher.update(step_index.to_be_bytes());
    hex::encode(hasher.finalize())
}

/// `SHA-256("HINT1" || winningTaskID_utf8)`.
pub fn interrupt_id(winning_task_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"HINT1");
    hasher.update(winning_task_id.as_bytes());
    hex::encode(hasher.finalize())
}
