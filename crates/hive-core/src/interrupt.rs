//! Interrupt selection and resume validation (spec §4.6).

use crate::error::{HiveError, Result};
use crate::fingerprint::interrupt_id;
use crate::task::InterruptRequest;

/// Exactly one interrupt is observable per step: the smallest task ordinal
/// among those that requested one (spec §4.6, §8.1 "Interrupt uniqueness").
pub fn select_interrupt(
    requests: &[(u32, &str, Option<&InterruptRequest>)],
) -> Option<(u32, String)> {
    requests
        .iter()
        .filter(|(_, _, req)| req.is_some())
        .min_by_key(|(ordinal, _, _)| *ordinal)
        .map(|(ordinal, task_id, _)| (*ordinal, interrupt_id(task_id)))
}

/// Validates that a resume targets the interruption actually recorded on
/// the loaded checkpoint (spec §4.6).
pub fn validate_resume(checkpoint_interrupt_id: Option<&str>, requested_interrupt_id: &str) -> Result<()> {
    match checkpoint_interrupt_id {
        None => Err(HiveError::NoCheckpointToResume),
        Some(id) if id == requested_interrupt_id => Ok(()),
        Some(id) => Err(HiveError::ResumeInterruptMismatch {
            expected: id.to_string(),
            actual: requested_interrupt_id.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_smallest_ordinal() {
        let r1 = InterruptRequest { payload: serde_json::Value::Null };
        let r2 = InterruptRequest { payload: serde_json::Value::Null };
        let requests: Vec<(u32, &str, Option<&InterruptRequest>)> =
            vec![(2, "t2", Some(&r2)), (0, "t0", None), (1, "t1", Some(&r1))];
        let (ordinal, _id) = select_interrupt(&requests).unwrap();
        assert_eq!(ordinal, 1);
    }

    #[test]
    fn resume_mismatch_is_rejected() {
        assert!(validate_resume(Some("a"), "b").is_err());
        assert!(validate_resume(Some("a"), "a").is_ok());
        assert!(validate_resume(None, "a").is_err());
    }
}
