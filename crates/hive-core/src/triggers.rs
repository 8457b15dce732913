//! Trigger filtering for non-default `runWhen` nodes (spec §4.5.6, v1.1).

use std::collections::HashMap;

use crate::graph::RunWhen;
use crate::ids::ChannelId;

/// A channel counts as "changed" iff its current version is strictly
/// greater than the node's recorded `versionsSeenByNode` entry, or no entry
/// exists at all.
fn channel_changed(
    channel: &str,
    current_versions: &HashMap<ChannelId, u64>,
    seen: &HashMap<ChannelId, u64>,
) -> bool {
    let current = current_versions.get(channel).copied().unwrap_or(0);
    let previously_seen = seen.get(channel).copied();
    match previously_seen {
        None => true,
        Some(seen_version) => current > seen_version,
    }
}

/// Whether a non-join graph seed for `run_when` should survive trigger
/// filtering, given the channel versions at next-frontier computation time
/// and what this node had seen as of step start.
pub fn seed_survives(
    run_when: &RunWhen,
    current_versions: &HashMap<ChannelId, u64>,
    seen: &HashMap<ChannelId, u64>,
) -> bool {
    match run_when {
        RunWhen::Always => true,
        RunWhen::AnyOf(channels) => channels
            .iter()
            .any(|c| channel_changed(c, current_versions, seen)),
        RunWhen::AllOf(channels) => channels
            .iter()
            .all(|c| channel_changed(c, current_versions, seen)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_always_survives() {
        let versions = HashMap::new();
        let seen = HashMap::new();
        assert!(seed_survives(&RunWhen::Always, &versions, &seen));
    }

    #[test]
    fn any_of_requires_one_changed_channel() {
        let mut versions = HashMap::new();
        versions.insert("a".to_string(), 2u64);
        versions.insert("b".to_string(), 1u64);
        let mut seen = HashMap::new();
        seen.insert("a".to_string(), 2u64);
        seen.insert("b".to_string(), 1u64);
        let run_when = RunWhen::AnyOf(vec!["a".into(), "b".into()]);
        assert!(!seed_survives(&run_when, &versions, &seen));

        versions.insert("b".to_string(), 2u64);
        assert!(seed_survives(&run_when, &versions, &seen));
    }

    #[test]
    fn all_of_requires_every_channel_changed() {
        let mut versions = HashMap::new();
        versions.insert("a".to_string(), 2u64);
        versions.insert("b".to_string(), 2u64);
        let mut seen = HashMap::new();
        seen.insert("a".to_string(), 1u64);
        seen.insert("b".to_string(), 2u64);
        let run_when = RunWhen::AllOf(vec!["a".into(), "b".into()]);
        assert!(!seed_survives(&run_when, &versions, &seen));

        seen.insert("b".to_string(), 1u64);
        assert!(seed_survives(&run_when, &versions, &seen));
    }

    #[test]
    fn missing_seen_entry_counts_as_changed() {
        let mut versions = HashMap::new();
        versions.insert("a".to_string(), 0u64);
        let seen = HashMap::new();
        let run_when = RunWhen::AnyOf(vec!["a".into()]);
        assert!(seed_survives(&run_when, &versions, &seen));
    }
}
