//! Decay scoring and prune-selection properties.

use chrono::{Duration, Utc};
use mnemos_core::memory::DEFAULT_DECAY_RATE;
use mnemos_core::{
    classify_tier, decay_score, ActivationEntry, ActivationIndex, DecayTier, MemoryType,
    RegisterOptions, TypeWeights,
};

fn entry(
    memory_type: MemoryType,
    access_count: u64,
    days_idle: i64,
    pinned: bool,
) -> ActivationEntry {
    let now = Utc::now();
    let mut e = ActivationEntry::new("m", memory_type, now - Duration::days(days_idle));
    e.access_count = access_count;
    e.pinned = pinned;
    e
}

#[test]
fn immune_entries_score_infinite_and_stay_active() {
    let w = TypeWeights::default();
    let now = Utc::now();
    for memory_type in MemoryType::ALL {
        for days in [0, 30, 10_000] {
            for count in [0, 1, 50] {
                let pinned = entry(memory_type, count, days, true);
                let score = decay_score(&pinned, now, &w, DEFAULT_DECAY_RATE);
                assert_eq!(score, f64::INFINITY);
                assert_eq!(classify_tier(score), DecayTier::Active);
            }
        }
    }
    let vault = entry(MemoryType::Vault, 0, 900, false);
    assert_eq!(decay_score(&vault, now, &w, DEFAULT_DECAY_RATE), f64::INFINITY);
}

#[test]
fn score_never_increases_with_idle_time() {
    let w = TypeWeights::default();
    let now = Utc::now();
    for memory_type in [MemoryType::Episodic, MemoryType::Semantic, MemoryType::Procedural] {
        let mut previous = f64::INFINITY;
        for days in 0..120 {
            let s = decay_score(&entry(memory_type, 4, days, false), now, &w, DEFAULT_DECAY_RATE);
            assert!(s <= previous, "{memory_type} day {days}: {s} > {previous}");
            previous = s;
        }
    }
}

#[test]
fn score_strictly_increases_with_access_count() {
    let w = TypeWeights::default();
    let now = Utc::now();
    let mut previous = -1.0;
    for count in 0..64 {
        let e = entry(MemoryType::Semantic, count, 5, false);
        let s = decay_score(&e, now, &w, DEFAULT_DECAY_RATE);
        assert!(s > previous, "count {count}: {s} <= {previous}");
        previous = s;
    }
}

#[test]
fn tier_boundaries() {
    assert_eq!(classify_tier(0.5), DecayTier::Active);
    assert_eq!(classify_tier(0.2), DecayTier::Fading);
    assert_eq!(classify_tier(0.05), DecayTier::Dormant);
    assert_eq!(classify_tier(0.049), DecayTier::Archived);
}

#[test]
fn pruning_never_selects_pinned_or_vault() {
    let mut index = ActivationIndex::new();
    let ancient = Utc::now() - Duration::days(3_650);
    for (i, memory_type) in MemoryType::ALL.into_iter().enumerate() {
        index.register_memory(
            &format!("plain-{i}"),
            memory_type,
            RegisterOptions::default(),
            ancient,
        );
        index.register_memory(
            &format!("pinned-{i}"),
            memory_type,
            RegisterOptions::default().pinned(true),
            ancient,
        );
    }
    let candidates =
        index.identify_prune_candidates(f64::MAX, Utc::now(), &TypeWeights::default(), 1.0);
    assert_eq!(candidates, vec!["plain-0", "plain-1", "plain-2"]);
    assert!(candidates.iter().all(|id| !id.starts_with("pinned")));
}
