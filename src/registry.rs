//! Stable slot numbers for the entities behind summary records.
//!
//! Within one nickname every live entity holds a small integer slot. New
//! entities take the smallest free slot, so the id space per nickname never
//! grows beyond the largest number of entities seen at once. Slots survive as
//! long as their entity keeps appearing and are released after the first
//! reconcile in which it is absent.

use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use std::collections::BTreeMap;
use tracing::debug;

use crate::summary::{EntityKey, SummaryRecord};

/// Slots of a single nickname.
#[derive(Debug, Default)]
struct NicknameSlots {
    by_slot: BTreeMap<u32, EntityKey>,
    by_key: HashMap<EntityKey, u32>,
}

impl NicknameSlots {
    fn first_free(&self) -> u32 {
        // by_slot iterates in ascending order; the first gap is the answer.
        let mut candidate = 0;
        for &slot in self.by_slot.keys() {
            if slot != candidate {
                break;
            }
            candidate += 1;
        }
        candidate
    }

    fn acquire(&mut self, key: EntityKey) -> u32 {
        if let Some(&slot) = self.by_key.get(&key) {
            return slot;
        }
        let slot = self.first_free();
        self.by_slot.insert(slot, key);
        self.by_key.insert(key, slot);
        slot
    }

    fn release(&mut self, key: &EntityKey) -> Option<u32> {
        let slot = self.by_key.remove(key)?;
        self.by_slot.remove(&slot);
        Some(slot)
    }

    fn is_empty(&self) -> bool {
        self.by_slot.is_empty()
    }
}

/// Registry of slot assignments, owned by the sampling worker.
#[derive(Debug, Default)]
pub struct SlotRegistry {
    nicknames: HashMap<String, NicknameSlots>,
    // Pairs seen by the previous reconcile.
    live: HashSet<(String, EntityKey)>,
}

impl SlotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns slots to this tick's records and releases the slots of
    /// entities that disappeared since the previous call.
    ///
    /// All current pairs are acquired before any stale pair is released, so
    /// a slot freed by this call can only be handed out by a later one.
    pub fn reconcile(&mut self, records: &mut [SummaryRecord]) {
        let mut current: HashSet<(String, EntityKey)> = HashSet::with_capacity(records.len());

        for record in records.iter_mut() {
            let slots = self.nicknames.entry(record.nickname.clone()).or_default();
            record.slot = slots.acquire(record.key);
            current.insert((record.nickname.clone(), record.key));
        }

        for (nickname, key) in self.live.difference(&current) {
            if let Some(slots) = self.nicknames.get_mut(nickname) {
                if let Some(slot) = slots.release(key) {
                    debug!("Released slot {} of {} (was {})", slot, nickname, key);
                }
                if slots.is_empty() {
                    self.nicknames.remove(nickname);
                }
            }
        }

        self.live = current;
    }

    /// Slot currently held by `key` under `nickname`.
    pub fn slot_for(&self, nickname: &str, key: EntityKey) -> Option<u32> {
        self.nicknames.get(nickname)?.by_key.get(&key).copied()
    }

    /// Slots in use for `nickname`, ascending.
    pub fn slots(&self, nickname: &str) -> Vec<u32> {
        self.nicknames
            .get(nickname)
            .map(|s| s.by_slot.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Number of live (nickname, key) pairs.
    pub fn len(&self) -> usize {
        self.nicknames.values().map(|s| s.by_key.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.nicknames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::ProcMetrics;

    fn rec(nickname: &str, key: EntityKey) -> SummaryRecord {
        let pid = match key {
            EntityKey::Pid(pid) => pid,
            EntityKey::Group => 0,
        };
        SummaryRecord {
            timestamp: String::new(),
            hostname: "h".to_string(),
            nickname: nickname.to_string(),
            name: nickname.to_string(),
            pid,
            uid: 0,
            ppid: 0,
            key,
            slot: u32::MAX,
            metrics: ProcMetrics::default(),
            cmdline: String::new(),
            members: 1,
        }
    }

    fn tick(reg: &mut SlotRegistry, entries: &[(&str, u32)]) -> Vec<SummaryRecord> {
        let mut records: Vec<SummaryRecord> = entries
            .iter()
            .map(|(n, pid)| rec(n, EntityKey::Pid(*pid)))
            .collect();
        reg.reconcile(&mut records);
        records
    }

    #[test]
    fn test_slots_are_minimal() {
        let mut reg = SlotRegistry::new();
        let out = tick(&mut reg, &[("java", 100), ("java", 200), ("java", 300), ("sshd", 5)]);
        let slots: Vec<u32> = out.iter().map(|r| r.slot).collect();
        assert_eq!(slots, vec![0, 1, 2, 0]);
        assert_eq!(reg.slots("java"), vec![0, 1, 2]);
        assert_eq!(reg.len(), 4);
    }

    #[test]
    fn test_slots_stable_across_ticks() {
        let mut reg = SlotRegistry::new();
        tick(&mut reg, &[("java", 100), ("java", 200)]);
        let out = tick(&mut reg, &[("java", 200), ("java", 100)]);
        assert_eq!(reg.slot_for("java", EntityKey::Pid(100)), Some(0));
        assert_eq!(reg.slot_for("java", EntityKey::Pid(200)), Some(1));
        assert_eq!(out[0].slot, 1);
        assert_eq!(out[1].slot, 0);
    }

    #[test]
    fn test_freed_slot_reused_after_release() {
        let mut reg = SlotRegistry::new();
        tick(&mut reg, &[("java", 100), ("java", 200), ("java", 300)]);

        // 100 disappears; 400 arrives in the same tick while slot 0 is still held.
        let out = tick(&mut reg, &[("java", 200), ("java", 300), ("java", 400)]);
        assert_eq!(out[2].slot, 3);
        assert_eq!(reg.slots("java"), vec![1, 2, 3]);

        // Next newcomer takes the released slot 0, never a higher one.
        let out = tick(
            &mut reg,
            &[("java", 200), ("java", 300), ("java", 400), ("java", 500)],
        );
        assert_eq!(out[3].slot, 0);
        assert_eq!(reg.slots("java"), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_nickname_dropped_when_empty() {
        let mut reg = SlotRegistry::new();
        tick(&mut reg, &[("cron", 10)]);
        tick(&mut reg, &[]);
        assert!(reg.is_empty());
        assert_eq!(reg.slot_for("cron", EntityKey::Pid(10)), None);
    }

    #[test]
    fn test_same_key_under_two_nicknames() {
        let mut reg = SlotRegistry::new();
        let mut records = vec![rec("SBIN", EntityKey::Group), rec("sshd", EntityKey::Group)];
        reg.reconcile(&mut records);
        assert_eq!(records[0].slot, 0);
        assert_eq!(records[1].slot, 0);
        assert_eq!(reg.len(), 2);
    }
}
