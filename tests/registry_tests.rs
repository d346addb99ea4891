//! Slot registry properties under process churn.

use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use nickstat_exporter::{EntityKey, ProcMetrics, SlotRegistry, SummaryRecord};

fn record(nickname: &str, pid: u32) -> SummaryRecord {
    SummaryRecord {
        timestamp: String::new(),
        hostname: "web01".to_string(),
        nickname: nickname.to_string(),
        name: nickname.to_string(),
        pid,
        uid: 0,
        ppid: 1,
        key: EntityKey::Pid(pid),
        slot: u32::MAX,
        metrics: ProcMetrics::default(),
        cmdline: String::new(),
        members: 1,
    }
}

#[test]
fn test_churn_keeps_slots_unique_stable_and_small() {
    let nicknames = ["java", "sshd", "nginx"];
    // Seeded so the churn pattern is the same on every run.
    let mut rng = StdRng::seed_from_u64(7);
    let mut registry = SlotRegistry::new();
    let mut alive: Vec<(usize, u32)> = Vec::new();
    let mut previous: HashMap<(String, u32), u32> = HashMap::new();
    let mut next_pid = 100;

    for _tick in 0..200 {
        // Drop some processes, start some new ones.
        alive.retain(|_| !rng.gen_bool(0.25));
        for _ in 0..rng.gen_range(0..4) {
            alive.push((rng.gen_range(0..nicknames.len()), next_pid));
            next_pid += 1;
        }

        let mut records: Vec<SummaryRecord> = alive
            .iter()
            .map(|&(n, pid)| record(nicknames[n], pid))
            .collect();
        registry.reconcile(&mut records);

        let mut seen: HashSet<(String, u32)> = HashSet::new();
        let mut current: HashMap<(String, u32), u32> = HashMap::new();
        for r in &records {
            // Unique within a nickname.
            assert!(
                seen.insert((r.nickname.clone(), r.slot)),
                "slot {} of {} handed out twice",
                r.slot,
                r.nickname
            );
            // Stable while the process keeps appearing.
            if let Some(&old) = previous.get(&(r.nickname.clone(), r.pid)) {
                assert_eq!(old, r.slot, "pid {} changed slot", r.pid);
            }
            current.insert((r.nickname.clone(), r.pid), r.slot);
        }

        // Bounded by the entities held at assignment time: this tick's plus
        // the ones released at its end.
        for nickname in nicknames {
            let now = records.iter().filter(|r| r.nickname == nickname).count();
            let before = previous.keys().filter(|(n, _)| n == nickname).count();
            for r in records.iter().filter(|r| r.nickname == nickname) {
                assert!((r.slot as usize) < now + before);
            }
            // After release, the table holds exactly this tick's entities.
            assert_eq!(registry.slots(nickname).len(), now);
        }

        assert_eq!(registry.len(), records.len());
        previous = current;
    }
}

#[test]
fn test_steady_population_never_grows_slot_space() {
    let mut registry = SlotRegistry::new();

    // Five workers, one restarting every tick under a new pid.
    let mut pids: Vec<u32> = (1..=5).collect();
    let mut next_pid = 6;
    for _ in 0..50 {
        let mut records: Vec<SummaryRecord> = pids.iter().map(|&p| record("worker", p)).collect();
        registry.reconcile(&mut records);
        assert!(records.iter().all(|r| r.slot <= 5));

        pids.remove(0);
        pids.push(next_pid);
        next_pid += 1;
    }
    assert_eq!(registry.len(), 5);
}
