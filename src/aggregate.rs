//! Reduction of same-nickname records into one row.

use ahash::AHashMap as HashMap;
use std::collections::BTreeSet;
use tracing::debug;

use crate::process::Classifier;
use crate::summary::{EntityKey, SummaryRecord};

/// Collapses records of reducible nicknames.
///
/// For each nickname in `reducible`, the first record (input order) whose
/// short name differs from the nickname becomes the accumulator: its command
/// line is replaced by the rule pattern and every later record of that
/// nickname is summed into it and dropped. Records whose short name equals
/// their nickname and records of other nicknames pass through unchanged.
/// Percentages are summed, so a group row reports the total consumption of
/// the group.
pub fn reduce(
    records: Vec<SummaryRecord>,
    reducible: &BTreeSet<String>,
    classifier: &Classifier,
) -> Vec<SummaryRecord> {
    if reducible.is_empty() {
        return records;
    }

    let mut out: Vec<SummaryRecord> = Vec::with_capacity(records.len());
    // nickname -> index of its accumulator in `out`
    let mut accumulators: HashMap<String, usize> = HashMap::new();

    for mut record in records {
        if record.is_self_named() || !reducible.contains(&record.nickname) {
            out.push(record);
            continue;
        }

        match accumulators.get(&record.nickname) {
            Some(&idx) => {
                let acc = &mut out[idx];
                acc.metrics += record.metrics;
                acc.members += record.members;
                debug!(
                    "Folded pid {} into {} (now {} members)",
                    record.pid, acc.nickname, acc.members
                );
            }
            None => {
                record.cmdline = classifier
                    .pattern(&record.nickname)
                    .unwrap_or(&record.nickname)
                    .to_string();
                record.key = EntityKey::Group;
                accumulators.insert(record.nickname.clone(), out.len());
                out.push(record);
            }
        }
    }

    out
}
