//! The accumulating record set behind both aggregators.
//!
//! Statistics are rolling: a (category, month) group covers every record
//! consumed so far, not only the current micro-batch. The set holds the
//! last arrival of each (reference_sheet, version), so a redelivered
//! message replaces its earlier copy instead of adding to it. A window
//! re-reduces only the groups it touched, which keeps a group's result
//! independent of how the transport split the records into batches.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};

use crate::classify::{classify_within, ClassifiedRecord, GroupKey};
use crate::record::NormalizedRecord;

type RecordKey = (String, Option<String>);

fn record_key(sheet: &str, version: Option<&str>) -> RecordKey {
    (sheet.to_string(), version.map(str::to_string))
}

/// What one micro-batch changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Absorbed {
    /// Groups whose statistics must be recomputed
    pub touched: BTreeSet<GroupKey>,
    /// Arrivals identical to a record already held
    pub duplicates: usize,
    /// Arrivals that superseded a different copy of the same identity
    pub replaced: usize,
    /// Arrivals without a publication date or before the cutoff year
    pub filtered: usize,
}

/// Filtered, classified records consumed so far.
///
/// Persisted with the sink checkpoint; serializes as a flat list of
/// classified records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccumulatedSet {
    keyed: HashMap<RecordKey, ClassifiedRecord>,
    /// Records without a reference sheet cannot be identified, so every
    /// arrival is kept
    unkeyed: Vec<ClassifiedRecord>,
}

impl AccumulatedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = ClassifiedRecord>) -> Self {
        let mut set = Self::default();
        for record in records {
            let key = record
                .dedup_key()
                .map(|(sheet, version)| record_key(sheet, version));
            match key {
                Some(key) => {
                    set.keyed.insert(key, record);
                }
                None => set.unkeyed.push(record),
            }
        }
        set
    }

    pub fn len(&self) -> usize {
        self.keyed.len() + self.unkeyed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn records(&self) -> impl Iterator<Item = &ClassifiedRecord> {
        self.keyed.values().chain(self.unkeyed.iter())
    }

    /// Folds one consumed micro-batch into the set.
    ///
    /// `records` should already be deduplicated within the batch. A newer
    /// arrival of a held identity always wins, even when it moves the record
    /// to another group or drops it below the cutoff; both the old and the
    /// new group are then reported as touched.
    pub fn absorb(&mut self, records: &[NormalizedRecord], cutoff_year: i32) -> Absorbed {
        let mut outcome = Absorbed::default();

        for record in records {
            let key = record
                .dedup_key()
                .map(|(sheet, version)| record_key(sheet, version));

            match (key, classify_within(record, cutoff_year)) {
                (Some(key), Some(classified)) => match self.keyed.entry(key) {
                    Entry::Occupied(mut held) => {
                        if *held.get() == classified {
                            outcome.duplicates += 1;
                        } else {
                            outcome.replaced += 1;
                            outcome.touched.insert(held.get().group_key());
                            outcome.touched.insert(classified.group_key());
                            held.insert(classified);
                        }
                    }
                    Entry::Vacant(slot) => {
                        outcome.touched.insert(classified.group_key());
                        slot.insert(classified);
                    }
                },
                (Some(key), None) => {
                    outcome.filtered += 1;
                    if let Some(held) = self.keyed.remove(&key) {
                        outcome.replaced += 1;
                        outcome.touched.insert(held.group_key());
                    }
                }
                (None, Some(classified)) => {
                    outcome.touched.insert(classified.group_key());
                    self.unkeyed.push(classified);
                }
                (None, None) => outcome.filtered += 1,
            }
        }

        outcome
    }

    /// Every held record belonging to one of `groups`.
    ///
    /// A touched group that no longer holds any record yields nothing, so
    /// it gets no new row.
    pub fn snapshot(&self, groups: &BTreeSet<GroupKey>) -> Vec<ClassifiedRecord> {
        if groups.is_empty() {
            return Vec::new();
        }
        self.records()
            .filter(|record| groups.contains(&record.group_key()))
            .cloned()
            .collect()
    }
}

impl Serialize for AccumulatedSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.records())
    }
}

impl<'de> Deserialize<'de> for AccumulatedSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<ClassifiedRecord>::deserialize(deserializer).map(Self::from_records)
    }
}
