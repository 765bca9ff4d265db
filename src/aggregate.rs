//! Flat aggregation of sample values by attribution key.

use serde::{Deserialize, Serialize};

use std::collections::HashMap;

use crate::{Profile, ResolvedMetric, Sample};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// Innermost frame's function name.
    Function,
    /// Innermost frame's `function at file:line`.
    AllocationSite,
    /// Sample type label, `unknown` when unlabeled.
    TypeLabel,
    /// Whole call stack.
    Stack,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateStat {
    pub key: String,
    pub value: i64,
    #[serde(rename = "objectCount")]
    pub object_count: i64,
    /// Display frames (`name\n\tfile:line`, innermost first); stack keys only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frames: Vec<String>,
}

/// Per-key totals in first-seen order.
#[derive(Debug, Clone)]
pub struct StatTable {
    pub granularity: Granularity,
    stats: Vec<AggregateStat>,
    index: HashMap<String, usize>,
}

impl StatTable {
    fn new(granularity: Granularity) -> Self {
        Self {
            granularity,
            stats: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// `frames` is only evaluated the first time `key` is seen.
    fn add(
        &mut self,
        key: String,
        value: i64,
        objects: i64,
        frames: impl FnOnce() -> Vec<String>,
    ) {
        let slot = match self.index.get(&key) {
            Some(i) => *i,
            None => {
                let i = self.stats.len();
                self.index.insert(key.clone(), i);
                self.stats.push(AggregateStat {
                    key,
                    value: 0,
                    object_count: 0,
                    frames: frames(),
                });
                i
            }
        };
        let stat = &mut self.stats[slot];
        stat.value = stat.value.saturating_add(value);
        stat.object_count = stat.object_count.saturating_add(objects);
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&AggregateStat> {
        self.index.get(key).map(|i| &self.stats[*i])
    }

    /// Entries in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = &AggregateStat> {
        self.stats.iter()
    }

    /// Descending by value; equal values keep first-seen order.
    pub fn sorted(&self) -> Vec<AggregateStat> {
        let mut out = self.stats.clone();
        out.sort_by(|a, b| b.value.cmp(&a.value));
        out
    }

    pub fn top(&self, n: usize) -> Vec<AggregateStat> {
        let mut out = self.sorted();
        out.truncate(n);
        out
    }

    pub fn sum(&self) -> i64 {
        self.stats
            .iter()
            .fold(0i64, |acc, s| acc.saturating_add(s.value))
    }
}

#[derive(Debug, Clone)]
pub struct FlatAggregation {
    pub total_value: i64,
    pub total_objects: i64,
    /// Value counted in the total but charged to no key, per granularity.
    pub unattributed: HashMap<Granularity, i64>,
    pub sample_count: usize,
    tables: Vec<StatTable>,
}

impl FlatAggregation {
    pub fn table(&self, granularity: Granularity) -> Option<&StatTable> {
        self.tables.iter().find(|t| t.granularity == granularity)
    }

    pub fn unattributed_value(&self, granularity: Granularity) -> i64 {
        self.unattributed.get(&granularity).copied().unwrap_or(0)
    }
}

/// Folds every eligible sample into one table per requested granularity in a
/// single traversal.
///
/// A sample is eligible when its stack is non-empty and its value vector
/// reaches `metric.index`. Eligible samples always count toward the total even
/// when no key can be derived for a granularity.
pub fn aggregate(
    profile: &Profile,
    metric: &ResolvedMetric,
    granularities: &[Granularity],
) -> FlatAggregation {
    let mut tables: Vec<StatTable> = Vec::with_capacity(granularities.len());
    for g in granularities {
        if !tables.iter().any(|t| t.granularity == *g) {
            tables.push(StatTable::new(*g));
        }
    }
    let mut unattributed = HashMap::<Granularity, i64>::new();
    let mut total_value = 0i64;
    let mut total_objects = 0i64;
    let mut sample_count = 0usize;

    for sample in &profile.samples {
        if sample.stack.is_empty() {
            continue;
        }
        let Some(value) = sample.value_at(metric.index) else {
            continue;
        };
        sample_count += 1;
        total_value = total_value.saturating_add(value);
        let objects = metric
            .object_index
            .and_then(|i| sample.value_at(i))
            .unwrap_or(0)
            .max(0);
        total_objects = total_objects.saturating_add(objects);

        for table in &mut tables {
            match attribution_key(sample, table.granularity) {
                Some(key) => {
                    let granularity = table.granularity;
                    table.add(key, value, objects, || {
                        if granularity == Granularity::Stack {
                            stack_frames(sample)
                        } else {
                            Vec::new()
                        }
                    })
                }
                None => {
                    let slot = unattributed.entry(table.granularity).or_insert(0);
                    *slot = slot.saturating_add(value);
                }
            }
        }
    }

    if total_value == 0 {
        tracing::warn!(
            "total value for the selected sample type ({}/{}) is zero",
            metric.name,
            metric.unit
        );
    }
    tracing::debug!(
        "aggregated {sample_count} samples into {} tables (total={total_value})",
        tables.len()
    );

    FlatAggregation {
        total_value,
        total_objects,
        unattributed,
        sample_count,
        tables,
    }
}

pub fn attribution_key(sample: &Sample, granularity: Granularity) -> Option<String> {
    match granularity {
        Granularity::Function => sample
            .innermost()
            .and_then(|loc| loc.first_function_line())
            .map(|(f, _)| f.name.clone()),
        Granularity::AllocationSite => sample
            .innermost()
            .and_then(|loc| loc.first_function_line())
            .map(|(f, line)| site_key(&f.name, &f.filename, line.line)),
        Granularity::TypeLabel => Some(sample.type_label_or_unknown().to_string()),
        Granularity::Stack => {
            let key: String = sample
                .stack
                .iter()
                .filter_map(|loc| loc.lines.first())
                .filter_map(|line| {
                    line.function
                        .as_ref()
                        .map(|f| format!("{:?};{:?};{}|", f.name, f.filename, line.line))
                })
                .collect();
            (!key.is_empty()).then_some(key)
        }
    }
}

pub fn site_key(function: &str, file: &str, line: i64) -> String {
    format!("{function} at {file}:{line}")
}

/// Display lines for each frame carrying a function, innermost first.
pub fn stack_frames(sample: &Sample) -> Vec<String> {
    sample
        .stack
        .iter()
        .filter_map(|loc| loc.lines.first())
        .filter_map(|line| {
            line.function
                .as_ref()
                .map(|f| format!("{}\n\t{}:{}", f.name, f.filename, line.line))
        })
        .collect()
}
