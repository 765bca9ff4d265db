//! Picks the sample value index that holds a requested metric.

use serde::{Deserialize, Serialize};

use crate::{ProflensError, ProflensResult, ValueType};

/// Sample type names that mark a byte-valued memory metric.
pub const MEMORY_VALUE_TYPES: [&str; 4] = ["inuse_space", "alloc_space", "alloc", "allocation"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricFamily {
    CpuTime,
    HeapInUse,
    AllocBytes,
    Goroutines,
    Contention,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMetric {
    pub index: usize,
    pub name: String,
    pub unit: String,
    /// Companion object-count index; enrichment is optional when absent.
    pub object_index: Option<usize>,
}

impl ResolvedMetric {
    fn at(sample_types: &[ValueType], index: usize) -> Self {
        let st = &sample_types[index];
        Self {
            index,
            name: st.name.clone(),
            unit: st.unit.clone(),
            object_index: companion_object_index(sample_types, st),
        }
    }

    pub fn value_type(&self) -> ValueType {
        ValueType::new(&self.name, &self.unit)
    }

    pub fn is_memory(&self) -> bool {
        is_memory_metric(&self.value_type())
    }
}

pub fn is_memory_metric(st: &ValueType) -> bool {
    st.unit == "bytes" && MEMORY_VALUE_TYPES.contains(&st.name.as_str())
}

/// Object-count sample type paired with a byte-valued memory metric.
pub fn companion_object_index(sample_types: &[ValueType], metric: &ValueType) -> Option<usize> {
    if !is_memory_metric(metric) {
        return None;
    }
    let wanted = if metric.name.starts_with("inuse") {
        "inuse_objects"
    } else {
        "alloc_objects"
    };
    find(sample_types, wanted, "count")
}

fn find(sample_types: &[ValueType], name: &str, unit: &str) -> Option<usize> {
    sample_types.iter().position(|st| st.is(name, unit))
}

fn describe(sample_types: &[ValueType]) -> String {
    sample_types
        .iter()
        .map(|st| format!("{}/{}", st.name, st.unit))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn resolve_metric(
    sample_types: &[ValueType],
    family: MetricFamily,
) -> ProflensResult<ResolvedMetric> {
    if sample_types.is_empty() {
        return Err(ProflensError::UnresolvableMetric(format!(
            "profile declares no sample types (wanted {family:?})"
        )));
    }
    let index = match family {
        MetricFamily::CpuTime => resolve_cpu(sample_types)?,
        MetricFamily::HeapInUse => resolve_heap(sample_types),
        MetricFamily::AllocBytes => resolve_alloc(sample_types),
        MetricFamily::Goroutines => {
            if sample_types[0].name != "goroutines" {
                tracing::warn!(
                    "expected 'goroutines' sample type, found [{}]; using index 0",
                    describe(sample_types)
                );
            }
            0
        }
        MetricFamily::Contention => resolve_contention(sample_types),
    };
    let resolved = ResolvedMetric::at(sample_types, index);
    tracing::debug!(
        "using index {} ({}/{}) for {family:?}",
        resolved.index,
        resolved.name,
        resolved.unit
    );
    Ok(resolved)
}

fn resolve_cpu(sample_types: &[ValueType]) -> ProflensResult<usize> {
    if let Some(i) = find(sample_types, "cpu", "nanoseconds") {
        return Ok(i);
    }
    if let Some(i) = find(sample_types, "samples", "count") {
        return Ok(i);
    }
    match sample_types.len() {
        0 => Err(ProflensError::UnresolvableMetric(
            "no cpu time sample type".to_string(),
        )),
        1 => {
            tracing::warn!(
                "only one sample type found, using index 0: {}",
                describe(sample_types)
            );
            Ok(0)
        }
        _ => {
            tracing::warn!(
                "could not identify cpu time sample type, defaulting to index 1: {}/{}",
                sample_types[1].name,
                sample_types[1].unit
            );
            Ok(1)
        }
    }
}

fn resolve_heap(sample_types: &[ValueType]) -> usize {
    if let Some(i) = find(sample_types, "inuse_space", "bytes") {
        return i;
    }
    if let Some(i) = find(sample_types, "alloc_space", "bytes") {
        tracing::warn!("'inuse_space' not found, falling back to 'alloc_space'");
        return i;
    }
    let last = sample_types.len() - 1;
    tracing::warn!(
        "could not find 'inuse_space' or 'alloc_space', defaulting to last sample type index {last}: {}/{}",
        sample_types[last].name,
        sample_types[last].unit
    );
    last
}

fn resolve_alloc(sample_types: &[ValueType]) -> usize {
    if let Some(i) = find(sample_types, "alloc_space", "bytes") {
        return i;
    }
    if let Some(i) = sample_types
        .iter()
        .position(|st| st.is("alloc", "bytes") || st.is("allocation", "bytes"))
    {
        tracing::warn!(
            "'alloc_space' not found, using '{}/{}' instead",
            sample_types[i].name,
            sample_types[i].unit
        );
        return i;
    }
    tracing::warn!(
        "could not find allocation space sample type, defaulting to index 0: {}/{}",
        sample_types[0].name,
        sample_types[0].unit
    );
    0
}

fn resolve_contention(sample_types: &[ValueType]) -> usize {
    if let Some(i) = find(sample_types, "delay", "nanoseconds") {
        return i;
    }
    if let Some(i) = find(sample_types, "contentions", "count") {
        return i;
    }
    tracing::warn!(
        "could not find contention sample type, defaulting to index 0: {}/{}",
        sample_types[0].name,
        sample_types[0].unit
    );
    0
}
