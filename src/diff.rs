//! Snapshot diffing of two heap profiles to surface leak candidates.

use serde::{Deserialize, Serialize};

use crate::{
    Granularity, Profile, ProflensError, ProflensResult, ResolvedMetric, aggregate, format_bytes,
};

pub const DEFAULT_LEAK_THRESHOLD: f64 = 0.10;
pub const DEFAULT_LEAK_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LeakOptions {
    /// Minimum growth as a fraction (0.10 == 10%).
    pub threshold: f64,
    pub limit: usize,
}

impl Default for LeakOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_LEAK_THRESHOLD,
            limit: DEFAULT_LEAK_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeakCandidate {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(rename = "oldValue")]
    pub old_value: i64,
    #[serde(rename = "newValue")]
    pub new_value: i64,
    pub growth: i64,
    #[serde(rename = "growthPercent")]
    pub growth_percent: f64,
    #[serde(rename = "oldObjects")]
    pub old_objects: i64,
    #[serde(rename = "newObjects")]
    pub new_objects: i64,
    #[serde(rename = "objectGrowth")]
    pub object_growth: i64,
    #[serde(rename = "objectGrowthPercent")]
    pub object_growth_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeakReport {
    pub threshold: f64,
    /// Matches before `limit` truncation.
    #[serde(rename = "totalMatches")]
    pub total_matches: usize,
    pub candidates: Vec<LeakCandidate>,
}

/// Growth relative to `old`; a type that appears from nothing counts as 100%.
pub fn growth_percent(old: i64, new: i64) -> f64 {
    let growth = new.saturating_sub(old);
    if old > 0 {
        (growth as f64 / old as f64) * 100.0
    } else if growth > 0 {
        100.0
    } else {
        0.0
    }
}

fn inuse_metric(profile: &Profile, which: &str) -> ProflensResult<ResolvedMetric> {
    let index = profile
        .sample_types
        .iter()
        .position(|st| st.is("inuse_space", "bytes"))
        .ok_or_else(|| {
            ProflensError::MissingBasisMetric(format!(
                "could not find inuse_space sample type in the {which} profile"
            ))
        })?;
    let object_index = profile
        .sample_types
        .iter()
        .position(|st| st.is("inuse_objects", "count"));
    Ok(ResolvedMetric {
        index,
        name: "inuse_space".to_string(),
        unit: "bytes".to_string(),
        object_index,
    })
}

pub fn detect_leaks(
    old: &Profile,
    new: &Profile,
    options: &LeakOptions,
) -> ProflensResult<LeakReport> {
    let old_metric = inuse_metric(old, "old")?;
    let new_metric = inuse_metric(new, "new")?;

    let old_agg = aggregate(old, &old_metric, &[Granularity::TypeLabel]);
    let new_agg = aggregate(new, &new_metric, &[Granularity::TypeLabel]);
    let (Some(old_types), Some(new_types)) = (
        old_agg.table(Granularity::TypeLabel),
        new_agg.table(Granularity::TypeLabel),
    ) else {
        return Err(ProflensError::InvalidArgument(
            "type aggregation produced no table".to_string(),
        ));
    };

    let mut candidates = Vec::<LeakCandidate>::new();
    for stat in new_types.iter() {
        let (old_value, old_objects) = old_types
            .get(&stat.key)
            .map(|s| (s.value, s.object_count))
            .unwrap_or((0, 0));
        let pct = growth_percent(old_value, stat.value);
        if pct < options.threshold * 100.0 {
            continue;
        }
        candidates.push(LeakCandidate {
            type_name: stat.key.clone(),
            old_value,
            new_value: stat.value,
            growth: stat.value.saturating_sub(old_value),
            growth_percent: pct,
            old_objects,
            new_objects: stat.object_count,
            object_growth: stat.object_count.saturating_sub(old_objects),
            object_growth_percent: growth_percent(old_objects, stat.object_count),
        });
    }

    candidates.sort_by(|a, b| b.growth.cmp(&a.growth));
    let total_matches = candidates.len();
    candidates.truncate(options.limit);
    tracing::debug!(
        "leak diff: {} old types, {} new types, {total_matches} above {:.1}%",
        old_types.len(),
        new_types.len(),
        options.threshold * 100.0
    );

    Ok(LeakReport {
        threshold: options.threshold,
        total_matches,
        candidates,
    })
}

impl LeakReport {
    pub fn render_text(&self) -> String {
        let mut b = String::new();
        b.push_str("Memory Leak Detection Report\n");
        b.push_str("==========================\n\n");

        if self.total_matches == 0 {
            b.push_str("No significant memory growth detected.\n");
            return b;
        }

        b.push_str(&format!(
            "Found {} types with significant memory growth (threshold: {:.1}%)\n\n",
            self.total_matches,
            self.threshold * 100.0
        ));
        b.push_str("Top Potential Memory Leaks:\n");
        b.push_str(&format!("{}\n", "-".repeat(50)));
        b.push_str(&format!(
            "{:<20} {:<15} {:<15} {:<15} {}\n",
            "Type", "Old Size", "New Size", "Growth", "Growth %"
        ));
        b.push_str(&format!("{}\n", "-".repeat(50)));

        for c in &self.candidates {
            b.push_str(&format!(
                "{:<20} {:<15} {:<15} {:<15} {:.2}%",
                c.type_name,
                format_bytes(c.old_value),
                format_bytes(c.new_value),
                format_bytes(c.growth),
                c.growth_percent
            ));
            if c.old_objects > 0 || c.new_objects > 0 {
                b.push_str(&format!(
                    " (Objects: {} → {}, {:+}, {:.2}%)",
                    c.old_objects, c.new_objects, c.object_growth, c.object_growth_percent
                ));
            }
            b.push('\n');
        }

        if self.candidates.len() < self.total_matches {
            b.push_str(&format!(
                "({} of {} shown)\n",
                self.candidates.len(),
                self.total_matches
            ));
        }
        b.push_str("\nRecommendations:\n");
        b.push_str("1. Focus on types with both high absolute growth and high percentage growth\n");
        b.push_str("2. Look for objects that grow in count but not significantly in size (may indicate collection leaks)\n");
        b.push_str("3. Compare multiple snapshots over time to confirm consistent growth patterns\n");
        b
    }
}
