//! Ranked text, Markdown and structured JSON reports over one profile.

use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

use crate::{
    AggregateStat, FlatAggregation, Granularity, MetricFamily, Profile, ProflensError,
    ProflensResult, ResolvedMetric, StatTable, UNKNOWN_TYPE, aggregate, build_flame_tree,
    format_bytes, format_sample_value, format_value, percentage, resolve_metric,
};

const RULE: &str = "--------------------------------------------------\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileKind {
    Cpu,
    Heap,
    Allocs,
    Goroutine,
    Mutex,
    Block,
}

impl ProfileKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Heap => "heap",
            Self::Allocs => "allocs",
            Self::Goroutine => "goroutine",
            Self::Mutex => "mutex",
            Self::Block => "block",
        }
    }

    pub fn family(self) -> MetricFamily {
        match self {
            Self::Cpu => MetricFamily::CpuTime,
            Self::Heap => MetricFamily::HeapInUse,
            Self::Allocs => MetricFamily::AllocBytes,
            Self::Goroutine => MetricFamily::Goroutines,
            Self::Mutex | Self::Block => MetricFamily::Contention,
        }
    }

    fn granularities(self) -> &'static [Granularity] {
        match self {
            Self::Heap => &[Granularity::Function, Granularity::TypeLabel],
            Self::Allocs => &[Granularity::Function, Granularity::AllocationSite],
            Self::Goroutine => &[Granularity::Function, Granularity::Stack],
            Self::Cpu | Self::Mutex | Self::Block => &[Granularity::Function],
        }
    }

    fn title(self) -> &'static str {
        match self {
            Self::Cpu => "CPU",
            Self::Heap => "Heap",
            Self::Allocs => "Allocation",
            Self::Goroutine => "Goroutine",
            Self::Mutex => "Mutex",
            Self::Block => "Block",
        }
    }
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProfileKind {
    type Err = ProflensError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(Self::Cpu),
            "heap" => Ok(Self::Heap),
            "allocs" => Ok(Self::Allocs),
            "goroutine" => Ok(Self::Goroutine),
            "mutex" => Ok(Self::Mutex),
            "block" => Ok(Self::Block),
            other => Err(ProflensError::UnsupportedProfileType(other.to_string())),
        }
    }
}

impl clap::ValueEnum for ProfileKind {
    fn value_variants<'a>() -> &'a [Self] {
        &[
            Self::Cpu,
            Self::Heap,
            Self::Allocs,
            Self::Goroutine,
            Self::Mutex,
            Self::Block,
        ]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(clap::builder::PossibleValue::new(self.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    Text,
    Markdown,
    Json,
    FlamegraphJson,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Markdown => "markdown",
            Self::Json => "json",
            Self::FlamegraphJson => "flamegraph-json",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = ProflensError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "markdown" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            "flamegraph-json" => Ok(Self::FlamegraphJson),
            other => Err(ProflensError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl clap::ValueEnum for OutputFormat {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Text, Self::Markdown, Self::Json, Self::FlamegraphJson]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(clap::builder::PossibleValue::new(self.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionRow {
    #[serde(rename = "functionName")]
    pub function_name: String,
    pub value: i64,
    #[serde(rename = "valueFormatted")]
    pub value_formatted: String,
    pub percentage: f64,
    #[serde(
        rename = "objectCount",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub object_count: Option<i64>,
}

/// Value, share and size breakdown shared by site and type rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    pub value: i64,
    #[serde(rename = "valueFormatted")]
    pub value_formatted: String,
    pub percentage: f64,
    #[serde(
        rename = "objectCount",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub object_count: Option<i64>,
    #[serde(rename = "avgSize", default, skip_serializing_if = "Option::is_none")]
    pub avg_size: Option<i64>,
    #[serde(
        rename = "avgSizeFormatted",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub avg_size_formatted: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteRow {
    pub site: String,
    #[serde(flatten)]
    pub stats: GroupStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeRow {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(flatten)]
    pub stats: GroupStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackRow {
    pub count: i64,
    pub percentage: f64,
    #[serde(rename = "stackTrace")]
    pub stack_trace: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredReport {
    #[serde(rename = "profileType")]
    pub profile_type: String,
    #[serde(rename = "valueType")]
    pub value_type: String,
    #[serde(rename = "valueUnit")]
    pub value_unit: String,
    #[serde(rename = "totalValue")]
    pub total_value: i64,
    #[serde(rename = "totalValueFormatted")]
    pub total_value_formatted: String,
    #[serde(
        rename = "totalDurationNanos",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub total_duration_nanos: Option<i64>,
    #[serde(
        rename = "totalObjects",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub total_objects: Option<i64>,
    /// Rows actually returned, not the requested limit.
    #[serde(rename = "topN")]
    pub top_n: usize,
    pub functions: Vec<FunctionRow>,
    #[serde(
        rename = "allocationSites",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub allocation_sites: Option<Vec<SiteRow>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<Vec<TypeRow>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stacks: Option<Vec<StackRow>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
    #[serde(rename = "topN", default, skip_serializing_if = "Option::is_none")]
    pub top_n: Option<usize>,
}

pub fn error_payload(message: impl Into<String>, top_n: Option<usize>) -> String {
    let payload = ErrorPayload {
        error: message.into(),
        top_n,
    };
    serde_json::to_string(&payload)
        .unwrap_or_else(|_| r#"{"error":"failed to encode error payload"}"#.to_string())
}

/// Resolves the metric for `kind`, aggregates once, and renders in `format`.
///
/// Output-layer failures in the JSON kinds come back as an error payload
/// string; resolution failures are returned as errors.
pub fn analyze_profile(
    profile: &Profile,
    kind: ProfileKind,
    top_n: usize,
    format: OutputFormat,
) -> ProflensResult<String> {
    tracing::debug!("analyzing {kind} profile (top {top_n}, format {format})");
    let metric = resolve_metric(&profile.sample_types, kind.family())?;

    if format == OutputFormat::FlamegraphJson {
        tracing::debug!(
            "building flame tree for {kind} profile using value index {}",
            metric.index
        );
        return Ok(match build_flame_tree(profile, metric.index) {
            Ok(tree) => serde_json::to_string(&tree).unwrap_or_else(|err| {
                error_payload(
                    format!("Failed to marshal flame graph tree to JSON: {err}"),
                    None,
                )
            }),
            Err(err) => {
                tracing::warn!("error building flame graph tree: {err}");
                error_payload(format!("Failed to build flame graph tree: {err}"), None)
            }
        });
    }

    let agg = aggregate(profile, &metric, kind.granularities());
    let ctx = ReportContext {
        profile,
        kind,
        metric: &metric,
        agg: &agg,
        top_n,
    };
    match format {
        OutputFormat::Text => Ok(ctx.render_text()),
        OutputFormat::Markdown => Ok(format!("```text\n{}```\n", ctx.render_text())),
        OutputFormat::Json => {
            let report = ctx.structured();
            Ok(serde_json::to_string_pretty(&report).unwrap_or_else(|err| {
                tracing::warn!("error encoding {kind} report: {err}");
                error_payload(
                    format!("Failed to marshal result to JSON: {err}"),
                    Some(top_n),
                )
            }))
        }
        OutputFormat::FlamegraphJson => Err(ProflensError::UnsupportedFormat(
            format.as_str().to_string(),
        )),
    }
}

struct ReportContext<'a> {
    profile: &'a Profile,
    kind: ProfileKind,
    metric: &'a ResolvedMetric,
    agg: &'a FlatAggregation,
    top_n: usize,
}

impl ReportContext<'_> {
    fn top(&self, granularity: Granularity) -> Vec<AggregateStat> {
        self.agg
            .table(granularity)
            .map(|t| t.top(self.top_n))
            .unwrap_or_default()
    }

    fn fmt_value(&self, v: i64) -> String {
        match self.kind {
            ProfileKind::Heap | ProfileKind::Allocs => format_bytes(v),
            _ => format_value(v, &self.metric.unit),
        }
    }

    fn pct(&self, v: i64) -> f64 {
        percentage(v, self.agg.total_value)
    }

    fn objects(&self, stat: &AggregateStat) -> Option<i64> {
        (self.metric.object_index.is_some() && stat.object_count > 0).then_some(stat.object_count)
    }

    /// Wall-clock duration for CPU reports, estimated from the sample total
    /// when the profile does not declare one.
    fn duration_nanos(&self) -> Option<i64> {
        if self.kind != ProfileKind::Cpu {
            return None;
        }
        match self.profile.duration_nanos.filter(|d| *d > 0) {
            Some(d) => Some(d),
            None if self.agg.total_value > 0 && self.metric.unit == "nanoseconds" => {
                tracing::debug!(
                    "profile declares no duration, estimating {}ns from samples",
                    self.agg.total_value
                );
                Some(self.agg.total_value)
            }
            None => None,
        }
    }

    fn labeled_types(&self) -> Option<&StatTable> {
        self.agg
            .table(Granularity::TypeLabel)
            .filter(|t| t.iter().any(|s| s.key != UNKNOWN_TYPE))
    }

    fn render_text(&self) -> String {
        let mut b = String::new();
        let vt = &self.metric.name;
        let unit = &self.metric.unit;
        let total = self.agg.total_value;
        let title = self.kind.title();

        match self.kind {
            ProfileKind::Cpu => {
                b.push_str(&format!(
                    "{title} Profile Analysis (Top {} Functions by Flat Time)\n",
                    self.top_n
                ));
                b.push_str(&format!(
                    "Total Samples/Time ({unit}): {}\n",
                    format_sample_value(total, unit)
                ));
                // Same two-decimal duration style as the sample totals.
                if let Some(d) = self.duration_nanos() {
                    b.push_str(&format!(
                        "Total Duration: {}\n",
                        format_sample_value(d, "nanoseconds")
                    ));
                }
                self.function_section(&mut b, "Flat Time", None);
            }
            ProfileKind::Heap => {
                b.push_str(&format!(
                    "{title} Profile Analysis (Top {} Functions by {vt})\n",
                    self.top_n
                ));
                b.push_str(&format!("Total {vt} ({unit}): {}\n", format_bytes(total)));
                self.function_section(&mut b, vt, None);
                if let Some(types) = self.labeled_types() {
                    b.push_str("\n=== By Type ===\n");
                    self.group_section(&mut b, vt, "Type", &types.top(self.top_n));
                }
            }
            ProfileKind::Allocs => {
                b.push_str(&format!(
                    "{title} Profile Analysis (Top {} Functions by {vt})\n",
                    self.top_n
                ));
                b.push_str(&format!("Total {vt} ({unit}): {}\n", format_bytes(total)));
                if self.agg.total_objects > 0 {
                    b.push_str(&format!("Total Objects: {}\n", self.agg.total_objects));
                }
                self.function_section(&mut b, vt, Some("=== By Function ==="));
                b.push_str("\n=== By Allocation Site ===\n");
                self.group_section(
                    &mut b,
                    vt,
                    "Allocation Site",
                    &self.top(Granularity::AllocationSite),
                );
            }
            ProfileKind::Goroutine => {
                b.push_str(&format!(
                    "{title} Profile Analysis (Top {} Stacks by Count)\n",
                    self.top_n
                ));
                b.push_str(&format!("Total Goroutines ({vt}/{unit}): {total}\n"));
                b.push_str(RULE);
                for stat in self.top(Granularity::Stack) {
                    b.push_str(&format!("\n{} goroutines with stack:\n", stat.value));
                    for frame in &stat.frames {
                        b.push_str(&format!("  {frame}\n"));
                    }
                    b.push_str(RULE);
                }
            }
            ProfileKind::Mutex | ProfileKind::Block => {
                b.push_str(&format!(
                    "{title} Profile Analysis (Top {} Functions by {vt})\n",
                    self.top_n
                ));
                b.push_str(&format!(
                    "Total {vt} ({unit}): {}\n",
                    format_sample_value(total, unit)
                ));
                self.function_section(&mut b, vt, None);
            }
        }
        b
    }

    fn function_section(&self, b: &mut String, value_header: &str, heading: Option<&str>) {
        if let Some(heading) = heading {
            b.push_str(&format!("\n{heading}\n"));
        }
        b.push_str(RULE);
        b.push_str(&format!(
            "{:<15} {:<15} {}\n",
            value_header, "%", "Function Name"
        ));
        b.push_str(RULE);
        for stat in self.top(Granularity::Function) {
            b.push_str(&format!(
                "{:<15} {:<15.2} {}{}\n",
                self.fmt_value(stat.value),
                self.pct(stat.value),
                stat.key,
                objects_suffix(self.objects(&stat))
            ));
        }
    }

    fn group_section(
        &self,
        b: &mut String,
        value_header: &str,
        name_header: &str,
        rows: &[AggregateStat],
    ) {
        b.push_str(RULE);
        b.push_str(&format!(
            "{:<15} {:<15} {}\n",
            value_header, "%", name_header
        ));
        b.push_str(RULE);
        for stat in rows {
            b.push_str(&format!(
                "{:<15} {:<15.2} {}{}\n",
                self.fmt_value(stat.value),
                self.pct(stat.value),
                stat.key,
                objects_suffix(self.objects(stat))
            ));
        }
    }

    fn group_stats(&self, stat: &AggregateStat) -> GroupStats {
        let object_count = self.objects(stat);
        let avg_size = object_count.map(|n| stat.value / n);
        GroupStats {
            value: stat.value,
            value_formatted: self.fmt_value(stat.value),
            percentage: self.pct(stat.value),
            object_count,
            avg_size,
            avg_size_formatted: avg_size.map(format_bytes),
        }
    }

    fn structured(&self) -> StructuredReport {
        let functions: Vec<FunctionRow> = self
            .top(Granularity::Function)
            .into_iter()
            .map(|stat| FunctionRow {
                value_formatted: self.fmt_value(stat.value),
                percentage: self.pct(stat.value),
                object_count: self.objects(&stat),
                function_name: stat.key,
                value: stat.value,
            })
            .collect();

        let allocation_sites = (self.kind == ProfileKind::Allocs).then(|| {
            self.top(Granularity::AllocationSite)
                .into_iter()
                .map(|stat| SiteRow {
                    stats: self.group_stats(&stat),
                    site: stat.key,
                })
                .collect()
        });
        let types = (self.kind == ProfileKind::Heap)
            .then(|| self.labeled_types())
            .flatten()
            .map(|table| {
                table
                    .top(self.top_n)
                    .into_iter()
                    .map(|stat| TypeRow {
                        stats: self.group_stats(&stat),
                        type_name: stat.key,
                    })
                    .collect()
            });
        let stacks = (self.kind == ProfileKind::Goroutine).then(|| {
            self.top(Granularity::Stack)
                .into_iter()
                .map(|stat| StackRow {
                    count: stat.value,
                    percentage: self.pct(stat.value),
                    stack_trace: stat.frames,
                })
                .collect()
        });

        StructuredReport {
            profile_type: self.kind.as_str().to_string(),
            value_type: self.metric.name.clone(),
            value_unit: self.metric.unit.clone(),
            total_value: self.agg.total_value,
            total_value_formatted: self.fmt_value(self.agg.total_value),
            total_duration_nanos: self.duration_nanos(),
            total_objects: (self.agg.total_objects > 0).then_some(self.agg.total_objects),
            top_n: functions.len(),
            functions,
            allocation_sites,
            types,
            stacks,
        }
    }
}

fn objects_suffix(count: Option<i64>) -> String {
    count
        .map(|n| format!(" ({n} objects)"))
        .unwrap_or_default()
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::fixtures::*;

    fn two_function_allocs() -> Profile {
        profile(
            &[("alloc_objects", "count"), ("alloc_space", "bytes")],
            vec![
                sample(&[10, 1024], vec![frame(1, "A", "a.go", 3)]),
                sample(&[20, 2048], vec![frame(2, "B", "b.go", 7)]),
            ],
        )
    }

    #[test]
    fn ranked_rows_carry_share_of_total() {
        let out = analyze_profile(
            &two_function_allocs(),
            ProfileKind::Allocs,
            2,
            OutputFormat::Text,
        )
        .expect("analyze");
        assert!(out.starts_with("Allocation Profile Analysis (Top 2 Functions by alloc_space)\n"));
        assert!(out.contains("Total alloc_space (bytes): 3.00 KB\n"));
        assert!(out.contains("Total Objects: 30\n"));
        let b_row = format!("{:<15} {:<15.2} {}", "2.00 KB", 66.666_666, "B (20 objects)");
        let a_row = format!("{:<15} {:<15.2} {}", "1.00 KB", 33.333_333, "A (10 objects)");
        let b_at = out.find(&b_row).expect("B row");
        let a_at = out.find(&a_row).expect("A row");
        assert!(b_at < a_at);
        assert!(out.contains("B at b.go:7 (20 objects)"));
    }

    #[test]
    fn json_report_matches_fresh_aggregation() {
        let p = two_function_allocs();
        let out = analyze_profile(&p, ProfileKind::Allocs, 5, OutputFormat::Json).expect("analyze");
        let report: StructuredReport = serde_json::from_str(&out).expect("parse report");

        let metric = resolve_metric(&p.sample_types, MetricFamily::AllocBytes).expect("resolve");
        let agg = aggregate(&p, &metric, &[Granularity::Function]);
        assert_eq!(report.total_value, agg.total_value);
        assert_eq!(report.profile_type, "allocs");
        assert_eq!(report.top_n, 2);
        let expected = agg.table(Granularity::Function).expect("table").top(5);
        let got: Vec<_> = report
            .functions
            .iter()
            .map(|f| (f.function_name.clone(), f.value))
            .collect();
        let want: Vec<_> = expected.into_iter().map(|s| (s.key, s.value)).collect();
        assert_eq!(got, want);

        let sites = report.allocation_sites.expect("sites");
        assert_eq!(sites[0].site, "B at b.go:7");
        assert_eq!(sites[0].stats.avg_size, Some(102));
        assert_eq!(sites[0].stats.avg_size_formatted.as_deref(), Some("102 B"));
        assert!(report.types.is_none());
        assert!(report.stacks.is_none());
    }

    #[test]
    fn markdown_wraps_text_in_fence() {
        let p = two_function_allocs();
        let text = analyze_profile(&p, ProfileKind::Allocs, 2, OutputFormat::Text).expect("text");
        let md =
            analyze_profile(&p, ProfileKind::Allocs, 2, OutputFormat::Markdown).expect("markdown");
        assert_eq!(md, format!("```text\n{text}```\n"));
    }

    #[test]
    fn cpu_report_includes_duration() {
        let mut p = profile(
            &[("samples", "count"), ("cpu", "nanoseconds")],
            vec![
                sample(&[1, 30_000_000], vec![named("spin")]),
                sample(&[1, 10_000_000], vec![named("idle")]),
            ],
        );
        let out = analyze_profile(&p, ProfileKind::Cpu, 5, OutputFormat::Text).expect("analyze");
        assert!(out.contains("Total Samples/Time (nanoseconds): 40.00ms\n"));
        assert!(out.contains("Total Duration: 40.00ms\n"));
        assert!(out.contains(&format!("{:<15} {:<15} {}", "Flat Time", "%", "Function Name")));
        assert!(out.contains(&format!("{:<15} {:<15.2} spin\n", "30.00ms", 75.0)));

        p.duration_nanos = Some(2_000_000_000);
        let json = analyze_profile(&p, ProfileKind::Cpu, 1, OutputFormat::Json).expect("json");
        let report: StructuredReport = serde_json::from_str(&json).expect("parse");
        assert_eq!(report.total_duration_nanos, Some(2_000_000_000));
        assert_eq!(report.functions.len(), 1);
        assert_eq!(report.functions[0].value_formatted, "30.00ms");
        assert_eq!(report.functions[0].object_count, None);
    }

    #[test]
    fn heap_by_type_section_only_with_labels() {
        let labeled = heap(vec![
            typed(&[0, 0, 4, 4096], vec![named("newBuf")], "Buffer"),
            sample(&[0, 0, 1, 1024], vec![named("misc")]),
        ]);
        let out = analyze_profile(&labeled, ProfileKind::Heap, 5, OutputFormat::Text).expect("heap");
        assert!(out.contains("=== By Type ==="));
        assert!(out.contains("Buffer (4 objects)"));

        let json = analyze_profile(&labeled, ProfileKind::Heap, 5, OutputFormat::Json).expect("json");
        let report: StructuredReport = serde_json::from_str(&json).expect("parse");
        let types = report.types.expect("types");
        assert_eq!(types[0].type_name, "Buffer");
        assert_eq!(types[0].stats.avg_size, Some(1024));

        let unlabeled = heap(vec![sample(&[0, 0, 1, 1024], vec![named("misc")])]);
        let out =
            analyze_profile(&unlabeled, ProfileKind::Heap, 5, OutputFormat::Text).expect("heap");
        assert!(!out.contains("=== By Type ==="));
    }

    #[test]
    fn goroutine_groups_identical_stacks() {
        let p = profile(
            &[("goroutines", "count")],
            vec![
                sample(&[2], vec![frame(1, "gopark", "proc.go", 10), frame(2, "main", "m.go", 3)]),
                sample(&[3], vec![frame(1, "gopark", "proc.go", 10), frame(2, "main", "m.go", 3)]),
                sample(&[1], vec![frame(3, "read", "io.go", 9)]),
            ],
        );
        let out = analyze_profile(&p, ProfileKind::Goroutine, 5, OutputFormat::Text).expect("text");
        assert!(out.contains("Total Goroutines (goroutines/count): 6\n"));
        assert!(out.contains("\n5 goroutines with stack:\n  gopark\n\tproc.go:10\n  main\n\tm.go:3\n"));

        let json = analyze_profile(&p, ProfileKind::Goroutine, 1, OutputFormat::Json).expect("json");
        let report: StructuredReport = serde_json::from_str(&json).expect("parse");
        let stacks = report.stacks.expect("stacks");
        assert_eq!(stacks.len(), 1);
        assert_eq!(stacks[0].count, 5);
        assert_eq!(stacks[0].stack_trace, vec!["gopark\n\tproc.go:10", "main\n\tm.go:3"]);
    }

    #[test]
    fn goroutine_stack_trace_keeps_multiline_names_whole() {
        let p = profile(
            &[("goroutines", "count")],
            vec![sample(
                &[1],
                vec![frame(1, "a\nb", "x.go", 1), frame(2, "main", "m.go", 3)],
            )],
        );
        let json = analyze_profile(&p, ProfileKind::Goroutine, 5, OutputFormat::Json).expect("json");
        let report: StructuredReport = serde_json::from_str(&json).expect("parse");
        let stacks = report.stacks.expect("stacks");
        assert_eq!(stacks[0].stack_trace, vec!["a\nb\n\tx.go:1", "main\n\tm.go:3"]);
    }

    #[test]
    fn contention_kinds_rank_by_delay() {
        let p = profile(
            &[("contentions", "count"), ("delay", "nanoseconds")],
            vec![
                sample(&[4, 3_000], vec![named("lockA")]),
                sample(&[1, 9_000], vec![named("lockB")]),
            ],
        );
        for kind in [ProfileKind::Mutex, ProfileKind::Block] {
            let out = analyze_profile(&p, kind, 5, OutputFormat::Text).expect("text");
            assert!(out.contains("Functions by delay"), "{out}");
            assert!(out.contains("Total delay (nanoseconds): 12.00us\n"));
            assert!(out.find("lockB").expect("B") < out.find("lockA").expect("A"));
        }
    }

    #[test]
    fn flamegraph_json_is_compact_tree() {
        let p = profile(
            &[("cpu", "nanoseconds")],
            vec![sample(&[1000], vec![named("bar"), named("main")])],
        );
        let out =
            analyze_profile(&p, ProfileKind::Cpu, 5, OutputFormat::FlamegraphJson).expect("flame");
        assert!(!out.contains('\n'));
        let tree: serde_json::Value = serde_json::from_str(&out).expect("parse");
        assert_eq!(tree["name"], "root");
        assert_eq!(tree["value"], 1000);
        assert_eq!(tree["children"][0]["name"], "main");
    }

    #[test]
    fn empty_profile_yields_zeroed_report() {
        let p = profile(&[("cpu", "nanoseconds")], Vec::new());
        let json = analyze_profile(&p, ProfileKind::Cpu, 5, OutputFormat::Json).expect("json");
        let report: StructuredReport = serde_json::from_str(&json).expect("parse");
        assert_eq!(report.total_value, 0);
        assert_eq!(report.top_n, 0);
        assert!(report.functions.is_empty());
        assert_eq!(report.total_duration_nanos, None);
    }

    #[test]
    fn no_sample_types_is_an_error() {
        let p = profile(&[], Vec::new());
        let err = analyze_profile(&p, ProfileKind::Heap, 5, OutputFormat::Text).expect_err("fail");
        assert!(matches!(err, ProflensError::UnresolvableMetric(_)));
    }

    #[test]
    fn names_parse_and_reject_unknowns() {
        assert_eq!("flamegraph-json".parse::<OutputFormat>().expect("fmt"), OutputFormat::FlamegraphJson);
        assert_eq!("block".parse::<ProfileKind>().expect("kind"), ProfileKind::Block);
        assert_eq!(ProfileKind::Block.family(), MetricFamily::Contention);
        assert!(matches!(
            "yaml".parse::<OutputFormat>(),
            Err(ProflensError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            "threadcreate".parse::<ProfileKind>(),
            Err(ProflensError::UnsupportedProfileType(_))
        ));
    }

    #[test]
    fn error_payload_shape() {
        assert_eq!(error_payload("boom", None), r#"{"error":"boom"}"#);
        assert_eq!(error_payload("boom", Some(3)), r#"{"error":"boom","topN":3}"#);
    }
}
