//! Profile analysis commands (`proflens analyze|flame|leaks`).

use clap::Subcommand;
use serde::{Deserialize, Serialize};

use std::path::{Path, PathBuf};

use crate::{
    Config, OutputFormat, Profile, ProfileKind, ProflensError, ProflensResult, analyze_profile,
    build_flame_tree, detect_leaks, resolve_metric,
};

const PROFILE_HELP: &str = "Decoded profile as JSON (sampleTypes, samples, durationNanos).";

#[derive(Debug, Subcommand)]
pub enum ProfileCommand {
    /// Rank functions, allocation sites, types or stacks by cost.
    Analyze {
        #[arg(value_name = "PROFILE", help = PROFILE_HELP)]
        profile: PathBuf,
        #[arg(long = "type", value_name = "KIND")]
        kind: ProfileKind,
        #[arg(long)]
        top_n: Option<usize>,
        #[arg(long)]
        format: Option<OutputFormat>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Build a call-tree flame graph.
    Flame {
        #[arg(value_name = "PROFILE", help = PROFILE_HELP)]
        profile: PathBuf,
        #[arg(long = "type", value_name = "KIND")]
        kind: ProfileKind,
        #[arg(long, default_value = "json")]
        format: FlameFormat,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Compare two heap snapshots for per-type growth.
    Leaks {
        #[arg(value_name = "OLD", help = PROFILE_HELP)]
        old: PathBuf,
        #[arg(value_name = "NEW", help = PROFILE_HELP)]
        new: PathBuf,
        #[arg(long)]
        threshold: Option<f64>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value = "text")]
        format: LeakFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlameFormat {
    Json,
    Folded,
}

impl clap::ValueEnum for FlameFormat {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Json, Self::Folded]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            Self::Json => clap::builder::PossibleValue::new("json"),
            Self::Folded => clap::builder::PossibleValue::new("folded"),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeakFormat {
    Text,
    Json,
}

impl clap::ValueEnum for LeakFormat {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Text, Self::Json]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            Self::Text => clap::builder::PossibleValue::new("text"),
            Self::Json => clap::builder::PossibleValue::new("json"),
        })
    }
}

pub fn profile_command(
    config: &Config,
    command: &ProfileCommand,
) -> ProflensResult<serde_json::Value> {
    match command {
        ProfileCommand::Analyze {
            profile,
            kind,
            top_n,
            format,
            out,
        } => {
            let top_n = top_n.unwrap_or(config.top_n);
            let format = format.unwrap_or(config.format);
            let parsed = Profile::read_json(profile)?;
            let content = analyze_profile(&parsed, *kind, top_n, format)?;
            if let Some(path) = out {
                write_text(path, &content)?;
            }
            Ok(serde_json::json!({
                "schemaVersion": "proflens.analyze.v1",
                "profile": profile.display().to_string(),
                "profileType": kind,
                "format": format,
                "topN": top_n,
                "samples": parsed.samples.len(),
                "content": content
            }))
        }
        ProfileCommand::Flame {
            profile,
            kind,
            format,
            out,
        } => {
            let parsed = Profile::read_json(profile)?;
            let metric = resolve_metric(&parsed.sample_types, kind.family())?;
            let tree = build_flame_tree(&parsed, metric.index)?;
            let content = match format {
                FlameFormat::Json => serde_json::to_string(&tree)?,
                FlameFormat::Folded => tree.to_folded(),
            };
            if let Some(path) = out {
                write_text(path, &content)?;
            }
            Ok(serde_json::json!({
                "schemaVersion": "proflens.flame.v1",
                "profile": profile.display().to_string(),
                "profileType": kind,
                "valueType": metric.name,
                "valueUnit": metric.unit,
                "totalValue": tree.value,
                "nodes": tree.node_count(),
                "empty": tree.children.is_empty(),
                "format": format,
                "content": content
            }))
        }
        ProfileCommand::Leaks {
            old,
            new,
            threshold,
            limit,
            format,
        } => {
            let options = config.leak_options(*threshold, *limit);
            if !options.threshold.is_finite() {
                return Err(ProflensError::InvalidArgument(format!(
                    "threshold must be a finite fraction, got {}",
                    options.threshold
                )));
            }
            let old_profile = Profile::read_json(old)?;
            let new_profile = Profile::read_json(new)?;
            let report = detect_leaks(&old_profile, &new_profile, &options)?;
            let content = match format {
                LeakFormat::Text => report.render_text(),
                LeakFormat::Json => serde_json::to_string_pretty(&report)?,
            };
            Ok(serde_json::json!({
                "schemaVersion": "proflens.leaks.v1",
                "old": old.display().to_string(),
                "new": new.display().to_string(),
                "threshold": options.threshold,
                "limit": options.limit,
                "totalMatches": report.total_matches,
                "format": format,
                "content": content
            }))
        }
    }
}

fn write_text(path: &Path, value: &str) -> ProflensResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, value)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::fixtures::*;

    fn temp_workspace(name: &str) -> PathBuf {
        let dir =
            std::env::temp_dir().join(format!("proflens-cmd-{name}-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("workspace");
        dir
    }

    fn write_profile(dir: &Path, name: &str, profile: &Profile) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, serde_json::to_vec(profile).expect("encode")).expect("write");
        path
    }

    fn cpu_profile() -> Profile {
        profile(
            &[("samples", "count"), ("cpu", "nanoseconds")],
            vec![
                sample(&[1, 3_000], vec![frame(2, "work", "w.go", 9), frame(1, "main", "m.go", 4)]),
                sample(&[1, 1_000], vec![frame(1, "main", "m.go", 4)]),
            ],
        )
    }

    #[test]
    fn analyze_uses_config_defaults_and_writes_out() {
        let dir = temp_workspace("analyze");
        let input = write_profile(&dir, "cpu.json", &cpu_profile());
        let out_file = dir.join("nested").join("report.txt");
        let cfg = Config {
            top_n: 1,
            ..Config::default()
        };
        let cmd = ProfileCommand::Analyze {
            profile: input,
            kind: ProfileKind::Cpu,
            top_n: None,
            format: None,
            out: Some(out_file.clone()),
        };
        let out = profile_command(&cfg, &cmd).expect("analyze");
        assert_eq!(
            out.get("schemaVersion").and_then(|v| v.as_str()),
            Some("proflens.analyze.v1")
        );
        assert_eq!(out.get("topN").and_then(|v| v.as_u64()), Some(1));
        assert_eq!(out.get("format").and_then(|v| v.as_str()), Some("text"));
        let content = out
            .get("content")
            .and_then(|v| v.as_str())
            .expect("content");
        assert!(content.contains("work"));
        assert!(!content.contains(" main\n"));
        let written = std::fs::read_to_string(out_file).expect("read output");
        assert_eq!(written, content);
    }

    #[test]
    fn flame_exports_folded_stacks() {
        let dir = temp_workspace("flame");
        let input = write_profile(&dir, "cpu.json", &cpu_profile());
        let cmd = ProfileCommand::Flame {
            profile: input,
            kind: ProfileKind::Cpu,
            format: FlameFormat::Folded,
            out: None,
        };
        let out = profile_command(&Config::default(), &cmd).expect("flame");
        assert_eq!(out.get("totalValue").and_then(|v| v.as_i64()), Some(4_000));
        assert_eq!(out.get("nodes").and_then(|v| v.as_u64()), Some(3));
        assert_eq!(out.get("empty").and_then(|v| v.as_bool()), Some(false));
        assert_eq!(
            out.get("content").and_then(|v| v.as_str()),
            Some("main 1000\nmain;work 3000")
        );
    }

    #[test]
    fn leaks_reports_growth_as_json() {
        let dir = temp_workspace("leaks");
        let old = write_profile(
            &dir,
            "old.json",
            &heap(vec![typed(&[0, 0, 10, 1000], vec![named("mk")], "T")]),
        );
        let new = write_profile(
            &dir,
            "new.json",
            &heap(vec![typed(&[0, 0, 20, 2000], vec![named("mk")], "T")]),
        );
        let cmd = ProfileCommand::Leaks {
            old,
            new,
            threshold: None,
            limit: Some(5),
            format: LeakFormat::Json,
        };
        let out = profile_command(&Config::default(), &cmd).expect("leaks");
        assert_eq!(out.get("totalMatches").and_then(|v| v.as_u64()), Some(1));
        assert_eq!(out.get("limit").and_then(|v| v.as_u64()), Some(5));
        let content = out
            .get("content")
            .and_then(|v| v.as_str())
            .expect("content");
        let report: crate::LeakReport = serde_json::from_str(content).expect("parse report");
        assert_eq!(report.candidates[0].growth, 1000);
    }

    #[test]
    fn leaks_rejects_non_finite_threshold() {
        let dir = temp_workspace("leaks-nan");
        let p = write_profile(&dir, "p.json", &heap(Vec::new()));
        let cmd = ProfileCommand::Leaks {
            old: p.clone(),
            new: p,
            threshold: Some(f64::NAN),
            limit: None,
            format: LeakFormat::Text,
        };
        let err = profile_command(&Config::default(), &cmd).expect_err("must fail");
        assert!(matches!(err, ProflensError::InvalidArgument(_)));
    }

    #[test]
    fn missing_profile_is_io_error() {
        let dir = temp_workspace("missing");
        let cmd = ProfileCommand::Analyze {
            profile: dir.join("absent.json"),
            kind: ProfileKind::Heap,
            top_n: None,
            format: Some(OutputFormat::Json),
            out: None,
        };
        let err = profile_command(&Config::default(), &cmd).expect_err("must fail");
        assert!(matches!(err, ProflensError::Io(_)));
    }
}
