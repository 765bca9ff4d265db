//! Call-tree ("flame graph") construction from stack samples.
//!
//! Nodes are keyed by function identity, so two call sites of the same
//! function under the same parent collapse into one node.

use serde::{Deserialize, Serialize};

use std::collections::HashMap;

use crate::{
    Location, Profile, ProflensError, ProflensResult, companion_object_index, format_bytes,
    format_sample_value, is_memory_metric,
};

pub const ROOT_NAME: &str = "root";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlameNode {
    pub name: String,
    /// Self value plus every descendant's value.
    pub value: i64,
    #[serde(rename = "selfValue")]
    pub self_value: i64,
    #[serde(rename = "valueFormatted", skip_serializing_if = "Option::is_none")]
    pub value_formatted: Option<String>,
    #[serde(rename = "objectCount", skip_serializing_if = "Option::is_none")]
    pub object_count: Option<i64>,
    #[serde(rename = "avgSize", skip_serializing_if = "Option::is_none")]
    pub avg_size: Option<i64>,
    #[serde(rename = "avgSizeFormatted", skip_serializing_if = "Option::is_none")]
    pub avg_size_formatted: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(rename = "filePath", skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(rename = "lineNumber", skip_serializing_if = "Option::is_none")]
    pub line_number: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FlameNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum FrameKey {
    Id(u64),
    Name(String),
}

struct Frame {
    key: FrameKey,
    name: String,
    file_path: String,
    line_number: i64,
}

fn frame_of(loc: &Location) -> Option<Frame> {
    let line = loc.lines.first()?;
    Some(match &line.function {
        Some(f) => Frame {
            key: if f.id != 0 {
                FrameKey::Id(f.id)
            } else {
                FrameKey::Name(f.name.clone())
            },
            name: f.name.clone(),
            file_path: f.filename.clone(),
            line_number: line.line,
        },
        None => {
            let name = format!("unknown @ 0x{:x}", loc.address);
            Frame {
                key: FrameKey::Name(name.clone()),
                name,
                file_path: String::new(),
                line_number: line.line,
            }
        }
    })
}

#[derive(Default)]
struct BuildNode {
    name: String,
    file_path: String,
    line_number: i64,
    self_value: i64,
    self_objects: i64,
    type_name: Option<String>,
    children: Vec<usize>,
    child_index: HashMap<FrameKey, usize>,
}

struct TreeBuilder {
    nodes: Vec<BuildNode>,
}

impl TreeBuilder {
    fn new() -> Self {
        Self {
            nodes: vec![BuildNode {
                name: ROOT_NAME.to_string(),
                ..BuildNode::default()
            }],
        }
    }

    fn child(&mut self, parent: usize, frame: Frame) -> usize {
        if let Some(idx) = self.nodes[parent].child_index.get(&frame.key) {
            return *idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(BuildNode {
            name: frame.name,
            file_path: frame.file_path,
            line_number: frame.line_number,
            ..BuildNode::default()
        });
        let p = &mut self.nodes[parent];
        p.children.push(idx);
        p.child_index.insert(frame.key, idx);
        idx
    }
}

struct Finish {
    memory: bool,
    unit: String,
}

impl Finish {
    fn node(&self, nodes: &[BuildNode], idx: usize, is_root: bool) -> Option<FlameNode> {
        let b = &nodes[idx];
        let mut children: Vec<FlameNode> = b
            .children
            .iter()
            .filter_map(|c| self.node(nodes, *c, false))
            .collect();
        let value = children
            .iter()
            .fold(b.self_value, |acc, c| acc.saturating_add(c.value));
        if value == 0 && !is_root {
            return None;
        }
        children.sort_by(|x, y| y.value.cmp(&x.value));

        let objects = children
            .iter()
            .fold(b.self_objects, |acc, c| acc.saturating_add(c.object_count.unwrap_or(0)));
        let mut node = FlameNode {
            name: b.name.clone(),
            value,
            self_value: b.self_value,
            value_formatted: self.format(value),
            object_count: None,
            avg_size: None,
            avg_size_formatted: None,
            type_name: b.type_name.clone(),
            file_path: (!b.file_path.is_empty()).then(|| b.file_path.clone()),
            line_number: (b.line_number > 0).then_some(b.line_number),
            children,
        };
        if self.memory && objects > 0 {
            let avg = value / objects;
            node.object_count = Some(objects);
            node.avg_size = Some(avg);
            node.avg_size_formatted = Some(format_bytes(avg));
        }
        Some(node)
    }

    fn format(&self, value: i64) -> Option<String> {
        if self.memory {
            Some(format_bytes(value))
        } else if self.unit == "nanoseconds" {
            Some(format_sample_value(value, &self.unit))
        } else {
            None
        }
    }
}

/// Folds every sample with a non-zero value at `value_index` into one rooted
/// tree. Children are sorted by value, descending, at every level.
pub fn build_flame_tree(profile: &Profile, value_index: usize) -> ProflensResult<FlameNode> {
    let Some(metric) = profile.sample_type(value_index) else {
        return Err(ProflensError::InvalidIndex {
            index: value_index,
            len: profile.sample_types.len(),
        });
    };
    let memory = is_memory_metric(metric);
    let objects_index = if memory {
        companion_object_index(&profile.sample_types, metric)
    } else {
        None
    };

    let mut builder = TreeBuilder::new();
    let mut folded = 0usize;
    for sample in &profile.samples {
        let value = sample.value_at(value_index).unwrap_or(0);
        if value == 0 {
            continue;
        }
        folded += 1;
        let objects = objects_index
            .and_then(|i| sample.value_at(i))
            .unwrap_or(0);
        let type_name = if memory { sample.type_label() } else { None };

        // Outermost frame first; the last node reached is the innermost.
        let mut current = 0usize;
        for loc in sample.stack.iter().rev() {
            if let Some(frame) = frame_of(loc) {
                current = builder.child(current, frame);
            }
        }

        let leaf = &mut builder.nodes[current];
        leaf.self_value = leaf.self_value.saturating_add(value);
        if memory && objects > 0 {
            leaf.self_objects = leaf.self_objects.saturating_add(objects);
        }
        if current != 0
            && leaf.type_name.is_none()
            && let Some(t) = type_name.filter(|t| !t.is_empty())
        {
            leaf.type_name = Some(t.to_string());
        }
    }

    let finish = Finish {
        memory,
        unit: metric.unit.clone(),
    };
    let root = finish.node(&builder.nodes, 0, true).ok_or_else(|| {
        ProflensError::InvalidArgument("flame tree root was dropped".to_string())
    })?;
    tracing::debug!(
        "folded {folded} samples into {} nodes (root={})",
        builder.nodes.len(),
        root.value
    );
    Ok(root)
}

impl FlameNode {
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(FlameNode::node_count).sum::<usize>()
    }

    /// One `frame;frame;... self_value` line per node carrying self value,
    /// root excluded.
    pub fn to_folded(&self) -> String {
        let mut out = String::new();
        let mut path = Vec::new();
        for child in &self.children {
            child.fold_into(&mut path, &mut out);
        }
        if out.is_empty() {
            return "# empty profile: no samples".to_string();
        }
        out.trim_end().to_string()
    }

    fn fold_into<'a>(&'a self, path: &mut Vec<&'a str>, out: &mut String) {
        path.push(&self.name);
        if self.self_value != 0 {
            out.push_str(&format!("{} {}\n", path.join(";"), self.self_value));
        }
        for child in &self.children {
            child.fold_into(path, out);
        }
        path.pop();
    }
}
