//! Recursive partitioning of over-budget chunks.
//!
//! Splitting never fails and never drops content: an oversized leaf that
//! cannot be split further is emitted as-is.

use crate::content::nest_path;
use serde_json::Value;

/// Token estimate for a payload: characters / average characters per token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenBudget {
    pub max_tokens: usize,
    pub chars_per_token: f64,
}

impl TokenBudget {
    pub fn new(max_tokens: usize, chars_per_token: f64) -> Self {
        Self {
            max_tokens,
            chars_per_token: if chars_per_token > 0.0 {
                chars_per_token
            } else {
                4.0
            },
        }
    }

    pub fn estimate_tokens(&self, value: &Value) -> usize {
        let chars = value.to_string().chars().count();
        (chars as f64 / self.chars_per_token).ceil() as usize
    }

    pub fn fits(&self, value: &Value) -> bool {
        self.estimate_tokens(value) <= self.max_tokens
    }
}

/// A fragment of a chunk, translated on its own and merged back.
///
/// `content` is rooted at the chunk root: the fragment's value nested under
/// its key path, so deep-merging every sub-chunk rebuilds the chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct SubChunk {
    pub name: String,
    pub path: Vec<String>,
    pub content: Value,
}

pub fn split(content: &Value, name: &str, budget: &TokenBudget, max_depth: usize) -> Vec<SubChunk> {
    let whole = || {
        vec![SubChunk {
            name: name.to_string(),
            path: Vec::new(),
            content: content.clone(),
        }]
    };

    if budget.fits(content) {
        return whole();
    }
    match content {
        Value::Object(map) if !map.is_empty() => {
            let mut out = Vec::new();
            split_into(content, &mut Vec::new(), name, budget, 0, max_depth, &mut out);
            out
        }
        _ => whole(),
    }
}

fn split_into(
    value: &Value,
    path: &mut Vec<String>,
    name: &str,
    budget: &TokenBudget,
    depth: usize,
    max_depth: usize,
    out: &mut Vec<SubChunk>,
) {
    let Value::Object(map) = value else {
        return;
    };

    for (key, child) in map {
        path.push(key.clone());

        let splittable = matches!(child, Value::Object(m) if !m.is_empty());
        if !budget.fits(child) && splittable && depth < max_depth {
            split_into(child, path, name, budget, depth + 1, max_depth, out);
        } else {
            out.push(leaf(name, path, child));
        }

        path.pop();
    }
}

fn leaf(name: &str, path: &[String], value: &Value) -> SubChunk {
    let segments: Vec<&str> = path.iter().map(String::as_str).collect();
    SubChunk {
        name: std::iter::once(name)
            .chain(segments.iter().copied())
            .collect::<Vec<_>>()
            .join("-"),
        path: path.to_vec(),
        content: nest_path(&segments, value.clone()),
    }
}
