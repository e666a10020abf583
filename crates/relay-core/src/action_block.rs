use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::cleaner::strip_action_with;
use crate::config::StreamConfig;
use crate::detector::{detect_with, ActionShape, Detection, DetectorOptions};

pub const FALLBACK_REASON: &str = "AI suggested action";

/// A UI-side instruction emitted by the assistant after its prose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    /// Repeat count, e.g. for stepping through calendar pages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub times: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remember: Option<bool>,
}

impl ActionBlock {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: Map::new(),
            times: None,
            remember: None,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("action json is not valid: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("action block has no string `type`")]
    MissingType,
    #[error("action block must be a json object or array")]
    UnexpectedShape,
}

/// Final text plus any actions recovered from a finished response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExtractedActions {
    pub final_text: String,
    pub actions: Vec<ActionBlock>,
}

pub fn extract_actions(buffer: &str, config: &StreamConfig) -> ExtractedActions {
    let options = DetectorOptions {
        marker: config.marker.as_str(),
        allow_arrays: config.allow_array_actions,
    };
    let final_text = strip_action_with(buffer, options);

    let actions = match detect_with(buffer, options) {
        Detection::Complete {
            json_start,
            json_end,
            shape,
            ..
        } => match parse_action_blocks(&buffer[json_start..json_end], shape, config.lenient_fallback)
        {
            Ok(actions) => actions,
            Err(err) => {
                warn!(error = %err, "discarding malformed action block");
                Vec::new()
            }
        },
        Detection::Partial { marker_start } => {
            warn!(marker_start, "stream ended inside an unterminated action block");
            Vec::new()
        }
        Detection::None => Vec::new(),
    };

    ExtractedActions {
        final_text,
        actions,
    }
}

pub fn parse_action_blocks(
    json: &str,
    shape: ActionShape,
    lenient: bool,
) -> Result<Vec<ActionBlock>, ActionError> {
    let value = match serde_json::from_str::<Value>(json) {
        Ok(value) => value,
        Err(err) => {
            if lenient {
                if let Some(block) = fallback_action(json) {
                    debug!(kind = %block.kind, "recovered action via lenient fallback");
                    return Ok(vec![block]);
                }
            }
            return Err(ActionError::Decode(err));
        }
    };

    match (shape, value) {
        (ActionShape::Object, value @ Value::Object(_)) => Ok(vec![block_from_value(value)?]),
        (ActionShape::Array, Value::Array(items)) => Ok(items
            .into_iter()
            .filter_map(|item| match block_from_value(item) {
                Ok(block) => Some(block),
                Err(err) => {
                    debug!(error = %err, "skipping action array item");
                    None
                }
            })
            .collect()),
        _ => Err(ActionError::UnexpectedShape),
    }
}

fn block_from_value(value: Value) -> Result<ActionBlock, ActionError> {
    let has_type = value
        .get("type")
        .is_some_and(|kind| kind.as_str().is_some_and(|kind| !kind.is_empty()));
    if !has_type {
        return Err(ActionError::MissingType);
    }
    Ok(serde_json::from_value(value)?)
}

fn quoted_field(name: &str) -> Regex {
    let pattern = format!(r#"["']?{name}["']?\s*:\s*["']([^"']+)["']"#);
    Regex::new(&pattern).expect("static field pattern")
}

fn type_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| quoted_field("type"))
}

fn reason_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| quoted_field("reason"))
}

fn semantic_target_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| quoted_field("semanticTarget"))
}

fn target_keywords_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"["']?targetKeywords["']?\s*:\s*\[([^\]]+)\]"#)
            .expect("static keywords pattern")
    })
}

/// Best-effort recovery for blocks that balance but are not strict JSON
/// (single quotes, trailing commas). Requires at least a `type`.
fn fallback_action(json: &str) -> Option<ActionBlock> {
    let kind = type_pattern().captures(json)?.get(1)?.as_str().to_string();

    let reason = reason_pattern()
        .captures(json)
        .and_then(|caps| caps.get(1))
        .map_or(FALLBACK_REASON, |m| m.as_str());
    let mut block = ActionBlock::new(kind).with_param("reason", Value::from(reason));

    if let Some(target) = semantic_target_pattern()
        .captures(json)
        .and_then(|caps| caps.get(1))
    {
        block = block.with_param("semanticTarget", Value::from(target.as_str()));
    }

    if let Some(list) = target_keywords_pattern()
        .captures(json)
        .and_then(|caps| caps.get(1))
    {
        let keywords: Vec<Value> = list
            .as_str()
            .split(',')
            .map(|keyword| keyword.trim().trim_matches(|c| c == '"' || c == '\''))
            .filter(|keyword| !keyword.is_empty())
            .map(Value::from)
            .collect();
        block = block.with_param("targetKeywords", Value::Array(keywords));
    }

    Some(block)
}
