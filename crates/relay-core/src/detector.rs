//! Locates a trailing action block in streamed assistant text.
//!
//! Blocks look like `ACTION: {"type": "...", "params": {...}}` and are always
//! the last thing in a response. While a response streams, the block can be
//! partially delivered, so detection distinguishes a complete, balanced block
//! from one whose JSON has not closed yet.

use crate::config::DEFAULT_ACTION_MARKER;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionShape {
    Object,
    Array,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    None,
    /// Marker present but its JSON has not closed (or not started) yet.
    Partial { marker_start: usize },
    /// Marker followed by a balanced JSON value and only trailing whitespace.
    /// `json_start..json_end` is the byte span of the value.
    Complete {
        marker_start: usize,
        json_start: usize,
        json_end: usize,
        shape: ActionShape,
    },
}

impl Detection {
    pub fn marker_start(&self) -> Option<usize> {
        match self {
            Self::None => None,
            Self::Partial { marker_start } | Self::Complete { marker_start, .. } => {
                Some(*marker_start)
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete { .. })
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, Self::Partial { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorOptions<'a> {
    pub marker: &'a str,
    pub allow_arrays: bool,
}

impl Default for DetectorOptions<'_> {
    fn default() -> Self {
        Self {
            marker: DEFAULT_ACTION_MARKER,
            allow_arrays: true,
        }
    }
}

pub fn is_action_complete(buffer: &str) -> bool {
    detect(buffer).is_complete()
}

pub fn is_action_partial(buffer: &str) -> bool {
    detect(buffer).is_partial()
}

pub fn detect(buffer: &str) -> Detection {
    detect_with(buffer, DetectorOptions::default())
}

/// Candidates are tried from the first marker occurrence forward so that a
/// marker quoted inside the block's own parameters never shadows the real one.
/// A complete block beats an earlier unterminated one unless its marker sits
/// inside a string of that earlier block.
pub fn detect_with(buffer: &str, options: DetectorOptions<'_>) -> Detection {
    if options.marker.is_empty() {
        return Detection::None;
    }
    let mut open_block: Option<usize> = None;
    for (marker_start, _) in buffer.match_indices(options.marker) {
        match classify_candidate(buffer, marker_start, options) {
            Detection::None => {}
            Detection::Partial { .. } => {
                open_block.get_or_insert(marker_start);
            }
            complete @ Detection::Complete { .. } => match open_block {
                Some(open)
                    if ends_inside_string(&buffer[open + options.marker.len()..marker_start]) => {}
                _ => return complete,
            },
        }
    }
    open_block.map_or(Detection::None, |marker_start| Detection::Partial { marker_start })
}

fn ends_inside_string(text: &str) -> bool {
    let mut in_string = false;
    let mut escaped = false;
    for byte in text.bytes() {
        if escaped {
            escaped = false;
        } else if in_string && byte == b'\\' {
            escaped = true;
        } else if byte == b'"' {
            in_string = !in_string;
        }
    }
    in_string
}

fn classify_candidate(buffer: &str, marker_start: usize, options: DetectorOptions<'_>) -> Detection {
    let after_marker = marker_start + options.marker.len();
    let rest = &buffer[after_marker..];
    let body = rest.trim_start();
    if body.is_empty() {
        return Detection::Partial { marker_start };
    }

    let shape = match body.as_bytes()[0] {
        b'{' => ActionShape::Object,
        b'[' if options.allow_arrays => ActionShape::Array,
        _ => return Detection::None,
    };
    let json_start = after_marker + (rest.len() - body.len());

    match scan_balanced(body) {
        Scan::Balanced(len) => {
            if body[len..].trim().is_empty() {
                Detection::Complete {
                    marker_start,
                    json_start,
                    json_end: json_start + len,
                    shape,
                }
            } else {
                Detection::None
            }
        }
        Scan::Unterminated => Detection::Partial { marker_start },
        Scan::Mismatched => Detection::None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    /// Byte length of the balanced value, including its closer.
    Balanced(usize),
    Unterminated,
    Mismatched,
}

/// `text` must start with `{` or `[`. Delimiters inside string literals are
/// skipped; all delimiters are ASCII so byte iteration is UTF-8 safe.
fn scan_balanced(text: &str) -> Scan {
    let mut closers: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (idx, byte) in text.bytes().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => closers.push(b'}'),
            b'[' => closers.push(b']'),
            b'}' | b']' => {
                if closers.pop() != Some(byte) {
                    return Scan::Mismatched;
                }
                if closers.is_empty() {
                    return Scan::Balanced(idx + 1);
                }
            }
            _ => {}
        }
    }

    Scan::Unterminated
}
