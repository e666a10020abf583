use crate::detector::detect_with;
use crate::detector::DetectorOptions;

/// Text safe to render while a response streams: any trailing action block,
/// complete or still arriving, is removed and the remainder trimmed.
pub fn strip_action(buffer: &str) -> String {
    strip_action_with(buffer, DetectorOptions::default())
}

pub fn strip_action_with(buffer: &str, options: DetectorOptions<'_>) -> String {
    let Some(mut end) = detect_with(buffer, options).marker_start() else {
        return buffer.to_string();
    };

    // Removing one block can expose another directly before it; keep going so
    // stripping is idempotent.
    loop {
        let head = &buffer[..end];
        let leading = head.len() - head.trim_start().len();
        let remaining = head.trim();
        match detect_with(remaining, options).marker_start() {
            Some(next) => end = leading + next,
            None => return remaining.to_string(),
        }
    }
}
