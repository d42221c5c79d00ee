//! Collapsed-text wire shape
//!
//! ```text
//! # mode: cpu
//! P4242;TWorker-1 (140300);app.py:main:10;app.py:run:5 1000
//! ```
//!
//! Parsers here return a plain reason on failure; the decoder attaches the
//! line and byte offset.

use threadscope_common::{
    FRAME_FIELD_SEPARATOR, METADATA_PREFIX, METADATA_SEPARATOR, PROCESS_SEGMENT_PREFIX,
    SEGMENT_SEPARATOR, THREAD_SEGMENT_PREFIX, VALUE_SEPARATOR,
};

use super::Sample;
use crate::domain::{Frame, Metric, MetricKind};

#[must_use]
pub fn is_metadata_line(text: &str) -> bool {
    text.starts_with(METADATA_PREFIX)
}

/// Parse `# key: value`.
pub fn parse_metadata_line(text: &str) -> Result<(String, String), String> {
    let body = text
        .strip_prefix(METADATA_PREFIX)
        .unwrap_or(text)
        .trim_start();
    let (key, value) = body
        .split_once(METADATA_SEPARATOR)
        .ok_or_else(|| format!("metadata line without {METADATA_SEPARATOR:?} separator"))?;
    if key.is_empty() {
        return Err("metadata line with empty key".to_string());
    }
    Ok((key.to_string(), value.trim_end().to_string()))
}

/// Parse one sample line; `kind` is the metric announced by the header.
pub fn parse_sample_line(text: &str, kind: MetricKind) -> Result<Sample, String> {
    let (stack, value) = text
        .rsplit_once(VALUE_SEPARATOR)
        .ok_or("missing metric value")?;
    let value: i64 = value
        .parse()
        .map_err(|_| format!("invalid metric value {value:?}"))?;

    let mut segments = stack.split(SEGMENT_SEPARATOR).peekable();

    let mut process_id = None;
    if let Some(pid) = segments
        .peek()
        .and_then(|s| s.strip_prefix(PROCESS_SEGMENT_PREFIX))
    {
        if let Ok(pid) = pid.parse::<u32>() {
            process_id = Some(pid);
            segments.next();
        }
    }

    let thread_label = segments
        .next()
        .and_then(|s| s.strip_prefix(THREAD_SEGMENT_PREFIX))
        .ok_or("missing thread segment")?;
    if thread_label.is_empty() {
        return Err("empty thread label".to_string());
    }

    let frames = segments.map(parse_frame).collect::<Result<Vec<_>, _>>()?;

    Ok(Sample {
        thread_label: thread_label.to_string(),
        metric: Metric { kind, value },
        frames,
        process_id,
    })
}

/// Parse `file:function:line`, or `function:line` when the file is unknown.
///
/// Functions may themselves contain `:`; only the first and last separators
/// are significant.
fn parse_frame(segment: &str) -> Result<Frame, String> {
    let (head, line) = segment
        .rsplit_once(FRAME_FIELD_SEPARATOR)
        .ok_or_else(|| format!("frame {segment:?} has no line number"))?;
    let line: u32 = line
        .parse()
        .map_err(|_| format!("frame {segment:?} has invalid line number"))?;

    let frame = match head.split_once(FRAME_FIELD_SEPARATOR) {
        Some((file, function)) => Frame::new(function, line).with_file(file),
        None => Frame::new(head, line),
    };
    if frame.function.is_empty() {
        return Err(format!("frame {segment:?} has no function name"));
    }
    Ok(frame)
}
