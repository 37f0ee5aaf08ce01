//! Output truncation shared by the built-in tools.
//!
//! Head truncation serves read-style tools (keep the beginning, page with
//! offsets); tail truncation serves bash (the end of a command's output is
//! usually what matters).

use serde::Serialize;

pub const DEFAULT_MAX_LINES: usize = 2000;
pub const DEFAULT_MAX_BYTES: usize = 50 * 1024;
pub const GREP_MAX_LINE_LEN: usize = 500;

/// What a truncation pass kept and why.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TruncationResult {
    pub content: String,
    pub truncated: bool,
    pub truncated_by: &'static str,
    pub total_lines: usize,
    pub total_bytes: usize,
    pub output_lines: usize,
    pub output_bytes: usize,
    pub last_line_partial: bool,
    pub first_line_exceeds_limit: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct TruncationOptions {
    pub max_lines: usize,
    pub max_bytes: usize,
}

impl Default for TruncationOptions {
    fn default() -> Self {
        Self {
            max_lines: DEFAULT_MAX_LINES,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

/// Human-readable size: `512B`, `2.5KB`, `1.2MB`.
pub fn format_size(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{bytes}B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1}KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

fn untruncated(content: &str, total_lines: usize, total_bytes: usize) -> TruncationResult {
    TruncationResult {
        content: content.to_string(),
        truncated: false,
        truncated_by: "",
        total_lines,
        total_bytes,
        output_lines: total_lines,
        output_bytes: total_bytes,
        last_line_partial: false,
        first_line_exceeds_limit: false,
    }
}

/// Keep the head of `content` within line/byte limits.
pub fn truncate_head(content: &str, options: TruncationOptions) -> TruncationResult {
    let max_lines = options.max_lines.max(1);
    let max_bytes = options.max_bytes.max(1);

    let total_bytes = content.len();
    let lines: Vec<&str> = content.split('\n').collect();
    let total_lines = lines.len();

    if total_lines <= max_lines && total_bytes <= max_bytes {
        return untruncated(content, total_lines, total_bytes);
    }

    if lines[0].len() > max_bytes {
        return TruncationResult {
            content: String::new(),
            truncated: true,
            truncated_by: "bytes",
            total_lines,
            total_bytes,
            output_lines: 0,
            output_bytes: 0,
            last_line_partial: false,
            first_line_exceeds_limit: true,
        };
    }

    let mut output_lines: Vec<&str> = Vec::new();
    let mut output_bytes = 0usize;
    let mut truncated_by = "lines";

    for (i, line) in lines.iter().enumerate() {
        if i >= max_lines {
            break;
        }
        let mut line_bytes = line.len();
        if i > 0 {
            line_bytes += 1;
        }
        if output_bytes + line_bytes > max_bytes {
            truncated_by = "bytes";
            break;
        }
        output_lines.push(line);
        output_bytes += line_bytes;
    }

    if output_lines.len() >= max_lines && output_bytes <= max_bytes {
        truncated_by = "lines";
    }

    let content_out = output_lines.join("\n");
    let final_bytes = content_out.len();
    TruncationResult {
        content: content_out,
        truncated: true,
        truncated_by,
        total_lines,
        total_bytes,
        output_lines: output_lines.len(),
        output_bytes: final_bytes,
        last_line_partial: false,
        first_line_exceeds_limit: false,
    }
}

/// Keep the tail of `content` within line/byte limits. When even the last
/// line alone exceeds the byte cap, its tail is kept and flagged partial.
pub fn truncate_tail(content: &str, options: TruncationOptions) -> TruncationResult {
    let max_lines = options.max_lines.max(1);
    let max_bytes = options.max_bytes.max(1);

    let total_bytes = content.len();
    let lines: Vec<&str> = content.split('\n').collect();
    let total_lines = lines.len();

    if total_lines <= max_lines && total_bytes <= max_bytes {
        return untruncated(content, total_lines, total_bytes);
    }

    let mut kept: Vec<&str> = Vec::new();
    let mut partial_line: Option<String> = None;
    let mut output_bytes = 0usize;
    let mut truncated_by = "lines";
    let mut last_line_partial = false;

    for line in lines.iter().rev() {
        if kept.len() >= max_lines {
            break;
        }
        let mut line_bytes = line.len();
        if !kept.is_empty() {
            line_bytes += 1;
        }
        if output_bytes + line_bytes > max_bytes {
            truncated_by = "bytes";
            if kept.is_empty() {
                let tail = tail_bytes_of(line, max_bytes);
                output_bytes = tail.len();
                partial_line = Some(tail);
                last_line_partial = true;
            }
            break;
        }
        kept.push(line);
        output_bytes += line_bytes;
    }

    kept.reverse();
    if kept.len() >= max_lines && output_bytes <= max_bytes {
        truncated_by = "lines";
    }

    let content_out = match partial_line {
        Some(partial) => partial,
        None => kept.join("\n"),
    };
    let output_line_count = if last_line_partial { 1 } else { kept.len() };
    let final_bytes = content_out.len();
    TruncationResult {
        content: content_out,
        truncated: true,
        truncated_by,
        total_lines,
        total_bytes,
        output_lines: output_line_count,
        output_bytes: final_bytes,
        last_line_partial,
        first_line_exceeds_limit: false,
    }
}

/// The last `max_bytes` of a string, snapped to a char boundary.
fn tail_bytes_of(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut start = s.len() - max_bytes;
    while start < s.len() && !s.is_char_boundary(start) {
        start += 1;
    }
    s[start..].to_string()
}

/// Cap one display line to `max_chars` characters.
pub fn truncate_line(line: &str, max_chars: usize) -> (String, bool) {
    let limit = if max_chars == 0 {
        GREP_MAX_LINE_LEN
    } else {
        max_chars
    };
    let chars: Vec<char> = line.chars().collect();
    if chars.len() <= limit {
        return (line.to_string(), false);
    }
    let mut out: String = chars[..limit].iter().collect();
    out.push_str("... [truncated]");
    (out, true)
}
