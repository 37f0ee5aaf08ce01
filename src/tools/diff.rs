//! Text-matching and diff-rendering helpers for the edit tool.
//!
//! Fuzzy matching normalizes unicode quotes/dashes/spaces and trailing
//! whitespace on the *comparison target only*; the matched byte range maps
//! back into the original content, which is never rewritten wholesale.

// ============================================================================
// Line Endings / BOM
// ============================================================================

/// The dominant line ending, decided by whichever appears first.
pub fn detect_line_ending(content: &str) -> &'static str {
    let crlf = content.find("\r\n");
    let lf = content.find('\n');
    match (crlf, lf) {
        (Some(c), Some(l)) if c < l => "\r\n",
        (_, Some(_)) => "\n",
        _ => "\n",
    }
}

pub fn normalize_to_lf(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

pub fn restore_line_endings(text: &str, ending: &str) -> String {
    if ending == "\r\n" {
        text.replace('\n', "\r\n")
    } else {
        text.to_string()
    }
}

/// Split a leading byte-order mark from the content.
pub fn strip_bom(content: &str) -> (&'static str, &str) {
    match content.strip_prefix('\u{FEFF}') {
        Some(rest) => ("\u{FEFF}", rest),
        None => ("", content),
    }
}

// ============================================================================
// Fuzzy Matching
// ============================================================================

/// How a replacement target was located.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Fuzzy,
}

/// A located replacement target: a byte range in the original content.
#[derive(Debug, Clone)]
pub struct TextMatch {
    pub start: usize,
    pub end: usize,
    pub kind: MatchKind,
    pub occurrences: usize,
}

/// Find `old_text` in `content`, exactly first, then via unicode
/// normalization. Both inputs are expected LF-normalized.
pub fn find_replacement_target(content: &str, old_text: &str) -> Option<TextMatch> {
    if old_text.is_empty() {
        return None;
    }

    let exact: Vec<usize> = content.match_indices(old_text).map(|(i, _)| i).collect();
    if let Some(&start) = exact.first() {
        return Some(TextMatch {
            start,
            end: start + old_text.len(),
            kind: MatchKind::Exact,
            occurrences: exact.len(),
        });
    }

    let haystack = normalize_with_spans(content);
    let needle: Vec<char> = normalize_with_spans(old_text).chars;
    if needle.is_empty() {
        return None;
    }

    let starts = find_char_sub(&haystack.chars, &needle);
    let &first = starts.first()?;
    let (start, _) = haystack.spans[first];
    let (_, end) = haystack.spans[first + needle.len() - 1];
    Some(TextMatch {
        start,
        end,
        kind: MatchKind::Fuzzy,
        occurrences: starts.len(),
    })
}

struct NormalizedText {
    chars: Vec<char>,
    /// Byte range in the source for each normalized char.
    spans: Vec<(usize, usize)>,
}

/// Per-line trailing-whitespace trim plus character unification, keeping a
/// map back to source byte ranges.
fn normalize_with_spans(source: &str) -> NormalizedText {
    let mut chars = Vec::with_capacity(source.len());
    let mut spans = Vec::with_capacity(source.len());

    let mut line_start = 0usize;
    let mut first = true;
    for line in source.split('\n') {
        if !first {
            // The '\n' separating this line from the previous one.
            let newline_at = line_start - 1;
            chars.push('\n');
            spans.push((newline_at, newline_at + 1));
        }
        first = false;

        let kept = line.trim_end();
        let mut offset = line_start;
        for c in kept.chars() {
            chars.push(unify_char(c));
            spans.push((offset, offset + c.len_utf8()));
            offset += c.len_utf8();
        }
        line_start += line.len() + 1;
    }

    NormalizedText { chars, spans }
}

fn unify_char(c: char) -> char {
    match c {
        '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' => '\'',
        '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' => '"',
        '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}' | '\u{2015}'
        | '\u{2212}' => '-',
        '\u{00A0}' | '\u{2002}'..='\u{200A}' | '\u{202F}' | '\u{205F}' | '\u{3000}' => ' ',
        other => other,
    }
}

/// All start indices of `needle` within `haystack` (char-wise).
fn find_char_sub(haystack: &[char], needle: &[char]) -> Vec<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return Vec::new();
    }
    let mut starts = Vec::new();
    for i in 0..=(haystack.len() - needle.len()) {
        if haystack[i..i + needle.len()] == *needle {
            starts.push(i);
        }
    }
    starts
}

// ============================================================================
// Diff Rendering
// ============================================================================

struct DiffPart {
    added: bool,
    removed: bool,
    lines: Vec<String>,
}

/// Render a line-numbered diff with `context` unchanged lines around each
/// change and `...` markers where runs are elided.
pub fn generate_diff(old_content: &str, new_content: &str, context: usize) -> String {
    let parts = diff_line_parts(old_content, new_content);

    let old_line_count = old_content.split('\n').count();
    let new_line_count = new_content.split('\n').count();
    let width = old_line_count.max(new_line_count).to_string().len();

    let mut output: Vec<String> = Vec::new();
    let mut old_line = 1usize;
    let mut new_line = 1usize;
    let mut last_was_change = false;

    for (i, part) in parts.iter().enumerate() {
        let mut raw = part.lines.clone();
        if raw.last().is_some_and(String::is_empty) {
            raw.pop();
        }

        if part.added || part.removed {
            for line in &raw {
                if part.added {
                    output.push(format!("+{new_line:>width$} {line}"));
                    new_line += 1;
                } else {
                    output.push(format!("-{old_line:>width$} {line}"));
                    old_line += 1;
                }
            }
            last_was_change = true;
            continue;
        }

        let next_is_change = parts
            .get(i + 1)
            .is_some_and(|next| next.added || next.removed);
        if last_was_change || next_is_change {
            let mut skip_start = 0usize;
            let mut to_show: &[String] = &raw;

            if !last_was_change {
                skip_start = raw.len().saturating_sub(context);
                to_show = &raw[skip_start..];
            }

            let mut skip_end = 0usize;
            if !next_is_change && to_show.len() > context {
                skip_end = to_show.len() - context;
                to_show = &to_show[..context];
            }

            if skip_start > 0 {
                output.push(format!(" {} ...", " ".repeat(width)));
                old_line += skip_start;
                new_line += skip_start;
            }
            for line in to_show {
                output.push(format!(" {old_line:>width$} {line}"));
                old_line += 1;
                new_line += 1;
            }
            if skip_end > 0 {
                output.push(format!(" {} ...", " ".repeat(width)));
            }

            old_line += skip_end;
            new_line += skip_end;
        } else {
            old_line += raw.len();
            new_line += raw.len();
        }

        last_was_change = false;
    }

    output.join("\n")
}

/// Split two texts into unchanged/removed/added line runs using common
/// prefix and suffix trimming.
fn diff_line_parts(old_content: &str, new_content: &str) -> Vec<DiffPart> {
    let old_lines: Vec<&str> = old_content.split('\n').collect();
    let new_lines: Vec<&str> = new_content.split('\n').collect();

    let mut start = 0usize;
    while start < old_lines.len() && start < new_lines.len() && old_lines[start] == new_lines[start]
    {
        start += 1;
    }

    let mut old_end = old_lines.len();
    let mut new_end = new_lines.len();
    while old_end > start && new_end > start && old_lines[old_end - 1] == new_lines[new_end - 1] {
        old_end -= 1;
        new_end -= 1;
    }

    let owned = |lines: &[&str]| lines.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    let mut parts = Vec::with_capacity(4);
    if start > 0 {
        parts.push(DiffPart {
            added: false,
            removed: false,
            lines: owned(&old_lines[..start]),
        });
    }
    if old_end > start {
        parts.push(DiffPart {
            added: false,
            removed: true,
            lines: owned(&old_lines[start..old_end]),
        });
    }
    if new_end > start {
        parts.push(DiffPart {
            added: true,
            removed: false,
            lines: owned(&new_lines[start..new_end]),
        });
    }
    if old_end < old_lines.len() {
        parts.push(DiffPart {
            added: false,
            removed: false,
            lines: owned(&old_lines[old_end..]),
        });
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_ending_detection() {
        assert_eq!(detect_line_ending("a\r\nb\r\n"), "\r\n");
        assert_eq!(detect_line_ending("a\nb\n"), "\n");
        assert_eq!(detect_line_ending("a\nb\r\n"), "\n");
        assert_eq!(detect_line_ending("no endings"), "\n");
    }

    #[test]
    fn bom_roundtrip() {
        let (bom, text) = strip_bom("\u{FEFF}hello");
        assert_eq!(bom, "\u{FEFF}");
        assert_eq!(text, "hello");
        let (bom, text) = strip_bom("hello");
        assert!(bom.is_empty());
        assert_eq!(text, "hello");
    }

    #[test]
    fn exact_match_wins_over_fuzzy() {
        let found = find_replacement_target("hello world", "world").unwrap();
        assert_eq!(found.kind, MatchKind::Exact);
        assert_eq!(&"hello world"[found.start..found.end], "world");
        assert_eq!(found.occurrences, 1);
    }

    #[test]
    fn exact_match_counts_occurrences() {
        let found = find_replacement_target("x\ny\nx\n", "x").unwrap();
        assert_eq!(found.occurrences, 2);
    }

    #[test]
    fn fuzzy_matches_unicode_quotes() {
        let content = "title: \u{201C}hello\u{201D}\n";
        let found = find_replacement_target(content, "title: \"hello\"").unwrap();
        assert_eq!(found.kind, MatchKind::Fuzzy);
        assert_eq!(&content[found.start..found.end], "title: \u{201C}hello\u{201D}");
    }

    #[test]
    fn fuzzy_ignores_trailing_whitespace() {
        let content = "line one   \nline two\n";
        let found = find_replacement_target(content, "line one\nline two").unwrap();
        assert_eq!(found.kind, MatchKind::Fuzzy);
        // The match starts at the beginning and ends before the trailing
        // newline of "line two".
        assert_eq!(found.start, 0);
        assert!(content[found.start..found.end].ends_with("line two"));
    }

    #[test]
    fn fuzzy_matches_em_dash() {
        let content = "a \u{2014} b";
        let found = find_replacement_target(content, "a - b").unwrap();
        assert_eq!(found.kind, MatchKind::Fuzzy);
        assert_eq!(&content[found.start..found.end], "a \u{2014} b");
    }

    #[test]
    fn no_match_returns_none() {
        assert!(find_replacement_target("abc", "zzz").is_none());
        assert!(find_replacement_target("abc", "").is_none());
    }

    #[test]
    fn diff_shows_single_line_change() {
        let diff = generate_diff("hello world", "hello gar", 4);
        assert!(diff.contains("-1 hello world"), "diff:\n{diff}");
        assert!(diff.contains("+1 hello gar"), "diff:\n{diff}");
    }

    #[test]
    fn diff_elides_distant_context() {
        let old: Vec<String> = (1..=20).map(|i| format!("line{i}")).collect();
        let mut new = old.clone();
        new[10] = "changed".to_string();
        let diff = generate_diff(&old.join("\n"), &new.join("\n"), 4);
        assert!(diff.contains("..."), "diff:\n{diff}");
        assert!(diff.contains("-11 line11"), "diff:\n{diff}");
        assert!(diff.contains("+11 changed"), "diff:\n{diff}");
        assert!(!diff.contains("line1\n"), "diff:\n{diff}");
    }

    #[test]
    fn diff_line_numbers_advance_after_insertion() {
        let diff = generate_diff("a\nb\nc", "a\nb\nX\nc", 4);
        assert!(diff.contains("+3 X"), "diff:\n{diff}");
    }
}
