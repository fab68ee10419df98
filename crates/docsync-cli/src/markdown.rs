//! Code sample discovery in Markdown: fenced blocks plus inline code spans
//! outside of them. Spans are byte ranges into the source so rendered text
//! can be spliced back without touching the prose around it.

use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;

static FENCE_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ {0,3}(`{3,}|~{3,})(.*)$").expect("fence pattern"));

static INLINE_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"`([^`\r\n]+)`").expect("inline code pattern"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub range: Range<usize>,
}

struct OpenFence {
    marker: char,
    len: usize,
    body_start: usize,
}

/// Every code sample in document order.
pub fn find_spans(text: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut open: Option<OpenFence> = None;
    let mut prose_start = 0;
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        let content = line.trim_end_matches(['\n', '\r']);
        match &open {
            None => {
                let Some(caps) = FENCE_OPEN.captures(content) else {
                    continue;
                };
                let fence = &caps[1];
                let marker = if fence.starts_with('`') { '`' } else { '~' };
                if marker == '`' && caps[2].contains('`') {
                    continue;
                }
                inline_spans(&text[prose_start..line_start], prose_start, &mut spans);
                open = Some(OpenFence {
                    marker,
                    len: fence.len(),
                    body_start: offset,
                });
            }
            Some(fence) => {
                if closes(content, fence) {
                    push_block(&mut spans, fence.body_start..line_start);
                    open = None;
                    prose_start = offset;
                }
            }
        }
    }
    match open {
        // An unclosed fence runs to the end of the document.
        Some(fence) => push_block(&mut spans, fence.body_start..text.len()),
        None => inline_spans(&text[prose_start..], prose_start, &mut spans),
    }
    spans
}

fn push_block(spans: &mut Vec<Span>, range: Range<usize>) {
    if !range.is_empty() {
        spans.push(Span { range });
    }
}

fn closes(line: &str, fence: &OpenFence) -> bool {
    let trimmed = line.trim_start_matches(' ');
    if line.len() - trimmed.len() > 3 {
        return false;
    }
    let run = trimmed.chars().take_while(|&c| c == fence.marker).count();
    run >= fence.len && trimmed[run..].trim().is_empty()
}

fn inline_spans(prose: &str, base: usize, spans: &mut Vec<Span>) {
    for caps in INLINE_CODE.captures_iter(prose) {
        if let Some(m) = caps.get(1) {
            spans.push(Span {
                range: base + m.start()..base + m.end(),
            });
        }
    }
}

/// Replaces each span with the matching entry of `replacements`.
pub fn splice(text: &str, spans: &[Span], replacements: &[String]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (span, replacement) in spans.iter().zip(replacements) {
        out.push_str(&text[last..span.range.start]);
        out.push_str(replacement);
        last = span.range.end;
    }
    out.push_str(&text[last..]);
    out
}
