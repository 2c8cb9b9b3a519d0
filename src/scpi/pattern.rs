//! SCPI header matching.
//!
//! Command patterns are colon-separated mnemonics whose uppercase head is
//! the short form ("CONFigure" accepts CONF and CONFIGURE, any case).
//! Bracketed segments are optional and may be skipped by the sender. A
//! trailing `?` marks a query and must match exactly.

/// Segments a pattern can hold. Deep trees in practice stop at five
/// levels; eight leaves headroom.
const MAX_SEGMENTS: usize = 8;

#[derive(Debug, Clone, Copy)]
struct Segment<'a> {
    name: &'a str,
    optional: bool,
}

/// Does `header` (as received, without parameters) match `pattern`?
pub fn matches(pattern: &str, header: &str) -> bool {
    let pattern_query = pattern.ends_with('?');
    let header_query = header.ends_with('?');
    if pattern_query != header_query {
        return false;
    }
    let pattern = pattern.trim_end_matches('?');
    let header = header.trim_end_matches('?').trim_start_matches(':');

    let Some(segments) = parse_pattern(pattern) else {
        return false;
    };
    let mut parts: heapless::Vec<&str, MAX_SEGMENTS> = heapless::Vec::new();
    for part in header.split(':') {
        if part.is_empty() || parts.push(part).is_err() {
            return false;
        }
    }
    match_segments(&segments, &parts)
}

fn parse_pattern(pattern: &str) -> Option<heapless::Vec<Segment<'_>, MAX_SEGMENTS>> {
    let mut segments = heapless::Vec::new();
    let mut optional = false;
    let mut start: Option<usize> = None;
    for (i, c) in pattern.char_indices() {
        match c {
            '[' | ']' | ':' => {
                if let Some(s) = start.take() {
                    segments
                        .push(Segment {
                            name: &pattern[s..i],
                            optional,
                        })
                        .ok()?;
                }
                match c {
                    '[' => optional = true,
                    ']' => optional = false,
                    _ => {}
                }
            }
            _ => {
                if start.is_none() {
                    start = Some(i);
                }
            }
        }
    }
    if let Some(s) = start {
        segments
            .push(Segment {
                name: &pattern[s..],
                optional,
            })
            .ok()?;
    }
    Some(segments)
}

fn match_segments(segments: &[Segment<'_>], parts: &[&str]) -> bool {
    match (segments.split_first(), parts.split_first()) {
        (None, None) => true,
        (None, Some(_)) => false,
        (Some((seg, rest)), None) => seg.optional && match_segments(rest, parts),
        (Some((seg, rest_segs)), Some((part, rest_parts))) => {
            (segment_matches(seg.name, part) && match_segments(rest_segs, rest_parts))
                || (seg.optional && match_segments(rest_segs, parts))
        }
    }
}

fn segment_matches(name: &str, input: &str) -> bool {
    input.eq_ignore_ascii_case(name) || matches_short_form(name, input)
}

/// The short form is the pattern name with its lowercase tail removed.
fn matches_short_form(name: &str, input: &str) -> bool {
    let mut inputs = input.chars();
    for c in name.chars() {
        if c.is_ascii_lowercase() {
            continue;
        }
        match inputs.next() {
            Some(ic) if ic.eq_ignore_ascii_case(&c) => {}
            _ => return false,
        }
    }
    inputs.next().is_none()
}
