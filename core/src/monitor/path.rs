//! Dotted path parser.
//!
//! Parses paths like `user.hexonly`, `user.options[2].enabled` or
//! `grid[0][3]` into an ordered list of segments. Each segment carries a bare
//! property name and the bracketed numeric indices that follow it.

use std::fmt;

use crate::error::MonitorError;


/// One step of a parsed path: a property name plus trailing indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub name: String,
    pub indices: Vec<usize>,
}

impl Segment {
    pub fn property(name: impl Into<String>) -> Self {
        Segment {
            name: name.into(),
            indices: Vec::new(),
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for idx in &self.indices {
            write!(f, "[{}]", idx)?;
        }
        Ok(())
    }
}


/// A single addressing step once names and indices are flattened.
///
/// `a.b[0][1].c` becomes `Key(a) Key(b) Index(0) Index(1) Key(c)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step<'a> {
    Key(&'a str),
    Index(usize),
}


/// A parsed dotted path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPath {
    pub segments: Vec<Segment>,
}

impl ParsedPath {
    /// Parse a path string.
    ///
    /// One leading and one trailing `.` are stripped first. What remains must
    /// be `name[idx]*` segments joined by `.`; anything else is rejected.
    pub fn parse(input: &str) -> Result<Self, MonitorError> {
        let body = strip_delimiters(input);
        if body.is_empty() {
            return Err(MonitorError::EmptyPath);
        }

        let mut segments = Vec::new();
        for part in body.split('.') {
            if part.is_empty() {
                return Err(MonitorError::malformed(input, "empty segment"));
            }
            segments.push(parse_segment(input, part)?);
        }

        Ok(ParsedPath { segments })
    }

    /// Flatten into addressing steps, in traversal order.
    pub fn steps(&self) -> Vec<Step<'_>> {
        let mut out = Vec::with_capacity(self.segments.len());
        for seg in &self.segments {
            out.push(Step::Key(&seg.name));
            out.extend(seg.indices.iter().map(|i| Step::Index(*i)));
        }
        out
    }

    /// Format back to a dotted string (the canonical spelling).
    pub fn to_dotted(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for ParsedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_dotted())
    }
}


/// Strip one leading and one trailing `.`.
pub fn strip_delimiters(input: &str) -> &str {
    let s = input.strip_prefix('.').unwrap_or(input);
    s.strip_suffix('.').unwrap_or(s)
}


// ---------------------------------------------------------------------------
// Internal: segment parsing
// ---------------------------------------------------------------------------

fn parse_segment(input: &str, part: &str) -> Result<Segment, MonitorError> {
    let name_end = part.find(['[', ']']).unwrap_or(part.len());
    let name = &part[..name_end];
    if name.is_empty() {
        return Err(MonitorError::malformed(
            input,
            format!("segment '{}' has no property name", part),
        ));
    }

    let mut indices = Vec::new();
    let mut rest = &part[name_end..];
    while !rest.is_empty() {
        let inner = match rest.strip_prefix('[') {
            Some(r) => r,
            None => {
                return Err(MonitorError::malformed(
                    input,
                    format!("unexpected '{}' in segment '{}'", rest, part),
                ))
            }
        };
        let close = inner.find(']').ok_or_else(|| {
            MonitorError::malformed(input, format!("unterminated index in '{}'", part))
        })?;
        let digits = &inner[..close];
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MonitorError::malformed(
                input,
                format!("index '[{}]' is not a number", digits),
            ));
        }
        let idx = digits.parse::<usize>().map_err(|_| {
            MonitorError::malformed(input, format!("index '{}' is out of range", digits))
        })?;
        indices.push(idx);
        rest = &inner[close + 1..];
    }

    Ok(Segment {
        name: name.to_string(),
        indices,
    })
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
