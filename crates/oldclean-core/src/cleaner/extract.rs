//! Scans a document for `OLD BLOCK` regions.
//!
//! Mark legacy code like this:
//!
//! ```text
//! # === OLD BLOCK START === v1.4 2025-06-08 (inline menus)
//! ... legacy code ...
//! # === OLD BLOCK END ===
//! ```
//!
//! Regions do not nest. A start marker inside an open region is plain content
//! of that region, and a region still open at end of file is dropped and
//! counted as malformed.

use std::{
    path::{Path, PathBuf},
    sync::OnceLock,
};

use regex::Regex;

const START_PATTERN: &str = r"^\s*# === OLD BLOCK START ===";
const END_PATTERN: &str = r"^\s*# === OLD BLOCK END ===";

fn start_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(START_PATTERN).expect("valid regex"))
}

fn end_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(END_PATTERN).expect("valid regex"))
}

pub fn is_start_marker(line: &str) -> bool {
    start_re().is_match(line)
}

pub fn is_end_marker(line: &str) -> bool {
    end_re().is_match(line)
}

/// A text file split into newline-preserving lines.
///
/// Concatenating `lines` yields the original text byte for byte.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Document {
    path: PathBuf,
    lines: Vec<String>,
}

impl Document {
    pub fn parse(path: impl Into<PathBuf>, text: &str) -> Self {
        Self {
            path: path.into(),
            lines: split_lines(text),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn text(&self) -> String {
        self.lines.concat()
    }
}

/// Split on `\n`, keeping the terminator on each line.
pub fn split_lines(text: &str) -> Vec<String> {
    text.split_inclusive('\n').map(str::to_string).collect()
}

/// A well-formed region: start marker through end marker, inclusive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Region {
    /// Index of the start marker line.
    pub start: usize,
    /// Index of the end marker line (inclusive).
    pub end: usize,
    pub lines: Vec<String>,
}

impl Region {
    /// Verbatim text of the region, markers included.
    pub fn text(&self) -> String {
        self.lines.concat()
    }

    /// The start marker line without its terminator; carries the description.
    pub fn header(&self) -> &str {
        self.lines
            .first()
            .map(|l| l.trim_end_matches(['\r', '\n']))
            .unwrap_or("")
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtractionResult {
    /// Well-formed regions in document order.
    pub regions: Vec<Region>,
    /// Start markers that were never closed.
    pub malformed: usize,
}

impl ExtractionResult {
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

pub fn extract(doc: &Document) -> ExtractionResult {
    extract_lines(doc.lines())
}

pub fn extract_lines(lines: &[String]) -> ExtractionResult {
    let mut out = ExtractionResult::default();
    let mut open: Option<Region> = None;

    for (idx, line) in lines.iter().enumerate() {
        let Some(region) = open.as_mut() else {
            if is_start_marker(line) {
                open = Some(Region {
                    start: idx,
                    end: idx,
                    lines: vec![line.clone()],
                });
            }
            continue;
        };

        region.lines.push(line.clone());
        if is_end_marker(line) {
            region.end = idx;
            out.regions.extend(open.take());
        }
    }

    if open.is_some() {
        out.malformed += 1;
    }
    out
}
