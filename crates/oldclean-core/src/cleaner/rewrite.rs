//! Pure stub rewriting: every extracted region collapses to one stub line.

use chrono::NaiveDate;

use crate::cleaner::extract::ExtractionResult;

/// Greppable prefix shared by every stub line.
pub const STUB_TOKEN: &str = "# === OLD BLOCK (removed ";

pub fn stub_line(date: NaiveDate) -> String {
    stub_with_ending(date, "\n")
}

fn stub_with_ending(date: NaiveDate, ending: &str) -> String {
    format!("{STUB_TOKEN}{}) ==={ending}", date.format("%Y-%m-%d"))
}

/// `\r\n`, `\n` or nothing for a final unterminated line.
fn line_ending(line: &str) -> &str {
    if line.ends_with("\r\n") {
        "\r\n"
    } else if line.ends_with('\n') {
        "\n"
    } else {
        ""
    }
}

pub fn is_stub(line: &str) -> bool {
    line.trim_start().starts_with(STUB_TOKEN)
}

/// Replace each region's span with a single stub line.
///
/// Lines outside regions are copied unchanged and in order. Malformed start
/// markers are not part of `extracted`, so their lines are kept as well. Each
/// stub keeps the line ending of the end marker it replaces.
pub fn rewrite(lines: &[String], extracted: &ExtractionResult, date: NaiveDate) -> Vec<String> {
    let mut out = Vec::with_capacity(lines.len());
    let mut regions = extracted.regions.iter().peekable();
    let mut idx = 0;

    while idx < lines.len() {
        match regions.peek() {
            Some(region) if region.start == idx => {
                out.push(stub_with_ending(date, line_ending(&lines[region.end])));
                idx = region.end + 1;
                regions.next();
            }
            _ => {
                out.push(lines[idx].clone());
                idx += 1;
            }
        }
    }
    out
}
