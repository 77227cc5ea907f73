use crate::{
    cleaner::{
        confirm::{ACCEPT_TOKEN, CANCEL_TOKEN},
        extract::ExtractionResult,
    },
    formatting::{code, escape_html},
};

/// Room kept for the "... and N more" line.
const OVERFLOW_RESERVE: usize = 48;

/// Operator-facing summary of a scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Report {
    /// No well-formed region; the run ends here.
    NothingFound(String),
    /// Numbered list of regions plus reply instructions.
    Proposal(String),
}

impl Report {
    pub fn html(&self) -> &str {
        match self {
            Report::NothingFound(s) | Report::Proposal(s) => s,
        }
    }

    pub fn needs_confirmation(&self) -> bool {
        matches!(self, Report::Proposal(_))
    }
}

/// Render the scan for the operator, keeping the whole text within `max_len` chars.
///
/// When the list does not fit, trailing entries are replaced by a "... and N more" line.
pub fn format_report(
    document: &str,
    changelog: &str,
    extracted: &ExtractionResult,
    max_len: usize,
) -> Report {
    let malformed = malformed_notice(extracted.malformed);

    if extracted.is_empty() {
        let mut out = format!("⚠️ Cleanup: no OLD blocks found in {}", code(document));
        if let Some(m) = malformed {
            out.push('\n');
            out.push_str(&m);
        }
        return Report::NothingFound(out);
    }

    let head = format!(
        "<b>Legacy block cleanup</b>\nFound <b>{}</b> block(s) in {}:",
        extracted.regions.len(),
        code(document)
    );
    let mut tail = Vec::new();
    if let Some(m) = malformed {
        tail.push(m);
    }
    tail.push(format!(
        "\nMove them to <i>{}</i> and replace with stubs?\nReply {} to accept or {} to cancel.",
        escape_html(changelog),
        code(ACCEPT_TOKEN),
        code(CANCEL_TOKEN)
    ));

    let fixed = char_len(&head) + tail.iter().map(|t| char_len(t) + 1).sum::<usize>();
    let budget = max_len.saturating_sub(fixed + OVERFLOW_RESERVE);

    let mut lines = vec![head];
    let mut used = 0;
    for (i, region) in extracted.regions.iter().enumerate() {
        let entry = format!("{}. {}", i + 1, escape_html(region.header().trim()));
        used += char_len(&entry) + 1;
        if used > budget {
            lines.push(format!(
                "… and {} more block(s)",
                extracted.regions.len() - i
            ));
            break;
        }
        lines.push(entry);
    }
    lines.extend(tail);

    Report::Proposal(lines.join("\n"))
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn malformed_notice(count: usize) -> Option<String> {
    (count > 0).then(|| {
        format!("⚠️ {count} unterminated start marker(s) ignored (no matching END).")
    })
}
