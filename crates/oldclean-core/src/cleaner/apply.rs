//! Backup, changelog, rewrite: the only code path that mutates the document.
//!
//! Steps run in order and each one is its own failure domain. A failed step stops
//! the run; nothing after it is attempted. The document is re-read first: an
//! approval only covers the text the operator was shown.

use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{DateTime, Local, NaiveDate};
use tracing::{error, info};

use crate::{
    cleaner::{
        extract::{Document, ExtractionResult},
        rewrite::rewrite,
        store::FileStore,
    },
    config::Config,
    domain::Operator,
    formatting::{code, escape_html},
    messaging::port::MessagingPort,
};

const MAX_BACKUPS_PER_DAY: usize = 1000;

#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error("document {path} could not be re-read before cleanup: {source}")]
    Verify {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("document {path} changed while awaiting confirmation")]
    Changed { path: PathBuf },

    #[error("backup {path} could not be written: {source}")]
    Backup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("changelog {path} could not be appended (backup {backup} kept): {source}")]
    Changelog {
        path: PathBuf,
        backup: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("document {path} could not be rewritten; restore it from {backup}: {source}")]
    Document {
        path: PathBuf,
        backup: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ApplyError {
    /// Whether the live document may have been modified.
    pub fn document_touched(&self) -> bool {
        matches!(self, ApplyError::Document { .. })
    }

    pub fn step(&self) -> &'static str {
        match self {
            ApplyError::Verify { .. } | ApplyError::Changed { .. } => "verify",
            ApplyError::Backup { .. } => "backup",
            ApplyError::Changelog { .. } => "changelog",
            ApplyError::Document { .. } => "document",
        }
    }

    pub fn operator_html(&self) -> String {
        match self {
            ApplyError::Verify { path, source } => format!(
                "🚨 <b>Cleanup aborted: document could not be re-read</b>\nDocument: {}\nError: {}\n\nThe document was <b>not</b> modified.",
                code(&path.display().to_string()),
                escape_html(&source.to_string())
            ),
            ApplyError::Changed { path } => format!(
                "⚠️ <b>Cleanup aborted: document changed while waiting</b>\nDocument: {}\n\nThe document was <b>not</b> modified. Run the cleaner again to review the current blocks.",
                code(&path.display().to_string())
            ),
            ApplyError::Backup { path, source } => format!(
                "🚨 <b>Cleanup aborted: backup failed</b>\nTarget: {}\nError: {}\n\nThe document was <b>not</b> modified.",
                code(&path.display().to_string()),
                escape_html(&source.to_string())
            ),
            ApplyError::Changelog {
                path,
                backup,
                source,
            } => format!(
                "🚨 <b>Cleanup aborted: changelog write failed</b>\nChangelog: {}\nError: {}\n\nThe document was <b>not</b> modified. Backup kept: {}",
                code(&path.display().to_string()),
                escape_html(&source.to_string()),
                code(&file_name(backup))
            ),
            ApplyError::Document {
                path,
                backup,
                source,
            } => format!(
                "🚨 <b>Cleanup failed while rewriting the document</b>\nDocument: {}\nError: {}\n\nThe document may be partially written. Restore it from backup {}",
                code(&path.display().to_string()),
                escape_html(&source.to_string()),
                code(&backup.display().to_string())
            ),
        }
    }
}

/// Result of a committed cleanup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Applied {
    pub backup: PathBuf,
    pub regions: usize,
}

pub struct Applier {
    store: Arc<dyn FileStore>,
    messenger: Arc<dyn MessagingPort>,
    operator: Operator,
    changelog: PathBuf,
    backup_dir: PathBuf,
}

impl Applier {
    pub fn new(
        cfg: &Config,
        store: Arc<dyn FileStore>,
        messenger: Arc<dyn MessagingPort>,
    ) -> Self {
        Self {
            store,
            messenger,
            operator: cfg.operator,
            changelog: cfg.changelog_path.clone(),
            backup_dir: cfg.backup_dir.clone(),
        }
    }

    /// Commit the cleanup and tell the operator how it went.
    ///
    /// Only call this after the operator approved.
    pub async fn apply(
        &self,
        doc: &Document,
        extracted: &ExtractionResult,
        now: DateTime<Local>,
    ) -> Result<Applied, ApplyError> {
        let res = self.commit(doc, extracted, now);

        let html = match &res {
            Ok(applied) => format!(
                "✅ Cleanup finished: {} block(s) removed.\nBackup: {}",
                applied.regions,
                code(&file_name(&applied.backup))
            ),
            Err(e) => {
                error!(step = e.step(), touched = e.document_touched(), error = %e, "cleanup failed");
                e.operator_html()
            }
        };
        if let Err(e) = self.messenger.send_html(self.operator.chat_id, &html).await {
            error!(error = %e, "failed to notify operator of cleanup result");
        }

        res
    }

    /// Steps 1-3 without any channel traffic.
    pub fn commit(
        &self,
        doc: &Document,
        extracted: &ExtractionResult,
        now: DateTime<Local>,
    ) -> Result<Applied, ApplyError> {
        let current = self
            .store
            .read_to_string(doc.path())
            .map_err(|source| ApplyError::Verify {
                path: doc.path().to_path_buf(),
                source,
            })?;
        if current != doc.text() {
            return Err(ApplyError::Changed {
                path: doc.path().to_path_buf(),
            });
        }

        let backup = self.write_backup(doc.path(), &current, now.date_naive())?;
        info!(backup = %backup.display(), "backup written");

        let section = changelog_section(extracted, now);
        self.store
            .append(&self.changelog, &section)
            .map_err(|source| ApplyError::Changelog {
                path: self.changelog.clone(),
                backup: backup.clone(),
                source,
            })?;
        info!(changelog = %self.changelog.display(), regions = extracted.regions.len(), "changelog appended");

        let rewritten = rewrite(doc.lines(), extracted, now.date_naive()).concat();
        self.store
            .write(doc.path(), &rewritten)
            .map_err(|source| ApplyError::Document {
                path: doc.path().to_path_buf(),
                backup: backup.clone(),
                source,
            })?;
        info!(document = %doc.path().display(), "document rewritten");

        Ok(Applied {
            backup,
            regions: extracted.regions.len(),
        })
    }

    fn write_backup(
        &self,
        document: &Path,
        original: &str,
        date: NaiveDate,
    ) -> Result<PathBuf, ApplyError> {
        let fail = |path: PathBuf, source: io::Error| ApplyError::Backup { path, source };

        self.store
            .create_dir_all(&self.backup_dir)
            .map_err(|e| fail(self.backup_dir.clone(), e))?;

        for n in 1..=MAX_BACKUPS_PER_DAY {
            let path = self.backup_dir.join(backup_name(document, date, n));
            match self.store.create_new(&path, original) {
                Ok(()) => return Ok(path),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(fail(path, e)),
            }
        }

        Err(fail(
            self.backup_dir.join(backup_name(document, date, MAX_BACKUPS_PER_DAY)),
            io::Error::new(
                io::ErrorKind::AlreadyExists,
                "too many backups for one day",
            ),
        ))
    }
}

/// `bot.py` on 2026-03-14 -> `bot_backup_2026-03-14.py`, then `bot_backup_2026-03-14-2.py`, ...
pub fn backup_name(document: &Path, date: NaiveDate, n: usize) -> String {
    let stem = document
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "document".to_string());
    let ext = document
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let counter = if n > 1 { format!("-{n}") } else { String::new() };
    format!("{stem}_backup_{}{counter}{ext}", date.format("%Y-%m-%d"))
}

/// One timestamped changelog section holding every region verbatim.
pub fn changelog_section(extracted: &ExtractionResult, now: DateTime<Local>) -> String {
    let mut out = format!("\n\n=== AUTO CLEAN {} ===\n", now.format("%Y-%m-%d %H:%M:%S"));
    for region in &extracted.regions {
        out.push_str(&region.text());
        out.push('\n');
    }
    out
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
