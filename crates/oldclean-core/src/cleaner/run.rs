use std::{path::Path, sync::Arc};

use chrono::Local;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    cleaner::{
        apply::{Applied, Applier},
        confirm::{ConfirmationOrchestrator, Resolution},
        extract::{extract, Document, ExtractionResult},
        report::{format_report, Report},
        rewrite::rewrite,
        store::FileStore,
    },
    config::Config,
    messaging::port::{InboundPort, MessagingPort},
    Result,
};

/// How a cleanup run ended without an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// No well-formed region; only the notice was sent.
    NothingFound { malformed: usize },
    /// The report never reached the operator.
    Undeliverable,
    /// Explicit cancel, timeout, shutdown or lost listener. Nothing was touched.
    Denied(Resolution),
    Applied(Applied),
    /// Dry run: what would be sent and what the document would become.
    Preview { report: String, rewritten: String },
}

/// A scanned document and what the operator would be shown.
pub struct Scan {
    pub document: Document,
    pub extracted: ExtractionResult,
    pub report: Report,
}

/// Extract -> report -> confirm -> apply, for one document.
pub struct Cleaner {
    cfg: Arc<Config>,
    store: Arc<dyn FileStore>,
    messenger: Arc<dyn MessagingPort>,
    orchestrator: ConfirmationOrchestrator,
    applier: Applier,
}

impl Cleaner {
    pub fn new(
        cfg: Arc<Config>,
        store: Arc<dyn FileStore>,
        messenger: Arc<dyn MessagingPort>,
        inbound: Arc<dyn InboundPort>,
    ) -> Self {
        let orchestrator = ConfirmationOrchestrator::new(&cfg, messenger.clone(), inbound);
        let applier = Applier::new(&cfg, store.clone(), messenger.clone());
        Self {
            cfg,
            store,
            messenger,
            orchestrator,
            applier,
        }
    }

    pub fn scan(&self) -> Result<Scan> {
        let path = &self.cfg.document_path;
        let text = self.store.read_to_string(path)?;
        let document = Document::parse(path, &text);
        let extracted = extract(&document);
        info!(
            document = %path.display(),
            regions = extracted.regions.len(),
            malformed = extracted.malformed,
            "document scanned"
        );
        if extracted.malformed > 0 {
            warn!(malformed = extracted.malformed, "unterminated start markers ignored");
        }

        let report = format_report(
            &display_name(path),
            &display_name(&self.cfg.changelog_path),
            &extracted,
            self.messenger.capabilities().max_message_len,
        );
        Ok(Scan {
            document,
            extracted,
            report,
        })
    }

    /// Scan and render the stubbed document without touching the channel or disk.
    pub fn preview(&self) -> Result<RunOutcome> {
        let scan = self.scan()?;
        let rewritten = rewrite(
            scan.document.lines(),
            &scan.extracted,
            Local::now().date_naive(),
        )
        .concat();
        Ok(RunOutcome::Preview {
            report: scan.report.html().to_string(),
            rewritten,
        })
    }

    pub async fn run(&self, shutdown: &CancellationToken) -> Result<RunOutcome> {
        let scan = self.scan()?;

        if !scan.report.needs_confirmation() {
            if let Err(e) = self
                .messenger
                .send_html(self.cfg.operator.chat_id, scan.report.html())
                .await
            {
                warn!(error = %e, "failed to send nothing-found notice");
            }
            return Ok(RunOutcome::NothingFound {
                malformed: scan.extracted.malformed,
            });
        }

        let session = self
            .orchestrator
            .request_confirmation(scan.report.html(), shutdown)
            .await;
        match session.resolution() {
            Some(Resolution::Approved) => {}
            Some(Resolution::Undeliverable) => return Ok(RunOutcome::Undeliverable),
            Some(other) => {
                info!(session = %session.id(), outcome = other.kind(), "cleanup not approved; nothing changed");
                return Ok(RunOutcome::Denied(other));
            }
            None => return Ok(RunOutcome::Denied(Resolution::Interrupted)),
        }

        let applied = self
            .applier
            .apply(&scan.document, &scan.extracted, Local::now())
            .await?;
        info!(
            session = %session.id(),
            backup = %applied.backup.display(),
            regions = applied.regions,
            "cleanup applied"
        );
        Ok(RunOutcome::Applied(applied))
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cleaner::{apply::ApplyError, rewrite::stub_line},
        domain::ChatId,
        testing::{msg_from, test_config, MemStore, RecordingMessenger, ScriptedInbound, StoreOp},
        Error,
    };
    use std::path::PathBuf;
    use tokio::time::Duration;

    const ONE_REGION: &str = "\
import os
# === OLD BLOCK START === v1.2 2025-06-08 (legacy scores)
def old_scores():
    pass
# === OLD BLOCK END ===
def new_scores():
    pass
";

    struct Harness {
        store: Arc<MemStore>,
        messenger: Arc<RecordingMessenger>,
        inbound: Arc<ScriptedInbound>,
        cleaner: Cleaner,
    }

    fn harness(doc: &str, script: Vec<(Duration, crate::messaging::types::TextMessage)>) -> Harness {
        let mut cfg = test_config("/srv/app");
        cfg.confirm_timeout = Duration::from_secs(30);
        let store = Arc::new(MemStore::default());
        store.insert(&cfg.document_path, doc);
        let inbound = Arc::new(ScriptedInbound::new(script));
        let messenger = Arc::new(RecordingMessenger::watching(inbound.listening_flag()));
        let cleaner = Cleaner::new(
            Arc::new(cfg),
            store.clone(),
            messenger.clone(),
            inbound.clone(),
        );
        Harness {
            store,
            messenger,
            inbound,
            cleaner,
        }
    }

    fn doc_path() -> PathBuf {
        PathBuf::from("/srv/app/bot.py")
    }

    fn changelog_path() -> PathBuf {
        PathBuf::from("/srv/app/changelog.md")
    }

    fn backups(store: &MemStore) -> Vec<String> {
        (1..=3)
            .map(|n| {
                PathBuf::from("/srv/app/backups").join(crate::cleaner::apply::backup_name(
                    &doc_path(),
                    Local::now().date_naive(),
                    n,
                ))
            })
            .filter_map(|p| store.get(&p))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn accepted_run_backs_up_logs_and_stubs() {
        let h = harness(
            ONE_REGION,
            vec![(Duration::from_secs(2), msg_from(7, "/ok"))],
        );

        let outcome = h.cleaner.run(&CancellationToken::new()).await.unwrap();

        let RunOutcome::Applied(applied) = outcome else {
            panic!("expected an applied outcome");
        };
        assert_eq!(applied.regions, 1);
        assert_eq!(backups(&h.store), vec![ONE_REGION.to_string()]);

        let log = h.store.get(&changelog_path()).unwrap();
        assert_eq!(log.matches("=== AUTO CLEAN ").count(), 1);
        assert!(log.contains(
            "# === OLD BLOCK START === v1.2 2025-06-08 (legacy scores)\ndef old_scores():\n    pass\n# === OLD BLOCK END ===\n"
        ));

        let expected_doc = format!(
            "import os\n{}def new_scores():\n    pass\n",
            stub_line(Local::now().date_naive())
        );
        assert_eq!(h.store.get(&doc_path()), Some(expected_doc));

        let sent = h.messenger.sent();
        assert_eq!(sent.len(), 3, "report, ack, completion");
        assert!(sent.iter().all(|s| s.chat_id == ChatId(7)));
        assert!(sent[0].html.contains("Found <b>1</b> block(s)"));
        assert!(sent[1].html.starts_with("Accepted"));
        assert!(!sent[1].listener_active_at_send);
        let backup_name = applied.backup.file_name().unwrap().to_string_lossy().to_string();
        assert!(sent[2].html.contains(&backup_name));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_run_touches_nothing() {
        let h = harness(
            ONE_REGION,
            vec![(Duration::from_secs(2), msg_from(7, "/cancel"))],
        );

        let outcome = h.cleaner.run(&CancellationToken::new()).await.unwrap();

        assert_eq!(outcome, RunOutcome::Denied(Resolution::DeniedExplicit));
        assert!(backups(&h.store).is_empty());
        assert!(h.store.get(&changelog_path()).is_none());
        assert_eq!(h.store.get(&doc_path()).as_deref(), Some(ONE_REGION));
        let sent = h.messenger.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[1].html.starts_with("Cancelled"));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_operator_times_out_once() {
        let h = harness(
            ONE_REGION,
            vec![(Duration::from_secs(45), msg_from(7, "/ok"))],
        );

        let outcome = h.cleaner.run(&CancellationToken::new()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert_eq!(outcome, RunOutcome::Denied(Resolution::DeniedTimeout));
        assert_eq!(h.store.get(&doc_path()).as_deref(), Some(ONE_REGION));
        assert!(h.store.get(&changelog_path()).is_none());
        let sent = h.messenger.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(
            sent.iter().filter(|s| s.html.starts_with("Cancelled")).count(),
            1
        );
        assert_eq!(h.inbound.delivered(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn trailing_unterminated_block_is_excluded() {
        let doc = format!("{ONE_REGION}# === OLD BLOCK START === v2 half done\nx = 1\n");
        let h = harness(&doc, vec![(Duration::from_secs(1), msg_from(7, "/ok"))]);

        let outcome = h.cleaner.run(&CancellationToken::new()).await.unwrap();

        let RunOutcome::Applied(applied) = outcome else {
            panic!("expected an applied outcome");
        };
        assert_eq!(applied.regions, 1);
        let report = &h.messenger.sent()[0].html;
        assert!(report.contains("Found <b>1</b> block(s)"));
        assert!(report.contains("1 unterminated"));
        assert!(!report.contains("v2 half done"));

        let rewritten = h.store.get(&doc_path()).unwrap();
        assert!(rewritten.ends_with("# === OLD BLOCK START === v2 half done\nx = 1\n"));
        assert!(!h.store.get(&changelog_path()).unwrap().contains("half done"));
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_found_sends_only_the_notice() {
        let h = harness("print('clean')\n", vec![]);

        let outcome = h.cleaner.run(&CancellationToken::new()).await.unwrap();

        assert_eq!(outcome, RunOutcome::NothingFound { malformed: 0 });
        let sent = h.messenger.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].html.contains("no OLD blocks found"));
        assert_eq!(h.inbound.starts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn apply_failure_surfaces_as_error() {
        let h = harness(
            ONE_REGION,
            vec![(Duration::from_secs(1), msg_from(7, "/ok"))],
        );
        h.store.fail(StoreOp::Append, changelog_path());

        let err = h.cleaner.run(&CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, Error::Apply(ApplyError::Changelog { .. })));
        assert_eq!(h.store.get(&doc_path()).as_deref(), Some(ONE_REGION));
    }

    #[tokio::test(start_paused = true)]
    async fn edit_while_awaiting_reply_aborts_without_touching_anything() {
        let h = harness(
            ONE_REGION,
            vec![(Duration::from_secs(10), msg_from(7, "/ok"))],
        );
        let edited = format!("{ONE_REGION}def new_work():\n    pass\n");
        tokio::spawn({
            let store = h.store.clone();
            let edited = edited.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                store.insert(&doc_path(), &edited);
            }
        });

        let err = h.cleaner.run(&CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, Error::Apply(ApplyError::Changed { .. })));
        assert_eq!(h.store.get(&doc_path()), Some(edited));
        assert!(backups(&h.store).is_empty());
        assert!(h.store.get(&changelog_path()).is_none());
        let sent = h.messenger.sent();
        assert_eq!(sent.len(), 3, "report, ack, abort notice");
        assert!(sent[2].html.contains("changed while waiting"));
    }

    #[tokio::test]
    async fn missing_document_is_an_io_error() {
        let h = harness(ONE_REGION, vec![]);
        h.store.fail(StoreOp::Read, doc_path());
        assert!(matches!(
            h.cleaner.run(&CancellationToken::new()).await,
            Err(Error::Io(_))
        ));
        assert!(h.messenger.sent().is_empty());
    }

    #[test]
    fn preview_renders_without_side_effects() {
        let h = harness(ONE_REGION, vec![]);

        let RunOutcome::Preview { report, rewritten } = h.cleaner.preview().unwrap() else {
            panic!("expected preview");
        };

        assert!(report.contains("Found <b>1</b> block(s)"));
        assert!(rewritten.contains(&stub_line(Local::now().date_naive())));
        assert_eq!(h.store.get(&doc_path()).as_deref(), Some(ONE_REGION));
        assert!(h.messenger.sent().is_empty());
        assert_eq!(h.inbound.starts(), 0);
    }
}
