use std::{process::ExitCode, sync::Arc};

use oldclean_core::{
    cleaner::{store::FsStore, Cleaner, RunOutcome},
    config::Config,
    Error,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    oldclean_core::logging::init("oldclean")?;

    let dry_run = std::env::args().skip(1).any(|a| a == "--dry-run");
    let cfg = Arc::new(Config::load()?);

    let (messenger, inbound) = oldclean_telegram::ports(&cfg.bot_token);
    let cleaner = Cleaner::new(
        cfg.clone(),
        Arc::new(FsStore),
        Arc::new(messenger),
        Arc::new(inbound),
    );

    if dry_run {
        if let RunOutcome::Preview { report, rewritten } = cleaner.preview()? {
            println!("{report}\n\n----- {} (preview) -----", cfg.document_path.display());
            print!("{rewritten}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; cancelling cleanup");
                shutdown.cancel();
            }
        }
    });

    match cleaner.run(&shutdown).await {
        Ok(RunOutcome::Applied(applied)) => {
            info!(backup = %applied.backup.display(), regions = applied.regions, "done");
            Ok(ExitCode::SUCCESS)
        }
        Ok(RunOutcome::NothingFound { .. }) | Ok(RunOutcome::Preview { .. }) => {
            Ok(ExitCode::SUCCESS)
        }
        Ok(RunOutcome::Undeliverable) => {
            error!("report could not be delivered to the operator");
            Ok(ExitCode::from(1))
        }
        Ok(RunOutcome::Denied(resolution)) => {
            info!(outcome = resolution.kind(), "cleanup cancelled");
            Ok(ExitCode::from(1))
        }
        Err(Error::Apply(e)) => {
            error!(step = e.step(), touched = e.document_touched(), error = %e, "cleanup failed");
            Ok(ExitCode::from(2))
        }
        Err(e) => Err(e.into()),
    }
}
