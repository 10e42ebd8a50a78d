//! Import and export command handlers.
//!
//! Engines run on a blocking task; they do file and database I/O and may
//! sleep while throttling.

use hitport::config::HitportConfig;
use hitport::io::{ExportJobStore, ExportService, ImportService, ImportTarget};
use hitport::notify::{CompletionNotifier, LogNotifier, WebhookNotifier};
use hitport::storage::{SqliteExportStore, SqliteHitStore};
use hitport::{Error, ExportStatus, Result};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

type CommandResult = std::result::Result<(), Box<dyn std::error::Error>>;

/// Builds the configured notifier.
fn notifier(config: &HitportConfig) -> Arc<dyn CompletionNotifier> {
    match &config.notify.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone(), config.notify_timeout())),
        None => Arc::new(LogNotifier),
    }
}

/// Runs `f` on the blocking pool.
async fn blocking<T: Send + 'static>(f: impl FnOnce() -> Result<T> + Send + 'static) -> Result<T> {
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::operation("join_blocking_task", e))?
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    let json =
        serde_json::to_string_pretty(value).map_err(|e| Error::operation("serialize_output", e))?;
    println!("{json}");
    Ok(())
}

/// Executes the export command.
pub async fn cmd_export(
    config: HitportConfig,
    site: i64,
    start_from: i64,
    dir: Option<PathBuf>,
    notify: bool,
) -> CommandResult {
    if start_from < 0 {
        let msg = format!("start-from must not be negative: {start_from}");
        return Err(Error::InvalidInput(msg).into());
    }
    let dir = dir.unwrap_or_else(|| config.export_dir_path());

    let (job, status) = blocking(move || {
        let db = config.database_path();
        let service = ExportService::new(
            Arc::new(SqliteHitStore::new(&db)?),
            Arc::new(SqliteExportStore::new(&db)?),
        )
        .with_options(config.export_options())
        .with_notifier(notifier(&config));

        let (mut job, file) = service.create_job(site, start_from, &dir)?;
        let status = service.run(&mut job, file, notify);
        Ok((job, status))
    })
    .await?;

    print_json(&job)?;
    match status? {
        ExportStatus::Finished => Ok(()),
        other => {
            eprintln!(
                "Export {} is {}: {}",
                job.id,
                other.as_str(),
                job.error.as_deref().unwrap_or("no error recorded")
            );
            Err(Error::operation("export", format!("export {} not verified", job.id)).into())
        },
    }
}

/// Executes the import command.
pub async fn cmd_import(
    config: HitportConfig,
    site: i64,
    file: PathBuf,
    replace: bool,
    notify: bool,
) -> CommandResult {
    let summary = blocking(move || {
        let source = File::open(&file)
            .map_err(|e| Error::operation("open_import_file", format!("{}: {e}", file.display())))?;
        let store = Arc::new(SqliteHitStore::new(config.database_path())?);
        let service = ImportService::new(store)
            .with_options(config.import_options())
            .with_notifier(notifier(&config));
        service.run(&ImportTarget::new(site), source, replace, notify)
    })
    .await?;

    print_json(&summary)?;
    if summary.has_faults() {
        eprintln!(
            "{} row(s) rejected; {} shown",
            summary.fault_count,
            summary.faults.len()
        );
    }
    Ok(())
}

/// Executes the exports command.
pub async fn cmd_exports(config: HitportConfig, site: i64) -> CommandResult {
    let jobs = blocking(move || SqliteExportStore::new(config.database_path())?.list(site)).await?;
    print_json(&jobs)?;
    Ok(())
}
