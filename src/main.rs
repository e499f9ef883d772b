use analytics_ingest::*;
use anyhow::Result;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;
    let server_id = app_config.server.id;
    tracing::info!(server_id = %server_id, server_name = %app_config.server.name, "starting");

    let store = Arc::new(
        storage::SqliteStore::connect(
            &app_config.database.path,
            app_config.database.max_pool_size,
            Duration::from_secs(app_config.database.busy_timeout_secs),
        )
        .await?,
    );
    store.init().await?;

    let (interrupt_tx, interrupt_rx) = watch::channel(false);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let sampler_handles = if app_config.sampler.enabled {
        let (summary_tx, summary_rx) = mpsc::channel(sampler::SUMMARY_CHANNEL_CAPACITY);
        let summaries_written_total = Arc::new(AtomicU64::new(0));
        let writer_handle = sampler::spawn_summary_writer(
            summary_rx,
            store.clone(),
            summaries_written_total.clone(),
        );
        let sensor = Arc::new(sampler::SysinfoSensor::new(
            sampler::PlayerCounter::default(),
            &app_config.database.path,
        ));
        let sampler_handle = sampler::spawn(
            sampler::SamplerDeps {
                sensor,
                summary_tx,
                summaries_written_total,
                shutdown_rx,
            },
            sampler::SamplerConfig {
                server_id,
                tick_interval_ms: app_config.sampler.tick_interval_ms,
                stats_log_interval_secs: app_config.sampler.stats_log_interval_secs,
            },
        );
        Some((sampler_handle, writer_handle))
    } else {
        tracing::info!("sampler disabled");
        None
    };

    let mut shutdown = std::pin::pin!(shutdown_signal());
    let mut signaled = false;

    // An unreadable dump skips the import; the sampler keeps running.
    let import_source = app_config.import.source_path.as_deref().and_then(|path| {
        match source::load_import_file(std::path::Path::new(path), server_id) {
            Ok(source) => Some(source),
            Err(e) => {
                tracing::warn!(error = %e, path, "import source unreadable; skipping import");
                None
            }
        }
    });

    if let Some(source) = import_source {
        let resolver = Arc::new(geolocation::CachedResolver::new(
            geolocation::StaticRegions::from_config(&app_config.geolocation.regions),
            Duration::from_millis(app_config.geolocation.timeout_ms),
        ));
        let mut orchestrator = orchestrator::TaskOrchestrator::new().with_interrupt(interrupt_rx);
        if let Some(cap) = app_config.import.wait_cap_secs {
            orchestrator = orchestrator.with_wait_cap(Duration::from_secs(cap));
        }
        let pipeline = pipeline::ImportPipeline::new(store.clone(), resolver, server_id)
            .with_orchestrator(orchestrator)
            .with_conversion_concurrency(app_config.import.conversion_concurrency);

        let import = pipeline.run(source);
        let mut import = std::pin::pin!(import);
        let result = tokio::select! {
            result = &mut import => result,
            _ = &mut shutdown => {
                tracing::info!("Received shutdown signal; waiting for in-flight import units");
                signaled = true;
                let _ = interrupt_tx.send(true);
                import.await
            }
        };
        match result {
            Ok(summary) => log_import_summary(&summary),
            Err(e) => tracing::warn!(error = %e, "import stopped early"),
        }
    }

    if !signaled {
        if sampler_handles.is_none() {
            return Ok(());
        }
        shutdown.await;
        tracing::info!("Received shutdown signal");
    }

    let _ = shutdown_tx.send(());
    if let Some((sampler_handle, writer_handle)) = sampler_handles {
        let _ = sampler_handle.await;
        let _ = writer_handle.await;
    }
    Ok(())
}

fn log_import_summary(summary: &pipeline::ImportSummary) {
    for (phase, outcome) in [("server", &summary.server), ("users", &summary.users)] {
        match outcome {
            pipeline::PhaseOutcome::Empty => tracing::info!(phase, "nothing to import"),
            pipeline::PhaseOutcome::Aborted(e) => {
                tracing::warn!(phase, error = %e, "import phase aborted")
            }
            pipeline::PhaseOutcome::Completed(report) => tracing::info!(
                phase,
                succeeded = report.succeeded.len(),
                failed = ?report.failed_destinations(),
                "import phase finished"
            ),
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
