//! Process startup: build everything a worker needs from its configuration,
//! failing fast on anything missing, then run the loop.

use anyhow::{Context, Result};
use sda_core::{Service, WorkerConfig};
use sda_db::{connect, FileRepository, PgFileRepository, RetryPolicy};
use sda_storage::{create_backend, Backend};
use sda_verify::PrivateKey;
use std::sync::Arc;

use crate::broker::Broker;
use crate::copy::CopyWorker;
use crate::telemetry::init_telemetry;
use crate::verify::VerifyWorker;
use crate::watcher::watch_connection;
use crate::worker::WorkerLoop;

/// Long-lived collaborators of one worker process.
pub struct Resources {
    pub archive: Arc<dyn Backend>,
    /// Only built for the copy-worker.
    pub backup: Option<Arc<dyn Backend>>,
    pub repository: Arc<dyn FileRepository>,
    /// Only loaded for the verify-worker.
    pub key: Option<Arc<PrivateKey>>,
}

impl Resources {
    pub async fn build(config: &WorkerConfig) -> Result<Self> {
        tracing::info!("Initializing storage backends...");
        let archive = create_backend(&config.archive)
            .await
            .context("Failed to initialize archive storage")?;

        let backup = match &config.backup {
            Some(backup) => Some(
                create_backend(backup)
                    .await
                    .context("Failed to initialize backup storage")?,
            ),
            None => None,
        };

        tracing::info!(
            archive = ?archive.backend_type(),
            backup = ?backup.as_ref().map(|b| b.backend_type()),
            "Storage backends initialized"
        );

        let key = match &config.c4gh {
            Some(c4gh) => {
                let key = PrivateKey::load(&c4gh.key_path, &c4gh.passphrase).with_context(|| {
                    format!("Failed to load Crypt4GH key from {}", c4gh.key_path)
                })?;
                tracing::info!(key_path = %c4gh.key_path, "Crypt4GH key loaded");
                Some(Arc::new(key))
            }
            None => None,
        };

        let pool = connect(&config.database).await?;
        let retry = RetryPolicy::with_max_attempts(config.database.max_retries);
        let repository: Arc<dyn FileRepository> = Arc::new(PgFileRepository::new(pool, retry));

        Ok(Self {
            archive,
            backup,
            repository,
            key,
        })
    }
}

/// Run the worker `config.service` names against `broker` until the broker
/// connection is lost.
///
/// Only returns on a startup failure or when the subscription ends.
pub async fn run_worker(config: WorkerConfig, broker: Arc<dyn Broker>) -> Result<()> {
    config.validate().context("Configuration validation failed")?;
    init_telemetry(config.log_format).context("Failed to initialize telemetry")?;

    tracing::info!(
        service = %config.service,
        environment = %config.environment,
        queue = %config.broker.queue,
        "Configuration loaded and validated successfully"
    );

    let resources = Resources::build(&config).await?;
    let _watcher = watch_connection(broker.clone());

    match config.service {
        Service::Copy => {
            let backup = resources
                .backup
                .context("Copy worker requires a backup storage configuration")?;
            let unit = CopyWorker::new(resources.archive, backup, resources.repository);
            WorkerLoop::new(unit, broker, config.broker).run().await?;
        }
        Service::Verify => {
            let key = resources
                .key
                .context("Verify worker requires a Crypt4GH key configuration")?;
            let unit = VerifyWorker::new(resources.archive, resources.repository, key);
            WorkerLoop::new(unit, broker, config.broker).run().await?;
        }
    }

    Ok(())
}
