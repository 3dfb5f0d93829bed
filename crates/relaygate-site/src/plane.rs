//! Assembly of the site control plane from its configuration.

use std::sync::Arc;
use std::time::Duration;

use relaygate_core::SiteConfig;
use relaygate_core::db::DatabaseError;
use relaygate_crypto::{CaBundle, CertError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tonic::transport::ServerTlsConfig;
use tracing::info;

use crate::certs::CertRetriever;
use crate::forward::ForwardMonitoringDataHandler;
use crate::relays::RelaysRepository;
use crate::server::{MonitoringDataService, RelayRegistrationService, RelayTaskService};
use crate::storage::SiteDatabase;
use crate::sync::{ConfigSyncTaskProducer, spawn_serial_watcher};
use crate::tasks::{Clock, SystemClock, TaskError, TaskLimits, TasksRepository, spawn_task_sweeper};
use crate::tls::{TlsConfigError, TlsMode};

#[derive(Debug, thiserror::Error)]
pub enum PlaneError {
    #[error(transparent)]
    Config(#[from] relaygate_core::Error),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Relay CA error: {0}")]
    Ca(#[from] CertError),

    #[error(transparent)]
    Tasks(#[from] TaskError),
}

/// Every long-lived component of the site, wired together.
#[derive(Debug)]
pub struct ControlPlane {
    config: SiteConfig,
    relays: RelaysRepository,
    tasks: Arc<TasksRepository>,
    certs: Arc<CertRetriever>,
    forwarder: Arc<ForwardMonitoringDataHandler>,
}

impl ControlPlane {
    /// Open the database and load the relay CA at the configured locations.
    pub async fn open(config: SiteConfig) -> Result<Self, PlaneError> {
        let db_path = config.database_path()?;
        let ca_dir = config.ca_dir()?;
        info!(db = %db_path.display(), ca_dir = %ca_dir.display(), "Opening site control plane");

        let db = SiteDatabase::open(&db_path).await?;
        let ca = CaBundle::load_from_dir(&ca_dir)?;
        Self::from_parts(config, db, ca, Arc::new(SystemClock))
    }

    pub fn from_parts(
        config: SiteConfig,
        db: SiteDatabase,
        ca: CaBundle,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, PlaneError> {
        config.validate()?;

        let tasks = Arc::new(TasksRepository::new(
            db.clone(),
            TaskLimits::from(&config.tasks),
            clock,
        )?);
        let relays = RelaysRepository::new(db, Arc::clone(&tasks));
        let forwarder = Arc::new(ForwardMonitoringDataHandler::new(
            config.monitoring_socket_path()?,
            config.forwarding.timeout(),
        ));

        Ok(Self {
            config,
            relays,
            tasks,
            certs: Arc::new(CertRetriever::new(ca)),
            forwarder,
        })
    }

    pub const fn config(&self) -> &SiteConfig {
        &self.config
    }

    pub const fn relays(&self) -> &RelaysRepository {
        &self.relays
    }

    pub const fn tasks(&self) -> &Arc<TasksRepository> {
        &self.tasks
    }

    pub const fn certs(&self) -> &Arc<CertRetriever> {
        &self.certs
    }

    pub const fn forwarder(&self) -> &Arc<ForwardMonitoringDataHandler> {
        &self.forwarder
    }

    pub fn registration_service(&self) -> RelayRegistrationService {
        RelayRegistrationService::new(self.relays.clone(), Arc::clone(&self.certs))
    }

    pub fn task_service(&self) -> RelayTaskService {
        RelayTaskService::new(self.relays.clone(), Arc::clone(&self.tasks))
    }

    pub fn monitoring_service(&self) -> MonitoringDataService {
        MonitoringDataService::new(self.relays.clone(), Arc::clone(&self.forwarder))
    }

    pub fn config_sync(&self) -> ConfigSyncTaskProducer {
        ConfigSyncTaskProducer::new(self.relays.clone(), Arc::clone(&self.tasks))
    }

    /// Server TLS that presents `mode`'s identity and requires relay
    /// certificates issued by the relay CA.
    pub fn tls_config(&self, mode: &TlsMode) -> Result<Option<ServerTlsConfig>, TlsConfigError> {
        mode.to_server_tls_config(self.certs.ca())
    }

    /// Spawn the task sweeper, the config serial watcher and the config sync
    /// producer. All of them stop when `shutdown` changes.
    pub fn start_background(
        &self,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<Vec<JoinHandle<()>>, PlaneError> {
        let sweeper = spawn_task_sweeper(
            Arc::clone(&self.tasks),
            Duration::from_secs(self.config.tasks.sweep_interval_secs),
            shutdown.clone(),
        );

        let (serial_tx, serial_rx) = watch::channel(None);
        let watcher = spawn_serial_watcher(
            self.config.config_serial_path()?,
            Duration::from_secs(self.config.sync.poll_interval_secs),
            serial_tx,
            shutdown.clone(),
        );
        let producer = self.config_sync().spawn(serial_rx, shutdown.clone());

        Ok(vec![sweeper, watcher, producer])
    }
}
