//! Migration orchestrator - owns connections, state and the step lifecycle
//!
//! Every step method follows the same shape: check prerequisites, persist
//! `in_progress`, run the pipeline with a persisting progress tracker, then
//! persist `completed` (with the output artifact) or `failed` (with the error).
//! Per-record failures inside a pipeline do not fail the step.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, warn};

use super::lock::StateLock;
use super::mapping::{Mapping, MappingStats};
use super::pipelines::{
    self, AssetExport, ImportOptions, ImportStats, MembershipExport, MembershipStats,
};
use super::progress::{LoggingReporter, ProgressEvent, ProgressReporter, ProgressTracker};
use super::resume::{existing_mapping, recorded_mapping, MappingSource};
use super::state::{MigrationState, StateStore, StepName};
use crate::services::archive::load_compressed;
use crate::services::client::auth::login;
use crate::services::client::{DestinationApi, MatrixClient, WhoAmIResponse};
use crate::services::config::{Config, ConfigError};
use crate::services::errors::{MigrationError, MigrationResult};
use crate::services::source::config_reader::discover_credentials;
use crate::services::source::{
    Assets, DatabaseCredentials, Memberships, PostgresSource, SourceProvider,
};
use crate::services::tunnel::{SshTransport, Transport, TunnelManager};

const SOURCE_TUNNEL: &str = "mattermost";
const DESTINATION_TUNNEL: &str = "matrix";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetImportReport {
    /// Mapping generation written by this run
    pub output_file: PathBuf,
    pub stats: ImportStats,
    pub resumed_from: MappingSource,
    pub mapping: MappingStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MembershipImportReport {
    pub stats: MembershipStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceDiagnostics {
    pub users: i64,
    pub teams: i64,
    pub channels: i64,
}

pub struct Orchestrator {
    config: Config,
    store: StateStore,
    state: MigrationState,
    tunnels: TunnelManager,
    source: Option<Box<dyn SourceProvider>>,
    destination: Option<Box<dyn DestinationApi>>,
    reporter: Arc<dyn ProgressReporter>,
    _lock: StateLock,
}

impl Orchestrator {
    /// Takes the state-file lock and loads (or starts) the migration state
    pub async fn open(config: Config) -> MigrationResult<Self> {
        let lock = StateLock::acquire(&config.data.state_file)?;
        let store = StateStore::new(&config.data.state_file);
        let state = store
            .load()
            .await
            .map_err(|e| MigrationError::from(e).with_context("loading migration state"))?;
        info!(
            "[Orchestrator] State loaded from {} ({} steps recorded)",
            store.path().display(),
            state.steps.len()
        );

        Ok(Self {
            config,
            store,
            state,
            tunnels: TunnelManager::new(),
            source: None,
            destination: None,
            reporter: Arc::new(LoggingReporter),
            _lock: lock,
        })
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> &MigrationState {
        &self.state
    }

    pub fn state_file(&self) -> &Path {
        self.store.path()
    }

    /// Use an already connected source instead of [`connect_source`](Self::connect_source)
    pub fn attach_source(&mut self, source: Box<dyn SourceProvider>) {
        self.source = Some(source);
    }

    /// Use an already authenticated destination instead of
    /// [`connect_destination`](Self::connect_destination)
    pub fn attach_destination(&mut self, destination: Box<dyn DestinationApi>) {
        self.destination = Some(destination);
    }

    pub fn is_source_connected(&self) -> bool {
        self.source.is_some()
    }

    pub fn is_destination_connected(&self) -> bool {
        self.destination.is_some()
    }

    fn source_transport(&self) -> Option<SshTransport> {
        let ssh = &self.config.mattermost.ssh;
        ssh.is_configured().then(|| SshTransport::from_config(ssh))
    }

    fn destination_transport(&self) -> Option<SshTransport> {
        let ssh = &self.config.matrix.ssh;
        ssh.is_configured().then(|| SshTransport::from_config(ssh))
    }

    async fn source_credentials(
        &self,
        transport: Option<&SshTransport>,
    ) -> MigrationResult<DatabaseCredentials> {
        let mattermost = &self.config.mattermost;
        if self.config.has_manual_database_config() {
            return Ok(DatabaseCredentials {
                host: mattermost.database.host.clone(),
                port: mattermost.database.port,
                database: mattermost.database.name.clone(),
                user: mattermost.database.user.clone(),
                password: self.config.mattermost_db_password().unwrap_or_default(),
                ..DatabaseCredentials::default()
            });
        }

        match transport {
            Some(transport) => {
                Ok(discover_credentials(transport, &mattermost.config_path).await?)
            }
            None => Err(ConfigError::Invalid {
                field: "mattermost.database".to_string(),
                message: "host, name and user are required when mattermost.ssh.host is empty"
                    .to_string(),
            }
            .into()),
        }
    }

    /// Open the source database, through an SSH tunnel when one is configured
    pub async fn connect_source(&mut self) -> MigrationResult<()> {
        let transport = self.source_transport();
        let mut credentials = self.source_credentials(transport.as_ref()).await?;
        let remote = format!("{}:{}", credentials.host, credentials.port);

        if let Some(transport) = &transport {
            let local = self
                .tunnels
                .create(SOURCE_TUNNEL, transport, &credentials.host, credentials.port)
                .await?;
            credentials.host = local.ip().to_string();
            credentials.port = local.port();
        }

        let source = match PostgresSource::connect(&credentials).await {
            Ok(source) => source,
            Err(e) => {
                if let Err(close_err) = self.tunnels.close(SOURCE_TUNNEL).await {
                    warn!("[Orchestrator] Failed to close source tunnel: {}", close_err);
                }
                return Err(e.into());
            }
        };

        info!("[Orchestrator] Connected to Mattermost database {}", remote);
        self.state.mattermost_host = if self.config.mattermost.ssh.is_configured() {
            self.config.mattermost.ssh.host.clone()
        } else {
            credentials.host.clone()
        };
        self.source = Some(Box::new(source));
        Ok(())
    }

    async fn access_token(&self, base_url: &str) -> MigrationResult<String> {
        if let Some(token) = self.config.matrix_admin_token() {
            return Ok(token);
        }

        let auth = &self.config.matrix.auth;
        let password = self
            .config
            .matrix_password()
            .ok_or_else(|| ConfigError::MissingSecret {
                field: "matrix.auth.password_env".to_string(),
                var: auth.password_env.clone(),
            })?;

        let session = login(base_url, &auth.username, &password)
            .await
            .map_err(|e| MigrationError::Authentication {
                message: e.to_string(),
            })?;
        info!("[Orchestrator] Logged in to Matrix as {}", session.user_id);
        Ok(session.access_token)
    }

    async fn build_destination(&self, base_url: &str) -> MigrationResult<MatrixClient> {
        let matrix = &self.config.matrix;
        let token = self.access_token(base_url).await?;
        let mut client = MatrixClient::new(
            base_url,
            &token,
            &matrix.homeserver,
            matrix.rate_limit.to_rate_limit(),
            matrix.rate_limit.request_timeout(),
        )?;

        let whoami = client.whoami().await.map_err(|e| MigrationError::Authentication {
            message: format!("identity check failed: {}", e),
        })?;

        match whoami.server_name() {
            Some(detected) if detected != matrix.homeserver => {
                info!(
                    "[Orchestrator] Detected homeserver '{}' differs from configured '{}', using detected value",
                    detected, matrix.homeserver
                );
                client.set_homeserver(detected);
            }
            Some(_) => {}
            None => warn!(
                "[Orchestrator] Could not detect homeserver from '{}', using configured '{}'",
                whoami.user_id, matrix.homeserver
            ),
        }

        Ok(client)
    }

    /// Authenticate against the homeserver API, tunnelled when configured
    pub async fn connect_destination(&mut self) -> MigrationResult<()> {
        let base_url = match self.destination_transport() {
            Some(transport) => {
                let local = self
                    .tunnels
                    .create(
                        DESTINATION_TUNNEL,
                        &transport,
                        "127.0.0.1",
                        self.config.matrix.api.remote_port,
                    )
                    .await?;
                format!("http://{}", local)
            }
            None => self.config.matrix_api_url(),
        };

        let client = match self.build_destination(&base_url).await {
            Ok(client) => client,
            Err(e) => {
                if let Err(close_err) = self.tunnels.close(DESTINATION_TUNNEL).await {
                    warn!("[Orchestrator] Failed to close destination tunnel: {}", close_err);
                }
                return Err(e);
            }
        };

        info!(
            "[Orchestrator] Connected to Matrix at {} (homeserver {})",
            base_url,
            client.homeserver()
        );
        self.state.matrix_host = if self.config.matrix.ssh.is_configured() {
            self.config.matrix.ssh.host.clone()
        } else {
            base_url
        };
        self.destination = Some(Box::new(client));
        Ok(())
    }

    pub async fn export_assets(&mut self) -> MigrationResult<AssetExport> {
        let step = StepName::ExportAssets;
        let source = self.source.as_deref().ok_or_else(|| not_connected("Mattermost"))?;
        begin_step(&mut self.state, &self.store, self.reporter.as_ref(), step).await?;

        let result = {
            let mut tracker = ProgressTracker::persisted(
                step,
                self.reporter.as_ref(),
                &mut self.state,
                &self.store,
            );
            pipelines::export_assets(source, &self.config.data.assets_dir, &mut tracker).await
        };

        let outcome = result.as_ref().map(|export| Some(export.output_file.clone()));
        finish_step(&mut self.state, &self.store, self.reporter.as_ref(), step, outcome).await?;
        result
    }

    pub async fn import_assets(&mut self) -> MigrationResult<AssetImportReport> {
        let step = StepName::ImportAssets;
        let destination = self
            .destination
            .as_deref()
            .ok_or_else(|| not_connected("Matrix"))?;
        self.state.ensure_can_run(step)?;
        let asset_file = self
            .state
            .output_file(StepName::ExportAssets)
            .map(Path::to_path_buf)
            .ok_or_else(|| MigrationError::MigrationStep {
                step: step.to_string(),
                reason: "no asset file recorded by export_assets".to_string(),
            })?;
        begin_step(&mut self.state, &self.store, self.reporter.as_ref(), step).await?;

        let result = run_asset_import(
            destination,
            &asset_file,
            &self.config,
            &mut self.state,
            &self.store,
            self.reporter.as_ref(),
        )
        .await;

        let outcome = result.as_ref().map(|report| Some(report.output_file.clone()));
        finish_step(&mut self.state, &self.store, self.reporter.as_ref(), step, outcome).await?;
        result
    }

    pub async fn export_memberships(&mut self) -> MigrationResult<MembershipExport> {
        let step = StepName::ExportMemberships;
        let source = self.source.as_deref().ok_or_else(|| not_connected("Mattermost"))?;
        begin_step(&mut self.state, &self.store, self.reporter.as_ref(), step).await?;

        let result = {
            let mut tracker = ProgressTracker::persisted(
                step,
                self.reporter.as_ref(),
                &mut self.state,
                &self.store,
            );
            pipelines::export_memberships(source, &self.config.data.assets_dir, &mut tracker)
                .await
        };

        let outcome = result.as_ref().map(|export| Some(export.output_file.clone()));
        finish_step(&mut self.state, &self.store, self.reporter.as_ref(), step, outcome).await?;
        result
    }

    pub async fn import_memberships(&mut self) -> MigrationResult<MembershipImportReport> {
        let step = StepName::ImportMemberships;
        let destination = self
            .destination
            .as_deref()
            .ok_or_else(|| not_connected("Matrix"))?;
        self.state.ensure_can_run(step)?;
        let membership_file = self
            .state
            .output_file(StepName::ExportMemberships)
            .map(Path::to_path_buf)
            .ok_or_else(|| MigrationError::MigrationStep {
                step: step.to_string(),
                reason: "no membership file recorded by export_memberships".to_string(),
            })?;
        begin_step(&mut self.state, &self.store, self.reporter.as_ref(), step).await?;

        let result = run_membership_import(
            destination,
            &membership_file,
            &mut self.state,
            &self.store,
            self.reporter.as_ref(),
        )
        .await;

        let outcome = result.as_ref().map(|_| None);
        finish_step(&mut self.state, &self.store, self.reporter.as_ref(), step, outcome).await?;
        result
    }

    /// Mark a step as handled without running it
    pub async fn skip_step(&mut self, step: StepName, reason: &str) -> MigrationResult<()> {
        self.state.skip_step(step, reason);
        self.store
            .save(&self.state)
            .await
            .map_err(|e| MigrationError::from(e).with_context("saving migration state"))?;
        info!("[Orchestrator] Skipped {}: {}", step, reason);
        self.reporter.report(ProgressEvent::StepCompleted {
            step,
            output_file: None,
        });
        Ok(())
    }

    /// SSH handshake, credential discovery and a database round trip
    pub async fn test_source_connection(&mut self) -> MigrationResult<SourceDiagnostics> {
        if let Some(transport) = self.source_transport() {
            transport.test_connection().await?;
            info!("[Orchestrator] SSH connection to {} OK", transport.describe());
        }

        if !self.is_source_connected() {
            self.connect_source().await?;
        }
        let source = self.source.as_deref().ok_or_else(|| not_connected("Mattermost"))?;
        source.ping().await?;

        Ok(SourceDiagnostics {
            users: source.count_users().await?,
            teams: source.count_teams().await?,
            channels: source.count_channels().await?,
        })
    }

    /// SSH handshake, authentication and a who-am-I round trip
    pub async fn test_destination_connection(&mut self) -> MigrationResult<WhoAmIResponse> {
        if let Some(transport) = self.destination_transport() {
            transport.test_connection().await?;
            info!("[Orchestrator] SSH connection to {} OK", transport.describe());
        }

        if !self.is_destination_connected() {
            self.connect_destination().await?;
        }
        let destination = self
            .destination
            .as_deref()
            .ok_or_else(|| not_connected("Matrix"))?;
        Ok(destination.whoami().await?)
    }

    /// Close the database pool and every tunnel. The state lock is released
    /// when the orchestrator is dropped.
    pub async fn close(&mut self) {
        if let Some(source) = self.source.take() {
            source.close().await;
        }
        self.destination = None;
        self.tunnels.close_all().await;
    }
}

fn not_connected(component: &str) -> MigrationError {
    MigrationError::NotConnected {
        component: component.to_string(),
    }
}

async fn begin_step(
    state: &mut MigrationState,
    store: &StateStore,
    reporter: &dyn ProgressReporter,
    step: StepName,
) -> MigrationResult<()> {
    state.ensure_can_run(step)?;
    state.start_step(step);
    store
        .save(state)
        .await
        .map_err(|e| MigrationError::from(e).with_context("saving migration state"))?;
    info!("[Orchestrator] Starting {}", step);
    reporter.report(ProgressEvent::StepStarted { step });
    Ok(())
}

/// Records the pipeline outcome. A pipeline error is persisted as `failed`
/// and left for the caller to return; only a failure to save a completed
/// step is reported from here.
async fn finish_step(
    state: &mut MigrationState,
    store: &StateStore,
    reporter: &dyn ProgressReporter,
    step: StepName,
    outcome: Result<Option<PathBuf>, &MigrationError>,
) -> MigrationResult<()> {
    match outcome {
        Ok(output_file) => {
            state.complete_step(step, output_file.clone());
            store
                .save(state)
                .await
                .map_err(|e| MigrationError::from(e).with_context("saving migration state"))?;
            info!("[Orchestrator] Completed {}", step);
            reporter.report(ProgressEvent::StepCompleted {
                step,
                output_file: output_file.map(|path| path.display().to_string()),
            });
        }
        Err(err) => {
            let message = err.to_string();
            state.fail_step(step, &message);
            if let Err(save_err) = store.save(state).await {
                error!(
                    "[Orchestrator] Could not persist failure of {}: {}",
                    step, save_err
                );
            }
            error!("[Orchestrator] {} failed: {}", step, message);
            reporter.report(ProgressEvent::StepFailed {
                step,
                error: message,
            });
        }
    }
    Ok(())
}

async fn run_asset_import(
    destination: &dyn DestinationApi,
    asset_file: &Path,
    config: &Config,
    state: &mut MigrationState,
    store: &StateStore,
    reporter: &dyn ProgressReporter,
) -> MigrationResult<AssetImportReport> {
    let assets: Assets = load_compressed(asset_file)
        .await
        .map_err(|e| MigrationError::from(e).with_context("loading asset export"))?;

    let (mut mapping, resumed_from) =
        existing_mapping(state, &config.data.mappings_dir, destination.homeserver()).await?;
    info!("[Orchestrator] Deduplicating against {}", resumed_from);

    let mut tracker = ProgressTracker::persisted(StepName::ImportAssets, reporter, state, store);
    let options = ImportOptions {
        room_aliases: config.matrix.room_aliases,
    };
    let import =
        pipelines::import_assets(destination, &assets, &mut mapping, options, &mut tracker).await;

    let output_file = Mapping::generate_filename(&config.data.mappings_dir);
    mapping
        .save(&output_file)
        .await
        .map_err(|e| MigrationError::from(e).with_context("saving mapping"))?;
    info!("[Orchestrator] Mapping written to {}", output_file.display());

    let mut stats = import.stats;
    stats.links = pipelines::link_rooms_to_spaces(
        destination,
        &assets.channels,
        &mapping,
        &import.fresh,
        &mut tracker,
    )
    .await;

    Ok(AssetImportReport {
        output_file,
        stats,
        resumed_from,
        mapping: mapping.stats(),
    })
}

async fn run_membership_import(
    destination: &dyn DestinationApi,
    membership_file: &Path,
    state: &mut MigrationState,
    store: &StateStore,
    reporter: &dyn ProgressReporter,
) -> MigrationResult<MembershipImportReport> {
    let memberships: Memberships = load_compressed(membership_file)
        .await
        .map_err(|e| MigrationError::from(e).with_context("loading membership export"))?;
    let (mapping, mapping_file) = recorded_mapping(state).await?;
    info!("[Orchestrator] Resolving memberships via {}", mapping_file.display());

    let mut tracker =
        ProgressTracker::persisted(StepName::ImportMemberships, reporter, state, store);
    let stats =
        pipelines::import_memberships(destination, &memberships, &mapping, &mut tracker).await;

    Ok(MembershipImportReport { stats })
}
