//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate configuration
//! - Initialize subsystems in dependency order
//! - Register the built-in re-login strategies
//! - Tear everything down in `dispose`
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Storage first, then sessions, cache and classifier, then the orchestrator
//!   and finally the façade that composes them
//! - Explicitly registered strategies and login flows replace the built-in ones

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use url::Url;

use crate::backends::{
    BookingApi, BookingCall, EnvelopeCall, IdentityApi, IdentityCall, IdentityLogin, PrimaryApi,
    RefreshTokenStrategy, TokenExchangeStrategy,
};
use crate::cache::CacheLayer;
use crate::classify::{Classifier, Rule};
use crate::config::{validate_config, AccessConfig, ConfigWatcher, ValidationError};
use crate::facade::{EventBus, RequestFacade};
use crate::lifecycle::shutdown::Shutdown;
use crate::reauth::{LoginFlow, ReauthOrchestrator, ReauthStrategy, StoredAccountStrategy};
use crate::session::{AccountStore, BackendId, SessionStore};
use crate::storage::{DurableStorage, FileStorage, StorageError};

/// Reasons the layer could not start.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))]
    Config(Vec<ValidationError>),

    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    #[error("{field} is not a valid URL: {source}")]
    Url {
        field: &'static str,
        source: url::ParseError,
    },

    #[error("HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

fn parse_url(field: &'static str, value: &str) -> Result<Url, StartupError> {
    Url::parse(value).map_err(|source| StartupError::Url { field, source })
}

/// Configures and builds an [`AccessLayer`].
pub struct AccessLayerBuilder {
    config: AccessConfig,
    storage: Option<Arc<dyn DurableStorage>>,
    strategies: Vec<(BackendId, Arc<dyn ReauthStrategy>)>,
    login_flows: Vec<(BackendId, Arc<dyn LoginFlow>)>,
    rules: Vec<Rule>,
}

impl AccessLayerBuilder {
    /// Use `storage` instead of the file named in the config.
    pub fn storage(mut self, storage: Arc<dyn DurableStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn strategy(mut self, backend: BackendId, strategy: Arc<dyn ReauthStrategy>) -> Self {
        self.strategies.push((backend, strategy));
        self
    }

    /// Re-login `backend` with its stored account through `flow`.
    pub fn login_flow(mut self, backend: BackendId, flow: Arc<dyn LoginFlow>) -> Self {
        self.login_flows.push((backend, flow));
        self
    }

    /// Append a custom classification rule.
    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub async fn build(self) -> Result<AccessLayer, StartupError> {
        let config = self.config;
        validate_config(&config).map_err(StartupError::Config)?;

        let storage = match self.storage {
            Some(storage) => storage,
            None => Arc::new(FileStorage::open(&config.storage.path).await?),
        };

        let sessions = Arc::new(
            SessionStore::init(storage.clone(), config.sessions.persisted.iter().copied()).await?,
        );
        let accounts = AccountStore::new(storage.clone());
        let cache = CacheLayer::new(storage.clone());
        let classifier = Arc::new(
            self.rules
                .into_iter()
                .fold(Classifier::new(config.classifier.clone()), Classifier::with_rule),
        );
        let events = EventBus::default();

        let primary = PrimaryApi::new(
            parse_url("backends.primary_url", &config.backends.primary_url)?,
            config.timeouts.request(),
            config.classifier.success_code.clone(),
        )?;
        let booking = BookingApi::new(
            parse_url("backends.booking_url", &config.backends.booking_url)?,
            config.timeouts.request(),
        )?;
        let identity = IdentityApi::new(
            parse_url("backends.identity_url", &config.backends.identity_url)?,
            config.timeouts.request(),
        )?;

        let mut orchestrator =
            ReauthOrchestrator::new(sessions.clone(), config.timeouts.relogin(), events.clone())
                .with_strategy(
                    BackendId::Primary,
                    Arc::new(RefreshTokenStrategy::new(
                        primary.clone(),
                        config.backends.refresh_path.clone(),
                        config.classifier.auth_codes.iter().cloned(),
                    )),
                )
                .with_strategy(
                    BackendId::Booking,
                    Arc::new(TokenExchangeStrategy::new(
                        parse_url("backends.sso_exchange_url", &config.backends.sso_exchange_url)?,
                        config.backends.exchange_token_param.clone(),
                        sessions.clone(),
                        config.timeouts.request(),
                    )?),
                )
                .with_strategy(
                    BackendId::Identity,
                    Arc::new(StoredAccountStrategy::new(
                        accounts.clone(),
                        Arc::new(IdentityLogin::new(
                            identity.clone(),
                            config.backends.identity_login_path.clone(),
                        )),
                    )),
                );
        for (backend, flow) in self.login_flows {
            orchestrator = orchestrator.with_strategy(
                backend,
                Arc::new(StoredAccountStrategy::new(accounts.clone(), flow)),
            );
        }
        for (backend, strategy) in self.strategies {
            orchestrator = orchestrator.with_strategy(backend, strategy);
        }
        let orchestrator = Arc::new(orchestrator);

        let facade = RequestFacade::new(
            sessions.clone(),
            cache.clone(),
            classifier.clone(),
            orchestrator.clone(),
            events.clone(),
        )
        .with_call_timeout(config.timeouts.request())
        .with_default_stale_time(Duration::from_secs(config.cache.stale_secs));

        tracing::info!(
            persisted = ?config.sessions.persisted,
            primary = %config.backends.primary_url,
            booking = %config.backends.booking_url,
            identity = %config.backends.identity_url,
            "Access layer initialized"
        );

        Ok(AccessLayer {
            config: ArcSwap::from_pointee(config),
            sessions,
            accounts,
            cache,
            classifier,
            orchestrator,
            facade,
            primary,
            booking,
            identity,
            events,
            shutdown: Shutdown::new(),
        })
    }
}

/// The assembled data-access layer, constructed once at app start.
pub struct AccessLayer {
    config: ArcSwap<AccessConfig>,
    sessions: Arc<SessionStore>,
    accounts: AccountStore,
    cache: CacheLayer,
    classifier: Arc<Classifier>,
    orchestrator: Arc<ReauthOrchestrator>,
    facade: RequestFacade,
    primary: PrimaryApi,
    booking: BookingApi,
    identity: IdentityApi,
    events: EventBus,
    shutdown: Shutdown,
}

impl AccessLayer {
    pub fn builder(config: AccessConfig) -> AccessLayerBuilder {
        AccessLayerBuilder {
            config,
            storage: None,
            strategies: Vec::new(),
            login_flows: Vec::new(),
            rules: Vec::new(),
        }
    }

    /// Build with defaults for everything not in `config`.
    pub async fn init(config: AccessConfig) -> Result<Self, StartupError> {
        Self::builder(config).build().await
    }

    pub fn config(&self) -> Arc<AccessConfig> {
        self.config.load_full()
    }

    pub fn facade(&self) -> &RequestFacade {
        &self.facade
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn accounts(&self) -> &AccountStore {
        &self.accounts
    }

    pub fn cache(&self) -> &CacheLayer {
        &self.cache
    }

    pub fn classifier(&self) -> &Arc<Classifier> {
        &self.classifier
    }

    pub fn orchestrator(&self) -> &Arc<ReauthOrchestrator> {
        &self.orchestrator
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// A call to the primary envelope API.
    pub fn primary_call<P, T>(&self, method: Method, path: &str) -> Arc<EnvelopeCall<P, T>> {
        Arc::new(EnvelopeCall::new(self.primary.clone(), method, path))
    }

    /// A call to the seat-booking service.
    pub fn booking_call<P, T>(&self, path: &str) -> Arc<BookingCall<P, T>>
    where
        P: Serialize,
        T: DeserializeOwned,
    {
        Arc::new(BookingCall::new(self.booking.clone(), path))
    }

    /// A call to the identity one-code service.
    pub fn identity_call<P, T>(&self, path: &str) -> Arc<IdentityCall<P, T>>
    where
        P: Serialize,
        T: DeserializeOwned,
    {
        Arc::new(IdentityCall::new(self.identity.clone(), path))
    }

    /// Apply a reloaded configuration.
    ///
    /// Classifier tables take effect immediately; other changed sections are
    /// reported and picked up on the next start.
    pub fn apply_config(&self, config: AccessConfig) {
        let current = self.config.load();
        self.classifier.reload(&config.classifier);

        let restart_needed = [
            ("storage", current.storage != config.storage),
            ("backends", current.backends != config.backends),
            ("sessions", current.sessions != config.sessions),
            ("timeouts", current.timeouts != config.timeouts),
            ("cache", current.cache != config.cache),
            ("observability", current.observability != config.observability),
        ];
        for (section, changed) in restart_needed {
            if changed {
                tracing::warn!(section, "Config section changed; takes effect after restart");
            }
        }
        self.config.store(Arc::new(config));
    }

    /// Watch `path` and apply every valid change until the layer is disposed.
    pub fn watch_config(self: &Arc<Self>, path: &Path) -> Result<JoinHandle<()>, notify::Error> {
        let mut updates = ConfigWatcher::new(path).spawn()?;
        let mut shutdown = self.shutdown.subscribe();
        let layer = Arc::clone(self);

        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = updates.recv() => match update {
                        Some(config) => layer.apply_config(config),
                        None => break,
                    },
                    _ = shutdown.recv() => break,
                }
            }
            tracing::debug!("Config watcher stopped");
        }))
    }

    /// Sign out of `backend`, or of every backend when `None`.
    pub async fn logout(&self, backend: Option<BackendId>) -> Result<(), StorageError> {
        match backend {
            Some(backend) => {
                self.sessions.clear(backend).await?;
                self.accounts.forget(backend).await?;
            }
            None => {
                self.sessions.clear_all().await?;
                for backend in BackendId::ALL {
                    self.accounts.forget(backend).await?;
                }
            }
        }
        Ok(())
    }

    /// Stop background tasks and flush durable state.
    pub async fn dispose(&self) -> Result<(), StorageError> {
        self.shutdown.trigger();
        self.cache.dispose().await;
        self.sessions.dispose().await?;
        tracing::info!("Access layer disposed");
        Ok(())
    }
}
