//! Pipeline wiring and the public facade host applications talk to.

pub mod config;
pub mod lifecycle;
pub mod logging;

pub use config::{BatchConfig, BatchSizeConfig, ConfigError, EngagementConfig, TelemetryConfig};
pub use lifecycle::{Lifecycle, LifecycleEvent};

use crate::buffer::{AssemblerHandle, EventAssembler, UserEngagement};
use crate::domain::event::names;
use crate::domain::{AppMeta, NetworkTypeProvider, NewLaunchFlag};
use crate::domain::meta::UnknownNetwork;
use crate::engine::{BatchEngine, EngineDeps, RetryConfig};
use crate::sender::{ClientConfig, HttpBatchSender, HttpClient, NoOpInterceptor, RequestInterceptor};
use crate::storage::{Counter, FileLedger, MemoryPressure, SledBatchStore, SledCounter};
use anyhow::Context;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Optional integration seams a host can plug in at startup.
pub struct TelemetryHooks {
    pub interceptor: Box<dyn RequestInterceptor>,
    pub network: Arc<dyn NetworkTypeProvider>,
}

impl Default for TelemetryHooks {
    fn default() -> Self {
        Self {
            interceptor: Box::new(NoOpInterceptor),
            network: Arc::new(UnknownNetwork),
        }
    }
}

/// The assembled pipeline: buffer, engine, sender, and storage, wired and
/// running. Dropping it does not stop the workers; call [`shutdown`].
///
/// [`shutdown`]: Telemetry::shutdown
pub struct Telemetry {
    assembler: AssemblerHandle,
    sender: Arc<HttpBatchSender>,
    lifecycle: Lifecycle,
    new_launch: NewLaunchFlag,
    shutdown: CancellationToken,
}

impl Telemetry {
    /// Builds and launches the pipeline. Must be called from within a tokio
    /// runtime; the worker tasks are spawned onto it.
    pub fn start(config: TelemetryConfig) -> anyhow::Result<Self> {
        Self::start_with(config, TelemetryHooks::default())
    }

    pub fn start_with(config: TelemetryConfig, hooks: TelemetryHooks) -> anyhow::Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.storage_dir)
            .with_context(|| format!("creating storage dir {:?}", config.storage_dir))?;

        let db = sled::open(config.storage_dir.join("batches"))
            .context("opening batch database")?;
        let store = SledBatchStore::with_db(db.clone()).context("opening batch tree")?;
        let counter: Arc<dyn Counter> =
            Arc::new(SledCounter::with_db(&db).context("opening counter tree")?);
        let ledger = FileLedger::new(&config.storage_dir, &config.api_key);
        let pressure = MemoryPressure::new();
        let new_launch = NewLaunchFlag::new(config.is_first_launch);
        let meta = AppMeta::new(config.meta.clone(), hooks.network, new_launch.clone());

        let client = HttpClient::new(ClientConfig {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            request_timeout: Duration::from_secs_f64(config.batch.request_timeout_secs),
            ..ClientConfig::default()
        })?;
        let sender = Arc::new(HttpBatchSender::with_interceptor(client, hooks.interceptor));

        let retry = RetryConfig {
            base_delay: Duration::from_secs_f64(config.batch.sending_delay_secs),
            ..RetryConfig::default()
        };

        let shutdown = CancellationToken::new();
        let engine = BatchEngine::spawn(
            EngineDeps {
                sender: Arc::clone(&sender),
                store: Box::new(store),
                ledger: Box::new(ledger),
                counter: Arc::clone(&counter),
                meta: Box::new(meta),
                pressure: pressure.clone(),
            },
            retry,
            config.batch_size.clone(),
            shutdown.child_token(),
        );

        let lifecycle = Lifecycle::new();
        let assembler = EventAssembler::spawn(
            engine,
            counter,
            pressure,
            &config.batch,
            &config.batch_size,
            &config.engagement,
            lifecycle.subscribe(),
            shutdown.child_token(),
        );

        if config.is_first_launch {
            let assembler = assembler.clone();
            tokio::spawn(async move {
                assembler.add_event(names::FIRST_OPEN, None).await;
            });
        }

        tracing::info!("telemetry pipeline started");
        Ok(Self {
            assembler,
            sender,
            lifecycle,
            new_launch,
            shutdown,
        })
    }

    /// Buffers an event for batched delivery.
    pub async fn add_event(&self, name: impl Into<String>, params: Option<Map<String, Value>>) {
        self.assembler.add_event(name, params).await;
    }

    /// Sends an event immediately as its own batch and reports the outcome.
    pub async fn log_event(&self, name: impl Into<String>, params: Option<Map<String, Value>>) -> bool {
        self.assembler.add_event_sync(name, params).await
    }

    /// Records a deep-link launch.
    pub async fn log_launch_url(&self, url: &str) {
        let mut params = Map::new();
        params.insert("link".to_string(), Value::from(url));
        self.assembler.add_event(names::OPEN_APP_WITH_LINK, Some(params)).await;
    }

    /// Replaces the common parameters merged into all later events.
    pub async fn set_common_parameters(&self, params: Map<String, Value>) {
        self.assembler.set_common_parameters(params).await;
    }

    /// Sets (or clears) the screen reported by the engagement timer.
    pub async fn set_user_engagement(&self, engagement: Option<UserEngagement>) {
        self.assembler.set_user_engagement(engagement).await;
    }

    /// Sets the authenticated user token injected into transmissions.
    pub fn set_user_token(&self, token: Option<String>) {
        use crate::sender::BatchSender;
        self.sender.set_user_token(token);
    }

    /// Updates the new-launch marker recorded in batch metadata.
    pub fn set_new_launch(&self, is_new_launch: bool) {
        self.new_launch.set(is_new_launch);
    }

    /// Lifecycle signals: forward enter-foreground / enter-background /
    /// will-terminate from the host UI layer here.
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Stops the workers. Buffered events are sealed and handed to the
    /// engine for persistence first; in-flight sends are not awaited.
    pub async fn shutdown(&self) {
        self.lifecycle.notify(LifecycleEvent::WillTerminate);
        self.assembler.seal().await;
        self.shutdown.cancel();
    }
}
