use super::chunk::split_events_by_max_bytes;
use crate::app::config::{BatchConfig, BatchSizeConfig, EngagementConfig};
use crate::app::lifecycle::LifecycleEvent;
use crate::domain::Event;
use crate::domain::event::{event_timestamp, names};
use crate::engine::EngineHandle;
use crate::storage::{Counter, MemoryPressure, keys};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, Interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const COMMAND_BUFFER: usize = 256;

/// Screen the user is currently engaged with; reported periodically as a
/// `user_engagement` event while set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEngagement {
    pub screen_name: String,
    pub text_size: Option<TextSize>,
}

/// Preferred text scaling reported alongside engagement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSize {
    Standard,
    Large,
    Small,
}

impl TextSize {
    fn raw(self) -> i64 {
        match self {
            Self::Standard => 0,
            Self::Large => 1,
            Self::Small => 2,
        }
    }
}

impl UserEngagement {
    fn params(&self) -> Map<String, Value> {
        let mut params = Map::new();
        params.insert("screen_name".to_string(), Value::from(self.screen_name.clone()));
        if let Some(text_size) = self.text_size {
            params.insert("text_size".to_string(), Value::from(text_size.raw()));
        }
        params
    }
}

enum BufferCommand {
    AddEvent {
        name: String,
        params: Option<Map<String, Value>>,
    },
    AddEventSync {
        name: String,
        params: Option<Map<String, Value>>,
        reply: oneshot::Sender<bool>,
    },
    SetCommonParameters(Map<String, Value>),
    SetUserEngagement(Option<UserEngagement>),
    Seal {
        ack: Option<oneshot::Sender<()>>,
    },
}

/// Cloneable handle onto the assembler's command queue.
#[derive(Clone)]
pub struct AssemblerHandle {
    tx: mpsc::Sender<BufferCommand>,
}

impl AssemblerHandle {
    /// Buffers an event; the buffer seals once the configured batch size is
    /// reached or the pressure flag is constrained.
    pub async fn add_event(&self, name: impl Into<String>, params: Option<Map<String, Value>>) {
        self.send(BufferCommand::AddEvent {
            name: name.into(),
            params,
        })
        .await;
    }

    /// Sends a single event immediately, bypassing the buffer, and resolves
    /// with the delivery outcome.
    pub async fn add_event_sync(
        &self,
        name: impl Into<String>,
        params: Option<Map<String, Value>>,
    ) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(BufferCommand::AddEventSync {
            name: name.into(),
            params,
            reply: reply_tx,
        })
        .await;
        reply_rx.await.unwrap_or(false)
    }

    /// Replaces the common parameters merged into all subsequently buffered
    /// events. Not retroactive.
    pub async fn set_common_parameters(&self, params: Map<String, Value>) {
        self.send(BufferCommand::SetCommonParameters(params)).await;
    }

    pub async fn set_user_engagement(&self, engagement: Option<UserEngagement>) {
        self.send(BufferCommand::SetUserEngagement(engagement)).await;
    }

    /// Forces the buffer to seal whatever it currently holds; resolves once
    /// the sealed batches have been handed to the engine.
    pub async fn seal(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(BufferCommand::Seal { ack: Some(ack_tx) }).await;
        let _ = ack_rx.await;
    }

    async fn send(&self, command: BufferCommand) {
        if self.tx.send(command).await.is_err() {
            warn!("event assembler is gone, dropping command");
        }
    }
}

pub struct EventAssembler {
    engine: EngineHandle,
    counter: Arc<dyn Counter>,
    pressure: MemoryPressure,
    batch_size: usize,
    max_batch_bytes: usize,
    seal_interval: Duration,
    engagement_interval: Duration,
    events: Vec<Event>,
    common: Map<String, Value>,
    engagement: Option<UserEngagement>,
}

impl EventAssembler {
    pub fn spawn(
        engine: EngineHandle,
        counter: Arc<dyn Counter>,
        pressure: MemoryPressure,
        batch: &BatchConfig,
        sizes: &BatchSizeConfig,
        engagement: &EngagementConfig,
        lifecycle: broadcast::Receiver<LifecycleEvent>,
        shutdown: CancellationToken,
    ) -> AssemblerHandle {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let assembler = Self {
            engine,
            counter,
            pressure,
            batch_size: batch.size,
            max_batch_bytes: sizes.max_batch_bytes(),
            seal_interval: Duration::from_secs_f64(batch.sending_timer_interval_secs),
            engagement_interval: Duration::from_secs_f64(engagement.timer_interval_secs),
            events: Vec::new(),
            common: Map::new(),
            engagement: None,
        };
        tokio::spawn(assembler.run(rx, lifecycle, shutdown));
        AssemblerHandle { tx }
    }

    async fn run(
        mut self,
        mut rx: mpsc::Receiver<BufferCommand>,
        lifecycle: broadcast::Receiver<LifecycleEvent>,
        shutdown: CancellationToken,
    ) {
        let mut lifecycle = Some(lifecycle);
        let mut seal_timer = Some(delayed_interval(self.seal_interval));
        let mut engagement_timer = Some(delayed_interval(self.engagement_interval));

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    self.seal().await;
                    debug!("event assembler shutting down");
                    break;
                }
                command = rx.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                event = next_lifecycle(&mut lifecycle) => {
                    self.handle_lifecycle(event, &mut seal_timer, &mut engagement_timer).await;
                }
                _ = maybe_tick(&mut seal_timer) => {
                    debug!("scheduled batch sealing");
                    self.seal().await;
                }
                _ = maybe_tick(&mut engagement_timer) => self.engagement_tick().await,
            }
        }
    }

    async fn handle(&mut self, command: BufferCommand) {
        match command {
            BufferCommand::AddEvent { name, params } => self.process_event(&name, params).await,
            BufferCommand::AddEventSync { name, params, reply } => {
                let event = self.build_event(&name, params);
                let engine = self.engine.clone();
                // Resolve off the buffer loop so slow sends don't stall it.
                tokio::spawn(async move {
                    let success = engine.send_event_sync(event).await;
                    let _ = reply.send(success);
                });
            }
            BufferCommand::SetCommonParameters(params) => {
                debug!("setting {} common parameters", params.len());
                self.common = params;
            }
            BufferCommand::SetUserEngagement(engagement) => self.engagement = engagement,
            BufferCommand::Seal { ack } => {
                self.seal().await;
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
            }
        }
    }

    async fn handle_lifecycle(
        &mut self,
        event: LifecycleEvent,
        seal_timer: &mut Option<Interval>,
        engagement_timer: &mut Option<Interval>,
    ) {
        debug!("lifecycle signal: {event:?}");
        match event {
            LifecycleEvent::EnterForeground => {
                *seal_timer = Some(delayed_interval(self.seal_interval));
                *engagement_timer = Some(delayed_interval(self.engagement_interval));
            }
            LifecycleEvent::EnterBackground | LifecycleEvent::WillTerminate => {
                *seal_timer = None;
                *engagement_timer = None;
                self.seal().await;
            }
        }
    }

    fn build_event(&self, name: &str, params: Option<Map<String, Value>>) -> Event {
        let mut data = params.unwrap_or_default();
        // Explicit event parameters win over common ones.
        for (key, value) in &self.common {
            data.entry(key.clone()).or_insert_with(|| value.clone());
        }
        let event_num = self.counter.incremented_count(keys::EVENT_NUM);
        Event::new(name, data, event_timestamp(), event_num)
    }

    async fn process_event(&mut self, name: &str, params: Option<Map<String, Value>>) {
        let event = self.build_event(name, params);
        debug!("buffered event {} (#{})", event.name, event.event_num);
        self.events.push(event);

        if self.events.len() >= self.batch_size || self.pressure.is_constrained() {
            self.seal().await;
        }
    }

    async fn engagement_tick(&mut self) {
        if let Some(engagement) = self.engagement.clone() {
            self.process_event(names::USER_ENGAGEMENT, Some(engagement.params()))
                .await;
        }
    }

    async fn seal(&mut self) {
        if self.events.is_empty() {
            debug!("no events to make a batch, skipping");
            return;
        }
        let events = std::mem::take(&mut self.events);
        for chunk in split_events_by_max_bytes(events, self.max_batch_bytes) {
            self.engine.add_batch(chunk).await;
        }
    }
}

/// Interval whose first tick fires one period from now, not immediately.
fn delayed_interval(period: Duration) -> Interval {
    tokio::time::interval_at(Instant::now() + period, period)
}

async fn maybe_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn next_lifecycle(
    rx: &mut Option<broadcast::Receiver<LifecycleEvent>>,
) -> LifecycleEvent {
    loop {
        match rx {
            Some(receiver) => match receiver.recv().await {
                Ok(event) => return event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("skipped {skipped} lifecycle signals");
                }
                Err(RecvError::Closed) => *rx = None,
            },
            None => std::future::pending().await,
        }
    }
}
