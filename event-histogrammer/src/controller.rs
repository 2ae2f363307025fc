//! Acquisition state machine: coordinates the allocator, the per-channel
//! ingestion tasks, and the snapshot publisher.

use crate::{
    accumulator::EngineCore,
    error::{ConnectionError, DataError, StartError},
    publisher::PublisherCommand,
    stats::{self, StatsThrottle},
};
use metrics::{counter, gauge};
use ned_common::{
    ChannelId, EventBatch, TimeOfFlight,
    metrics::{
        batches_received::{self, BatchKind},
        failures::{self, FailureKind},
        names,
    },
};
use std::{
    future::Future,
    sync::{Arc, Mutex as StdMutex},
    time::{Duration, Instant},
};
use tokio::{
    sync::{Mutex, watch},
    task::JoinSet,
};
use tracing::{info, warn};

/// A live stream of event batches for one channel. `recv` resolves to `None`
/// when the stream ends.
pub(crate) trait EventSubscription: Send + 'static {
    fn recv(&mut self) -> impl Future<Output = Option<EventBatch>> + Send;
}

/// Transport factory: opens one subscription per configured channel.
/// Connection setup is allowed to block briefly, bounded by `timeout`.
pub(crate) trait ChannelProvider: Send + Sync + 'static {
    type Subscription: EventSubscription;

    fn connect(
        &self,
        name: &str,
        timeout: Duration,
    ) -> Result<Self::Subscription, ConnectionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AcquisitionState {
    Idle,
    Starting,
    Acquiring,
    Stopping,
    Error,
}

impl AcquisitionState {
    fn as_gauge(self) -> f64 {
        match self {
            AcquisitionState::Idle => 0.0,
            AcquisitionState::Starting => 1.0,
            AcquisitionState::Acquiring => 2.0,
            AcquisitionState::Stopping => 3.0,
            AcquisitionState::Error => 4.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ControllerStatus {
    pub(crate) state: AcquisitionState,
    pub(crate) message: String,
}

pub(crate) struct AcquisitionController<P: ChannelProvider> {
    engine: Arc<Mutex<EngineCore>>,
    provider: P,
    channel_names: Vec<String>,
    tof_max: TimeOfFlight,
    connect_timeout: Duration,
    publisher: watch::Sender<PublisherCommand>,
    throttle: Arc<StdMutex<StatsThrottle>>,
    state: AcquisitionState,
    message: String,
    tasks: JoinSet<()>,
    stop_ingestion: Option<watch::Sender<bool>>,
}

impl<P: ChannelProvider> AcquisitionController<P> {
    pub(crate) fn new(
        engine: Arc<Mutex<EngineCore>>,
        provider: P,
        channel_names: Vec<String>,
        tof_max: TimeOfFlight,
        connect_timeout: Duration,
        publisher: watch::Sender<PublisherCommand>,
        throttle: Arc<StdMutex<StatsThrottle>>,
    ) -> Self {
        Self {
            engine,
            provider,
            channel_names,
            tof_max,
            connect_timeout,
            publisher,
            throttle,
            state: AcquisitionState::Idle,
            message: String::new(),
            tasks: JoinSet::new(),
            stop_ingestion: None,
        }
    }

    pub(crate) fn status(&self) -> ControllerStatus {
        ControllerStatus {
            state: self.state,
            message: self.message.clone(),
        }
    }

    fn set_state(&mut self, state: AcquisitionState, message: impl Into<String>) {
        self.state = state;
        self.message = message.into();
        gauge!(names::ACQUISITION_STATE).set(state.as_gauge());
    }

    /// Begin an acquisition. Valid from `Idle` and `Error`; a no-op from any
    /// other state. Setup failure lands in the recoverable `Error` state with
    /// the publisher halted.
    pub(crate) async fn start(&mut self) -> Result<(), StartError> {
        if !matches!(self.state, AcquisitionState::Idle | AcquisitionState::Error) {
            return Ok(());
        }
        self.set_state(AcquisitionState::Starting, "starting acquisition");

        match self.try_start().await {
            Ok(()) => {
                self.engine.lock().await.set_acquiring(true);
                let _ = self.publisher.send(PublisherCommand::Run);
                if let Ok(mut throttle) = self.throttle.lock() {
                    throttle.restart(Instant::now());
                }
                self.set_state(AcquisitionState::Acquiring, "acquiring");
                info!("acquisition started");
                Ok(())
            }
            Err(e) => {
                let _ = self.publisher.send(PublisherCommand::Halt);
                counter!(
                    names::FAILURES,
                    &vec![failures::get_label(FailureKind::ConnectionFailed)]
                )
                .increment(1);
                self.set_state(AcquisitionState::Error, e.to_string());
                warn!("acquisition start failed: {e}");
                Err(e)
            }
        }
    }

    async fn try_start(&mut self) -> Result<(), StartError> {
        {
            let mut core = self.engine.lock().await;
            if core.needs_reallocation() {
                core.reallocate(self.tof_max)?;
            }
            core.reset_for_start();
            gauge!(names::BUFFER_SIZE).set(core.buffer.layout().total_size() as f64);
        }

        // Open every subscription before spawning anything, so a late
        // connect failure leaves no ingestion running.
        let mut subscriptions = Vec::with_capacity(self.channel_names.len());
        for name in &self.channel_names {
            subscriptions.push(self.provider.connect(name, self.connect_timeout)?);
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        for (channel, subscription) in subscriptions.into_iter().enumerate() {
            self.tasks.spawn(ingest(
                subscription,
                channel,
                Arc::clone(&self.engine),
                Arc::clone(&self.throttle),
                stop_rx.clone(),
            ));
        }
        self.stop_ingestion = Some(stop_tx);
        Ok(())
    }

    /// End the acquisition. Valid from `Acquiring`; a no-op otherwise.
    pub(crate) async fn stop(&mut self) {
        if self.state != AcquisitionState::Acquiring {
            return;
        }
        self.set_state(AcquisitionState::Stopping, "stopping acquisition");

        let _ = self.publisher.send(PublisherCommand::Halt);
        if let Some(stop) = self.stop_ingestion.take() {
            let _ = stop.send(true);
        }
        while self.tasks.join_next().await.is_some() {}
        self.engine.lock().await.set_acquiring(false);

        self.set_state(AcquisitionState::Idle, "idle");
        info!("acquisition stopped");
    }
}

/// One channel's ingestion loop: lock, accumulate, tick the statistics
/// throttle, release. Per-batch failures are counted and skipped.
async fn ingest<S: EventSubscription>(
    mut subscription: S,
    channel: ChannelId,
    engine: Arc<Mutex<EngineCore>>,
    throttle: Arc<StdMutex<StatsThrottle>>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    return;
                }
            }
            batch = subscription.recv() => {
                let Some(batch) = batch else {
                    info!(channel, "event stream ended");
                    return;
                };
                counter!(
                    names::BATCHES_RECEIVED,
                    &vec![batches_received::get_label(BatchKind::Event)]
                )
                .increment(1);

                let report = {
                    let mut core = engine.lock().await;
                    match core.accumulate(channel, &batch) {
                        Ok(()) => throttle
                            .lock()
                            .ok()
                            .and_then(|mut throttle| throttle.tick(Instant::now(), &mut core)),
                        Err(e) => {
                            warn!(channel, "batch rejected: {e}");
                            counter!(
                                names::FAILURES,
                                &vec![failures::get_label(failure_kind(&e))]
                            )
                            .increment(1);
                            None
                        }
                    }
                };
                if let Some(report) = report {
                    stats::emit(&report);
                }
            }
        }
    }
}

fn failure_kind(error: &DataError) -> FailureKind {
    match error {
        DataError::BadTimeStamp { .. } => FailureKind::BadTimestamp,
        DataError::LengthMismatch { .. } => FailureKind::LengthMismatch,
        _ => FailureKind::UnableToDecodeMessage,
    }
}
