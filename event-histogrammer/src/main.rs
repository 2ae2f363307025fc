mod accumulator;
mod buffer;
mod channel;
mod controller;
mod detector;
mod error;
mod kafka;
mod metrics;
mod packet;
mod parameters;
mod publisher;
mod stats;
mod table;
mod transform;

use crate::{
    accumulator::EngineCore,
    controller::{AcquisitionController, AcquisitionState},
    kafka::{KafkaChannelProvider, KafkaFrameSink},
    parameters::Cli,
    publisher::{PublisherCommand, publish_frames},
    stats::StatsThrottle,
};
use anyhow::Result;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use ned_common::metrics::component_info_metric;
use rdkafka::producer::FutureProducer;
use std::{
    sync::{Arc, Mutex as StdMutex, atomic::AtomicU64},
    time::Duration,
};
use tokio::sync::{Mutex, watch};
use tracing::warn;

/// How long to wait before retrying a failed acquisition start.
const START_RETRY_PERIOD: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Cli::parse();

    let builder = PrometheusBuilder::new();
    builder
        .with_http_listener(args.observability_address)
        .install()?;
    crate::metrics::register();
    component_info_metric("event-histogrammer");

    let detectors = args.build_detectors()?;
    let engine = Arc::new(Mutex::new(EngineCore::new(
        detectors,
        args.channel_topics.clone(),
    )));

    let client_config = ned_common::generate_kafka_client_config(
        &args.broker,
        &args.username,
        &args.password,
    );
    let provider =
        KafkaChannelProvider::new(client_config.clone(), args.consumer_group.clone());
    let producer: FutureProducer = client_config.create()?;
    let sink = Arc::new(KafkaFrameSink::new(producer, args.frame_topic.clone()));

    let frame_period_ms = Arc::new(AtomicU64::new(args.frame_update_period_ms));
    let (publisher_tx, publisher_rx) = watch::channel(PublisherCommand::Halt);
    let publisher_task = tokio::spawn(publish_frames(
        Arc::clone(&engine),
        sink,
        frame_period_ms,
        publisher_rx,
    ));

    let throttle = Arc::new(StdMutex::new(StatsThrottle::new(Duration::from_millis(
        args.event_update_period_ms,
    ))));
    let mut controller = AcquisitionController::new(
        engine,
        provider,
        args.channel_topics.clone(),
        args.tof_max,
        Duration::from_millis(args.connect_timeout_ms),
        publisher_tx,
        throttle,
    );

    // A failed start is recoverable: keep retrying until the transport comes
    // up or we are told to shut down.
    let mut retry = tokio::time::interval(START_RETRY_PERIOD);
    loop {
        tokio::select! {
            biased;
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
            _ = retry.tick() => {
                if controller.status().state != AcquisitionState::Acquiring {
                    if let Err(e) = controller.start().await {
                        warn!("acquisition start failed, retrying: {e}");
                    }
                }
            }
        }
    }

    controller.stop().await;
    drop(controller);
    publisher_task.await?;

    Ok(())
}
