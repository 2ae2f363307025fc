//! Kafka realisation of the transport seams: one topic per event channel on
//! the consume side, one topic for published frame snapshots.

use crate::{
    controller::{ChannelProvider, EventSubscription},
    error::ConnectionError,
    packet,
    publisher::{FrameSink, FrameSnapshot},
};
use metrics::counter;
use ned_common::{
    EventBatch,
    metrics::{
        failures::{self, FailureKind},
        names,
    },
};
use rdkafka::{
    ClientConfig,
    consumer::{Consumer, stream_consumer::StreamConsumer},
    message::Message,
    producer::{FutureProducer, FutureRecord},
};
use std::{future::Future, time::Duration};
use tracing::{error, trace, warn};

pub(crate) struct KafkaChannelProvider {
    client_config: ClientConfig,
    consumer_group: String,
}

impl KafkaChannelProvider {
    pub(crate) fn new(client_config: ClientConfig, consumer_group: String) -> Self {
        Self {
            client_config,
            consumer_group,
        }
    }
}

impl ChannelProvider for KafkaChannelProvider {
    type Subscription = KafkaSubscription;

    fn connect(
        &self,
        name: &str,
        timeout: Duration,
    ) -> Result<Self::Subscription, ConnectionError> {
        let provider_error = |message: String| ConnectionError::Provider {
            name: name.to_owned(),
            message,
        };

        let consumer: StreamConsumer = self
            .client_config
            .clone()
            .set("group.id", &self.consumer_group)
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "6000")
            .set("enable.auto.commit", "false")
            .create()
            .map_err(|e| provider_error(e.to_string()))?;

        // Metadata fetch doubles as the reachability check.
        let metadata = consumer
            .fetch_metadata(Some(name), timeout)
            .map_err(|_| ConnectionError::Timeout {
                name: name.to_owned(),
                timeout_ms: timeout.as_millis() as u64,
            })?;
        if let Some(error) = metadata.topics().iter().find_map(|topic| topic.error()) {
            return Err(provider_error(format!("topic error: {error:?}")));
        }

        consumer
            .subscribe(&[name])
            .map_err(|e| provider_error(e.to_string()))?;

        Ok(KafkaSubscription { consumer })
    }
}

pub(crate) struct KafkaSubscription {
    consumer: StreamConsumer,
}

impl EventSubscription for KafkaSubscription {
    fn recv(&mut self) -> impl Future<Output = Option<EventBatch>> + Send {
        async move {
            loop {
                match self.consumer.recv().await {
                    Ok(message) => {
                        let Some(payload) = message.payload() else {
                            continue;
                        };
                        match packet::decode_batch(payload) {
                            Ok(batch) => return Some(batch),
                            Err(e) => {
                                warn!("undecodable event payload: {e}");
                                counter!(
                                    names::FAILURES,
                                    &vec![failures::get_label(
                                        FailureKind::UnableToDecodeMessage
                                    )]
                                )
                                .increment(1);
                            }
                        }
                    }
                    Err(e) => {
                        warn!("kafka receive error: {e}");
                    }
                }
            }
        }
    }
}

pub(crate) struct KafkaFrameSink {
    producer: FutureProducer,
    topic: String,
}

impl KafkaFrameSink {
    pub(crate) fn new(producer: FutureProducer, topic: String) -> Self {
        Self { producer, topic }
    }
}

impl FrameSink for KafkaFrameSink {
    fn publish(&self, snapshot: FrameSnapshot) {
        let producer = self.producer.clone();
        let topic = self.topic.clone();
        let payload = packet::encode_frame(&snapshot);

        tokio::spawn(async move {
            match producer
                .send(
                    FutureRecord::to(&topic).payload(&payload).key("frame"),
                    Duration::from_secs(0),
                )
                .await
            {
                Ok(_) => trace!("published frame snapshot"),
                Err((e, _)) => {
                    error!("failed to publish frame snapshot: {e}");
                    counter!(
                        names::FAILURES,
                        &vec![failures::get_label(FailureKind::KafkaPublishFailed)]
                    )
                    .increment(1);
                }
            }
        });
    }
}
