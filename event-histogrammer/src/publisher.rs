//! Timer-driven snapshot loop: copy the histogram buffer under the engine
//! lock, hand the copy to the frame sink outside it.

use crate::accumulator::EngineCore;
use chrono::Utc;
use metrics::counter;
use ned_common::{Counts, FrameId, metrics::names};
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use tokio::sync::{Mutex, watch};
use tracing::debug;

/// One published copy of the aggregate state.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FrameSnapshot {
    pub(crate) frame_id: FrameId,
    pub(crate) timestamp_secs: f64,
    pub(crate) counts: Vec<Counts>,
}

/// Downstream consumer of snapshots. `publish` must not block; transports
/// that need to wait spawn their own sends.
pub(crate) trait FrameSink: Send + Sync + 'static {
    fn publish(&self, snapshot: FrameSnapshot);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PublisherCommand {
    Run,
    Halt,
}

/// Runs until the command channel closes. Halt is checked at the top of each
/// iteration, so a halt raised mid-sleep wins over the pending publish. The
/// period is re-read every iteration and can be retuned live.
pub(crate) async fn publish_frames(
    engine: Arc<Mutex<EngineCore>>,
    sink: Arc<dyn FrameSink>,
    period_ms: Arc<AtomicU64>,
    mut command: watch::Receiver<PublisherCommand>,
) {
    let mut frame_id: FrameId = 0;

    loop {
        if *command.borrow_and_update() == PublisherCommand::Halt {
            if command.changed().await.is_err() {
                return;
            }
            continue;
        }

        let period =
            std::time::Duration::from_millis(period_ms.load(Ordering::Relaxed).max(1));
        tokio::select! {
            biased;
            changed = command.changed() => {
                if changed.is_err() {
                    return;
                }
                continue;
            }
            () = tokio::time::sleep(period) => {}
        }

        let counts = {
            let core = engine.lock().await;
            core.buffer.counts().to_vec()
        };
        let now = Utc::now();
        let snapshot = FrameSnapshot {
            frame_id,
            timestamp_secs: now.timestamp() as f64
                + f64::from(now.timestamp_subsec_nanos()) / 1e9,
            counts,
        };
        debug!(frame_id, "publishing frame snapshot");
        frame_id = frame_id.wrapping_add(1);

        sink.publish(snapshot);
        counter!(names::FRAMES_PUBLISHED).increment(1);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::detector::DetectorConfig;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct CollectingSink(mpsc::UnboundedSender<FrameSnapshot>);

    impl FrameSink for CollectingSink {
        fn publish(&self, snapshot: FrameSnapshot) {
            let _ = self.0.send(snapshot);
        }
    }

    fn engine() -> Arc<Mutex<EngineCore>> {
        let mut core = EngineCore::new(vec![DetectorConfig::new(0, 3)], vec!["pulse".into()]);
        core.reallocate(3).unwrap();
        Arc::new(Mutex::new(core))
    }

    #[tokio::test(start_paused = true)]
    async fn frames_flow_while_running_with_increasing_ids() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = watch::channel(PublisherCommand::Run);
        let period = Arc::new(AtomicU64::new(100));

        let task = tokio::spawn(publish_frames(
            engine(),
            Arc::new(CollectingSink(tx)),
            period,
            command_rx,
        ));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.frame_id, 0);
        assert_eq!(second.frame_id, 1);
        assert_eq!(first.counts.len(), 4 + 4);

        drop(command_tx);
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn halt_stops_publication_until_the_next_run() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = watch::channel(PublisherCommand::Halt);
        let period = Arc::new(AtomicU64::new(10));

        let task = tokio::spawn(publish_frames(
            engine(),
            Arc::new(CollectingSink(tx)),
            period,
            command_rx,
        ));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());

        command_tx.send(PublisherCommand::Run).unwrap();
        assert!(rx.recv().await.is_some());

        command_tx.send(PublisherCommand::Halt).unwrap();
        // Drain anything already in flight, then confirm silence.
        tokio::time::sleep(Duration::from_millis(100)).await;
        while rx.try_recv().is_ok() {}
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());

        drop(command_tx);
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_copies_the_buffer_counts() {
        let engine = engine();
        {
            let mut core = engine.lock().await;
            core.buffer.bump(0);
            core.buffer.bump(0);
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = watch::channel(PublisherCommand::Run);
        let task = tokio::spawn(publish_frames(
            engine,
            Arc::new(CollectingSink(tx)),
            Arc::new(AtomicU64::new(50)),
            command_rx,
        ));

        let snapshot = rx.recv().await.unwrap();
        assert_eq!(snapshot.counts[0], 2);

        drop(command_tx);
        task.await.unwrap();
    }
}
