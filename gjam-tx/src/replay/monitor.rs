//! Underrun monitor
//!
//! The tick handler only bumps counters. This task polls them from the tokio
//! runtime and turns new underruns into log lines and `TransmitUnderrun` events.

use super::processor::ProcessorStats;
use gjam_common::events::{EventBus, GjamEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Spawn the monitoring task on `rt_handle`
///
/// **Returns:** Shutdown flag (set to true to stop monitoring)
pub fn spawn_underrun_monitor(
    stats: Arc<ProcessorStats>,
    events: EventBus,
    interval: Duration,
    rt_handle: tokio::runtime::Handle,
) -> Arc<AtomicBool> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = Arc::clone(&shutdown);

    rt_handle.spawn(async move {
        let mut last_underruns = 0u64;
        let mut last_ticks = 0u64;

        debug!("Underrun monitor started ({} ms interval)", interval.as_millis());

        while !shutdown_clone.load(Ordering::Relaxed) {
            tokio::time::sleep(interval).await;

            let snapshot = stats.snapshot();

            // Counters restart with each session
            if snapshot.underruns < last_underruns {
                last_underruns = 0;
            }

            if snapshot.underruns > last_underruns {
                let new_underruns = snapshot.underruns - last_underruns;
                if snapshot.configured {
                    warn!(
                        "Transmit underrun: {} total (+{} since last check)",
                        snapshot.underruns, new_underruns
                    );
                    events.emit_lossy(GjamEvent::TransmitUnderrun {
                        underrun_count: snapshot.underruns,
                        timestamp: chrono::Utc::now(),
                    });
                } else {
                    trace!("Underrun while unconfigured: {} total", snapshot.underruns);
                }
                last_underruns = snapshot.underruns;
            }

            if snapshot.ticks > last_ticks {
                trace!(
                    "Tick health: {} ticks, {} underruns, {} bytes this session",
                    snapshot.ticks,
                    snapshot.underruns,
                    snapshot.bytes_consumed
                );
            }
            last_ticks = snapshot.ticks;
        }

        info!("Underrun monitor stopped");
    });

    shutdown
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::chunk::chunk_pool;
    use crate::replay::processor::{Binding, SampleProcessor};
    use crate::replay::signal::ReadinessSignal;

    #[tokio::test]
    async fn test_underrun_becomes_event() {
        let (mut processor, handle) = SampleProcessor::new(0);
        let (fill, consume) = chunk_pool(2, 4);
        handle.configure(Binding {
            pool: consume,
            signal: Arc::new(ReadinessSignal::new()),
        });
        fill.mark_primed();

        let events = EventBus::new(16);
        let mut rx = events.subscribe();
        let shutdown = spawn_underrun_monitor(
            handle.shared_stats(),
            events.clone(),
            Duration::from_millis(5),
            tokio::runtime::Handle::current(),
        );

        // Primed but empty pool: every tick is short
        let mut out = [0u8; 4];
        processor.tick(&mut out);
        processor.tick(&mut out);

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no underrun event")
            .unwrap();
        match event {
            GjamEvent::TransmitUnderrun { underrun_count, .. } => assert_eq!(underrun_count, 2),
            other => panic!("Unexpected event {:?}", other),
        }

        shutdown.store(true, Ordering::Relaxed);
    }
}
