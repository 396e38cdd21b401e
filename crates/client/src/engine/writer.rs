use std::sync::Arc;
use std::time::Duration;

use persona_shared::WireFrame;

use crate::ports::StreamWriter;

use super::SessionRuntime;

/// Every `interval`, sends everything queued for the server in FIFO order.
/// Frames still queued when the session is cancelled are abandoned.
pub(super) async fn run(
    mut writer: Box<dyn StreamWriter>,
    runtime: Arc<SessionRuntime>,
    interval: Duration,
) -> Box<dyn StreamWriter> {
    tracing::debug!(interval_ms = interval.as_millis() as u64, "Writer task started");

    'session: loop {
        tokio::select! {
            _ = runtime.cancel.cancelled() => break 'session,
            _ = tokio::time::sleep(interval) => {}
        }

        let batch = runtime.connection.drain_outgoing();
        if batch.is_empty() {
            continue;
        }
        let total = batch.len();

        for (sent, packet) in batch.into_iter().enumerate() {
            if runtime.cancel.is_cancelled() {
                tracing::debug!(abandoned = total - sent, "Session cancelled mid-drain");
                break 'session;
            }

            let frame = WireFrame::from(&packet);
            let result = tokio::select! {
                _ = runtime.cancel.cancelled() => {
                    tracing::debug!(abandoned = total - sent, "Session cancelled mid-write");
                    break 'session;
                }
                result = writer.write(frame) => result,
            };

            match result {
                Ok(()) => {
                    runtime.engine.metrics.record_sent();
                    tracing::debug!(kind = %packet.kind(), packet_id = %packet.packet_id, "Sent packet");
                }
                Err(e) if e.is_cancelled() => {
                    tracing::info!("Write side cancelled by peer");
                    runtime.cancel.cancel();
                    break 'session;
                }
                Err(e) => {
                    runtime.fail(format!("write failed: {e}"));
                    break 'session;
                }
            }
        }
    }

    tracing::debug!("Writer task stopped");
    writer
}
