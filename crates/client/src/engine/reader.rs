use std::sync::Arc;

use persona_domain::Packet;

use crate::error::TransportError;
use crate::ports::StreamReader;

use super::dispatch::{self, Destination};
use super::{lock, SessionRuntime};

/// Reads inbound frames until the session is cancelled, the peer ends the
/// stream, or the transport faults. Returns the read half for disposal.
pub(super) async fn run(
    mut reader: Box<dyn StreamReader>,
    runtime: Arc<SessionRuntime>,
) -> Box<dyn StreamReader> {
    tracing::debug!("Reader task started");

    loop {
        let next = tokio::select! {
            _ = runtime.cancel.cancelled() => {
                tracing::debug!("Reader task cancelled");
                break;
            }
            next = reader.read_next() => next,
        };

        match next {
            Ok(Some(frame)) => {
                runtime.engine.metrics.record_received();
                match Packet::try_from(frame) {
                    Ok(packet) => handle_packet(&runtime, packet),
                    Err(e) => {
                        runtime.engine.metrics.record_unrecognized();
                        tracing::warn!(error = %e, reason = e.label(), "Dropping unrecognized frame");
                    }
                }
            }
            Ok(None) => {
                tracing::info!("Server ended the session stream");
                runtime.cancel.cancel();
                break;
            }
            Err(TransportError::Cancelled) => {
                tracing::info!("Session stream cancelled");
                runtime.cancel.cancel();
                break;
            }
            Err(TransportError::Decode(message)) => {
                runtime.engine.metrics.record_received();
                runtime.engine.metrics.record_unrecognized();
                tracing::warn!(error = %message, "Dropping undecodable frame");
            }
            Err(e @ TransportError::Fault(_)) => {
                runtime.fail(format!("read failed: {e}"));
                break;
            }
        }
    }

    reader
}

fn handle_packet(runtime: &SessionRuntime, packet: Packet) {
    let kind = packet.kind();
    let packet_id = packet.packet_id.clone();

    let routed = {
        let mut context = lock(&runtime.engine.context);
        dispatch::route(packet, &runtime.connection, &mut context)
    };

    match routed {
        Ok(Destination::LastState) => {
            runtime.engine.metrics.record_state_update();
            tracing::debug!(packet_id = %packet_id, "Session state snapshot updated");
        }
        Ok(Destination::Queue(queue)) => {
            tracing::debug!(kind = %kind, queue = %queue, packet_id = %packet_id, "Routed inbound packet");
        }
        Err(e) => {
            tracing::warn!(kind = %kind, error = %e, "Inbound packet dropped");
        }
    }
}
