//! Inbound packet routing.

use persona_domain::{Packet, PacketKind, PacketPayload, SessionContext};

use crate::connection::{ConnectionState, QueueKind};
use crate::error::QueueError;

/// Where an inbound packet of a given kind goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Queue(QueueKind),
    /// Replaces the session snapshot; never queued.
    LastState,
}

pub fn destination(kind: PacketKind) -> Destination {
    match kind {
        kind if kind.is_interaction() => Destination::Queue(QueueKind::Interaction),
        PacketKind::Audio => Destination::Queue(QueueKind::Audio),
        PacketKind::Animation => Destination::Queue(QueueKind::Animation),
        _ => Destination::LastState,
    }
}

/// Routes one decoded packet into its queue or into the session context.
pub fn route(
    packet: Packet,
    connection: &ConnectionState,
    context: &mut SessionContext,
) -> Result<Destination, QueueError> {
    let target = destination(packet.kind());
    match target {
        Destination::Queue(kind) => connection.enqueue_incoming(kind, packet)?,
        Destination::LastState => {
            if let PacketPayload::State(chunk) = &packet.payload {
                context.record_state(chunk);
            }
        }
    }
    Ok(target)
}
