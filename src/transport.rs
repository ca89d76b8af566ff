use std::fmt;

/// Error reported by a network interface that could not hand a frame to the mesh.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// A wrapper frame received from the mesh for one meter.
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    pub data_payload: Vec<u8>,
    pub network_address: u32,
    pub gw_id: String,
    pub sink_id: String,
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("data_payload", &hex::encode(&self.data_payload))
            .field("network_address", &format_args!("{:#X}", self.network_address))
            .field("gw_id", &self.gw_id)
            .field("sink_id", &self.sink_id)
            .finish()
    }
}

/// A wrapper frame to deliver to the NIC of `node_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPacket {
    pub payload: Vec<u8>,
    pub node_id: u32,
    pub gateway_id: Option<String>,
    pub sink_id: Option<String>,
    /// Addressed to the NIC logical device rather than the meter behind it.
    pub to_nic_server: bool,
}

/// The mesh side of a [`Meter`](crate::Meter).
///
/// Implementations deliver frames to the network and route every frame received
/// from the node back to [`Meter::on_data_received`](crate::Meter::on_data_received),
/// from whatever thread they receive on. Responses are matched by the meter itself,
/// `send` returns as soon as the frame is handed over.
pub trait DlmsNetworkInterface: fmt::Debug + Send + Sync {
    fn send(&self, packet: OutboundPacket) -> Result<(), TransportError>;
}
