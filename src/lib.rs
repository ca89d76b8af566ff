//! DLMS/COSEM client for electricity meters reached through Wirepas NIC nodes.
//!
//! A [`Meter`] talks to two logical devices behind one radio node: the NIC
//! itself (server address 100) and the meter in passthrough (server address 1).
//! Requests are wrapped in the DLMS/TCP wrapper, protected with the AES-GCM
//! cipher suite when keys are configured, and handed to a
//! [`DlmsNetworkInterface`]. Frames coming back are classified as NIC status
//! words, data pushes or responses to the request in flight.
//!
//! ```no_run
//! use std::sync::Arc;
//! use wirepas_dlms::{
//!     AssociationLevel, DlmsNetworkInterface, ErrorCode, Meter, MeterConfiguration, MeterOptions,
//!     OutboundPacket,
//! };
//!
//! #[derive(Debug)]
//! struct Mqtt;
//!
//! impl DlmsNetworkInterface for Mqtt {
//!     fn send(&self, _packet: OutboundPacket) -> Result<(), wirepas_dlms::TransportError> {
//!         Ok(())
//!     }
//! }
//!
//! let config = MeterConfiguration::builder()
//!     .authentication_key("00112233445566778899AABBCCDDEEFF")
//!     .block_cipher_key("FFEEDDCCBBAA99887766554433221100")
//!     .us_password("5365637265743132")
//!     .build()?;
//! let meter = Meter::new(Arc::new(Mqtt), 0x0102_0304, config, MeterOptions::default())?;
//!
//! let response = meter.get_meter_clock(AssociationLevel::UtilitySetting)?;
//! if response.error_code == ErrorCode::Ok {
//!     println!("{:?}", response.value);
//! }
//! # Ok::<(), wirepas_dlms::Error>(())
//! ```

pub mod action;
pub mod apdu;
pub mod association;
pub mod association_level;
pub mod catalogue;
pub mod ciphering;
pub mod client;
pub mod config;
pub mod data;
pub mod data_notification;
pub mod error;
pub mod exception;
pub mod get;
pub mod key_wrap;
pub mod meter;
pub mod notification;
pub mod obis_code;
pub mod parsed_frame;
pub mod response;
pub mod security_control;
mod session;
pub mod set;
pub mod translator;
pub mod transport;
pub mod wrapper;

pub use association_level::AssociationLevel;
pub use catalogue::{PUSH_ENABLE_FLAGS, ProfileGeneric};
pub use client::{DLMS_METER_ADDRESS, DLMS_NIC_ADDRESS, DlmsClient, NIC_CLIENT_SYSTEM_TITLE};
pub use config::{
    HexKey, KeyRotation, KeySlot, MeterConfiguration, MeterConfigurationBuilder, MeterOptions,
};
pub use data::{BitString, Data, DataType, Date, DateTime, Time};
pub use error::{ConfigurationError, Error};
pub use meter::{Meter, MeterCallbacks};
pub use notification::{
    ConnectionStatus, FirmwareUpdateResult, FirmwareUpdateStep, NicStatusWord, NotificationObis,
    WirepasNotification,
};
pub use obis_code::ObisCode;
pub use parsed_frame::ParsedFrame;
pub use response::{ErrorCode, Response};
pub use security_control::{Security, SecurityControl};
pub use transport::{DlmsNetworkInterface, OutboundPacket, Packet, TransportError};

/// Big-endian writers used by every `encode` of the crate.
pub(crate) trait ByteBuffer {
    fn push_u8(&mut self, value: u8);
    fn push_u16(&mut self, value: u16);
    fn push_u32(&mut self, value: u32);
    fn push_bytes(&mut self, bytes: &[u8]);
}

impl ByteBuffer for Vec<u8> {
    fn push_u8(&mut self, value: u8) {
        self.push(value);
    }

    fn push_u16(&mut self, value: u16) {
        self.extend_from_slice(&value.to_be_bytes());
    }

    fn push_u32(&mut self, value: u32) {
        self.extend_from_slice(&value.to_be_bytes());
    }

    fn push_bytes(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}
