//! Unsolicited frames pushed by the NIC
//!
//! Every push is a data-notification whose body is a structure
//!
//! ```text
//! [device id, push setup OBIS, date-time, value]
//! ```
//!
//! The push setup OBIS names the kind of content. The NIC status word push
//! carries the NIC identity and the state of its associations:
//!
//! ```text
//! value = [nic system title, US invocation counter, connection status bit string,
//!          firmware update step?, firmware update result?]
//! ```

use std::fmt;

use derive_try_from_primitive::TryFromPrimitive;
use log::info;

use crate::association_level::AssociationLevel;
use crate::client::DlmsClient;
use crate::data::{BitString, Data, DateTime};
use crate::obis_code::ObisCode;
use crate::parsed_frame::ParsedFrame;

/// Push setup objects whose notifications are understood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum NotificationObis {
    EventStatusWordPush,
    InstantaneousProfilePush,
    BlockLoadProfilePush,
    DailyLoadProfilePush,
    BillingProfilePush,
    NamePlateProfilePush,
    NicStatusWord,
    VoltageRelatedEventsPush,
    CurrentRelatedEventsPush,
    PowerRelatedEventsPush,
    TransactionRelatedEventsPush,
    OtherEventsPush,
    NonRolloverEventsPush,
    ControlEventsPush,
}

impl NotificationObis {
    pub const ALL: [NotificationObis; 14] = [
        NotificationObis::EventStatusWordPush,
        NotificationObis::InstantaneousProfilePush,
        NotificationObis::BlockLoadProfilePush,
        NotificationObis::DailyLoadProfilePush,
        NotificationObis::BillingProfilePush,
        NotificationObis::NamePlateProfilePush,
        NotificationObis::NicStatusWord,
        NotificationObis::VoltageRelatedEventsPush,
        NotificationObis::CurrentRelatedEventsPush,
        NotificationObis::PowerRelatedEventsPush,
        NotificationObis::TransactionRelatedEventsPush,
        NotificationObis::OtherEventsPush,
        NotificationObis::NonRolloverEventsPush,
        NotificationObis::ControlEventsPush,
    ];

    pub const fn obis(&self) -> ObisCode {
        let b = match self {
            NotificationObis::EventStatusWordPush => 4,
            NotificationObis::InstantaneousProfilePush => 0,
            NotificationObis::BlockLoadProfilePush => 5,
            NotificationObis::DailyLoadProfilePush => 6,
            NotificationObis::BillingProfilePush => 103,
            NotificationObis::NamePlateProfilePush => 104,
            NotificationObis::NicStatusWord => 105,
            NotificationObis::VoltageRelatedEventsPush => 120,
            NotificationObis::CurrentRelatedEventsPush => 121,
            NotificationObis::PowerRelatedEventsPush => 122,
            NotificationObis::TransactionRelatedEventsPush => 123,
            NotificationObis::OtherEventsPush => 124,
            NotificationObis::NonRolloverEventsPush => 125,
            NotificationObis::ControlEventsPush => 126,
        };
        ObisCode::new(0, b, 25, 9, 0, 255)
    }

    pub const fn name(&self) -> &'static str {
        match self {
            NotificationObis::EventStatusWordPush => "Event Status Word push",
            NotificationObis::InstantaneousProfilePush => "Instantaneous profile push",
            NotificationObis::BlockLoadProfilePush => "Block load profile push",
            NotificationObis::DailyLoadProfilePush => "Daily load profile push",
            NotificationObis::BillingProfilePush => "Billing profile push",
            NotificationObis::NamePlateProfilePush => "Name plate profile push",
            NotificationObis::NicStatusWord => "NIC status word notification",
            NotificationObis::VoltageRelatedEventsPush => "Voltage related events push",
            NotificationObis::CurrentRelatedEventsPush => "Current related events push",
            NotificationObis::PowerRelatedEventsPush => "Power related events push",
            NotificationObis::TransactionRelatedEventsPush => "Transaction related events push",
            NotificationObis::OtherEventsPush => "Other events push",
            NotificationObis::NonRolloverEventsPush => "Non rollover events push",
            NotificationObis::ControlEventsPush => "Control events push",
        }
    }

    pub fn from_obis(obis: ObisCode) -> Option<Self> {
        Self::ALL.into_iter().find(|push| push.obis() == obis)
    }
}

impl fmt::Display for NotificationObis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.obis())
    }
}

/// Name of an Event Status Word bit, `None` for reserved bits.
pub fn esw_bit_name(bit: usize) -> Option<&'static str> {
    Some(match bit {
        0 => "R Phase - Voltage missing",
        1 => "Y Phase - Voltage missing",
        2 => "B Phase - Voltage missing",
        3 => "Over voltage in any phase",
        4 => "Low voltage in any phase",
        5 => "Voltage unbalance",
        6 => "R Phase current reverse (Import type only)",
        7 => "Y Phase current reverse (Import type only)",
        8 => "B Phase current reverse (Import type only)",
        9 => "Current unbalance",
        10 => "Current bypass/short",
        11 => "Over current in any phase",
        12 => "Very low PF",
        51 => "Earth Loading",
        81 => "Influence of permanent magnet or ac/dc electromagnet",
        82 => "Neutral disturbance - HF, dc or alternate method",
        83 => "Meter cover opening",
        84 => "Meter load disconnected/Meter load connected",
        85 => "Last Gasp - Occurrence",
        86 => "First Breath - Restoration",
        87 => "Increment in billing counter (Manual/MRI reset)",
        _ => return None,
    })
}

/// A data-notification from one of the known push setups.
#[derive(Debug, Clone, PartialEq)]
pub struct WirepasNotification {
    pub frame: ParsedFrame,
    pub push: NotificationObis,
    pub device_id: Option<Data>,
    pub date_time: Option<DateTime>,
    pub value: Data,
}

impl WirepasNotification {
    /// Decode `payload` with the keys of the push client.
    pub fn from_payload(client: &DlmsClient, payload: &[u8]) -> Option<Self> {
        Self::from_frame(ParsedFrame::from_payload(client, payload)?)
    }

    pub fn from_frame(frame: ParsedFrame) -> Option<Self> {
        if !frame.is_data_notification() {
            return None;
        }
        let [device_id, obis, date_time, value] = frame.value.as_ref()?.as_structure()? else {
            return None;
        };
        let (_, obis) = ObisCode::parse(obis.as_bytes()?).ok()?;
        let push = NotificationObis::from_obis(obis)?;

        Some(Self {
            push,
            device_id: (*device_id != Data::Null).then(|| device_id.clone()),
            date_time: date_time.as_date_time().or_else(|| frame.date_time.clone()),
            value: value.clone(),
            frame,
        })
    }

    /// Set bits of an Event Status Word push, with their names.
    pub fn activated_esw_bits(&self) -> Vec<(usize, &'static str)> {
        if self.push != NotificationObis::EventStatusWordPush {
            return Vec::new();
        }
        let Some(bits) = self.value.as_bit_string() else {
            return Vec::new();
        };
        bits.set_bits()
            .map(|bit| (bit, esw_bit_name(bit).unwrap_or("Reserved")))
            .collect()
    }

    pub fn log_activated_esw_bits(&self) {
        for (bit, name) in self.activated_esw_bits() {
            info!("ESW bit {bit} is set: {name}");
        }
    }
}

/// Outcome of the last attempt of an association, as reported by the NIC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ConnectionStatus {
    NeverTested,
    Success,
    Failed,
    Unknown,
}

impl ConnectionStatus {
    fn from_bits(bits: &str) -> Self {
        match bits {
            "00" => ConnectionStatus::NeverTested,
            "01" => ConnectionStatus::Success,
            "10" => ConnectionStatus::Failed,
            _ => ConnectionStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
#[rustfmt::skip]
pub enum FirmwareUpdateStep {
  CheckAvailability             = 0,
  ReadUpdate                    = 1,
  Connect                       = 2,
  CheckIfImageTransferIsEnabled = 3,
  ReadBlockSize                 = 4,
  CheckImageTransferStatus      = 5,
  InitiateTransfer              = 6,
  TransferBlock                 = 7,
  VerifyImage                   = 8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
#[rustfmt::skip]
pub enum FirmwareUpdateResult {
  Ok                =  0,
  NoAvailableUpdate =  1,
  AlreadyProcessed  =  2,
  UpdateAvailable   =  3,
  Enabled           =  4,
  Disabled          =  5,
  InternalError     =  6,
  ConnectionError   =  7,
  LibError          =  8,
  MeterError        =  9,
  OperationFailed   = 10,
  InvalidOperation  = 11,
}

/// The NIC status word push.
#[derive(Debug, Clone, PartialEq)]
pub struct NicStatusWord {
    pub notification: WirepasNotification,
    pub nic_system_title: [u8; 8],
    pub us_invocation_counter: u32,
    pub connection_status: BitString,
    pub firmware_update_step: Option<FirmwareUpdateStep>,
    pub firmware_update_result: Option<FirmwareUpdateResult>,
    /// The meter serial number, sent in place of the device id until the US
    /// association has been tested successfully.
    pub serial_number: Option<Data>,
}

impl NicStatusWord {
    pub fn from_payload(client: &DlmsClient, payload: &[u8]) -> Option<Self> {
        Self::from_notification(WirepasNotification::from_payload(client, payload)?)
    }

    pub fn from_notification(mut notification: WirepasNotification) -> Option<Self> {
        if notification.push != NotificationObis::NicStatusWord {
            return None;
        }
        let fields = notification.value.as_structure()?;
        if fields.len() != 3 && fields.len() != 5 {
            return None;
        }

        let nic_system_title = pad_system_title(fields[0].as_bytes()?)?;
        let us_invocation_counter = u32::try_from(fields[1].as_u64()?).ok()?;
        let connection_status = fields[2].as_bit_string()?.clone();
        let (firmware_update_step, firmware_update_result) = match fields.get(3..5) {
            Some([step, result]) => (
                as_u8(step).and_then(|v| FirmwareUpdateStep::try_from(v).ok()),
                as_u8(result).and_then(|v| FirmwareUpdateResult::try_from(v).ok()),
            ),
            _ => (None, None),
        };

        let serial_number = match connection(&connection_status, AssociationLevel::UtilitySetting) {
            Some(ConnectionStatus::Success) => None,
            _ => notification.device_id.take(),
        };

        Some(Self {
            notification,
            nic_system_title,
            us_invocation_counter,
            connection_status,
            firmware_update_step,
            firmware_update_result,
            serial_number,
        })
    }

    /// Status of `association`, `None` for the push association which is not reported.
    pub fn connection(&self, association: AssociationLevel) -> Option<ConnectionStatus> {
        connection(&self.connection_status, association)
    }

    pub fn device_id(&self) -> Option<&Data> {
        self.notification.device_id.as_ref()
    }
}

// Two bits per association, read from the last bit backwards.
fn as_u8(data: &Data) -> Option<u8> {
    u8::try_from(data.as_u64()?).ok()
}

fn connection(bits: &BitString, association: AssociationLevel) -> Option<ConnectionStatus> {
    let range = match association {
        AssociationLevel::PublicClient => 6..8,
        AssociationLevel::MeterReader => 4..6,
        AssociationLevel::UtilitySetting => 2..4,
        AssociationLevel::FirmwareUpgrade => 0..2,
        AssociationLevel::Push => return None,
    };
    let reversed = bits.reversed();
    Some(ConnectionStatus::from_bits(reversed.as_str().get(range).unwrap_or_default()))
}

/// System title of 8 bytes from the content of a push. Shorter titles keep the
/// 3 byte manufacturer flag and have the node part left padded to 5 bytes.
pub(crate) fn pad_system_title(bytes: &[u8]) -> Option<[u8; 8]> {
    if bytes.len() < 3 || bytes.len() > 8 {
        return None;
    }
    let mut title = [0u8; 8];
    title[..3].copy_from_slice(&bytes[..3]);
    let node = &bytes[3..];
    title[8 - node.len()..].copy_from_slice(node);
    Some(title)
}
