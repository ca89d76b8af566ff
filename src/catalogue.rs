//! Typed requests to the meter and its NIC
//!
//! Each request fixes the COSEM class, the OBIS code, the attribute or method
//! index and the logical device it is sent to. Meter requests take the
//! association to use; the one usually granted by IS 15959 meters is given in
//! brackets in their documentation.
//!
//! Every method returns `Err` when the request cannot be built (invalid value,
//! missing NIC association, missing key), and `Ok` with the [`Response`] once
//! a request was sent, including timeouts.

use std::fmt;

use log::{info, warn};

use crate::association_level::AssociationLevel;
use crate::client::WriteItem;
use crate::config::{KeyRotation, KeySlot, MeterConfiguration};
use crate::data::{BitString, Data, DataType, DateTime};
use crate::error::Error;
use crate::get::AccessSelector;
use crate::meter::{Meter, Target};
use crate::obis_code::ObisCode;
use crate::response::Response;

// ============================================================================
// COSEM interface classes
// ============================================================================

pub const DATA_CLASS_ID: u16 = 1;
pub const REGISTER_CLASS_ID: u16 = 3;
pub const PROFILE_GENERIC_CLASS_ID: u16 = 7;
pub const CLOCK_CLASS_ID: u16 = 8;
pub const ASSOCIATION_LN_CLASS_ID: u16 = 15;
pub const IMAGE_TRANSFER_CLASS_ID: u16 = 18;
pub const ACTIVITY_CALENDAR_CLASS_ID: u16 = 20;
pub const SINGLE_ACTION_SCHEDULE_CLASS_ID: u16 = 22;
pub const PUSH_SETUP_CLASS_ID: u16 = 40;
pub const DISCONNECT_CONTROL_CLASS_ID: u16 = 70;
pub const LIMITER_CLASS_ID: u16 = 71;

// ============================================================================
// Objects
// ============================================================================

pub const CLOCK: ObisCode = ObisCode::new(0, 0, 1, 0, 0, 255);
pub const SERIAL_NUMBER: ObisCode = ObisCode::new(0, 0, 96, 1, 0, 255);
pub const DEVICE_ID: ObisCode = ObisCode::new(0, 0, 96, 1, 2, 255);
pub const EVENT_STATUS_WORD_1: ObisCode = ObisCode::new(0, 0, 94, 91, 18, 255);
pub const DISCONNECT_CONTROL: ObisCode = ObisCode::new(0, 0, 96, 3, 10, 255);
pub const IMAGE_TRANSFER: ObisCode = ObisCode::new(0, 0, 44, 0, 0, 255);
pub const ACTION_SCHEDULE: ObisCode = ObisCode::new(0, 0, 15, 0, 0, 255);
pub const ACTIVITY_CALENDAR: ObisCode = ObisCode::new(0, 0, 13, 0, 0, 255);
pub const LIMITER: ObisCode = ObisCode::new(0, 0, 17, 0, 0, 255);
pub const PUSH_SETUP: ObisCode = ObisCode::new(0, 7, 25, 9, 0, 255);
pub const METER_OBJECT_LIST: ObisCode = ObisCode::new(0, 0, 40, 0, 0, 255);
pub const NIC_OBJECT_LIST: ObisCode = ObisCode::new(0, 0, 40, 0, 100, 255);
pub const NIC_INSTANTANEOUS_PUSH_INTERVAL: ObisCode = ObisCode::new(0, 100, 25, 9, 0, 250);
pub const NIC_PUSH_ENABLE_CONFIGURATION: ObisCode = ObisCode::new(0, 101, 25, 9, 0, 250);
pub const BLOCK_LOAD_CAPTURE_PERIOD: ObisCode = ObisCode::new(1, 0, 0, 8, 4, 255);
pub const DAILY_LOAD_CAPTURE_PERIOD: ObisCode = ObisCode::new(1, 0, 0, 8, 5, 255);

const DISCONNECT_METHOD: i8 = 1;
const RECONNECT_METHOD: i8 = 2;
const IMAGE_VERIFY_METHOD: i8 = 3;
const IMAGE_ACTIVATE_METHOD: i8 = 4;

/// Push intervals in minutes accepted by the NIC.
pub const INSTANTANEOUS_PUSH_INTERVALS: [u16; 4] = [15, 30, 60, 1440];

/// Block load capture periods in seconds supported by IS 15959 meters.
pub const BLOCK_LOAD_CAPTURE_PERIODS: [u16; 3] = [900, 1800, 3600];

/// Profiles behind each character of the NIC push enable configuration, leftmost first.
pub const PUSH_ENABLE_FLAGS: [&str; 11] = [
    "instantaneous",
    "block load",
    "daily load",
    "billing",
    "voltage events",
    "current events",
    "power events",
    "transaction events",
    "other events",
    "non-rollover events",
    "control events",
];

/// NIC security material slots, in the order they are written.
#[rustfmt::skip]
const SECURITY_MATERIAL: [(KeySlot, ObisCode); 6] = [
    (KeySlot::MrPassword,        ObisCode::new(0, 0, 40, 0, 2, 250)),
    (KeySlot::UsPassword,        ObisCode::new(0, 0, 40, 0, 3, 250)),
    (KeySlot::FuPassword,        ObisCode::new(0, 0, 40, 0, 5, 250)),
    (KeySlot::EncryptionKey,     ObisCode::new(0, 0, 43, 0, 0, 251)),
    (KeySlot::AuthenticationKey, ObisCode::new(0, 0, 43, 0, 0, 253)),
    (KeySlot::KeyEncryptionKey,  ObisCode::new(0, 0, 43, 0, 0, 254)),
];

// ============================================================================
// Profile generic
// ============================================================================

/// Profile generic objects of IS 15959 meters.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileGeneric {
    Instantaneous,
    BlockLoad,
    DailyLoad,
    Billing,
    NamePlate,
    VoltageEventsLog,
    CurrentEventsLog,
    PowerEventsLog,
    TransactionEventsLog,
    OtherEventsLog,
    NonRolloverEventsLog,
    ControlEventsLog,
}

impl ProfileGeneric {
    pub const EVENT_LOGS: [ProfileGeneric; 7] = [
        ProfileGeneric::VoltageEventsLog,
        ProfileGeneric::CurrentEventsLog,
        ProfileGeneric::PowerEventsLog,
        ProfileGeneric::TransactionEventsLog,
        ProfileGeneric::OtherEventsLog,
        ProfileGeneric::NonRolloverEventsLog,
        ProfileGeneric::ControlEventsLog,
    ];

    pub fn obis(&self) -> ObisCode {
        match self.event_log_index() {
            Some(index) => ObisCode::new(0, 0, 99, 98, index, 255),
            None => match self {
                ProfileGeneric::Instantaneous => ObisCode::new(1, 0, 94, 91, 0, 255),
                ProfileGeneric::BlockLoad => ObisCode::new(1, 0, 99, 1, 0, 255),
                ProfileGeneric::DailyLoad => ObisCode::new(1, 0, 99, 2, 0, 255),
                ProfileGeneric::Billing => ObisCode::new(1, 0, 98, 1, 0, 255),
                _ => ObisCode::new(0, 0, 94, 91, 10, 255),
            },
        }
    }

    /// Profile holding the scalers of the captured values.
    pub fn scaler_obis(&self) -> Option<ObisCode> {
        match self {
            ProfileGeneric::Instantaneous => Some(ObisCode::new(1, 0, 94, 91, 3, 255)),
            ProfileGeneric::BlockLoad => Some(ObisCode::new(1, 0, 94, 91, 4, 255)),
            ProfileGeneric::DailyLoad => Some(ObisCode::new(1, 0, 94, 91, 5, 255)),
            ProfileGeneric::Billing => Some(ObisCode::new(1, 0, 94, 91, 6, 255)),
            ProfileGeneric::NamePlate => None,
            _ => Some(ObisCode::new(1, 0, 94, 91, 7, 255)),
        }
    }

    /// Data object holding the code of the last event, event logs only.
    pub fn event_code_obis(&self) -> Option<ObisCode> {
        self.event_log_index().map(|index| ObisCode::new(0, 0, 96, 11, index, 255))
    }

    pub fn is_event_log(&self) -> bool {
        self.event_log_index().is_some()
    }

    fn event_log_index(&self) -> Option<u8> {
        Self::EVENT_LOGS.iter().position(|log| log == self).map(|index| index as u8)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProfileGeneric::Instantaneous => "instantaneous",
            ProfileGeneric::BlockLoad => "block load",
            ProfileGeneric::DailyLoad => "daily load",
            ProfileGeneric::Billing => "billing",
            ProfileGeneric::NamePlate => "name plate",
            ProfileGeneric::VoltageEventsLog => "voltage related events log",
            ProfileGeneric::CurrentEventsLog => "current related events log",
            ProfileGeneric::PowerEventsLog => "power related events log",
            ProfileGeneric::TransactionEventsLog => "transaction related events log",
            ProfileGeneric::OtherEventsLog => "other events log",
            ProfileGeneric::NonRolloverEventsLog => "non-rollover events log",
            ProfileGeneric::ControlEventsLog => "control events log",
        }
    }
}

impl fmt::Display for ProfileGeneric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} profile", self.name())
    }
}

/// Entry descriptor (selector 2) over `count` rows from `index`, all columns.
/// A `count` of 0 reads up to the last entry.
///
/// ```text
/// 02 04                 structure of 4
///    06 00 00 00 01     from_entry
///    06 00 00 00 01     to_entry (0 = last)
///    12 00 01           from_selected_value
///    12 00 00           to_selected_value (0 = last)
/// ```
pub fn entry_descriptor(index: u32, count: u32) -> AccessSelector {
    let to_entry = if count == 0 { 0 } else { index.saturating_add(count - 1) };
    AccessSelector {
        selector: 2,
        parameters: Data::Structure(vec![
            Data::DoubleLongUnsigned(index),
            Data::DoubleLongUnsigned(to_entry),
            Data::LongUnsigned(1),
            Data::LongUnsigned(0),
        ]),
    }
}

/// Range descriptor (selector 1) over the clock column, all columns.
pub fn range_descriptor(start: &DateTime, end: &DateTime) -> AccessSelector {
    let restricting_object = Data::Structure(vec![
        Data::LongUnsigned(CLOCK_CLASS_ID),
        Data::OctetString(CLOCK.encode().to_vec()),
        Data::Integer(2),
        Data::LongUnsigned(0),
    ]);
    AccessSelector {
        selector: 1,
        parameters: Data::Structure(vec![
            restricting_object,
            Data::from(start.clone()),
            Data::from(end.clone()),
            Data::Array(Vec::new()),
        ]),
    }
}

// ============================================================================
// Requests
// ============================================================================

impl Meter {
    // ------------------------------------------------------------------------
    // Generic objects
    // ------------------------------------------------------------------------

    /// GET of a Data object of the meter [US].
    pub fn get_meter_data(
        &self,
        obis: ObisCode,
        association: AssociationLevel,
        attribute_id: i8,
    ) -> Result<Response, Error> {
        info!("A get request of {obis} is being sent to the meter in passthrough");
        self.request(Target::Meter(association), |client| {
            client.encode_get(obis, DATA_CLASS_ID, attribute_id)
        })
    }

    /// SET of a Data object of the meter [US]. `value` must be of `data_type`.
    pub fn set_meter_data(
        &self,
        obis: ObisCode,
        data_type: DataType,
        value: Data,
        association: AssociationLevel,
        attribute_id: i8,
    ) -> Result<Response, Error> {
        info!("A set request of {obis} is being sent to the meter in passthrough");
        self.request(Target::Meter(association), |client| {
            client.encode_set(obis, DATA_CLASS_ID, attribute_id, data_type, value)
        })
    }

    /// GET of a Data object of the NIC, under the established association.
    pub fn get_nic_data(&self, obis: ObisCode, attribute_id: i8) -> Result<Response, Error> {
        info!("A get request of {obis} is being sent to the NIC");
        self.request(Target::Nic, |client| client.encode_get(obis, DATA_CLASS_ID, attribute_id))
    }

    pub fn set_nic_data(
        &self,
        obis: ObisCode,
        data_type: DataType,
        value: Data,
        attribute_id: i8,
    ) -> Result<Response, Error> {
        info!("A set request of {obis} is being sent to the NIC");
        self.request(Target::Nic, |client| {
            client.encode_set(obis, DATA_CLASS_ID, attribute_id, data_type, value)
        })
    }

    /// GET of a Register of the meter [US].
    pub fn get_meter_register(
        &self,
        obis: ObisCode,
        association: AssociationLevel,
        attribute_id: i8,
    ) -> Result<Response, Error> {
        info!("A get register request of {obis} is being sent to the meter in passthrough");
        self.request(Target::Meter(association), |client| {
            client.encode_get(obis, REGISTER_CLASS_ID, attribute_id)
        })
    }

    pub fn get_meter_serial_number(
        &self,
        association: AssociationLevel,
    ) -> Result<Response, Error> {
        info!("Get the serial number of the meter in passthrough");
        self.get_meter_data(SERIAL_NUMBER, association, 2)
    }

    /// [MR]
    pub fn get_meter_device_id(&self, association: AssociationLevel) -> Result<Response, Error> {
        info!("Get the device ID of the meter in passthrough");
        self.get_meter_data(DEVICE_ID, association, 2)
    }

    /// Event status word 1 [MR].
    pub fn get_meter_esw1(&self, association: AssociationLevel) -> Result<Response, Error> {
        info!("Get the Event Status Word 1 of the meter in passthrough");
        self.get_meter_data(EVENT_STATUS_WORD_1, association, 2)
    }

    // ------------------------------------------------------------------------
    // Clock, disconnect control, image transfer
    // ------------------------------------------------------------------------

    /// Time attribute of the meter clock [US].
    pub fn get_meter_clock(&self, association: AssociationLevel) -> Result<Response, Error> {
        info!("Send a get clock request to the meter in passthrough");
        self.request(Target::Meter(association), |client| {
            client.encode_get(CLOCK, CLOCK_CLASS_ID, 2)
        })
    }

    /// [US]
    pub fn set_meter_clock(
        &self,
        date_time: &DateTime,
        association: AssociationLevel,
    ) -> Result<Response, Error> {
        info!("Send a set clock request to the meter in passthrough");
        let value = Data::from(date_time.clone());
        self.request(Target::Meter(association), |client| {
            client.encode_set(CLOCK, CLOCK_CLASS_ID, 2, DataType::OctetString, value)
        })
    }

    /// Set the meter clock to the local time of the host.
    #[cfg(feature = "chrono-conversions")]
    pub fn set_meter_clock_now(&self, association: AssociationLevel) -> Result<Response, Error> {
        let now = chrono::Local::now().naive_local();
        self.set_meter_clock(&DateTime::from_chrono(&now), association)
    }

    /// Open the supply relay of the meter [US].
    pub fn disconnect_meter(&self, association: AssociationLevel) -> Result<Response, Error> {
        info!("Send a disconnect request to the meter in passthrough");
        self.request(Target::Meter(association), |client| {
            client.encode_action(
                DISCONNECT_CONTROL,
                DISCONNECT_CONTROL_CLASS_ID,
                DISCONNECT_METHOD,
                Some(Data::Integer(0)),
            )
        })
    }

    /// [US]
    pub fn reconnect_meter(&self, association: AssociationLevel) -> Result<Response, Error> {
        info!("Send a reconnect request to the meter in passthrough");
        self.request(Target::Meter(association), |client| {
            client.encode_action(
                DISCONNECT_CONTROL,
                DISCONNECT_CONTROL_CLASS_ID,
                RECONNECT_METHOD,
                Some(Data::Integer(0)),
            )
        })
    }

    /// Image transfer attribute, under the FU association. Attribute 6 is the
    /// transfer status.
    pub fn get_meter_image_transfer_attribute(&self, attribute_id: i8) -> Result<Response, Error> {
        info!("Get image transfer attribute {attribute_id} of the meter in passthrough");
        self.request(Target::Meter(AssociationLevel::FirmwareUpgrade), |client| {
            client.encode_get(IMAGE_TRANSFER, IMAGE_TRANSFER_CLASS_ID, attribute_id)
        })
    }

    pub fn meter_image_verify(&self) -> Result<Response, Error> {
        info!("An image verify request is being sent to the meter in passthrough");
        self.request(Target::Meter(AssociationLevel::FirmwareUpgrade), |client| {
            client.encode_action(
                IMAGE_TRANSFER,
                IMAGE_TRANSFER_CLASS_ID,
                IMAGE_VERIFY_METHOD,
                Some(Data::Integer(0)),
            )
        })
    }

    pub fn meter_image_activate(&self) -> Result<Response, Error> {
        info!("An image activate request is being sent to the meter in passthrough");
        self.request(Target::Meter(AssociationLevel::FirmwareUpgrade), |client| {
            client.encode_action(
                IMAGE_TRANSFER,
                IMAGE_TRANSFER_CLASS_ID,
                IMAGE_ACTIVATE_METHOD,
                Some(Data::Integer(0)),
            )
        })
    }

    // ------------------------------------------------------------------------
    // Profile generic
    // ------------------------------------------------------------------------

    /// [US]
    pub fn get_meter_profile_generic_by_attribute(
        &self,
        obis: ObisCode,
        association: AssociationLevel,
        attribute_id: i8,
    ) -> Result<Response, Error> {
        info!("Get attribute {attribute_id} of profile {obis} from the meter in passthrough");
        self.request(Target::Meter(association), |client| {
            client.encode_get(obis, PROFILE_GENERIC_CLASS_ID, attribute_id)
        })
    }

    /// Buffer rows `index..index + count` (1-based) [US].
    pub fn get_meter_profile_generic_by_entries(
        &self,
        obis: ObisCode,
        index: u32,
        count: u32,
        association: AssociationLevel,
    ) -> Result<Response, Error> {
        info!("Get {count} entries from {index} of profile {obis} from the meter in passthrough");
        let access = entry_descriptor(index, count);
        self.request(Target::Meter(association), |client| {
            client.encode_get_with_access(obis, PROFILE_GENERIC_CLASS_ID, 2, access)
        })
    }

    /// Buffer rows captured between `start` and `end`, both included [US].
    pub fn get_meter_profile_generic_by_range(
        &self,
        obis: ObisCode,
        start: &DateTime,
        end: &DateTime,
        association: AssociationLevel,
    ) -> Result<Response, Error> {
        info!("Get entries from {start} to {end} of profile {obis} from the meter in passthrough");
        let access = range_descriptor(start, end);
        self.request(Target::Meter(association), |client| {
            client.encode_get_with_access(obis, PROFILE_GENERIC_CLASS_ID, 2, access)
        })
    }

    pub fn get_meter_profile_capture_objects(
        &self,
        profile: ProfileGeneric,
        association: AssociationLevel,
    ) -> Result<Response, Error> {
        info!("Get the {profile} capture objects of the meter in passthrough");
        self.get_meter_profile_generic_by_attribute(profile.obis(), association, 3)
    }

    pub fn get_meter_profile_scaler(
        &self,
        profile: ProfileGeneric,
        association: AssociationLevel,
    ) -> Result<Response, Error> {
        let obis = profile
            .scaler_obis()
            .ok_or_else(|| Error::InvalidValue(format!("{profile} has no scaler")))?;
        info!("Get the {profile} scaler of the meter in passthrough");
        self.get_meter_profile_generic_by_attribute(obis, association, 2)
    }

    pub fn get_meter_profile_event_code(
        &self,
        profile: ProfileGeneric,
        association: AssociationLevel,
    ) -> Result<Response, Error> {
        let obis = profile
            .event_code_obis()
            .ok_or_else(|| Error::InvalidValue(format!("{profile} is not an event log")))?;
        info!("Get the {profile} event code of the meter in passthrough");
        self.get_meter_data(obis, association, 2)
    }

    pub fn get_meter_instantaneous_profile(
        &self,
        association: AssociationLevel,
    ) -> Result<Response, Error> {
        let obis = ProfileGeneric::Instantaneous.obis();
        self.get_meter_profile_generic_by_attribute(obis, association, 2)
    }

    pub fn get_meter_name_plate_details(
        &self,
        association: AssociationLevel,
    ) -> Result<Response, Error> {
        let obis = ProfileGeneric::NamePlate.obis();
        self.get_meter_profile_generic_by_attribute(obis, association, 2)
    }

    pub fn get_meter_block_load_profile(
        &self,
        start: &DateTime,
        end: &DateTime,
        association: AssociationLevel,
    ) -> Result<Response, Error> {
        let obis = ProfileGeneric::BlockLoad.obis();
        self.get_meter_profile_generic_by_range(obis, start, end, association)
    }

    pub fn get_meter_daily_load_profile(
        &self,
        start: &DateTime,
        end: &DateTime,
        association: AssociationLevel,
    ) -> Result<Response, Error> {
        let obis = ProfileGeneric::DailyLoad.obis();
        self.get_meter_profile_generic_by_range(obis, start, end, association)
    }

    pub fn get_meter_billing_profile(
        &self,
        index: u32,
        count: u32,
        association: AssociationLevel,
    ) -> Result<Response, Error> {
        let obis = ProfileGeneric::Billing.obis();
        self.get_meter_profile_generic_by_entries(obis, index, count, association)
    }

    /// Entries of one of the [`ProfileGeneric::EVENT_LOGS`].
    pub fn get_meter_event_log(
        &self,
        log: ProfileGeneric,
        index: u32,
        count: u32,
        association: AssociationLevel,
    ) -> Result<Response, Error> {
        if !log.is_event_log() {
            return Err(Error::InvalidValue(format!("{log} is not an event log")));
        }
        self.get_meter_profile_generic_by_entries(log.obis(), index, count, association)
    }

    pub fn get_meter_block_load_capture_period(
        &self,
        association: AssociationLevel,
    ) -> Result<Response, Error> {
        info!("Get the block load capture period of the meter in passthrough");
        self.get_meter_data(BLOCK_LOAD_CAPTURE_PERIOD, association, 2)
    }

    /// Capture period in seconds [US]. Periods other than 900, 1800 and 3600
    /// are sent anyway.
    pub fn set_meter_block_load_capture_period(
        &self,
        seconds: u16,
        association: AssociationLevel,
    ) -> Result<Response, Error> {
        if !BLOCK_LOAD_CAPTURE_PERIODS.contains(&seconds) {
            warn!(
                "Block load profile capture period should be set to 900, 1800 or 3600s. \
                 Found: {seconds}"
            );
        }
        info!("Set the block load capture period of the meter in passthrough");
        self.set_meter_data(
            BLOCK_LOAD_CAPTURE_PERIOD,
            DataType::LongUnsigned,
            Data::LongUnsigned(seconds),
            association,
            2,
        )
    }

    pub fn get_meter_daily_load_capture_period(
        &self,
        association: AssociationLevel,
    ) -> Result<Response, Error> {
        info!("Get the daily load capture period of the meter in passthrough");
        self.get_meter_data(DAILY_LOAD_CAPTURE_PERIOD, association, 2)
    }

    // ------------------------------------------------------------------------
    // Schedules, limiter, push setup, object lists
    // ------------------------------------------------------------------------

    /// Execution times of the single action schedule [MR].
    pub fn get_meter_action_scheduler(
        &self,
        association: AssociationLevel,
    ) -> Result<Response, Error> {
        info!("Get the action schedule of the meter in passthrough");
        self.request(Target::Meter(association), |client| {
            client.encode_get(ACTION_SCHEDULE, SINGLE_ACTION_SCHEDULE_CLASS_ID, 4)
        })
    }

    /// Passive calendar activation time [MR].
    pub fn get_meter_activity_calendar(
        &self,
        association: AssociationLevel,
    ) -> Result<Response, Error> {
        info!("Get the activity calendar of the meter in passthrough");
        self.request(Target::Meter(association), |client| {
            client.encode_get(ACTIVITY_CALENDAR, ACTIVITY_CALENDAR_CLASS_ID, 10)
        })
    }

    /// Active threshold of the limiter [US].
    pub fn get_meter_limiter(&self, association: AssociationLevel) -> Result<Response, Error> {
        info!("Get the limiter threshold of the meter in passthrough");
        self.request(Target::Meter(association), |client| {
            client.encode_get(LIMITER, LIMITER_CLASS_ID, 4)
        })
    }

    pub fn set_meter_limiter(
        &self,
        threshold: u32,
        association: AssociationLevel,
    ) -> Result<Response, Error> {
        info!("Set the limiter threshold of the meter in passthrough");
        self.request(Target::Meter(association), |client| {
            client.encode_set(
                LIMITER,
                LIMITER_CLASS_ID,
                4,
                DataType::DoubleLongUnsigned,
                Data::DoubleLongUnsigned(threshold),
            )
        })
    }

    /// Push object list of a push setup, [`PUSH_SETUP`] by default [US].
    pub fn get_meter_push_setup(
        &self,
        obis: ObisCode,
        association: AssociationLevel,
    ) -> Result<Response, Error> {
        info!("Get the push setup {obis} of the meter in passthrough");
        self.request(Target::Meter(association), |client| {
            client.encode_get(obis, PUSH_SETUP_CLASS_ID, 2)
        })
    }

    /// Object list of the current association [PC]. The response is heavy and
    /// may exceed what the NIC relays.
    pub fn get_meter_object_list(&self, association: AssociationLevel) -> Result<Response, Error> {
        info!("Get the object list of the meter in passthrough");
        self.request(Target::Meter(association), |client| {
            client.encode_get(METER_OBJECT_LIST, ASSOCIATION_LN_CLASS_ID, 2)
        })
    }

    pub fn get_nic_object_list(&self) -> Result<Response, Error> {
        info!("Get the object list of the NIC");
        self.request(Target::Nic, |client| {
            client.encode_get(NIC_OBJECT_LIST, ASSOCIATION_LN_CLASS_ID, 2)
        })
    }

    // ------------------------------------------------------------------------
    // NIC push configuration
    // ------------------------------------------------------------------------

    pub fn get_nic_instantaneous_push_interval(&self) -> Result<Response, Error> {
        info!("Get the instantaneous push interval of the NIC");
        self.get_nic_data(NIC_INSTANTANEOUS_PUSH_INTERVAL, 2)
    }

    /// Interval in minutes, one of [`INSTANTANEOUS_PUSH_INTERVALS`].
    pub fn set_nic_instantaneous_push_interval(&self, minutes: u16) -> Result<Response, Error> {
        if !INSTANTANEOUS_PUSH_INTERVALS.contains(&minutes) {
            return Err(Error::InvalidValue(format!(
                "instantaneous push interval should be 15, 30, 60 or 1440 minutes, found {minutes}"
            )));
        }
        info!("Set the instantaneous push interval of the NIC");
        self.set_nic_data(
            NIC_INSTANTANEOUS_PUSH_INTERVAL,
            DataType::LongUnsigned,
            Data::LongUnsigned(minutes),
            2,
        )
    }

    pub fn get_nic_push_enable_configuration(&self) -> Result<Response, Error> {
        info!("Get the push enable configuration of the NIC");
        self.get_nic_data(NIC_PUSH_ENABLE_CONFIGURATION, 2)
    }

    /// One character per profile of [`PUSH_ENABLE_FLAGS`], leftmost first,
    /// `'1'` to enable its push, e.g. `"11110000000"`.
    pub fn set_nic_push_enable_configuration(&self, flags: &str) -> Result<Response, Error> {
        let bits: BitString = flags.parse().map_err(|e| Error::InvalidValue(format!("{e}")))?;
        if bits.len() != PUSH_ENABLE_FLAGS.len() {
            return Err(Error::InvalidValue(format!(
                "push enable configuration needs {} flags, found {}",
                PUSH_ENABLE_FLAGS.len(),
                bits.len()
            )));
        }
        let enabled: Vec<&str> = bits.set_bits().map(|bit| PUSH_ENABLE_FLAGS[bit]).collect();
        info!("Set the push enable configuration of the NIC, enabled: {enabled:?}");
        self.set_nic_data(
            NIC_PUSH_ENABLE_CONFIGURATION,
            DataType::BitString,
            Data::BitString(bits),
            2,
        )
    }

    // ------------------------------------------------------------------------
    // NIC security material
    // ------------------------------------------------------------------------

    /// Write every credential of `config` to the NIC.
    pub fn set_nic_security_material_from_config(
        &self,
        config: &MeterConfiguration,
    ) -> Result<Response, Error> {
        let mut rotation = KeyRotation::new();
        let slots = [
            (KeySlot::MrPassword, config.mr_password()),
            (KeySlot::UsPassword, config.us_password()),
            (KeySlot::FuPassword, config.fu_password()),
            (KeySlot::EncryptionKey, config.block_cipher_key()),
            (KeySlot::AuthenticationKey, config.authentication_key()),
            (KeySlot::KeyEncryptionKey, config.key_encryption_key()),
        ];
        for (slot, value) in slots {
            if let Some(value) = value {
                rotation.insert(slot, value.clone());
            }
        }
        self.set_nic_security_material_with_list(&rotation)
    }

    /// Write new credentials to the NIC in one SET-with-list, under the US
    /// association. Keys are wrapped under the current key encryption key.
    ///
    /// The NIC only switches to the new credentials when the association is
    /// released, so [`Meter::release_aa_nic`] must follow. The slots the NIC
    /// accepted are applied to this meter by that release.
    pub fn set_nic_security_material_with_list(
        &self,
        rotation: &KeyRotation,
    ) -> Result<Response, Error> {
        if rotation.is_empty() {
            return Err(Error::InvalidValue(
                "secrets or keys must be provided to set up the NIC security material".to_string(),
            ));
        }

        let mut ordered = KeyRotation::new();
        for (slot, _) in SECURITY_MATERIAL {
            if let Some(value) = rotation.get(slot) {
                ordered.insert(slot, value.clone());
            }
        }

        let names: Vec<&str> = ordered.iter().map(|(slot, _)| slot.name()).collect();
        info!("Set NIC security material: {names:?}");
        let items = ordered.clone();
        self.request_with_rotation(Target::Nic, ordered, move |client| {
            let association = client.association();
            if association != AssociationLevel::UtilitySetting {
                return Err(Error::WrongAssociation {
                    expected: AssociationLevel::UtilitySetting,
                    found: association,
                });
            }

            let mut list = Vec::with_capacity(items.len());
            for (slot, obis) in SECURITY_MATERIAL {
                let Some(value) = items.get(slot) else {
                    continue;
                };
                let bytes = match slot {
                    KeySlot::MrPassword | KeySlot::UsPassword | KeySlot::FuPassword => {
                        value.as_bytes().to_vec()
                    }
                    _ => client.wrap_key(value.as_bytes())?,
                };
                list.push(WriteItem::new(DATA_CLASS_ID, obis, 2, Data::OctetString(bytes)));
            }
            client.encode_set_list(&list)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Date, Time};
    use crate::get::{AttributeDescriptor, GetRequest};

    #[test]
    fn test_profile_generic_obis() {
        assert_eq!(ProfileGeneric::Instantaneous.obis(), ObisCode::new(1, 0, 94, 91, 0, 255));
        assert_eq!(ProfileGeneric::NamePlate.obis(), ObisCode::new(0, 0, 94, 91, 10, 255));
        assert_eq!(ProfileGeneric::ControlEventsLog.obis(), ObisCode::new(0, 0, 99, 98, 6, 255));
        assert_eq!(
            ProfileGeneric::VoltageEventsLog.event_code_obis(),
            Some(ObisCode::new(0, 0, 96, 11, 0, 255))
        );
        assert_eq!(
            ProfileGeneric::PowerEventsLog.scaler_obis(),
            Some(ObisCode::new(1, 0, 94, 91, 7, 255))
        );
        assert_eq!(
            ProfileGeneric::Billing.scaler_obis(),
            Some(ObisCode::new(1, 0, 94, 91, 6, 255))
        );
        assert_eq!(ProfileGeneric::NamePlate.scaler_obis(), None);
        assert_eq!(ProfileGeneric::BlockLoad.event_code_obis(), None);
        assert!(!ProfileGeneric::DailyLoad.is_event_log());
        assert_eq!(
            ProfileGeneric::NonRolloverEventsLog.to_string(),
            "non-rollover events log profile"
        );
    }

    #[test]
    fn test_entry_descriptor() {
        let access = entry_descriptor(5, 3);
        assert_eq!(access.selector, 2);
        assert_eq!(
            access.parameters,
            Data::Structure(vec![
                Data::DoubleLongUnsigned(5),
                Data::DoubleLongUnsigned(7),
                Data::LongUnsigned(1),
                Data::LongUnsigned(0),
            ])
        );

        let Data::Structure(fields) = entry_descriptor(1, 0).parameters else {
            panic!("entry descriptor is a structure");
        };
        assert_eq!(fields[1], Data::DoubleLongUnsigned(0));
    }

    #[test]
    fn test_entry_descriptor_encoding() {
        let request = GetRequest::Normal {
            invoke_id: 0xC1,
            attribute: AttributeDescriptor::new(
                PROFILE_GENERIC_CLASS_ID,
                ProfileGeneric::Billing.obis(),
                2,
            ),
            access_selection: Some(entry_descriptor(1, 1)),
        };

        #[rustfmt::skip]
        let expected = vec![
            0xC0, 0x01, 0xC1,
            0x00, 0x07, 0x01, 0x00, 0x62, 0x01, 0x00, 0xFF, 0x02,
            0x01, 0x02,
            0x02, 0x04,
            0x06, 0x00, 0x00, 0x00, 0x01,
            0x06, 0x00, 0x00, 0x00, 0x01,
            0x12, 0x00, 0x01,
            0x12, 0x00, 0x00,
        ];
        assert_eq!(request.encode(), expected);
    }

    #[test]
    fn test_range_descriptor() {
        let start = DateTime::new(Date::new(2024, 1, 1), Time::new(0, 0, 0));
        let end = DateTime::new(Date::new(2024, 1, 2), Time::new(0, 0, 0));

        let access = range_descriptor(&start, &end);

        assert_eq!(access.selector, 1);
        let Data::Structure(fields) = access.parameters else {
            panic!("range descriptor is a structure");
        };
        assert_eq!(fields.len(), 4);
        assert_eq!(
            fields[0],
            Data::Structure(vec![
                Data::LongUnsigned(8),
                Data::OctetString(vec![0, 0, 1, 0, 0, 255]),
                Data::Integer(2),
                Data::LongUnsigned(0),
            ])
        );
        assert_eq!(fields[1], Data::OctetString(start.encode()));
        assert_eq!(fields[2], Data::OctetString(end.encode()));
        assert_eq!(fields[3], Data::Array(vec![]));
    }

    #[test]
    fn test_security_material_slots() {
        let slots: Vec<KeySlot> = SECURITY_MATERIAL.iter().map(|(slot, _)| *slot).collect();
        assert_eq!(slots.len(), 6);
        assert_eq!(SECURITY_MATERIAL[3].1, ObisCode::new(0, 0, 43, 0, 0, 251));
        assert_eq!(PUSH_ENABLE_FLAGS[0], "instantaneous");
        assert_eq!(PUSH_ENABLE_FLAGS[10], "control events");
    }
}
