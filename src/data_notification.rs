//! Data-notification APDU
//!
//! Unsolicited pushes (NIC status word, ESW, load profiles, event logs) reach the
//! client as data-notifications, usually inside a general-glo-ciphering envelope.
//!
//! ```text
//! 0F [long-invoke-id-and-priority:4] [date-time: 00 | 0C + 12 bytes] [notification-body: Data]
//! ```

use nom::{
    IResult, Parser,
    bytes::streaming::take,
    error::{Error, ErrorKind},
    number::streaming::{be_u32, u8},
};

use crate::ByteBuffer;
use crate::{Data, DateTime};

pub const DATA_NOTIFICATION_TAG: u8 = 0x0F;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LongInvokeIdAndPriority(pub u32);

impl LongInvokeIdAndPriority {
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, id) = be_u32(input)?;
        Ok((input, Self(id)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Normal,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceClass {
    Confirmed,
    Unconfirmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingOption {
    ContinueOnError,
    BreakOnError,
}

impl LongInvokeIdAndPriority {
    pub fn priority(&self) -> Priority {
        if (self.0 & (1 << 31)) == 0 { Priority::Normal } else { Priority::High }
    }

    pub fn processing_option(&self) -> ProcessingOption {
        if (self.0 & (1 << 29)) == 0 {
            ProcessingOption::ContinueOnError
        } else {
            ProcessingOption::BreakOnError
        }
    }

    pub fn self_descriptive(&self) -> bool {
        (self.0 & (1 << 28)) != 0
    }

    pub fn service_class(&self) -> ServiceClass {
        if (self.0 & (1 << 30)) == 0 { ServiceClass::Unconfirmed } else { ServiceClass::Confirmed }
    }

    pub fn invoke_id(&self) -> u32 {
        self.0 & 0x00ffffff
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataNotification {
    pub long_invoke_id_and_priority: LongInvokeIdAndPriority,
    pub date_time: Option<DateTime>,
    pub notification_body: Data,
}

impl DataNotification {
    pub fn new(invoke_id: u32, date_time: Option<DateTime>, notification_body: Data) -> Self {
        Self {
            long_invoke_id_and_priority: LongInvokeIdAndPriority(invoke_id & 0x00ffffff),
            date_time,
            notification_body,
        }
    }

    pub fn priority(&self) -> Priority {
        self.long_invoke_id_and_priority.priority()
    }

    pub fn self_descriptive(&self) -> bool {
        self.long_invoke_id_and_priority.self_descriptive()
    }

    pub fn processing_option(&self) -> ProcessingOption {
        self.long_invoke_id_and_priority.processing_option()
    }

    pub fn service_class(&self) -> ServiceClass {
        self.long_invoke_id_and_priority.service_class()
    }

    pub fn invoke_id(&self) -> u32 {
        self.long_invoke_id_and_priority.invoke_id()
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, tag) = u8(input)?;
        if tag != DATA_NOTIFICATION_TAG {
            return Err(nom::Err::Error(Error::new(input, ErrorKind::Tag)));
        }
        let (input, long_invoke_id_and_priority) = LongInvokeIdAndPriority::parse(input)?;
        let (input, date_time_len) = u8(input)?;
        let (input, date_time) = match date_time_len {
            0 => (input, None),
            12 => {
                let (input, date_time) = DateTime::parse(input)?;
                (input, Some(date_time))
            }
            // Unknown encodings are skipped rather than rejected.
            len => {
                let (input, _) = take(len).parse(input)?;
                (input, None)
            }
        };
        let (input, notification_body) = Data::parse(input)?;
        Ok((input, Self { long_invoke_id_and_priority, date_time, notification_body }))
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push_u8(DATA_NOTIFICATION_TAG);
        buf.push_u32(self.long_invoke_id_and_priority.0);
        match &self.date_time {
            Some(date_time) => {
                buf.push_u8(12);
                buf.push_bytes(&date_time.encode());
            }
            None => buf.push_u8(0),
        }
        buf.push_bytes(&self.notification_body.encode());
        buf
    }
}
