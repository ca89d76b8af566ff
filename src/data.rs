//! COSEM data values (A-XDR encoded)
//!
//! Every attribute value read from or written to a meter travels as a `Data`
//! element: a one byte type tag followed by the type specific encoding.
//!
//! Reference: DLMS Blue Book Ed. 14, Section 4.1.5

use std::fmt;
use std::str::FromStr;

use derive_try_from_primitive::TryFromPrimitive;
use nom::{
    IResult, Parser,
    bytes::streaming::take,
    combinator::fail,
    multi::length_count,
    number::streaming::{be_f32, be_f64, be_i16, be_i32, be_i64, be_u16, be_u32, be_u64, i8, u8},
};
#[cfg(feature = "serde")]
use serde::{Serialize, Serializer};

use crate::ByteBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
#[non_exhaustive]
#[rustfmt::skip]
pub enum DataType {
  Null               =  0,
  Array              =  1,
  Structure          =  2,
  Bool               =  3,
  BitString          =  4,
  DoubleLong         =  5,
  DoubleLongUnsigned =  6,
  OctetString        =  9,
  VisibleString      = 10,
  Utf8String         = 12,
  BinaryCodedDecimal = 13,
  Integer            = 15,
  Long               = 16,
  Unsigned           = 17,
  LongUnsigned       = 18,
  CompactArray       = 19,
  Long64             = 20,
  Long64Unsigned     = 21,
  Enum               = 22,
  Float32            = 23,
  Float64            = 24,
  DateTime           = 25,
  Date               = 26,
  Time               = 27,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ============================================================================
// A-XDR length
// ============================================================================

/// Parse an A-XDR variable length (`0x00..=0x7F`, `0x81 nn`, `0x82 nnnn`, ...).
pub(crate) fn parse_length(input: &[u8]) -> IResult<&[u8], usize> {
    let (input, first) = u8(input)?;
    if first & 0x80 == 0 {
        return Ok((input, first as usize));
    }

    let octets = (first & 0x7F) as usize;
    if octets == 0 || octets > 4 {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::LengthValue,
        )));
    }

    let (input, bytes) = take(octets).parse(input)?;
    let length = bytes.iter().fold(0usize, |acc, &b| (acc << 8) | b as usize);
    Ok((input, length))
}

pub(crate) fn encode_length(buf: &mut Vec<u8>, length: usize) {
    if length < 0x80 {
        buf.push_u8(length as u8);
    } else if length <= 0xFF {
        buf.push_u8(0x81);
        buf.push_u8(length as u8);
    } else if length <= 0xFFFF {
        buf.push_u8(0x82);
        buf.push_u16(length as u16);
    } else {
        buf.push_u8(0x84);
        buf.push_u32(length as u32);
    }
}

// ============================================================================
// Date / Time / DateTime
// ============================================================================

#[derive(Clone, PartialEq, Eq)]
pub struct Date {
    pub(crate) year: u16,
    pub(crate) month: u8,
    pub(crate) day_of_month: u8,
    pub(crate) day_of_week: u8,
}

impl Date {
    /// Create a date; the day of week is left unspecified (0xFF).
    pub fn new(year: u16, month: u8, day_of_month: u8) -> Self {
        Self { year, month, day_of_month, day_of_week: 0xFF }
    }

    pub fn year(&self) -> u16 {
        self.year
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    pub fn day_of_month(&self) -> u8 {
        self.day_of_month
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, year) = be_u16(input)?;
        let (input, month) = u8(input)?;
        let (input, day_of_month) = u8(input)?;
        let (input, day_of_week) = u8(input)?;

        Ok((input, Self { year, month, day_of_month, day_of_week }))
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(5);
        buf.push_u16(self.year);
        buf.push_u8(self.month);
        buf.push_u8(self.day_of_month);
        buf.push_u8(self.day_of_week);
        buf
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day_of_month)
    }
}

impl fmt::Debug for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Date(\"{}\")", self)
    }
}

#[cfg(feature = "serde")]
impl Serialize for Date {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Time {
    pub(crate) hour: Option<u8>,
    pub(crate) minute: Option<u8>,
    pub(crate) second: Option<u8>,
    pub(crate) hundredth: Option<u8>,
}

impl Time {
    pub fn new(hour: u8, minute: u8, second: u8) -> Self {
        Self { hour: Some(hour), minute: Some(minute), second: Some(second), hundredth: None }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, (hour, minute, second, hundredth)) = (u8, u8, u8, u8).parse(input)?;

        let hour = match hour {
            0xff => None,
            0..=23 => Some(hour),
            _ => return fail().parse(input),
        };
        let minute = match minute {
            0xff => None,
            0..=59 => Some(minute),
            _ => return fail().parse(input),
        };
        let second = match second {
            0xff => None,
            0..=59 => Some(second),
            _ => return fail().parse(input),
        };
        let hundredth = match hundredth {
            0xff => None,
            0..=99 => Some(hundredth),
            _ => return fail().parse(input),
        };

        Ok((input, Self { hour, minute, second, hundredth }))
    }

    pub fn encode(&self) -> Vec<u8> {
        vec![
            self.hour.unwrap_or(0xFF),
            self.minute.unwrap_or(0xFF),
            self.second.unwrap_or(0xFF),
            self.hundredth.unwrap_or(0xFF),
        ]
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.hour.unwrap_or(0),
            self.minute.unwrap_or(0),
            self.second.unwrap_or(0),
        )
    }
}

impl fmt::Debug for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Time(\"{}\")", self)
    }
}

#[cfg(feature = "serde")]
impl Serialize for Time {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockStatus(pub(crate) u8);

impl ClockStatus {
    #[rustfmt::skip]
    const INVALID_VALUE_BIT:   u8 = 0b00000001;
    #[rustfmt::skip]
    const DOUBTFUL_VALUE_BIT:  u8 = 0b00000010;
    #[rustfmt::skip]
    const DAYLIGHT_SAVING_BIT: u8 = 0b10000000;

    pub fn invalid_value(&self) -> bool {
        (self.0 & Self::INVALID_VALUE_BIT) != 0
    }

    pub fn doubtful_value(&self) -> bool {
        (self.0 & Self::DOUBTFUL_VALUE_BIT) != 0
    }

    pub fn daylight_saving(&self) -> bool {
        (self.0 & Self::DAYLIGHT_SAVING_BIT) != 0
    }
}

/// Twelve byte COSEM date-time: date, time, deviation in minutes, clock status.
#[derive(Clone, PartialEq, Eq)]
pub struct DateTime {
    pub(crate) date: Date,
    pub(crate) time: Time,
    pub(crate) offset_minutes: Option<i16>,
    pub(crate) clock_status: Option<ClockStatus>,
}

impl DateTime {
    const NOT_SPECIFIED_DEVIATION: i16 = 0x8000u16 as i16;

    pub fn new(date: Date, time: Time) -> Self {
        Self { date, time, offset_minutes: None, clock_status: None }
    }

    pub fn with_offset_minutes(mut self, offset_minutes: i16) -> Self {
        self.offset_minutes = Some(offset_minutes);
        self
    }

    pub fn date(&self) -> &Date {
        &self.date
    }

    pub fn time(&self) -> &Time {
        &self.time
    }

    pub fn clock_status(&self) -> Option<ClockStatus> {
        self.clock_status
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, date) = Date::parse(input)?;
        let (input, time) = Time::parse(input)?;
        let (input, offset_minutes) = be_i16(input)?;
        let offset_minutes = Some(offset_minutes).filter(|&b| b != Self::NOT_SPECIFIED_DEVIATION);
        let (input, clock_status) = u8(input)?;
        let clock_status = Some(clock_status).filter(|&b| b != 0xff).map(ClockStatus);

        Ok((input, Self { date, time, offset_minutes, clock_status }))
    }

    /// Twelve byte octet-string form, as carried by clock attribute 2 and push headers.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(12);
        buf.push_bytes(&self.date.encode());
        buf.push_bytes(&self.time.encode());
        buf.push_u16(self.offset_minutes.unwrap_or(Self::NOT_SPECIFIED_DEVIATION) as u16);
        buf.push_u8(self.clock_status.map(|s| s.0).unwrap_or(0xFF));
        buf
    }

    #[cfg(feature = "chrono-conversions")]
    pub fn from_chrono(value: &chrono::NaiveDateTime) -> Self {
        use chrono::{Datelike, Timelike};

        let mut date =
            Date::new(value.year() as u16, value.month() as u8, value.day() as u8);
        date.day_of_week = value.weekday().number_from_monday() as u8;
        let time = Time::new(value.hour() as u8, value.minute() as u8, value.second() as u8);
        Self::new(date, time)
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}T{}", self.date, self.time)?;

        // DLMS deviation is local time minus UTC with inverted sign.
        if let Some(offset_minutes) = self.offset_minutes {
            let sign = if offset_minutes > 0 { '-' } else { '+' };
            let offset_minutes = offset_minutes.abs();
            write!(f, "{}{:02}:{:02}", sign, offset_minutes / 60, offset_minutes % 60)?;
        }

        Ok(())
    }
}

impl fmt::Debug for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DateTime(\"{}\")", self)
    }
}

#[cfg(feature = "serde")]
impl Serialize for DateTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

// ============================================================================
// BitString
// ============================================================================

/// A DLMS bit-string, held as a string of `'0'`/`'1'` with bit 0 leftmost.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BitString(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("bit string may only contain '0' and '1', found {0:?}")]
pub struct InvalidBitString(pub String);

impl BitString {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether bit `index` (0 = leftmost) is set.
    pub fn bit(&self, index: usize) -> bool {
        self.0.as_bytes().get(index) == Some(&b'1')
    }

    pub fn reversed(&self) -> Self {
        Self(self.0.chars().rev().collect())
    }

    /// Indices of the set bits, in ascending order.
    pub fn set_bits(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.bytes().enumerate().filter(|&(_, b)| b == b'1').map(|(i, _)| i)
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, bit_count) = parse_length(input)?;
        let (input, bytes) = take(bit_count.div_ceil(8)).parse(input)?;

        let bits = (0..bit_count)
            .map(|i| if bytes[i / 8] & (0x80 >> (i % 8)) != 0 { '1' } else { '0' })
            .collect();
        Ok((input, Self(bits)))
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut packed = vec![0u8; self.0.len().div_ceil(8)];
        for index in self.set_bits() {
            packed[index / 8] |= 0x80 >> (index % 8);
        }

        let mut buf = Vec::with_capacity(packed.len() + 2);
        encode_length(&mut buf, self.0.len());
        buf.push_bytes(&packed);
        buf
    }
}

impl FromStr for BitString {
    type Err = InvalidBitString;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.bytes().all(|b| b == b'0' || b == b'1') {
            Ok(Self(s.to_owned()))
        } else {
            Err(InvalidBitString(s.to_owned()))
        }
    }
}

impl fmt::Display for BitString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for BitString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BitString(\"{}\")", self.0)
    }
}

#[cfg(feature = "serde")]
impl Serialize for BitString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

// ============================================================================
// Data
// ============================================================================

#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Data {
    Null,
    Array(Vec<Data>),
    Structure(Vec<Data>),
    Bool(bool),
    BitString(BitString),
    DoubleLong(i32),
    DoubleLongUnsigned(u32),
    OctetString(Vec<u8>),
    VisibleString(Vec<u8>),
    Utf8String(String),
    Integer(i8),
    Long(i16),
    Unsigned(u8),
    LongUnsigned(u16),
    Long64(i64),
    Long64Unsigned(u64),
    Enum(u8),
    Float32(f32),
    Float64(f64),
    DateTime(DateTime),
    Date(Date),
    Time(Time),
}

impl Data {
    pub fn data_type(&self) -> DataType {
        match self {
            Data::Null => DataType::Null,
            Data::Array(_) => DataType::Array,
            Data::Structure(_) => DataType::Structure,
            Data::Bool(_) => DataType::Bool,
            Data::BitString(_) => DataType::BitString,
            Data::DoubleLong(_) => DataType::DoubleLong,
            Data::DoubleLongUnsigned(_) => DataType::DoubleLongUnsigned,
            Data::OctetString(_) => DataType::OctetString,
            Data::VisibleString(_) => DataType::VisibleString,
            Data::Utf8String(_) => DataType::Utf8String,
            Data::Integer(_) => DataType::Integer,
            Data::Long(_) => DataType::Long,
            Data::Unsigned(_) => DataType::Unsigned,
            Data::LongUnsigned(_) => DataType::LongUnsigned,
            Data::Long64(_) => DataType::Long64,
            Data::Long64Unsigned(_) => DataType::Long64Unsigned,
            Data::Enum(_) => DataType::Enum,
            Data::Float32(_) => DataType::Float32,
            Data::Float64(_) => DataType::Float64,
            Data::DateTime(_) => DataType::DateTime,
            Data::Date(_) => DataType::Date,
            Data::Time(_) => DataType::Time,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, tag) = u8(input)?;
        let data_type = DataType::try_from(tag).map_err(|_| {
            nom::Err::Failure(nom::error::Error::new(input, nom::error::ErrorKind::Tag))
        })?;

        Ok(match data_type {
            DataType::Null => (input, Data::Null),
            DataType::Array => {
                let (input, items) = length_count(parse_length, Self::parse).parse(input)?;
                (input, Data::Array(items))
            }
            DataType::Structure => {
                let (input, items) = length_count(parse_length, Self::parse).parse(input)?;
                (input, Data::Structure(items))
            }
            DataType::Bool => {
                let (input, b) = u8(input)?;
                (input, Data::Bool(b != 0))
            }
            DataType::BitString => {
                let (input, bits) = BitString::parse(input)?;
                (input, Data::BitString(bits))
            }
            DataType::OctetString => {
                let (input, len) = parse_length(input)?;
                let (input, bytes) = take(len).parse(input)?;
                (input, Data::OctetString(bytes.to_vec()))
            }
            DataType::VisibleString => {
                let (input, len) = parse_length(input)?;
                let (input, bytes) = take(len).parse(input)?;
                (input, Data::VisibleString(bytes.to_vec()))
            }
            DataType::Utf8String => {
                let (input, len) = parse_length(input)?;
                let (input, bytes) = take(len).parse(input)?;
                (input, Data::Utf8String(String::from_utf8_lossy(bytes).into_owned()))
            }
            DataType::DateTime => {
                let (input, date_time) = DateTime::parse(input)?;
                (input, Data::DateTime(date_time))
            }
            DataType::Date => {
                let (input, date) = Date::parse(input)?;
                (input, Data::Date(date))
            }
            DataType::Time => {
                let (input, time) = Time::parse(input)?;
                (input, Data::Time(time))
            }
            DataType::Float32 => {
                let (input, n) = be_f32(input)?;
                (input, Data::Float32(n))
            }
            DataType::Float64 => {
                let (input, n) = be_f64(input)?;
                (input, Data::Float64(n))
            }
            DataType::Integer => {
                let (input, n) = i8(input)?;
                (input, Data::Integer(n))
            }
            DataType::Long => {
                let (input, n) = be_i16(input)?;
                (input, Data::Long(n))
            }
            DataType::DoubleLong => {
                let (input, n) = be_i32(input)?;
                (input, Data::DoubleLong(n))
            }
            DataType::Long64 => {
                let (input, n) = be_i64(input)?;
                (input, Data::Long64(n))
            }
            DataType::Enum => {
                let (input, n) = u8(input)?;
                (input, Data::Enum(n))
            }
            DataType::Unsigned => {
                let (input, n) = u8(input)?;
                (input, Data::Unsigned(n))
            }
            DataType::LongUnsigned => {
                let (input, n) = be_u16(input)?;
                (input, Data::LongUnsigned(n))
            }
            DataType::DoubleLongUnsigned => {
                let (input, n) = be_u32(input)?;
                (input, Data::DoubleLongUnsigned(n))
            }
            DataType::Long64Unsigned => {
                let (input, n) = be_u64(input)?;
                (input, Data::Long64Unsigned(n))
            }
            DataType::BinaryCodedDecimal | DataType::CompactArray => {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    input,
                    nom::error::ErrorKind::Switch,
                )));
            }
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf);
        buf
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push_u8(self.data_type() as u8);
        match self {
            Data::Null => {}
            Data::Array(items) | Data::Structure(items) => {
                encode_length(buf, items.len());
                for item in items {
                    item.encode_into(buf);
                }
            }
            Data::Bool(b) => buf.push_u8(*b as u8),
            Data::BitString(bits) => buf.push_bytes(&bits.encode()),
            Data::OctetString(bytes) | Data::VisibleString(bytes) => {
                encode_length(buf, bytes.len());
                buf.push_bytes(bytes);
            }
            Data::Utf8String(s) => {
                encode_length(buf, s.len());
                buf.push_bytes(s.as_bytes());
            }
            Data::Integer(n) => buf.push_u8(*n as u8),
            Data::Long(n) => buf.push_u16(*n as u16),
            Data::DoubleLong(n) => buf.push_u32(*n as u32),
            Data::Long64(n) => buf.push_bytes(&n.to_be_bytes()),
            Data::Unsigned(n) | Data::Enum(n) => buf.push_u8(*n),
            Data::LongUnsigned(n) => buf.push_u16(*n),
            Data::DoubleLongUnsigned(n) => buf.push_u32(*n),
            Data::Long64Unsigned(n) => buf.push_bytes(&n.to_be_bytes()),
            Data::Float32(n) => buf.push_bytes(&n.to_be_bytes()),
            Data::Float64(n) => buf.push_bytes(&n.to_be_bytes()),
            Data::DateTime(dt) => buf.push_bytes(&dt.encode()),
            Data::Date(d) => buf.push_bytes(&d.encode()),
            Data::Time(t) => buf.push_bytes(&t.encode()),
        }
    }

    // ------------------------------------------------------------------------
    // Typed accessors
    // ------------------------------------------------------------------------

    /// Any unsigned or non-negative signed integer, widened.
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Data::Unsigned(n) | Data::Enum(n) => Some(n as u64),
            Data::LongUnsigned(n) => Some(n as u64),
            Data::DoubleLongUnsigned(n) => Some(n as u64),
            Data::Long64Unsigned(n) => Some(n),
            _ => self.as_i64().and_then(|n| u64::try_from(n).ok()),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Data::Integer(n) => Some(n as i64),
            Data::Long(n) => Some(n as i64),
            Data::DoubleLong(n) => Some(n as i64),
            Data::Long64(n) => Some(n),
            Data::Unsigned(n) | Data::Enum(n) => Some(n as i64),
            Data::LongUnsigned(n) => Some(n as i64),
            Data::DoubleLongUnsigned(n) => Some(n as i64),
            Data::Long64Unsigned(n) => i64::try_from(n).ok(),
            _ => None,
        }
    }

    /// Raw bytes of an octet-string or visible-string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Data::OctetString(bytes) | Data::VisibleString(bytes) => Some(bytes),
            Data::Utf8String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Textual view of string-like values.
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    pub fn as_structure(&self) -> Option<&[Data]> {
        match self {
            Data::Structure(items) | Data::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_bit_string(&self) -> Option<&BitString> {
        match self {
            Data::BitString(bits) => Some(bits),
            _ => None,
        }
    }

    /// A date-time, either native or as the 12 byte octet-string form.
    pub fn as_date_time(&self) -> Option<DateTime> {
        match self {
            Data::DateTime(dt) => Some(dt.clone()),
            Data::OctetString(bytes) if bytes.len() == 12 => {
                DateTime::parse(bytes).ok().map(|(_, dt)| dt)
            }
            _ => None,
        }
    }
}

impl From<DateTime> for Data {
    fn from(value: DateTime) -> Self {
        Data::OctetString(value.encode())
    }
}
