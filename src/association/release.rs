//! RLRQ / RLRE APDUs (A-Release Request / Response)
//!
//! ```text
//! RLRQ: 62 03 80 01 <reason>
//! RLRE: 63 03 80 01 <reason>   (or an empty 63 00)
//! ```
//!
//! Reference: DLMS Green Book Ed. 12, Section 11 and Table 146-147

use derive_try_from_primitive::TryFromPrimitive;
use nom::IResult;

use super::ber::{
    TagType, encode_application, encode_context_specific, parse_elements, parse_tagged,
};
use super::{RLRE_TAG, RLRQ_TAG};

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
#[rustfmt::skip]
pub enum ReleaseRequestReason {
  Normal      =  0,
  Urgent      =  1,
  UserDefined = 30,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
#[rustfmt::skip]
pub enum ReleaseResponseReason {
  Normal      =  0,
  NotFinished =  1,
  UserDefined = 30,
}

fn encode_release(tag: u8, reason: Option<u8>) -> Vec<u8> {
    let content = reason
        .map(|reason| encode_context_specific(0, TagType::Primitive, &[reason]))
        .unwrap_or_default();
    encode_application(tag & 0x1F, TagType::Constructed, &content)
}

fn parse_reason(content: &[u8]) -> IResult<&[u8], Option<u8>> {
    let (rest, elements) = parse_elements(content)?;
    let reason = elements
        .into_iter()
        .find(|(tag, _)| *tag == 0x80)
        .and_then(|(_, value)| value.first().copied());
    Ok((rest, reason))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseRequest {
    pub reason: Option<ReleaseRequestReason>,
}

impl ReleaseRequest {
    pub fn normal() -> Self {
        Self { reason: Some(ReleaseRequestReason::Normal) }
    }

    pub fn encode(&self) -> Vec<u8> {
        encode_release(RLRQ_TAG, self.reason.map(|r| r as u8))
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (rest, content) = parse_tagged(RLRQ_TAG)(input)?;
        let (_, reason) = parse_reason(content)?;
        let reason = reason.and_then(|r| ReleaseRequestReason::try_from(r).ok());
        Ok((rest, Self { reason }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseResponse {
    pub reason: Option<ReleaseResponseReason>,
}

impl ReleaseResponse {
    pub fn encode(&self) -> Vec<u8> {
        encode_release(RLRE_TAG, self.reason.map(|r| r as u8))
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (rest, content) = parse_tagged(RLRE_TAG)(input)?;
        let (_, reason) = parse_reason(content)?;
        let reason = reason.and_then(|r| ReleaseResponseReason::try_from(r).ok());
        Ok((rest, Self { reason }))
    }
}
