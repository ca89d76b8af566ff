//! Association layer: ACSE APDUs for DLMS/COSEM
//!
//! Application association (AA) establishment with the NIC logical device:
//! - AARQ (A-Associate Request, tag 0x60), sent by the client
//! - AARE (A-Associate Response, tag 0x61), returned by the server
//! - RLRQ / RLRE (A-Release Request / Response, tags 0x62 / 0x63)
//!
//! With high level security (mechanism 2) a second leg follows the AARE: the
//! client answers the server challenge through `reply_to_HLS_authentication`
//! (method 1 of the association LN object) and checks the server's reply, see [`hls`].
//!
//! Reference: DLMS Green Book Ed. 12, Section 11
//!
//! # Encoding
//!
//! - AARQ/AARE use ASN.1 BER encoding with context-specific tags
//! - xDLMS APDUs (InitiateRequest/Response) use A-XDR encoding

use core::fmt;

use derive_try_from_primitive::TryFromPrimitive;

pub use self::{
    aare::{AareApdu, SourceDiagnostic},
    aarq::AarqApdu,
    initiate::{Conformance, InitiateRequest, InitiateResponse},
    release::{ReleaseRequest, ReleaseRequestReason, ReleaseResponse, ReleaseResponseReason},
};

mod aare;
mod aarq;
pub(crate) mod ber;
pub mod hls;
mod initiate;
mod release;

/// ASN.1 BER tag for AARQ APDU
pub const AARQ_TAG: u8 = 0x60;

/// ASN.1 BER tag for AARE APDU
pub const AARE_TAG: u8 = 0x61;

/// ASN.1 BER tag for RLRQ APDU
pub const RLRQ_TAG: u8 = 0x62;

/// ASN.1 BER tag for RLRE APDU
pub const RLRE_TAG: u8 = 0x63;

/// xDLMS VAA name for Logical Name referencing
pub const VAA_NAME_LN: u16 = 0x0007;

/// Default DLMS version number (version 6)
pub const DLMS_VERSION: u8 = 6;

/// Association result returned in AARE (Green Book Table 138).
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum AssociationResult {
    Accepted = 0,
    RejectedPermanent = 1,
    RejectedTransient = 2,
}

impl fmt::Display for AssociationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted => write!(f, "Accepted"),
            Self::RejectedPermanent => write!(f, "Rejected (Permanent)"),
            Self::RejectedTransient => write!(f, "Rejected (Transient)"),
        }
    }
}

/// ACSE service user diagnostics (Green Book Table 138).
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
#[non_exhaustive]
#[rustfmt::skip]
pub enum AcseServiceUserDiagnostics {
  Null                                 =  0,
  NoReasonGiven                        =  1,
  ApplicationContextNameNotSupported   =  2,
  AuthenticationMechanismNameNotRecognised = 11,
  AuthenticationMechanismNameRequired  = 12,
  AuthenticationFailure                = 13,
  AuthenticationRequired               = 14,
}

/// Application context names used by a logical name referencing client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationContextName {
    /// 2.16.756.5.8.1.1
    LogicalNameReferencing,
    /// 2.16.756.5.8.1.3
    LogicalNameReferencingWithCiphering,
}

impl ApplicationContextName {
    pub fn oid_bytes(&self) -> &'static [u8] {
        match self {
            Self::LogicalNameReferencing => &[0x60, 0x85, 0x74, 0x05, 0x08, 0x01, 0x01],
            Self::LogicalNameReferencingWithCiphering => {
                &[0x60, 0x85, 0x74, 0x05, 0x08, 0x01, 0x03]
            }
        }
    }

    pub fn from_oid_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [0x60, 0x85, 0x74, 0x05, 0x08, 0x01, 0x01] => Some(Self::LogicalNameReferencing),
            [0x60, 0x85, 0x74, 0x05, 0x08, 0x01, 0x03] => {
                Some(Self::LogicalNameReferencingWithCiphering)
            }
            _ => None,
        }
    }

    pub const fn uses_ciphering(&self) -> bool {
        matches!(self, Self::LogicalNameReferencingWithCiphering)
    }
}

impl fmt::Display for ApplicationContextName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LogicalNameReferencing => write!(f, "LN"),
            Self::LogicalNameReferencingWithCiphering => write!(f, "LN_WITH_CIPHERING"),
        }
    }
}

/// Authentication level of an association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Authentication {
    /// Lowest level security (no authentication)
    None,
    /// Low level security (password)
    Low,
    /// High level security (challenge / response, mechanism 2)
    High,
}

impl Authentication {
    /// Mechanism name OID (2.16.756.5.8.2.x).
    pub fn mechanism_oid(&self) -> [u8; 7] {
        [0x60, 0x85, 0x74, 0x05, 0x08, 0x02, self.mechanism_id()]
    }

    pub fn mechanism_id(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::Low => 1,
            Self::High => 2,
        }
    }

    pub fn from_mechanism_oid(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [0x60, 0x85, 0x74, 0x05, 0x08, 0x02, 0x00] => Some(Self::None),
            [0x60, 0x85, 0x74, 0x05, 0x08, 0x02, 0x01] => Some(Self::Low),
            [0x60, 0x85, 0x74, 0x05, 0x08, 0x02, 0x02] => Some(Self::High),
            _ => None,
        }
    }
}

impl fmt::Display for Authentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Low => write!(f, "Low"),
            Self::High => write!(f, "High"),
        }
    }
}
