//! The five associations a Wirepas NIC and its meter expose.

use std::fmt;
use std::str::FromStr;

use derive_try_from_primitive::TryFromPrimitive;

use crate::association::Authentication;

/// Association, keyed by its DLMS client address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u16)]
#[rustfmt::skip]
pub enum AssociationLevel {
  PublicClient    = 16,
  MeterReader     = 32,
  UtilitySetting  = 48,
  Push            = 64,
  FirmwareUpgrade = 80,
}

/// Credential slot holding the password of an association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PasswordSlot {
    MeterReader,
    UtilitySetting,
    FirmwareUpgrade,
}

impl AssociationLevel {
    pub const ALL: [AssociationLevel; 5] = [
        AssociationLevel::PublicClient,
        AssociationLevel::MeterReader,
        AssociationLevel::UtilitySetting,
        AssociationLevel::Push,
        AssociationLevel::FirmwareUpgrade,
    ];

    pub const fn client_address(&self) -> u16 {
        *self as u16
    }

    pub fn from_client_address(client_address: u16) -> Option<Self> {
        Self::try_from(client_address).ok()
    }

    pub const fn notation(&self) -> &'static str {
        match self {
            AssociationLevel::PublicClient => "PC",
            AssociationLevel::MeterReader => "MR",
            AssociationLevel::UtilitySetting => "US",
            AssociationLevel::Push => "push",
            AssociationLevel::FirmwareUpgrade => "FU",
        }
    }

    pub fn from_notation(notation: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|level| level.notation() == notation)
    }

    pub const fn authentication(&self) -> Authentication {
        match self {
            AssociationLevel::PublicClient => Authentication::None,
            AssociationLevel::MeterReader => Authentication::Low,
            AssociationLevel::UtilitySetting
            | AssociationLevel::Push
            | AssociationLevel::FirmwareUpgrade => Authentication::High,
        }
    }

    pub const fn password_slot(&self) -> Option<PasswordSlot> {
        match self {
            AssociationLevel::MeterReader => Some(PasswordSlot::MeterReader),
            AssociationLevel::UtilitySetting => Some(PasswordSlot::UtilitySetting),
            AssociationLevel::FirmwareUpgrade => Some(PasswordSlot::FirmwareUpgrade),
            AssociationLevel::PublicClient | AssociationLevel::Push => None,
        }
    }

    /// The public client never uses key material.
    pub const fn is_public(&self) -> bool {
        matches!(self, AssociationLevel::PublicClient)
    }
}

impl fmt::Display for AssociationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.notation())
    }
}

impl FromStr for AssociationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_notation(s).ok_or_else(|| format!("unknown association {s:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookups_are_total() {
        for level in AssociationLevel::ALL {
            assert_eq!(AssociationLevel::from_client_address(level.client_address()), Some(level));
            assert_eq!(AssociationLevel::from_notation(level.notation()), Some(level));
        }
        assert_eq!(AssociationLevel::from_client_address(17), None);
        assert_eq!("FU".parse::<AssociationLevel>(), Ok(AssociationLevel::FirmwareUpgrade));
    }

    #[test]
    fn test_authentication_levels() {
        assert_eq!(AssociationLevel::PublicClient.authentication(), Authentication::None);
        assert_eq!(AssociationLevel::MeterReader.authentication(), Authentication::Low);
        assert_eq!(AssociationLevel::UtilitySetting.authentication(), Authentication::High);
        assert_eq!(AssociationLevel::Push.authentication(), Authentication::High);
        assert_eq!(AssociationLevel::FirmwareUpgrade.authentication(), Authentication::High);
    }

    #[test]
    fn test_password_slots() {
        assert_eq!(AssociationLevel::PublicClient.password_slot(), None);
        assert_eq!(AssociationLevel::Push.password_slot(), None);
        assert_eq!(
            AssociationLevel::UtilitySetting.password_slot(),
            Some(PasswordSlot::UtilitySetting)
        );
    }
}
