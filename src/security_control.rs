use core::fmt;

use nom::{IResult, number::streaming::u8};

/// Protection applied to ciphered APDUs, derived from which keys are configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Security {
    #[default]
    None,
    Authentication,
    Encryption,
    AuthenticationEncryption,
}

impl Security {
    /// Both keys give authenticated encryption, one key gives its own mode.
    pub fn derive(has_authentication_key: bool, has_block_cipher_key: bool) -> Self {
        match (has_authentication_key, has_block_cipher_key) {
            (true, true) => Self::AuthenticationEncryption,
            (false, true) => Self::Encryption,
            (true, false) => Self::Authentication,
            (false, false) => Self::None,
        }
    }

    pub fn is_secured(&self) -> bool {
        *self != Self::None
    }

    pub fn control(&self) -> SecurityControl {
        let mut control = SecurityControl::new(0);
        control.set_authentication(matches!(
            self,
            Self::Authentication | Self::AuthenticationEncryption
        ));
        control.set_encryption(matches!(self, Self::Encryption | Self::AuthenticationEncryption));
        control
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Authentication => "Authentication",
            Self::Encryption => "Encryption",
            Self::AuthenticationEncryption => "AuthenticationEncryption",
        }
    }
}

impl fmt::Display for Security {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Security control byte of the security header (Green Book 9.2.7.2.4.1).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SecurityControl {
    security_control: u8,
}

impl fmt::Debug for SecurityControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityControl")
            .field("suite_id", &self.suite_id())
            .field("authentication", &self.authentication())
            .field("encryption", &self.encryption())
            .field("broadcast", &self.broadcast())
            .field("compression", &self.compression())
            .finish()
    }
}

impl SecurityControl {
    #[rustfmt::skip]
    const COMPRESSION_BIT:    u8 = 0b10000000;
    #[rustfmt::skip]
    const BROADCAST_BIT:      u8 = 0b01000000;
    #[rustfmt::skip]
    const ENCRYPTION_BIT:     u8 = 0b00100000;
    #[rustfmt::skip]
    const AUTHENTICATION_BIT: u8 = 0b00010000;

    pub fn new(security_control: u8) -> Self {
        Self { security_control }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, security_control) = u8(input)?;
        Ok((input, Self { security_control }))
    }

    pub fn byte(&self) -> u8 {
        self.security_control
    }

    pub fn suite_id(&self) -> u8 {
        self.security_control & 0b00001111
    }

    /// The protection this control byte announces.
    pub fn security(&self) -> Security {
        Security::derive(self.authentication(), self.encryption())
    }

    pub fn authentication(&self) -> bool {
        (self.security_control & Self::AUTHENTICATION_BIT) != 0
    }

    pub fn set_authentication(&mut self, authentication: bool) {
        if authentication {
            self.security_control |= Self::AUTHENTICATION_BIT
        } else {
            self.security_control &= !Self::AUTHENTICATION_BIT
        }
    }

    pub fn encryption(&self) -> bool {
        (self.security_control & Self::ENCRYPTION_BIT) != 0
    }

    pub fn set_encryption(&mut self, encryption: bool) {
        if encryption {
            self.security_control |= Self::ENCRYPTION_BIT
        } else {
            self.security_control &= !Self::ENCRYPTION_BIT
        }
    }

    pub fn broadcast(&self) -> bool {
        (self.security_control & Self::BROADCAST_BIT) != 0
    }

    pub fn compression(&self) -> bool {
        (self.security_control & Self::COMPRESSION_BIT) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_security() {
        assert_eq!(Security::derive(true, true), Security::AuthenticationEncryption);
        assert_eq!(Security::derive(false, true), Security::Encryption);
        assert_eq!(Security::derive(true, false), Security::Authentication);
        assert_eq!(Security::derive(false, false), Security::None);
        assert!(!Security::None.is_secured());
    }

    #[test]
    fn test_control_byte_per_security() {
        assert_eq!(Security::AuthenticationEncryption.control().byte(), 0x30);
        assert_eq!(Security::Encryption.control().byte(), 0x20);
        assert_eq!(Security::Authentication.control().byte(), 0x10);
        assert_eq!(Security::None.control().byte(), 0x00);
    }

    #[test]
    fn test_parse_security_control() {
        let input = [0x30, 0xFF];
        let (remaining, sc) = SecurityControl::parse(&input).unwrap();

        assert_eq!(remaining, &[0xFF]);
        assert!(sc.authentication());
        assert!(sc.encryption());
        assert_eq!(sc.security(), Security::AuthenticationEncryption);
    }

    #[test]
    fn test_suite_id_ignores_upper_bits() {
        assert_eq!(SecurityControl::new(0xF1).suite_id(), 1);
        assert_eq!(SecurityControl::new(0x30).suite_id(), 0);
    }

    #[test]
    fn test_setters_leave_other_bits() {
        let mut sc = SecurityControl::new(0xFF);
        sc.set_authentication(false);

        assert_eq!(sc.byte(), 0xEF);
        assert!(sc.encryption());
        assert!(sc.broadcast());
        assert!(sc.compression());

        sc.set_encryption(false);
        assert_eq!(sc.byte(), 0xCF);
    }
}
