//! Key material and options of a meter
//!
//! Keys and passwords are given as hex strings, the way they are provisioned on
//! the NIC. Spaces are stripped. Keys are exactly 16 bytes, passwords at most 16
//! bytes of even length.

use std::fmt;
use std::time::Duration;

use crate::association_level::{AssociationLevel, PasswordSlot};
use crate::error::ConfigurationError;

/// Hex length of a 16-byte key.
pub const KEY_HEX_LENGTH: usize = 32;
/// Maximum hex length of a password.
pub const PASSWORD_MAX_HEX_LENGTH: usize = 32;

/// Default time to wait for a response.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(20);

/// A validated hex string holding a key or a password.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct HexKey {
    hex: String,
    bytes: Vec<u8>,
}

impl HexKey {
    /// A symmetric key, exactly 16 bytes.
    pub fn key(name: &'static str, value: &str) -> Result<Self, ConfigurationError> {
        let key = Self::parse(name, value)?;
        if key.hex.len() != KEY_HEX_LENGTH {
            return Err(ConfigurationError::KeyLength {
                name,
                expected: KEY_HEX_LENGTH,
                found: key.hex.len(),
            });
        }
        Ok(key)
    }

    /// A password, at most 16 bytes.
    pub fn password(name: &'static str, value: &str) -> Result<Self, ConfigurationError> {
        // Length is checked on the stripped string so odd lengths are reported as such.
        let stripped: String = value.chars().filter(|c| *c != ' ').collect();
        if stripped.len() > PASSWORD_MAX_HEX_LENGTH || stripped.len() % 2 != 0 {
            return Err(ConfigurationError::PasswordLength {
                name,
                max: PASSWORD_MAX_HEX_LENGTH,
                found: stripped.len(),
            });
        }
        Self::parse(name, &stripped)
    }

    fn parse(name: &'static str, value: &str) -> Result<Self, ConfigurationError> {
        let hex: String = value.chars().filter(|c| *c != ' ').collect();
        let bytes = hex::decode(&hex)
            .map_err(|_| ConfigurationError::NotHex { name, value: value.to_string() })?;
        Ok(Self { hex, bytes })
    }

    pub fn as_str(&self) -> &str {
        &self.hex
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The key as a 16-byte array, `None` for passwords of another length.
    pub fn key_bytes(&self) -> Option<[u8; 16]> {
        self.bytes.as_slice().try_into().ok()
    }
}

impl fmt::Debug for HexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", "*".repeat(self.hex.len()))
    }
}

impl PartialEq<str> for HexKey {
    fn eq(&self, other: &str) -> bool {
        self.hex.eq_ignore_ascii_case(other)
    }
}

impl PartialEq<&str> for HexKey {
    fn eq(&self, other: &&str) -> bool {
        self.hex.eq_ignore_ascii_case(other)
    }
}

/// Credential slots of a meter, as named by key rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeySlot {
    MrPassword,
    UsPassword,
    FuPassword,
    EncryptionKey,
    AuthenticationKey,
    KeyEncryptionKey,
}

impl KeySlot {
    pub fn name(&self) -> &'static str {
        match self {
            KeySlot::MrPassword => "mr_password",
            KeySlot::UsPassword => "us_password",
            KeySlot::FuPassword => "fu_password",
            KeySlot::EncryptionKey => "encryption_key",
            KeySlot::AuthenticationKey => "authentication_key",
            KeySlot::KeyEncryptionKey => "key_encryption_key",
        }
    }
}

impl fmt::Display for KeySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name().replace('_', " "))
    }
}

/// New credentials, in the order they were sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyRotation(Vec<(KeySlot, HexKey)>);

impl KeyRotation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value` for `slot`, replacing an earlier value of the same slot.
    pub fn insert(&mut self, slot: KeySlot, value: HexKey) {
        match self.0.iter_mut().find(|(s, _)| *s == slot) {
            Some(entry) => entry.1 = value,
            None => self.0.push((slot, value)),
        }
    }

    pub fn get(&self, slot: KeySlot) -> Option<&HexKey> {
        self.0.iter().find(|(s, _)| *s == slot).map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(KeySlot, HexKey)> {
        self.0.iter()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub(crate) fn take(&mut self) -> Self {
        std::mem::take(self)
    }
}

/// Key material of one meter. Every field is optional.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct MeterConfiguration {
    authentication_key: Option<HexKey>,
    block_cipher_key: Option<HexKey>,
    dedicated_key: Option<HexKey>,
    key_encryption_key: Option<HexKey>,
    mr_password: Option<HexKey>,
    us_password: Option<HexKey>,
    fu_password: Option<HexKey>,
}

impl MeterConfiguration {
    pub fn builder() -> MeterConfigurationBuilder<'static> {
        MeterConfigurationBuilder::default()
    }

    pub fn authentication_key(&self) -> Option<&HexKey> {
        self.authentication_key.as_ref()
    }

    /// Global unicast encryption key.
    pub fn block_cipher_key(&self) -> Option<&HexKey> {
        self.block_cipher_key.as_ref()
    }

    pub fn dedicated_key(&self) -> Option<&HexKey> {
        self.dedicated_key.as_ref()
    }

    pub fn key_encryption_key(&self) -> Option<&HexKey> {
        self.key_encryption_key.as_ref()
    }

    pub fn mr_password(&self) -> Option<&HexKey> {
        self.mr_password.as_ref()
    }

    pub fn us_password(&self) -> Option<&HexKey> {
        self.us_password.as_ref()
    }

    pub fn fu_password(&self) -> Option<&HexKey> {
        self.fu_password.as_ref()
    }

    /// Password of `association`, `None` for associations without one.
    pub fn password_for(&self, association: AssociationLevel) -> Option<&HexKey> {
        match association.password_slot()? {
            PasswordSlot::MeterReader => self.mr_password.as_ref(),
            PasswordSlot::UtilitySetting => self.us_password.as_ref(),
            PasswordSlot::FirmwareUpgrade => self.fu_password.as_ref(),
        }
    }

    /// Copy of this configuration with the rotated credentials applied.
    pub(crate) fn rotated(&self, rotation: &KeyRotation) -> Self {
        let mut rotated = self.clone();
        for (slot, value) in rotation.iter() {
            let field = match slot {
                KeySlot::MrPassword => &mut rotated.mr_password,
                KeySlot::UsPassword => &mut rotated.us_password,
                KeySlot::FuPassword => &mut rotated.fu_password,
                KeySlot::EncryptionKey => &mut rotated.block_cipher_key,
                KeySlot::AuthenticationKey => &mut rotated.authentication_key,
                KeySlot::KeyEncryptionKey => &mut rotated.key_encryption_key,
            };
            *field = Some(value.clone());
        }
        rotated
    }
}

impl fmt::Debug for MeterConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeterConfiguration")
            .field("authentication_key", &self.authentication_key)
            .field("block_cipher_key", &self.block_cipher_key)
            .field("dedicated_key", &self.dedicated_key)
            .field("key_encryption_key", &self.key_encryption_key)
            .field("mr_password", &self.mr_password)
            .field("us_password", &self.us_password)
            .field("fu_password", &self.fu_password)
            .finish()
    }
}

/// Builder validating every field of a [`MeterConfiguration`] on [`build`](Self::build).
#[derive(Debug, Default, Clone)]
pub struct MeterConfigurationBuilder<'a> {
    authentication_key: Option<&'a str>,
    block_cipher_key: Option<&'a str>,
    dedicated_key: Option<&'a str>,
    key_encryption_key: Option<&'a str>,
    mr_password: Option<&'a str>,
    us_password: Option<&'a str>,
    fu_password: Option<&'a str>,
}

impl<'a> MeterConfigurationBuilder<'a> {
    pub fn authentication_key(mut self, key: &'a str) -> Self {
        self.authentication_key = Some(key);
        self
    }

    pub fn block_cipher_key(mut self, key: &'a str) -> Self {
        self.block_cipher_key = Some(key);
        self
    }

    pub fn dedicated_key(mut self, key: &'a str) -> Self {
        self.dedicated_key = Some(key);
        self
    }

    pub fn key_encryption_key(mut self, key: &'a str) -> Self {
        self.key_encryption_key = Some(key);
        self
    }

    pub fn mr_password(mut self, password: &'a str) -> Self {
        self.mr_password = Some(password);
        self
    }

    pub fn us_password(mut self, password: &'a str) -> Self {
        self.us_password = Some(password);
        self
    }

    pub fn fu_password(mut self, password: &'a str) -> Self {
        self.fu_password = Some(password);
        self
    }

    pub fn build(self) -> Result<MeterConfiguration, ConfigurationError> {
        let key = |name, value: Option<&str>| {
            value.filter(|v| !v.is_empty()).map(|v| HexKey::key(name, v)).transpose()
        };
        let password = |name, value: Option<&str>| {
            value.filter(|v| !v.is_empty()).map(|v| HexKey::password(name, v)).transpose()
        };

        Ok(MeterConfiguration {
            authentication_key: key("authentication key", self.authentication_key)?,
            block_cipher_key: key("block cipher key", self.block_cipher_key)?,
            dedicated_key: key("dedicated key", self.dedicated_key)?,
            key_encryption_key: key("key encryption key", self.key_encryption_key)?,
            mr_password: password("MR password", self.mr_password)?,
            us_password: password("US password", self.us_password)?,
            fu_password: password("FU password", self.fu_password)?,
        })
    }
}

/// Per-meter settings that are not key material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeterOptions {
    /// Time to wait for the response of a request.
    /// Default: 20 s.
    pub response_timeout: Duration,
    /// Derive the invoke-id of each request from the message count. Meters that
    /// ignore invoke-ids get 1 on every request when disabled.
    /// Default: true.
    pub increment_invoke_id: bool,
    /// Invocation counter the first secured request continues from.
    /// Default: 0.
    pub invocation_counter: u32,
    /// System title of the NIC, if already known.
    /// Default: None, learned from the AARE or the NIC status word.
    pub nic_system_title: Option<[u8; 8]>,
}

impl Default for MeterOptions {
    fn default() -> Self {
        Self {
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            increment_invoke_id: true,
            invocation_counter: 0,
            nic_system_title: None,
        }
    }
}

impl MeterOptions {
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_increment_invoke_id(mut self, increment: bool) -> Self {
        self.increment_invoke_id = increment;
        self
    }

    pub fn with_invocation_counter(mut self, invocation_counter: u32) -> Self {
        self.invocation_counter = invocation_counter;
        self
    }

    pub fn with_nic_system_title(mut self, system_title: [u8; 8]) -> Self {
        self.nic_system_title = Some(system_title);
        self
    }
}
