use thiserror::Error;

use crate::association_level::AssociationLevel;
use crate::ciphering::CipherError;
use crate::data::DataType;
use crate::key_wrap::KeyWrapError;
use crate::transport::TransportError;

/// Invalid key material or meter settings, raised while building a configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("{name} must be a hex string, found {value:?}")]
    NotHex { name: &'static str, value: String },

    #[error("{name} hex string must be of length {expected} but is of length {found}")]
    KeyLength { name: &'static str, expected: usize, found: usize },

    #[error("{name} hex string length must be an even number smaller than {max} but is {found}")]
    PasswordLength { name: &'static str, max: usize, found: usize },

    #[error("NIC system title flag must be 3 ASCII characters, found {0:?}")]
    SystemTitleFlag(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("attribute declared as {expected} but the value is {found}")]
    ValueType { expected: DataType, found: DataType },

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("ciphering error: {0}")]
    Cipher(#[from] CipherError),

    #[error("key wrap error: {0}")]
    KeyWrap(#[from] KeyWrapError),

    #[error("no key encryption key configured to wrap the new keys")]
    MissingKeyEncryptionKey,

    #[error("{association} association requires a password")]
    MissingPassword { association: AssociationLevel },

    #[error("operation is not allowed under the {found} association, {expected} is required")]
    WrongAssociation { expected: AssociationLevel, found: AssociationLevel },

    #[error("no application association with the NIC, establish_aa_nic must be called first")]
    NotAssociated,

    #[error("invocation counter {0} cannot be advanced, the keys must be renewed")]
    InvocationCounterExhausted(u32),

    #[error("association failed: {0}")]
    Association(String),

    #[error("could not draw a random challenge: {0}")]
    Random(getrandom::Error),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("could not start the callback worker: {0}")]
    Worker(#[from] std::io::Error),
}
