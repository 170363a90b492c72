//! API credentials, passed explicitly into the clients that need them.
//!
//! Loading from the environment is one caller-side strategy among others;
//! construction never reads the environment behind the caller's back.

use crate::data::DataError;

/// Environment variable holding the BEA API key.
pub const BEA_API_KEY_VAR: &str = "BEA_API_KEY";

#[derive(Debug, Clone)]
pub struct Credentials {
    pub bea_api_key: String,
}

impl Credentials {
    pub fn new(bea_api_key: impl Into<String>) -> Result<Self, DataError> {
        let key = bea_api_key.into();
        if key.trim().is_empty() {
            return Err(DataError::MissingCredential(BEA_API_KEY_VAR));
        }
        Ok(Self { bea_api_key: key })
    }

    /// Read the key from the process environment.
    pub fn from_env() -> Result<Self, DataError> {
        match std::env::var(BEA_API_KEY_VAR) {
            Ok(key) => Self::new(key),
            Err(_) => Err(DataError::MissingCredential(BEA_API_KEY_VAR)),
        }
    }
}
