use std::{
    borrow::Borrow,
    collections::{HashMap, hash_map::Entry},
    fmt,
    str::FromStr,
    sync::Arc,
};

use parking_lot::RwLock;

use crate::{
    crypto::{Algorithm, HashAlgorithm, KeyHandle, KeyUsage},
    error::{KmsError, Result},
};

/// Key identifier, unique within a registry.
#[derive(Clone, Debug, Hash, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct KeyId(pub String);

impl Borrow<str> for KeyId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Authenticated caller. Compared by exact string equality.
#[derive(Clone, Debug, Hash, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Controller(pub String);

impl Controller {
    pub fn new(principal: impl Into<String>) -> Self {
        Self(principal.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum KeyType {
    SymmetricWrapKey,
    HmacSigningKey,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::SymmetricWrapKey => "symmetric-wrap-key",
            KeyType::HmacSigningKey => "hmac-signing-key",
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            KeyType::SymmetricWrapKey => Algorithm::AesKw { length: 256 },
            KeyType::HmacSigningKey => Algorithm::Hmac {
                hash: HashAlgorithm::Sha256,
            },
        }
    }

    pub fn usages(&self) -> &'static [KeyUsage] {
        match self {
            KeyType::SymmetricWrapKey => &[KeyUsage::WrapKey, KeyUsage::UnwrapKey],
            KeyType::HmacSigningKey => &[KeyUsage::Sign, KeyUsage::Verify],
        }
    }
}

impl FromStr for KeyType {
    type Err = KmsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "symmetric-wrap-key" => Ok(KeyType::SymmetricWrapKey),
            "hmac-signing-key" => Ok(KeyType::HmacSigningKey),
            other => Err(KmsError::UnsupportedKeyType(other.to_owned())),
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable once registered.
#[derive(Debug)]
pub struct KeyRecord {
    key_id: KeyId,
    controller: Controller,
    key_type: KeyType,
    handle: KeyHandle,
}

impl KeyRecord {
    pub fn key_id(&self) -> &KeyId {
        &self.key_id
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    pub fn handle(&self) -> &KeyHandle {
        &self.handle
    }
}

/// In-memory key table shared by the dispatch core and its plugins.
#[derive(Default)]
pub struct KeyRegistry {
    records: RwLock<HashMap<KeyId, Arc<KeyRecord>>>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new record. Exactly one of any number of concurrent
    /// registrations for the same id succeeds.
    pub fn register(
        &self,
        key_id: KeyId,
        controller: Controller,
        key_type: KeyType,
        handle: KeyHandle,
    ) -> Result<Arc<KeyRecord>> {
        let mut records = self.records.write();
        match records.entry(key_id) {
            Entry::Occupied(e) => Err(KmsError::AlreadyExists(e.key().0.clone())),
            Entry::Vacant(e) => {
                let record = Arc::new(KeyRecord {
                    key_id: e.key().clone(),
                    controller,
                    key_type,
                    handle,
                });
                e.insert(record.clone());
                Ok(record)
            }
        }
    }

    pub fn lookup(&self, key_id: &str) -> Result<Arc<KeyRecord>> {
        self.records
            .read()
            .get(key_id)
            .cloned()
            .ok_or_else(|| KmsError::NotFound(key_id.to_owned()))
    }

    /// Look up a record owned by `controller`. A record owned by anyone
    /// else is reported exactly like a missing one.
    pub fn authorize(&self, key_id: &str, controller: &Controller) -> Result<Arc<KeyRecord>> {
        let record = self.lookup(key_id)?;
        if record.controller != *controller {
            return Err(KmsError::NotFound(key_id.to_owned()));
        }
        Ok(record)
    }

    pub fn contains(&self, key_id: &str) -> bool {
        self.records.read().contains_key(key_id)
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}
