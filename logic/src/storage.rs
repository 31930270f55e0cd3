use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use crate::config::StorageConfig;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StorageError {
    #[error("empty keys are not storable")]
    EmptyKey,
    #[error("value too large")]
    ValueTooLarge,
    #[error("too many records stored")]
    TooManyRecords,
}

/// The local slice of the network's key/value records.
#[derive(Clone, Debug, Default)]
pub struct Storage {
    config: StorageConfig,
    records: HashMap<Vec<u8>, Vec<u8>>,
}

impl Storage {
    pub fn new(config: StorageConfig) -> Self {
        Storage {
            config,
            records: HashMap::new(),
        }
    }

    pub fn check_record(
        config: &StorageConfig,
        key: &[u8],
        value: &[u8],
    ) -> Result<(), StorageError> {
        if key.is_empty() {
            Err(StorageError::EmptyKey)
        } else if value.len() > config.max_value_size {
            Err(StorageError::ValueTooLarge)
        } else {
            Ok(())
        }
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<(), StorageError> {
        Self::check_record(&self.config, &key, &value)?;
        if !self.records.contains_key(&key) && self.records.len() >= self.config.max_entries {
            return Err(StorageError::TooManyRecords);
        }
        debug!("storing {} value bytes under a {} byte key", value.len(), key.len());
        self.records.insert(key, value);
        Ok(())
    }

    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.records.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
