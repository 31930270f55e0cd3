use std::time::Duration;

#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct SystemConfig {
    pub routing: RoutingConfig,
    pub storage: StorageConfig,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RoutingConfig {
    // Also called k in the original paper
    pub bucket_size: usize,

    // Also called alpha: lookup RPCs kept in flight per round
    pub alpha: usize,

    // Buckets that don't contain the local id may only split while
    // depth % split_relaxation != 0 (accelerated lookups)
    pub split_relaxation: usize,

    // The replacement cache holds bucket_size * replacement_factor
    // contacts observed while the bucket was full
    pub replacement_factor: usize,

    // How many of the closest nodes receive a STORE
    pub store_replication: usize,

    // Deadline for FIND_NODE / FIND_VALUE / PING round trips
    pub request_timeout: Duration,

    // Deadline for STORE acknowledgements
    pub store_timeout: Duration,
}

impl RoutingConfig {
    pub fn replacement_cache_size(&self) -> usize {
        self.bucket_size * self.replacement_factor
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            bucket_size: 20,
            alpha: 3,
            split_relaxation: 5,
            replacement_factor: 5,
            store_replication: 5,
            request_timeout: Duration::from_secs(5),
            store_timeout: Duration::from_secs(3),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct StorageConfig {
    // Maximum stored value size (in bytes)
    pub max_value_size: usize,

    // Maximum number of stored records
    pub max_entries: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_value_size: 64 * 1024,
            max_entries: 1024,
        }
    }
}
