//! Engine configuration.

/// Configuration for the storage engine.
#[derive(Debug, Clone)]
pub struct Config {
    /// Longest dedicated table name before the hashed fallback is used.
    pub max_table_name_length: usize,

    /// Characters of the entity type id kept in hashed table names.
    pub entity_type_hash_prefix_length: usize,

    /// Hex characters of the SHA-256 digest used as a table name suffix.
    pub hash_suffix_length: usize,

    /// Prefix of archived data tables of deleted fields.
    pub deleted_data_table_prefix: String,

    /// Prefix of archived revision tables of deleted fields.
    pub deleted_revision_table_prefix: String,

    /// Whether default-revision loads go through the entity cache.
    pub persistent_cache: bool,

    /// Entities purged per batch when purging deleted field data.
    pub purge_batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_table_name_length: 48,
            entity_type_hash_prefix_length: 34,
            hash_suffix_length: 10,
            deleted_data_table_prefix: "field_deleted_data_".to_string(),
            deleted_revision_table_prefix: "field_deleted_revision_".to_string(),
            persistent_cache: true,
            purge_batch_size: 10,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the longest allowed dedicated table name.
    #[must_use]
    pub const fn max_table_name_length(mut self, len: usize) -> Self {
        self.max_table_name_length = len;
        self
    }

    /// Sets how much of the entity type id survives in hashed names.
    #[must_use]
    pub const fn entity_type_hash_prefix_length(mut self, len: usize) -> Self {
        self.entity_type_hash_prefix_length = len;
        self
    }

    /// Sets the number of hex characters in hashed suffixes.
    #[must_use]
    pub const fn hash_suffix_length(mut self, len: usize) -> Self {
        self.hash_suffix_length = len;
        self
    }

    /// Sets whether default-revision loads use the entity cache.
    #[must_use]
    pub const fn persistent_cache(mut self, value: bool) -> Self {
        self.persistent_cache = value;
        self
    }

    /// Sets the purge batch size.
    #[must_use]
    pub const fn purge_batch_size(mut self, size: usize) -> Self {
        self.purge_batch_size = size;
        self
    }

    /// Sets the prefixes used for deleted field tables.
    #[must_use]
    pub fn deleted_table_prefixes(
        mut self,
        data: impl Into<String>,
        revision: impl Into<String>,
    ) -> Self {
        self.deleted_data_table_prefix = data.into();
        self.deleted_revision_table_prefix = revision.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.max_table_name_length, 48);
        assert_eq!(config.entity_type_hash_prefix_length, 34);
        assert_eq!(config.hash_suffix_length, 10);
        assert!(config.persistent_cache);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .persistent_cache(false)
            .purge_batch_size(2)
            .deleted_table_prefixes("gone_", "gone_rev_");

        assert!(!config.persistent_cache);
        assert_eq!(config.purge_batch_size, 2);
        assert_eq!(config.deleted_revision_table_prefix, "gone_rev_");
    }
}
