//! Store configuration.

/// When the store snapshots a table before mutating it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackupPolicy {
    /// Only explicit `create_backup` calls produce snapshots.
    Never,
    /// Snapshot before operations that remove or replace many records:
    /// `delete`, `clear`, `create_many`, `import` and `restore_from_backup`.
    #[default]
    Destructive,
    /// Snapshot before every write.
    EveryWrite,
}

/// Configuration shared by every table of a [`crate::Database`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Prefix of every table key (`<prefix>_<TABLE>`).
    pub key_prefix: String,

    /// Number of snapshots kept per table; older ones are pruned.
    pub backup_retention: usize,

    /// When automatic snapshots are taken.
    pub backup_policy: BackupPolicy,

    /// Serialized table size above which compaction and eviction kick in.
    pub soft_limit_bytes: u64,

    /// Fraction of the oldest records evicted as a last resort.
    pub eviction_ratio: f64,

    /// Snapshots kept for a table while it is over the soft limit.
    pub min_backups_under_pressure: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            key_prefix: "IFIX".to_string(),
            backup_retention: 5,
            backup_policy: BackupPolicy::Destructive,
            soft_limit_bytes: 4_718_592, // 4.5 MiB
            eviction_ratio: 0.10,
            min_backups_under_pressure: 1,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the table key prefix.
    #[must_use]
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Sets how many snapshots are retained per table.
    #[must_use]
    pub const fn backup_retention(mut self, count: usize) -> Self {
        self.backup_retention = count;
        self
    }

    /// Sets the automatic backup policy.
    #[must_use]
    pub const fn backup_policy(mut self, policy: BackupPolicy) -> Self {
        self.backup_policy = policy;
        self
    }

    /// Sets the soft size ceiling for a serialized table.
    #[must_use]
    pub const fn soft_limit_bytes(mut self, bytes: u64) -> Self {
        self.soft_limit_bytes = bytes;
        self
    }

    /// Sets the eviction ratio, clamped to `0.0..=1.0`.
    #[must_use]
    pub fn eviction_ratio(mut self, ratio: f64) -> Self {
        self.eviction_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    /// Sets how many snapshots survive pruning under storage pressure.
    #[must_use]
    pub const fn min_backups_under_pressure(mut self, count: usize) -> Self {
        self.min_backups_under_pressure = count;
        self
    }

    /// Returns the storage key for `table`.
    #[must_use]
    pub fn table_key(&self, table: &str) -> String {
        format!("{}_{}", self.key_prefix, table)
    }
}
