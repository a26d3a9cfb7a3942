//! Handle configuration.

/// When a put resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PutAck {
    /// On the write request's own success event.
    #[default]
    Request,
    /// On completion of the enclosing transaction, so a commit failure after
    /// a successful write is reported.
    Transaction,
}

/// What an open handle does when another session asks for a newer version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VersionChangePolicy {
    /// Keep the connection; the other session's open stays blocked.
    #[default]
    Keep,
    /// Close the connection so the other session's upgrade can proceed.
    Close,
}

/// Configuration for a [`crate::Database`] handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Entry limit used by `entries()`.
    pub default_limit: usize,

    /// When a put resolves.
    pub put_ack: PutAck,

    /// Reaction to version-change requests from other sessions.
    pub version_change: VersionChangePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_limit: 1000,
            put_ack: PutAck::Request,
            version_change: VersionChangePolicy::Keep,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the limit used by `entries()`.
    #[must_use]
    pub const fn default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit;
        self
    }

    /// Sets when a put resolves.
    #[must_use]
    pub const fn put_ack(mut self, ack: PutAck) -> Self {
        self.put_ack = ack;
        self
    }

    /// Sets the version-change policy.
    #[must_use]
    pub const fn version_change(mut self, policy: VersionChangePolicy) -> Self {
        self.version_change = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.default_limit, 1000);
        assert_eq!(config.put_ack, PutAck::Request);
        assert_eq!(config.version_change, VersionChangePolicy::Keep);
    }

    #[test]
    fn builder_sets_fields() {
        let config = Config::new()
            .default_limit(10)
            .put_ack(PutAck::Transaction)
            .version_change(VersionChangePolicy::Close);
        assert_eq!(config.default_limit, 10);
        assert_eq!(config.put_ack, PutAck::Transaction);
        assert_eq!(config.version_change, VersionChangePolicy::Close);
    }
}
