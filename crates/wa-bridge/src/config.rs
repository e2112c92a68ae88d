//! Configuration for connecting to the chat bridge daemon.

/// Connection settings for the bridge daemon's HTTP server.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Base URL of the bridge (e.g., "http://127.0.0.1:8077").
    pub base_url: String,
}

impl BridgeConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    /// JSON-RPC endpoint URL.
    pub fn rpc_url(&self) -> String {
        format!("{}/api/v1/rpc", self.base_url)
    }

    /// SSE events endpoint for one credential store.
    pub fn events_url(&self, store_dsn: &str) -> String {
        format!(
            "{}/api/v1/events?store={}",
            self.base_url,
            urlencoding::encode(store_dsn)
        )
    }

    /// Health check endpoint URL.
    pub fn check_url(&self) -> String {
        format!("{}/api/v1/check", self.base_url)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::new("http://127.0.0.1:8077")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls() {
        let config = BridgeConfig::new("http://127.0.0.1:9000");
        assert_eq!(config.rpc_url(), "http://127.0.0.1:9000/api/v1/rpc");
        assert_eq!(config.check_url(), "http://127.0.0.1:9000/api/v1/check");
        assert_eq!(
            config.events_url("sqlite:promote_wa_a1.db?mode=rwc"),
            "http://127.0.0.1:9000/api/v1/events?store=sqlite%3Apromote_wa_a1.db%3Fmode%3Drwc"
        );
    }
}
