//! BLE driver configuration

use std::time::Duration;

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for the BLE radio driver
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BleDriverConfig {
    /// Index of the adapter to use when several are present
    pub adapter_index: usize,
    /// Maximum time to wait for a connection to complete
    pub connect_timeout: Duration,
    /// Local name included in advertisements
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_name: Option<String>,
    /// Capacity of the driver event channel
    pub event_capacity: usize,
}

impl Default for BleDriverConfig {
    fn default() -> Self {
        Self {
            adapter_index: 0,
            connect_timeout: Duration::from_secs(8),
            local_name: None,
            event_capacity: 256,
        }
    }
}

impl BleDriverConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the adapter by index
    pub fn with_adapter_index(mut self, index: usize) -> Self {
        self.adapter_index = index;
        self
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the advertised local name
    pub fn with_local_name(mut self, name: impl Into<String>) -> Self {
        self.local_name = Some(name.into());
        self
    }

    /// Set event channel capacity
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = BleDriverConfig::new()
            .with_adapter_index(1)
            .with_connect_timeout(Duration::from_secs(3))
            .with_local_name("presence");
        assert_eq!(config.adapter_index, 1);
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.local_name.as_deref(), Some("presence"));
        assert_eq!(config.event_capacity, 256);
    }

    #[test]
    fn test_partial_deserialization() {
        let config: BleDriverConfig = serde_json::from_str(r#"{ "adapter_index": 2 }"#).unwrap();
        assert_eq!(config.adapter_index, 2);
        assert_eq!(config.connect_timeout, Duration::from_secs(8));
    }
}
