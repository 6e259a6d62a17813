//! Configuration options for the USB card reader channel

use std::time::Duration;

/// Vendor id of the supported security tokens
pub const DEFAULT_VENDOR_ID: u16 = 0x1050;

/// Configuration options for the USB channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbConfig {
    /// Vendor id used to pick the device; product ids are not filtered
    pub vendor_id: u16,

    /// Configuration value selected after opening
    pub configuration: u8,

    /// Card reader (CCID) interface number
    pub interface: u8,

    /// Bulk OUT endpoint address
    pub endpoint_out: u8,

    /// Bulk IN endpoint address
    pub endpoint_in: u8,

    /// Timeout for each bulk or control transfer
    pub timeout: Duration,
}

impl Default for UsbConfig {
    fn default() -> Self {
        Self {
            vendor_id: DEFAULT_VENDOR_ID,
            configuration: 1,
            interface: 2,
            endpoint_out: 0x02,
            endpoint_in: 0x82,
            timeout: Duration::from_secs(5),
        }
    }
}

impl UsbConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the vendor id filter
    pub const fn with_vendor_id(mut self, vendor_id: u16) -> Self {
        self.vendor_id = vendor_id;
        self
    }

    /// Set the configuration value
    pub const fn with_configuration(mut self, configuration: u8) -> Self {
        self.configuration = configuration;
        self
    }

    /// Set the reader interface number
    pub const fn with_interface(mut self, interface: u8) -> Self {
        self.interface = interface;
        self
    }

    /// Set the bulk endpoint pair
    pub const fn with_endpoints(mut self, endpoint_out: u8, endpoint_in: u8) -> Self {
        self.endpoint_out = endpoint_out;
        self.endpoint_in = endpoint_in;
        self
    }

    /// Set the transfer timeout
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
