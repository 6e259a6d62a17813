//! USB bulk transport built on libusb
//!
//! Talks to the token's CCID interface directly, without a PC/SC daemon. The handle is
//! opened lazily by [`CardChannel::open`] so the session can drive every setup step
//! (and fail at the right one).

use std::fmt;

use bytes::Bytes;
use rusb::{Context, Device, DeviceHandle, Direction, Recipient, RequestType, UsbContext};
use tracing::{debug, trace, warn};

use crate::{
    channel::{CardChannel, ChannelProvider, abort_value},
    config::UsbConfig,
    error::ChannelError,
};

/// CCID class request ABORT
const REQUEST_ABORT: u8 = 0x01;

/// Channel to one USB card reader
pub struct UsbTransport {
    config: UsbConfig,
    device: Device<Context>,
    handle: Option<DeviceHandle<Context>>,
    interface_claimed: bool,
}

impl UsbTransport {
    /// Find the first device matching the configured vendor id
    ///
    /// The device is not opened yet.
    pub fn find(config: UsbConfig) -> Result<Self, ChannelError> {
        let context = Context::new()?;
        let devices = context.devices()?;

        for device in devices.iter() {
            let Ok(desc) = device.device_descriptor() else {
                continue;
            };

            if desc.vendor_id() == config.vendor_id {
                debug!(
                    vendor_id = format_args!("{:04x}", desc.vendor_id()),
                    product_id = format_args!("{:04x}", desc.product_id()),
                    "Found card reader"
                );
                return Ok(Self {
                    config,
                    device,
                    handle: None,
                    interface_claimed: false,
                });
            }
        }

        Err(ChannelError::NotFound {
            vendor_id: config.vendor_id,
        })
    }

    /// Configuration in use
    pub const fn config(&self) -> &UsbConfig {
        &self.config
    }

    fn handle(&self) -> Result<&DeviceHandle<Context>, ChannelError> {
        self.handle.as_ref().ok_or(ChannelError::Closed)
    }

    fn handle_mut(&mut self) -> Result<&mut DeviceHandle<Context>, ChannelError> {
        self.handle.as_mut().ok_or(ChannelError::Closed)
    }
}

impl fmt::Debug for UsbTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsbTransport")
            .field("config", &self.config)
            .field("bus", &self.device.bus_number())
            .field("address", &self.device.address())
            .field("open", &self.handle.is_some())
            .field("interface_claimed", &self.interface_claimed)
            .finish()
    }
}

impl CardChannel for UsbTransport {
    fn open(&mut self) -> Result<(), ChannelError> {
        if self.handle.is_none() {
            self.handle = Some(self.device.open()?);
            trace!("Opened device handle");
        }
        Ok(())
    }

    fn select_configuration(&mut self) -> Result<(), ChannelError> {
        let configuration = self.config.configuration;
        let handle = self.handle_mut()?;
        match handle.active_configuration() {
            Ok(active) if active == configuration => Ok(()),
            _ => handle
                .set_active_configuration(configuration)
                .map_err(ChannelError::from),
        }
    }

    fn claim_interface(&mut self) -> Result<(), ChannelError> {
        let interface = self.config.interface;
        let handle = self.handle_mut()?;

        #[cfg(target_os = "linux")]
        if handle.kernel_driver_active(interface).unwrap_or(false) {
            handle.detach_kernel_driver(interface)?;
        }

        handle.claim_interface(interface).map_err(|e| match e {
            rusb::Error::Busy | rusb::Error::Access => ChannelError::Busy,
            other => ChannelError::from(other),
        })?;
        self.interface_claimed = true;
        debug!(interface, "Claimed card reader interface");
        Ok(())
    }

    fn do_send(&mut self, frame: &[u8]) -> Result<(), ChannelError> {
        let endpoint = self.config.endpoint_out;
        let timeout = self.config.timeout;
        let written = self.handle()?.write_bulk(endpoint, frame, timeout)?;
        if written != frame.len() {
            return Err(ChannelError::ShortWrite {
                written,
                expected: frame.len(),
            });
        }
        Ok(())
    }

    fn do_receive(&mut self, max_len: usize) -> Result<Bytes, ChannelError> {
        let endpoint = self.config.endpoint_in;
        let timeout = self.config.timeout;
        let mut buf = vec![0u8; max_len];
        let read = self.handle()?.read_bulk(endpoint, &mut buf, timeout)?;
        buf.truncate(read);
        Ok(Bytes::from(buf))
    }

    fn abort(&mut self, slot: u8, sequence: u8) -> Result<(), ChannelError> {
        let request_type = rusb::request_type(Direction::Out, RequestType::Class, Recipient::Interface);
        let index = u16::from(self.config.interface);
        let timeout = self.config.timeout;
        self.handle()?.write_control(
            request_type,
            REQUEST_ABORT,
            abort_value(slot, sequence),
            index,
            &[],
            timeout,
        )?;
        Ok(())
    }

    fn release(&mut self) {
        if let Some(handle) = self.handle.as_mut() {
            if self.interface_claimed {
                if let Err(e) = handle.release_interface(self.config.interface) {
                    warn!(error = %e, "Failed to release card reader interface");
                }
                self.interface_claimed = false;
            }
        }
        if self.handle.take().is_some() {
            trace!("Closed device handle");
        }
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        self.release();
    }
}

/// Hands out a fresh [`UsbTransport`] per session
#[derive(Debug, Clone, Copy, Default)]
pub struct UsbProvider {
    config: UsbConfig,
}

impl UsbProvider {
    /// Provider for devices matching `config`
    pub const fn new(config: UsbConfig) -> Self {
        Self { config }
    }
}

impl ChannelProvider for UsbProvider {
    type Channel = UsbTransport;

    fn acquire(&mut self) -> Result<UsbTransport, ChannelError> {
        UsbTransport::find(self.config)
    }
}
