use std::time::Duration;

use crate::models::error::DeviceError;

/// Host-provided bulk USB device with separate IN and OUT endpoints.
///
/// Methods take `&self` so the read loop and writers can share one
/// `Arc<D>`; implementations keep the IN and OUT transfers independent.
/// Implemented by the host platform (libusb, Android USB host, a test mock).
pub trait BulkDevice: Send + Sync + 'static {
    /// Claim the interface and endpoints.
    fn open(&self) -> Result<(), DeviceError>;

    /// Release the interface. Called after the read loop has stopped.
    fn close(&self);

    /// Read from the IN endpoint into `buf`.
    ///
    /// Returns the number of bytes received. `DeviceError::Timeout` means no
    /// data arrived within `timeout` and is not fatal.
    fn bulk_read(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, DeviceError>;

    /// Write to the OUT endpoint, returning the number of bytes sent.
    fn bulk_write(&self, data: &[u8], timeout: Duration) -> Result<usize, DeviceError>;

    /// Issue a USB port reset if the host supports it.
    fn reset(&self) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported)
    }

    /// Ask the host for access to the device. Blocks up to `timeout`.
    fn request_permission(&self, _timeout: Duration) -> bool {
        true
    }
}
