/// USB vendor/product id pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UsbId {
    pub vendor_id: u16,
    pub product_id: u16,
}

/// Adapters known to speak the CPC200-CCPA protocol.
pub const KNOWN_ADAPTERS: [UsbId; 3] = [
    UsbId { vendor_id: 0x1314, product_id: 0x1520 },
    UsbId { vendor_id: 0x1314, product_id: 0x1521 },
    UsbId { vendor_id: 0x08e4, product_id: 0x01c0 },
];

/// Whether a device enumerated by the host is a supported adapter.
pub fn is_known_adapter(vendor_id: u16, product_id: u16) -> bool {
    KNOWN_ADAPTERS
        .iter()
        .any(|id| id.vendor_id == vendor_id && id.product_id == product_id)
}
