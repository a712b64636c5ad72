/// Opaque device identifier, assigned by the backend at enumeration.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub struct DeviceId(pub u64);

/// Information about a device that can be obtained without opening it.
///
/// Found in the results of [`Context::list_devices`][crate::Context::list_devices].
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub(crate) id: DeviceId,

    pub(crate) bus_number: u8,
    pub(crate) device_address: u8,
    pub(crate) port_chain: Vec<u8>,

    pub(crate) vendor_id: u16,
    pub(crate) product_id: u16,
    pub(crate) usb_version: u16,
    pub(crate) device_version: u16,

    pub(crate) class: u8,
    pub(crate) subclass: u8,
    pub(crate) protocol: u8,

    pub(crate) max_packet_size_0: u8,
    pub(crate) num_configurations: u8,
}

impl DeviceInfo {
    /// Describe a device found by a backend. Descriptor fields start zeroed;
    /// fill them in with the `with_*` methods.
    pub fn new(id: DeviceId, bus_number: u8, device_address: u8) -> Self {
        DeviceInfo {
            id,
            bus_number,
            device_address,
            port_chain: Vec::new(),
            vendor_id: 0,
            product_id: 0,
            usb_version: 0,
            device_version: 0,
            class: 0,
            subclass: 0,
            protocol: 0,
            max_packet_size_0: 0,
            num_configurations: 0,
        }
    }

    /// Set the vendor and product IDs.
    pub fn with_ids(mut self, vendor_id: u16, product_id: u16) -> Self {
        self.vendor_id = vendor_id;
        self.product_id = product_id;
        self
    }

    /// Set the port chain.
    pub fn with_port_chain(mut self, port_chain: Vec<u8>) -> Self {
        self.port_chain = port_chain;
        self
    }

    /// Set the class, subclass and protocol codes.
    pub fn with_class(mut self, class: u8, subclass: u8, protocol: u8) -> Self {
        self.class = class;
        self.subclass = subclass;
        self.protocol = protocol;
        self
    }

    /// Set the BCD-encoded USB specification and device release numbers.
    pub fn with_versions(mut self, usb_version: u16, device_version: u16) -> Self {
        self.usb_version = usb_version;
        self.device_version = device_version;
        self
    }

    /// Set the remaining device descriptor fields.
    pub fn with_limits(mut self, max_packet_size_0: u8, num_configurations: u8) -> Self {
        self.max_packet_size_0 = max_packet_size_0;
        self.num_configurations = num_configurations;
        self
    }

    /// Opaque identifier for the device.
    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Number of the bus the device is connected to.
    pub fn bus_number(&self) -> u8 {
        self.bus_number
    }

    /// Number identifying the device within the bus.
    pub fn device_address(&self) -> u8 {
        self.device_address
    }

    /// Path of port numbers identifying the port where the device is connected.
    ///
    /// Together with the bus number, it identifies a physical port.
    pub fn port_chain(&self) -> &[u8] {
        &self.port_chain
    }

    /// The 16-bit number identifying the device's vendor, from the `idVendor` device descriptor field.
    #[doc(alias = "idVendor")]
    pub fn vendor_id(&self) -> u16 {
        self.vendor_id
    }

    /// The 16-bit number identifying the product, from the `idProduct` device descriptor field.
    #[doc(alias = "idProduct")]
    pub fn product_id(&self) -> u16 {
        self.product_id
    }

    /// USB specification release number in BCD, from the `bcdUSB` device descriptor field.
    #[doc(alias = "bcdUSB")]
    pub fn usb_version(&self) -> u16 {
        self.usb_version
    }

    /// The device version, normally encoded as BCD, from the `bcdDevice` device descriptor field.
    #[doc(alias = "bcdDevice")]
    pub fn device_version(&self) -> u16 {
        self.device_version
    }

    /// Code identifying the standard device class, from the `bDeviceClass` device descriptor field.
    ///
    /// `0x00`: specified at the interface level.\
    /// `0xFF`: vendor-defined.
    #[doc(alias = "bDeviceClass")]
    pub fn class(&self) -> u8 {
        self.class
    }

    /// Standard subclass, from the `bDeviceSubClass` device descriptor field.
    #[doc(alias = "bDeviceSubClass")]
    pub fn subclass(&self) -> u8 {
        self.subclass
    }

    /// Standard protocol, from the `bDeviceProtocol` device descriptor field.
    #[doc(alias = "bDeviceProtocol")]
    pub fn protocol(&self) -> u8 {
        self.protocol
    }

    /// Maximum packet size for endpoint zero.
    #[doc(alias = "bMaxPacketSize0")]
    pub fn max_packet_size_0(&self) -> u8 {
        self.max_packet_size_0
    }

    /// Number of possible configurations.
    #[doc(alias = "bNumConfigurations")]
    pub fn num_configurations(&self) -> u8 {
        self.num_configurations
    }
}

// Not derived so that we can format some fields in hex
impl std::fmt::Debug for DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceInfo")
            .field("bus_number", &self.bus_number)
            .field("device_address", &self.device_address)
            .field("port_chain", &format_args!("{:?}", self.port_chain))
            .field("vendor_id", &format_args!("0x{:04X}", self.vendor_id))
            .field("product_id", &format_args!("0x{:04X}", self.product_id))
            .field("usb_version", &format_args!("0x{:04X}", self.usb_version))
            .field(
                "device_version",
                &format_args!("0x{:04X}", self.device_version),
            )
            .field("class", &format_args!("0x{:02X}", self.class))
            .field("subclass", &format_args!("0x{:02X}", self.subclass))
            .field("protocol", &format_args!("0x{:02X}", self.protocol))
            .field("max_packet_size_0", &self.max_packet_size_0)
            .field("num_configurations", &self.num_configurations)
            .finish()
    }
}
