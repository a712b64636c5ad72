use crate::{codes, Error, NativeError};

/// Transfer direction
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum Direction {
    /// Host to device
    Out = 0,

    /// Device to host
    In = 1,
}

impl Direction {
    /// Get the direction from the MSB of the endpoint address.
    pub fn from_address(addr: u8) -> Direction {
        match addr & 0x80 {
            0 => Self::Out,
            _ => Self::In,
        }
    }
}

/// Specification defining the request.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum ControlType {
    /// Request defined by the USB standard.
    Standard = 0,

    /// Request defined by the standard USB class specification.
    Class = 1,

    /// Non-standard request.
    Vendor = 2,
}

/// Entity targeted by the request.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum Recipient {
    /// Request made to device as a whole.
    Device = 0,

    /// Request made to specific interface.
    Interface = 1,

    /// Request made to specific endpoint.
    Endpoint = 2,

    /// Other request.
    Other = 3,
}

/// Size of the setup packet at the start of every control transfer buffer.
pub const SETUP_PACKET_SIZE: usize = 8;

/// SETUP packet and associated data to make an **OUT** request on a control endpoint.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ControlOut<'a> {
    /// Request type used for the `bmRequestType` field sent in the SETUP packet.
    #[doc(alias = "bmRequestType")]
    pub control_type: ControlType,

    /// Recipient used for the `bmRequestType` field sent in the SETUP packet.
    #[doc(alias = "bmRequestType")]
    pub recipient: Recipient,

    /// `bRequest` field sent in the SETUP packet.
    #[doc(alias = "bRequest")]
    pub request: u8,

    /// `wValue` field sent in the SETUP packet.
    #[doc(alias = "wValue")]
    pub value: u16,

    /// `wIndex` field sent in the SETUP packet.
    ///
    /// For [`Recipient::Interface`] this is the interface number. For [`Recipient::Endpoint`] this is the endpoint number.
    #[doc(alias = "wIndex")]
    pub index: u16,

    /// Data to be sent in the data stage.
    #[doc(alias = "wLength")]
    pub data: &'a [u8],
}

impl ControlOut<'_> {
    /// Build the buffer to submit on a control transfer: the setup packet
    /// followed by the data.
    ///
    /// Fails if the data is longer than `wLength` can express.
    pub fn to_buffer(&self) -> Result<Vec<u8>, Error> {
        let length: u16 = self
            .data
            .len()
            .try_into()
            .map_err(|_| Error::Submit(NativeError::new(codes::ERROR_INVALID_PARAM)))?;

        let mut buf = Vec::with_capacity(SETUP_PACKET_SIZE + self.data.len());
        buf.extend_from_slice(&pack_setup(
            Direction::Out,
            self.control_type,
            self.recipient,
            self.request,
            self.value,
            self.index,
            length,
        ));
        buf.extend_from_slice(self.data);
        Ok(buf)
    }

    /// The `bmRequestType` byte.
    pub fn request_type(&self) -> u8 {
        request_type(Direction::Out, self.control_type, self.recipient)
    }
}

/// SETUP packet to make an **IN** request on a control endpoint.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ControlIn {
    /// Request type used for the `bmRequestType` field sent in the SETUP packet.
    #[doc(alias = "bmRequestType")]
    pub control_type: ControlType,

    /// Recipient used for the `bmRequestType` field sent in the SETUP packet.
    #[doc(alias = "bmRequestType")]
    pub recipient: Recipient,

    /// `bRequest` field sent in the SETUP packet.
    #[doc(alias = "bRequest")]
    pub request: u8,

    /// `wValue` field sent in the SETUP packet.
    #[doc(alias = "wValue")]
    pub value: u16,

    /// `wIndex` field sent in the SETUP packet.
    ///
    /// For [`Recipient::Interface`] this is the interface number. For [`Recipient::Endpoint`] this is the endpoint number.
    #[doc(alias = "wIndex")]
    pub index: u16,

    /// `wLength` field sent in the SETUP packet.
    ///
    /// This is the maximum number of bytes that will be read.
    #[doc(alias = "wLength")]
    pub length: u16,
}

impl ControlIn {
    /// Build the buffer to submit on a control transfer: the setup packet
    /// followed by `length` zeroed bytes to receive into.
    pub fn to_buffer(&self) -> Vec<u8> {
        let mut buf = vec![0; SETUP_PACKET_SIZE + self.length as usize];
        buf[..SETUP_PACKET_SIZE].copy_from_slice(&pack_setup(
            Direction::In,
            self.control_type,
            self.recipient,
            self.request,
            self.value,
            self.index,
            self.length,
        ));
        buf
    }

    /// The `bmRequestType` byte.
    pub fn request_type(&self) -> u8 {
        request_type(Direction::In, self.control_type, self.recipient)
    }
}

fn pack_setup(
    direction: Direction,
    control_type: ControlType,
    recipient: Recipient,
    request: u8,
    value: u16,
    index: u16,
    length: u16,
) -> [u8; SETUP_PACKET_SIZE] {
    let bmrequesttype = request_type(direction, control_type, recipient);

    [
        bmrequesttype,
        request,
        (value & 0xFF) as u8,
        (value >> 8) as u8,
        (index & 0xFF) as u8,
        (index >> 8) as u8,
        (length & 0xFF) as u8,
        (length >> 8) as u8,
    ]
}

fn request_type(direction: Direction, control_type: ControlType, recipient: Recipient) -> u8 {
    ((direction as u8) << 7) | ((control_type as u8) << 5) | (recipient as u8)
}

/// The `wLength` field of a setup packet.
pub(crate) fn setup_length(setup: &[u8; SETUP_PACKET_SIZE]) -> usize {
    u16::from_le_bytes([setup[6], setup[7]]).into()
}

/// Whether `buffer` starts with a setup packet and has room for the data
/// stage its `wLength` announces.
///
/// The host library sizes a control transfer from `wLength`, not from the
/// buffer, so anything shorter must never reach it.
pub(crate) fn is_valid_control_buffer(buffer: &[u8]) -> bool {
    match buffer.first_chunk::<SETUP_PACKET_SIZE>() {
        Some(setup) => buffer.len() >= SETUP_PACKET_SIZE + setup_length(setup),
        None => false,
    }
}

#[test]
fn control_in_buffer() {
    let buf = ControlIn {
        control_type: ControlType::Standard,
        recipient: Recipient::Device,
        request: 0x06,
        value: 0x0100,
        index: 0,
        length: 18,
    }
    .to_buffer();

    assert_eq!(buf.len(), SETUP_PACKET_SIZE + 18);
    assert_eq!(&buf[..SETUP_PACKET_SIZE], &[0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 18, 0]);
    assert!(buf[SETUP_PACKET_SIZE..].iter().all(|&b| b == 0));
}

#[test]
fn control_out_buffer() {
    let req = ControlOut {
        control_type: ControlType::Vendor,
        recipient: Recipient::Interface,
        request: 0x42,
        value: 0xBEEF,
        index: 0x0102,
        data: &[1, 2, 3],
    };
    assert_eq!(req.request_type(), 0x41);
    assert_eq!(
        req.to_buffer().unwrap(),
        vec![0x41, 0x42, 0xEF, 0xBE, 0x02, 0x01, 3, 0, 1, 2, 3]
    );

    let big = vec![0; 0x10000];
    let err = ControlOut { data: &big, ..req }.to_buffer().unwrap_err();
    assert_eq!(err.native_code(), Some(codes::ERROR_INVALID_PARAM));
}

#[test]
fn control_buffer_must_cover_wlength() {
    let setup = [0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x00, 0x10];
    assert_eq!(setup_length(&setup), 0x1000);
    assert!(!is_valid_control_buffer(&setup));
    assert!(!is_valid_control_buffer(&[0x80, 0x06, 0x00]));

    let mut buf = setup.to_vec();
    buf.resize(SETUP_PACKET_SIZE + 0x1000, 0);
    assert!(is_valid_control_buffer(&buf));
    buf.push(0);
    assert!(is_valid_control_buffer(&buf));

    let zero_length = [0x00, 0x09, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00];
    assert!(is_valid_control_buffer(&zero_length));
}

#[test]
fn direction_from_address() {
    assert_eq!(Direction::from_address(0x81), Direction::In);
    assert_eq!(Direction::from_address(0x02), Direction::Out);
}
