use std::time::Duration;

use usbio::{
    transfer::{ControlIn, ControlOut, ControlType, Recipient},
    Context, Transfer, TransferType,
};

fn main() {
    env_logger::init();
    let context = Context::libusb().unwrap();
    let device = context
        .find_by_ids(0x59e3, 0x0a23)
        .unwrap()
        .expect("device should be connected");

    device.open().unwrap();
    let ep0 = Transfer::new(&device, 0x00, TransferType::Control, Duration::from_millis(100))
        .unwrap();

    let out = ControlOut {
        control_type: ControlType::Vendor,
        recipient: Recipient::Device,
        request: 0x81,
        value: 0x9999,
        index: 0x9999,
        data: &[1, 2, 3, 4],
    };
    ep0.submit(out.to_buffer().unwrap(), |_, completion| {
        println!("{:?}", completion.status);
    })
    .unwrap();
    context.run();

    let inp = ControlIn {
        control_type: ControlType::Vendor,
        recipient: Recipient::Device,
        request: 0x81,
        value: 0x9999,
        index: 0x9999,
        length: 256,
    };
    ep0.submit(inp.to_buffer(), |_, completion| {
        println!("{:?} {:02x?}", completion.status, completion.data());
    })
    .unwrap();
    context.run();
}
