use std::time::Duration;

use usbio::{Context, Transfer, TransferType};

fn read_next(transfer: &Transfer) {
    transfer
        .submit(vec![0; 4096], |t, completion| {
            println!("{:?} {:02x?}", completion.status, completion.data());
            if completion.status.is_ok() {
                read_next(t);
            }
        })
        .unwrap();
}

fn main() {
    env_logger::init();
    let context = Context::libusb().unwrap();
    let device = context
        .find_by_ids(0x59e3, 0x0a23)
        .unwrap()
        .expect("device should be connected");

    println!("Device info: {:?}", device.info());

    device.open().unwrap();
    device.claim_interface(0).unwrap();

    let ep_out = Transfer::new(&device, 0x02, TransferType::Bulk, Duration::from_millis(1000))
        .unwrap();
    ep_out
        .submit(vec![1, 2, 3, 4, 5], |_, completion| {
            println!("write: {:?}", completion.status);
        })
        .unwrap();
    context.run();

    let ep_in = Transfer::new(&device, 0x81, TransferType::Bulk, Duration::from_millis(1000))
        .unwrap();
    read_next(&ep_in);
    context.run();

    device.release_interface(0).unwrap();
    device.close().unwrap();
}
