use usbio::Context;

fn main() {
    env_logger::init();
    let context = Context::libusb().unwrap();
    for dev in context.list_devices().unwrap() {
        println!("{:#?}", dev);
    }
}
