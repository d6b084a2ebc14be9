pub mod mqtt;
pub mod serial;

pub use mqtt::Publisher;
pub use serial::{SerialInterface, SerialLink};
