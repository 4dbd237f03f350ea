pub mod beacon;

pub use beacon::{Beacon, BeaconSender, BeaconSink};
