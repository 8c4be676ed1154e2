//! Sensor module - identities, readings and the sensor registry

mod address;
mod reading;
mod registry;

pub use address::{AddressParseError, SensorId};
pub use reading::{Location, Measurement, Reading, ReceivedAt, Site, SiteParseError};
pub use registry::{RegistrySummary, SensorHandle, SensorRecord, SensorRegistry};
