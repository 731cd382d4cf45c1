pub mod controller;
pub mod loop_worker;
pub mod processor;
pub mod state;

pub use controller::{CollectorController, CollectorInputs, SensorCapabilities, StaticCapabilities};
pub use processor::Collector;
pub use state::{CollectorEvent, CollectorStatus};
