pub mod sensor_api;

pub use sensor_api::{load_ideal_conditions_file, SensorApiClient};

use crate::error::Result;
use crate::models::SensorReading;
use std::future::Future;

/// Anything that can produce the current sensor reading.
pub trait SensorSource: Send + Sync + 'static {
    fn fetch_latest(&self) -> impl Future<Output = Result<SensorReading>> + Send;
}
