pub mod advisory;
pub mod calculations;
pub mod history;
pub mod poller;

pub use advisory::{watering_status, AdvisoryEngine};
pub use history::HistoryWindow;
pub use poller::{CycleOutcome, LivePoller, PollerSnapshot};
