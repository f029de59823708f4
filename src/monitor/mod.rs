pub mod commands;
pub mod controller;
pub mod events;
pub mod force_stop;
pub mod snapshot;
pub mod state;
mod worker;

pub use commands::{MonitorHandle, ToggleOutcome, TOGGLE_TOKEN};
pub use controller::{MonitorController, MonitorDeps, MonitorOptions};
pub use events::{MonitorEvent, Notice};
pub use force_stop::{ForceStopHold, HoldOutcome, FORCE_STOP_HOLD};
pub use snapshot::{MonitorSnapshot, SessionGate};
pub use state::{Monitor, Step};
