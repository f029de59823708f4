pub mod blocked_apps;
pub mod monitor_state;
pub mod sessions;
