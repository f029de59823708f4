pub mod app;
pub mod session;

pub use app::AppId;
pub use session::{EndReason, SessionRecord, SessionState};
