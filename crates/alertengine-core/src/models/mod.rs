//! Data models for alertengine

mod alert;
mod dashboard;
mod notification;
mod query;

pub use alert::*;
pub use dashboard::*;
pub use notification::*;
pub use query::*;
