//! Handlers 模块

pub mod alarms;
pub mod devices;
pub mod history;
pub mod metrics;
pub mod registers;

pub use alarms::*;
pub use devices::*;
pub use history::*;
pub use metrics::*;
pub use registers::*;
