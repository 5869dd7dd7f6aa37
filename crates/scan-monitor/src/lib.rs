pub mod monitor;
pub mod trail;

pub use monitor::{MonitorEvent, TradeMonitor};
