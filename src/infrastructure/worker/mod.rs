//! Worker Layer - Background Task Processing
//!
//! 实现 AutoReconnectWorker，周期性恢复掉线的已认证会话

mod reconnect_worker;

pub use reconnect_worker::{AutoReconnectWorker, ReconnectWorkerConfig, SweepSummary};
