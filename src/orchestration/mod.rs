//! Long-running reconciliation: the polling monitor and its period schedule.

pub mod monitor;
pub mod schedule;

pub use monitor::{
    Monitor, MonitorSettings, MonitoredAccount, ReportBoard, TickError, TickOutcome,
};
pub use schedule::PeriodSchedule;
