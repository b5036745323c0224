pub mod dispatch_worker;
pub mod scheduled_sweep;

pub use dispatch_worker::DispatchWorker;
pub use scheduled_sweep::ScheduledSweepWorker;
