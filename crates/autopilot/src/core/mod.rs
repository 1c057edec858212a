pub mod admission;
pub mod aggregator;
pub mod dispatcher;
pub mod environment_guard;
pub mod risk;
pub mod scheduler;

pub use admission::{AdmissionContext, AdmissionController};
pub use aggregator::{AggregatedSignals, SignalAggregator};
pub use dispatcher::{DispatchReceipt, ExecutionDispatcher};
pub use environment_guard::EnvironmentGuard;
pub use risk::{protective_levels, size_order};
pub use scheduler::Scheduler;
