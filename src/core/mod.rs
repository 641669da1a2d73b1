//! CPU-side timing model: request lifecycle, the scheduler that drives it,
//! and the functional units it uses (MMU and caches).

/// In-flight request state and completion records.
pub mod request;

/// Per-port request scheduling and the stage state machine.
pub mod scheduler;

/// MMU and cache units.
pub mod units;

pub use request::{
    Completion, MemoryRequest, PortId, RequestDescriptor, RequestId, RequestStage, ServicedBy,
};
pub use scheduler::RequestScheduler;
