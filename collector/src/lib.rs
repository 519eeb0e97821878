//! Collection of game statistics: which accounts to poll, fetching their stats once per tick and
//! pushing the result to Graphite.

#[macro_use]
extern crate tracing;

pub mod batch;
pub mod cycle;
pub mod health;
pub mod orchestrator;
pub mod probe;
pub mod publisher;
pub mod race;
pub mod registry;
pub mod scheduler;
pub mod session;

pub use batch::AggregateBatch;
pub use cycle::{
    CollectionCycle,
    GroupReport,
};
pub use health::{
    PushHealth,
    PushStatus,
};
pub use orchestrator::Orchestrator;
pub use probe::HostProbe;
pub use publisher::{
    GraphiteSink,
    MetricsSink,
    PublishError,
    PublishOutcome,
    Publisher,
};
pub use registry::{
    TrackedAccount,
    UserRegistry,
};
pub use scheduler::Scheduler;
