mod collaborator;
mod cycle;
mod reconcile;
mod registry;
mod task;

pub mod prelude {
    pub use crate::collaborator::{DefinitionStore, HostGroupResolver, MetricFetcher, PublishSink};
    pub use crate::cycle::{prepare_expressions, AggregationRunner, CycleAbort, CycleReport, Side};
    pub use crate::reconcile::Reconciler;
    pub use crate::registry::{ReconcileOutcome, TaskRegistry};
    pub use crate::task::AggregationTask;
}
