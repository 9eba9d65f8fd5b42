mod definition;
mod metric;
pub mod tags;

pub use definition::{
    parse_definitions, AggregationDefinition, DefinitionSet, SeriesType, MAX_STEP_S,
};
pub use metric::{FreshnessWindow, HostCounter, MetricValue, MetricValues, Sample};
