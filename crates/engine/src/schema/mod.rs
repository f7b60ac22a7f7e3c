pub mod flatten;
pub mod model;
pub mod provider;

pub use flatten::flatten_step;
pub use model::{FlatColumn, StepKind, StepValue, SubField, WorkflowStep};
pub use provider::{SchemaProvider, StaticSchemaProvider};
