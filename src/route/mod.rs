//! The `route` module describes routes: where they consume from, how many
//! consumers they run, their redelivery policy and the pipeline of steps each
//! message goes through.

pub mod definition;
pub mod status;
pub mod step;

pub use definition::{Pipeline, RedeliveryPolicy, RouteBuilder, RouteDefinition};
pub use status::RouteStatus;
pub use step::{Exchange, Log, SendTo, Step, ThrowException};
