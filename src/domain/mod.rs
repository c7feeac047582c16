pub mod event;
pub mod flatten;

pub use event::{Alert, EntityType, FieldValue, TelemetryEvent};
pub use flatten::flatten;
