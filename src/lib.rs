//! Exposes the state of an apcupsd managed UPS as Prometheus metrics.

pub mod catalogue;
pub mod collector;
pub mod exposition;
pub mod settings;
pub mod source;
pub mod status;

pub use catalogue::{Catalogue, MetricDesc, MetricKind, NAMESPACE, STATUS_FLAGS};
pub use collector::{Collection, InvalidMeasurement, Measurement, UpsCollector};
pub use exposition::UpsExporter;
pub use settings::Settings;
pub use source::{CommandSource, SourceError, StatusSource};
pub use status::StatusSnapshot;
