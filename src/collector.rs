use chrono::{DateTime, Utc};

use crate::{
    catalogue::{Catalogue, MetricDesc, STATUS_FLAGS},
    source::{SourceError, StatusSource},
    status::StatusSnapshot,
};

/// A definition bound to label values and a value, for one collection cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement<'c> {
    pub desc: &'c MetricDesc,
    pub label_values: Vec<String>,
    pub value: f64,
}

impl<'c> Measurement<'c> {
    fn new(desc: &'c MetricDesc, label_values: Vec<String>, value: f64) -> Measurement<'c> {
        debug_assert_eq!(desc.labels().len(), label_values.len(), "{}", desc.name());
        Measurement {
            desc,
            label_values,
            value,
        }
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.desc
            .labels()
            .iter()
            .position(|l| *l == name)
            .map(|i| self.label_values[i].as_str())
    }
}

/// Stands in for the whole measurement set when no snapshot could be read.
#[derive(Debug)]
pub struct InvalidMeasurement<'c> {
    pub desc: &'c MetricDesc,
    pub error: SourceError,
}

/// Result of one collection cycle.
#[derive(Debug)]
pub enum Collection<'c> {
    Measurements(Vec<Measurement<'c>>),
    Invalid(InvalidMeasurement<'c>),
}

impl<'c> Collection<'c> {
    pub fn measurements(&self) -> &[Measurement<'c>] {
        match self {
            Collection::Measurements(ms) => ms.as_slice(),
            Collection::Invalid(_) => &[],
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Collection::Invalid(_))
    }
}

/// Collects the catalogue's metrics from a single UPS.
///
/// The collector keeps nothing between cycles: every [`UpsCollector::collect`]
/// asks the source for a fresh snapshot.
pub struct UpsCollector<'c, 's, S: ?Sized> {
    catalogue: &'c Catalogue,
    source: &'s S,
}

impl<'c, 's, S: StatusSource + ?Sized> UpsCollector<'c, 's, S> {
    pub fn new(catalogue: &'c Catalogue, source: &'s S) -> UpsCollector<'c, 's, S> {
        UpsCollector { catalogue, source }
    }

    /// Every definition this collector may emit, without touching the source.
    pub fn describe(&self) -> Vec<&'c MetricDesc> {
        self.catalogue.definitions()
    }

    pub fn collect(&self) -> Collection<'c> {
        match self.source.status() {
            Ok(snapshot) => {
                let measurements = self.derive(&snapshot);
                tracing::debug!(
                    ups = %snapshot.ups_name,
                    count = measurements.len(),
                    "collected ups metrics"
                );
                Collection::Measurements(measurements)
            }
            Err(error) => {
                let desc = self.catalogue.fallback();
                tracing::error!(metric = desc.name(), %error, "failed collecting ups metrics");
                Collection::Invalid(InvalidMeasurement { desc, error })
            }
        }
    }

    fn derive(&self, s: &StatusSnapshot) -> Vec<Measurement<'c>> {
        let c = self.catalogue;
        let ups = || vec![s.ups_name.clone()];

        let readings = [
            (&c.ups_load_percent, s.load_percent),
            (&c.battery_charge_percent, s.battery_charge_percent),
            (&c.line_volts, s.line_voltage),
            (&c.line_nominal_volts, s.nominal_input_voltage),
            (&c.output_volts, s.output_voltage),
            (&c.output_amps, s.output_current),
            (&c.battery_volts, s.battery_voltage),
            (&c.battery_nominal_volts, s.nominal_battery_voltage),
            (&c.internal_temperature_celsius, s.internal_temp),
            (&c.battery_number_transfers_total, s.number_transfers as f64),
            (&c.battery_time_left_seconds, s.time_left.as_secs_f64()),
            (&c.battery_time_on_seconds, s.time_on_battery.as_secs_f64()),
            (
                &c.battery_cumulative_time_on_seconds_total,
                s.cumulative_time_on_battery.as_secs_f64(),
            ),
        ];

        let timestamps = [
            (&c.last_transfer_on_battery, s.last_transfer_on_battery),
            (&c.last_transfer_off_battery, s.last_transfer_off_battery),
            (&c.last_selftest, s.last_selftest),
        ];

        let capacity = readings.len() + timestamps.len() + STATUS_FLAGS.len() + 2;
        let mut out = Vec::with_capacity(capacity);

        for (desc, value) in readings {
            out.push(Measurement::new(desc, ups(), value));
        }

        for (desc, at) in timestamps {
            if let Some(m) = timestamp(desc, at, ups()) {
                out.push(m);
            }
        }

        out.push(Measurement::new(&c.nominal_power_watts, ups(), s.nominal_power as f64));

        for flag in STATUS_FLAGS {
            let value = if s.status.contains(flag) { 1.0 } else { 0.0 };
            out.push(Measurement::new(
                &c.ups_status,
                vec![s.ups_name.clone(), flag.to_string()],
                value,
            ));
        }

        out.push(Measurement::new(
            &c.ups_info,
            vec![
                s.ups_name.clone(),
                s.hostname.clone(),
                s.model.clone(),
                s.status.clone(),
            ],
            1.0,
        ));

        out
    }
}

// An unset timestamp means the event was never recorded: no series, not 0.
fn timestamp<'c>(
    desc: &'c MetricDesc,
    at: Option<DateTime<Utc>>,
    label_values: Vec<String>,
) -> Option<Measurement<'c>> {
    at.map(|at| Measurement::new(desc, label_values, at.timestamp() as f64))
}
