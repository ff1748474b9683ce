//! The fixed set of metrics exported for a UPS.
//!
//! Every numeric series carries a single `ups` label holding the UPS name.
//! Descriptive fields (hostname, model, status text) are only attached to the
//! `apcupsd_ups_info` series, which can be joined on `ups`.

use prometheus::Opts;

/// Top-level namespace for all exported metric names.
pub const NAMESPACE: &str = "apcupsd";

/// Conditions apcupsd may list in its STATUS field, in export order.
pub const STATUS_FLAGS: [&str; 13] = [
    "CAL",
    "TRIM",
    "BOOST",
    "ONLINE",
    "ONBATT",
    "OVERLOAD",
    "LOWBATT",
    "REPLACEBATT",
    "NOBATT",
    "SLAVE",
    "SLAVEDOWN",
    "COMMLOST",
    "SHUTTING DOWN",
];

const UPS_LABELS: &[&str] = &["ups"];
const STATUS_LABELS: &[&str] = &["ups", "status"];
const INFO_LABELS: &[&str] = &["ups", "hostname", "model", "status"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Gauge,
    Counter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDesc {
    name: String,
    help: &'static str,
    labels: &'static [&'static str],
    kind: MetricKind,
}

impl MetricDesc {
    fn new(
        name: &str,
        help: &'static str,
        labels: &'static [&'static str],
        kind: MetricKind,
    ) -> MetricDesc {
        MetricDesc {
            name: Opts::new(name, help).namespace(NAMESPACE).fq_name(),
            help,
            labels,
            kind,
        }
    }

    fn gauge(name: &str, help: &'static str) -> MetricDesc {
        MetricDesc::new(name, help, UPS_LABELS, MetricKind::Gauge)
    }

    fn counter(name: &str, help: &'static str) -> MetricDesc {
        MetricDesc::new(name, help, UPS_LABELS, MetricKind::Counter)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn help(&self) -> &str {
        self.help
    }

    pub fn labels(&self) -> &[&'static str] {
        self.labels
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Catalogue {
    pub ups_load_percent: MetricDesc,
    pub battery_charge_percent: MetricDesc,
    pub line_volts: MetricDesc,
    pub line_nominal_volts: MetricDesc,
    pub output_volts: MetricDesc,
    pub output_amps: MetricDesc,
    pub battery_volts: MetricDesc,
    pub battery_nominal_volts: MetricDesc,
    pub internal_temperature_celsius: MetricDesc,
    pub battery_number_transfers_total: MetricDesc,
    pub battery_time_left_seconds: MetricDesc,
    pub battery_time_on_seconds: MetricDesc,
    pub battery_cumulative_time_on_seconds_total: MetricDesc,
    pub last_transfer_on_battery: MetricDesc,
    pub last_transfer_off_battery: MetricDesc,
    pub last_selftest: MetricDesc,
    pub nominal_power_watts: MetricDesc,
    pub ups_status: MetricDesc,
    pub ups_info: MetricDesc,
}

impl Catalogue {
    pub fn new() -> Catalogue {
        Catalogue {
            ups_load_percent: MetricDesc::gauge(
                "ups_load_percent",
                "Current UPS load percentage.",
            ),
            battery_charge_percent: MetricDesc::gauge(
                "battery_charge_percent",
                "Current UPS battery charge percentage.",
            ),
            line_volts: MetricDesc::gauge("line_volts", "Current AC input line voltage."),
            line_nominal_volts: MetricDesc::gauge(
                "line_nominal_volts",
                "Nominal AC input line voltage.",
            ),
            output_volts: MetricDesc::gauge("output_volts", "Current UPS output voltage."),
            output_amps: MetricDesc::gauge("output_amps", "Current UPS output current in amps."),
            battery_volts: MetricDesc::gauge("battery_volts", "Current UPS battery voltage."),
            battery_nominal_volts: MetricDesc::gauge(
                "battery_nominal_volts",
                "Nominal UPS battery voltage.",
            ),
            internal_temperature_celsius: MetricDesc::gauge(
                "internal_temperature_celsius",
                "Internal UPS temperature in degrees Celsius.",
            ),
            battery_number_transfers_total: MetricDesc::counter(
                "battery_number_transfers_total",
                "Total number of transfers to UPS battery power.",
            ),
            battery_time_left_seconds: MetricDesc::gauge(
                "battery_time_left_seconds",
                "Number of seconds remaining of UPS battery power.",
            ),
            battery_time_on_seconds: MetricDesc::gauge(
                "battery_time_on_seconds",
                "Number of seconds the UPS has been providing battery power \
                 due to an AC input line outage.",
            ),
            battery_cumulative_time_on_seconds_total: MetricDesc::counter(
                "battery_cumulative_time_on_seconds_total",
                "Total number of seconds the UPS has provided battery power \
                 due to AC input line outages.",
            ),
            last_transfer_on_battery: MetricDesc::gauge(
                "last_transfer_on_battery",
                "Time of last transfer to battery since apcupsd startup.",
            ),
            last_transfer_off_battery: MetricDesc::gauge(
                "last_transfer_off_battery",
                "Time of last transfer from battery since apcupsd startup.",
            ),
            last_selftest: MetricDesc::gauge(
                "last_selftest",
                "Time of last selftest since apcupsd startup.",
            ),
            nominal_power_watts: MetricDesc::gauge(
                "nominal_power_watts",
                "Nominal power output in watts.",
            ),
            ups_status: MetricDesc::new(
                "ups_status",
                "UPS Status values.",
                STATUS_LABELS,
                MetricKind::Gauge,
            ),
            ups_info: MetricDesc::new(
                "ups_info",
                "Hostname, UPS Model and Name.",
                INFO_LABELS,
                MetricKind::Gauge,
            ),
        }
    }

    /// All definitions, in the order their measurements are collected.
    pub fn definitions(&self) -> Vec<&MetricDesc> {
        vec![
            &self.ups_load_percent,
            &self.battery_charge_percent,
            &self.line_volts,
            &self.line_nominal_volts,
            &self.output_volts,
            &self.output_amps,
            &self.battery_volts,
            &self.battery_nominal_volts,
            &self.internal_temperature_celsius,
            &self.battery_number_transfers_total,
            &self.battery_time_left_seconds,
            &self.battery_time_on_seconds,
            &self.battery_cumulative_time_on_seconds_total,
            &self.last_transfer_on_battery,
            &self.last_transfer_off_battery,
            &self.last_selftest,
            &self.nominal_power_watts,
            &self.ups_status,
            &self.ups_info,
        ]
    }

    /// The definition a failed collection is reported against: always the
    /// first numeric one.
    pub fn fallback(&self) -> &MetricDesc {
        &self.ups_load_percent
    }
}

impl Default for Catalogue {
    fn default() -> Self {
        Catalogue::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_names_carry_namespace() {
        let catalogue = Catalogue::new();
        assert_eq!(catalogue.line_volts.name(), "apcupsd_line_volts");
        assert_eq!(catalogue.ups_info.name(), "apcupsd_ups_info");
    }

    #[test]
    fn test_names_are_namespaced_and_unique() {
        let catalogue = Catalogue::new();
        let defs = catalogue.definitions();
        let names: HashSet<&str> = defs.iter().map(|d| d.name()).collect();

        assert_eq!(names.len(), defs.len());
        for d in defs {
            assert!(d.name().starts_with("apcupsd_"), "{}", d.name());
            assert!(!d.name().starts_with("apcupsd_apcupsd_"), "{}", d.name());
            assert!(!d.help().is_empty());
        }
    }

    #[test]
    fn test_fallback_is_first_definition() {
        let catalogue = Catalogue::new();
        assert_eq!(catalogue.fallback(), catalogue.definitions()[0]);
        assert_eq!(catalogue.fallback().name(), "apcupsd_ups_load_percent");
    }

    #[test]
    fn test_label_schema() {
        let catalogue = Catalogue::new();
        assert_eq!(catalogue.ups_status.labels(), &["ups", "status"]);
        assert_eq!(catalogue.ups_info.labels(), &["ups", "hostname", "model", "status"]);
        assert_eq!(catalogue.line_volts.labels(), &["ups"]);
    }

    #[test]
    fn test_counters_end_in_total() {
        for d in Catalogue::new().definitions() {
            let is_counter = d.kind() == MetricKind::Counter;
            assert_eq!(is_counter, d.name().ends_with("_total"), "{}", d.name());
        }
    }
}
