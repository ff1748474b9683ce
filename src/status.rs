use std::{str::FromStr, time::Duration};

use chrono::{DateTime, Utc};

use crate::source::SourceError;

// apcupsd reports dates like `2024-03-01 09:12:44 +0100`.
const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

// Marks a value the UPS has no record of.
const NOT_AVAILABLE: &str = "N/A";

// Last line of every status report.
const END_OF_REPORT: &str = "END APC";

/// One read of the UPS state, as reported by apcupsd.
///
/// Readings the unit does not support are left at zero. Timestamps are `None`
/// when the event has never been recorded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusSnapshot {
    pub hostname: String,
    pub ups_name: String,
    pub model: String,
    pub status: String,

    pub load_percent: f64,
    pub battery_charge_percent: f64,

    pub line_voltage: f64,
    pub nominal_input_voltage: f64,

    pub output_voltage: f64,
    pub output_current: f64,

    pub battery_voltage: f64,
    pub nominal_battery_voltage: f64,

    pub internal_temp: f64,

    pub number_transfers: u64,

    pub time_left: Duration,
    pub time_on_battery: Duration,
    pub cumulative_time_on_battery: Duration,

    pub last_transfer_on_battery: Option<DateTime<Utc>>,
    pub last_transfer_off_battery: Option<DateTime<Utc>>,
    pub last_selftest: Option<DateTime<Utc>>,

    pub nominal_power: u64,
}

impl StatusSnapshot {
    /// Parses a full `apcaccess status` report.
    ///
    /// The report is either accepted whole or rejected, so a snapshot is never
    /// half filled in.
    pub fn parse(report: &str) -> Result<StatusSnapshot, SourceError> {
        let mut snapshot = StatusSnapshot::default();
        let mut recognised = 0;

        for line in report.lines() {
            let line = line.trim();
            if line.is_empty() || line == END_OF_REPORT {
                continue;
            }

            let (key, value) = line.split_once(':').ok_or_else(|| {
                SourceError::Protocol(format!("line without separator: {:?}", line))
            })?;

            if snapshot.set(key.trim(), value.trim())? {
                recognised += 1;
            }
        }

        if recognised == 0 {
            return Err(SourceError::Protocol("empty status report".to_string()));
        }

        Ok(snapshot)
    }

    // Returns whether the key is one we track.
    fn set(&mut self, key: &str, value: &str) -> Result<bool, SourceError> {
        match key {
            "HOSTNAME" => self.hostname = value.to_string(),
            "UPSNAME" => self.ups_name = value.to_string(),
            "MODEL" => self.model = value.to_string(),
            "STATUS" => self.status = value.to_string(),

            "LOADPCT" => self.load_percent = parse_number(key, value)?,
            "BCHARGE" => self.battery_charge_percent = parse_number(key, value)?,
            "LINEV" => self.line_voltage = parse_number(key, value)?,
            "NOMINV" => self.nominal_input_voltage = parse_number(key, value)?,
            "OUTPUTV" => self.output_voltage = parse_number(key, value)?,
            "OUTCURNT" => self.output_current = parse_number(key, value)?,
            "BATTV" => self.battery_voltage = parse_number(key, value)?,
            "NOMBATTV" => self.nominal_battery_voltage = parse_number(key, value)?,
            "ITEMP" => self.internal_temp = parse_number(key, value)?,

            "NUMXFERS" => self.number_transfers = parse_number(key, value)?,
            "NOMPOWER" => self.nominal_power = parse_number(key, value)?,

            "TIMELEFT" => self.time_left = parse_duration(key, value)?,
            "TONBATT" => self.time_on_battery = parse_duration(key, value)?,
            "CUMONBATT" => self.cumulative_time_on_battery = parse_duration(key, value)?,

            "XONBATT" => self.last_transfer_on_battery = parse_timestamp(key, value)?,
            "XOFFBATT" => self.last_transfer_off_battery = parse_timestamp(key, value)?,
            "LASTSTEST" => self.last_selftest = parse_timestamp(key, value)?,

            _ => return Ok(false),
        }

        Ok(true)
    }
}

impl FromStr for StatusSnapshot {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StatusSnapshot::parse(s)
    }
}

fn malformed(key: &str, value: &str) -> SourceError {
    SourceError::Protocol(format!("malformed value for {}: {:?}", key, value))
}

// Values carry a unit suffix, e.g. `121.0 Volts` or `29.2 C`.
fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, SourceError> {
    value
        .split_whitespace()
        .next()
        .and_then(|number| number.parse().ok())
        .ok_or_else(|| malformed(key, value))
}

fn parse_duration(key: &str, value: &str) -> Result<Duration, SourceError> {
    let amount: f64 = parse_number(key, value)?;
    let scale = match value.split_whitespace().nth(1) {
        None | Some("Seconds") => 1.0,
        Some("Minutes") => 60.0,
        Some("Hours") => 3600.0,
        Some(_) => return Err(malformed(key, value)),
    };

    Duration::try_from_secs_f64(amount * scale).map_err(|_| malformed(key, value))
}

fn parse_timestamp(key: &str, value: &str) -> Result<Option<DateTime<Utc>>, SourceError> {
    if value.is_empty() || value == NOT_AVAILABLE {
        return Ok(None);
    }

    DateTime::parse_from_str(value, DATE_FORMAT)
        .map(|at| Some(at.with_timezone(&Utc)))
        .map_err(|_| malformed(key, value))
}
