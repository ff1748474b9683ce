use std::{path::PathBuf, time::Duration};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// The following define where the UPS status comes from and how often it is read.
const APCACCESS: &str = "/sbin/apcaccess"; // Tool used to query apcupsd.
const ADDRESS: &str = "localhost:3551"; // apcupsd network information server.
const TIMEOUT_SECONDS: u64 = 5; // Seconds before a status request is abandoned.
const POLL_DELAY: u64 = 15; // Seconds to wait between collections.
const COMMUNICATION_FAILED_POLL_DELAY: u64 = 5; // Seconds to wait after a failed collection.

const ENV_PREFIX: &str = "APCUPSD_EXPORTER_";

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Settings {
    pub apcaccess: String,
    pub address: String,
    pub timeout_seconds: u64,
    pub poll_delay: u64,
    pub communication_failed_poll_delay: u64,
    /// Where to write the metrics, stdout when unset.
    pub textfile: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            apcaccess: APCACCESS.to_string(),
            address: ADDRESS.to_string(),
            timeout_seconds: TIMEOUT_SECONDS,
            poll_delay: POLL_DELAY,
            communication_failed_poll_delay: COMMUNICATION_FAILED_POLL_DELAY,
            textfile: None,
        }
    }
}

impl Settings {
    /// Defaults, overridden by the TOML file at `path` (if any), overridden
    /// by `APCUPSD_EXPORTER_*` environment variables.
    pub fn load(path: &str) -> Result<Settings, figment::Error> {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults_without_file() {
        Jail::expect_with(|_jail| {
            let settings = Settings::load("missing.toml")?;
            assert_eq!(settings, Settings::default());
            assert_eq!(settings.timeout(), Duration::from_secs(5));
            Ok(())
        });
    }

    #[test]
    fn test_file_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "exporter.toml",
                r#"
                    address = "ups.lan:3551"
                    poll_delay = 60
                    textfile = "/var/lib/node_exporter/apcupsd.prom"
                "#,
            )?;

            let settings = Settings::load("exporter.toml")?;
            assert_eq!(settings.address, "ups.lan:3551");
            assert_eq!(settings.poll_delay, 60);
            assert_eq!(
                settings.textfile,
                Some(PathBuf::from("/var/lib/node_exporter/apcupsd.prom"))
            );
            assert_eq!(settings.apcaccess, APCACCESS);
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("exporter.toml", "timeout_seconds = 2")?;
            jail.set_env("APCUPSD_EXPORTER_TIMEOUT_SECONDS", "9");

            let settings = Settings::load("exporter.toml")?;
            assert_eq!(settings.timeout_seconds, 9);
            Ok(())
        });
    }
}
