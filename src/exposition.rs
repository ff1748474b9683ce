//! Bridges collected measurements to the `prometheus` crate's data model and
//! text format.

use std::{collections::HashMap, fs, io, path::Path};

use prometheus::{
    core::{Collector, Desc},
    proto::{Counter, Gauge, LabelPair, Metric, MetricFamily, MetricType},
    Encoder, TextEncoder,
};

use crate::{
    catalogue::{Catalogue, MetricDesc, MetricKind},
    collector::{Measurement, UpsCollector},
    source::StatusSource,
};

/// A UPS collector that owns its catalogue and status source, so it can be
/// registered with a [`prometheus::Registry`].
///
/// Every `collect` runs one collection cycle. A failed cycle yields no
/// families at all; the error has been logged by then.
pub struct UpsExporter<S> {
    catalogue: Catalogue,
    source: S,
    descs: Vec<Desc>,
}

impl<S: StatusSource> UpsExporter<S> {
    pub fn new(source: S) -> Result<UpsExporter<S>, prometheus::Error> {
        let catalogue = Catalogue::new();
        let descs = descs(&catalogue)?;
        Ok(UpsExporter {
            catalogue,
            source,
            descs,
        })
    }
}

impl<S: StatusSource + Send + Sync + 'static> Collector for UpsExporter<S> {
    fn desc(&self) -> Vec<&Desc> {
        self.descs.iter().collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let collection = UpsCollector::new(&self.catalogue, &self.source).collect();
        families(collection.measurements())
    }
}

/// Builds a registry descriptor for every catalogue definition, failing on the
/// first name or label the registry would reject.
pub fn descs(catalogue: &Catalogue) -> Result<Vec<Desc>, prometheus::Error> {
    catalogue
        .definitions()
        .into_iter()
        .map(|d| {
            Desc::new(
                d.name().to_string(),
                d.help().to_string(),
                d.labels().iter().map(|l| l.to_string()).collect(),
                HashMap::new(),
            )
        })
        .collect()
}

/// Groups measurements into metric families, keeping their order.
pub fn families(measurements: &[Measurement]) -> Vec<MetricFamily> {
    let mut out: Vec<MetricFamily> = Vec::new();
    let mut current: Option<&MetricDesc> = None;

    for m in measurements {
        if current != Some(m.desc) {
            out.push(family(m.desc));
            current = Some(m.desc);
        }

        if let Some(family) = out.last_mut() {
            family.mut_metric().push(metric(m));
        }
    }

    out
}

/// Renders metric families in the Prometheus text exposition format.
pub fn encode(families: &[MetricFamily]) -> Result<String, prometheus::Error> {
    let mut buf = Vec::new();
    TextEncoder::new().encode(families, &mut buf)?;
    String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

pub fn render(measurements: &[Measurement]) -> Result<String, prometheus::Error> {
    encode(&families(measurements))
}

/// Replaces `path` with `contents` so that readers, such as the node_exporter
/// textfile collector, never see a partial write.
pub fn write_textfile(path: &Path, contents: &str) -> io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");

    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
}

/// Removes a previously written textfile, so none of its series outlive a
/// failed collection.
pub fn remove_textfile(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn family(desc: &MetricDesc) -> MetricFamily {
    let mut family = MetricFamily::default();
    family.set_name(desc.name().to_string());
    family.set_help(desc.help().to_string());
    family.set_field_type(match desc.kind() {
        MetricKind::Gauge => MetricType::GAUGE,
        MetricKind::Counter => MetricType::COUNTER,
    });
    family
}

fn metric(m: &Measurement) -> Metric {
    let labels: Vec<LabelPair> = m
        .desc
        .labels()
        .iter()
        .zip(&m.label_values)
        .map(|(name, value)| {
            let mut pair = LabelPair::default();
            pair.set_name(name.to_string());
            pair.set_value(value.clone());
            pair
        })
        .collect();

    let mut metric = Metric::default();
    metric.set_label(labels.into());
    match m.desc.kind() {
        MetricKind::Gauge => {
            let mut gauge = Gauge::default();
            gauge.set_value(m.value);
            metric.set_gauge(gauge);
        }
        MetricKind::Counter => {
            let mut counter = Counter::default();
            counter.set_value(m.value);
            metric.set_counter(counter);
        }
    }
    metric
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceError;
    use crate::status::StatusSnapshot;
    use prometheus::Registry;
    use std::time::Duration;

    struct FixedSource(StatusSnapshot);

    impl StatusSource for FixedSource {
        fn status(&self) -> Result<StatusSnapshot, SourceError> {
            Ok(self.0.clone())
        }
    }

    struct FailingSource;

    impl StatusSource for FailingSource {
        fn status(&self) -> Result<StatusSnapshot, SourceError> {
            Err(SourceError::Timeout(Duration::from_secs(5)))
        }
    }

    #[test]
    fn test_registry_gathers_exporter() {
        let registry = Registry::new();
        let exporter = UpsExporter::new(FixedSource(StatusSnapshot {
            ups_name: "rack".to_string(),
            status: "ONBATT".to_string(),
            ..Default::default()
        }))
        .unwrap();
        registry.register(Box::new(exporter)).unwrap();

        let families = registry.gather();
        // Timestamps are absent from a default snapshot.
        assert_eq!(families.len(), Catalogue::new().definitions().len() - 3);

        let text = encode(&families).unwrap();
        assert!(text.contains("apcupsd_ups_load_percent{ups=\"rack\"} 0"));
        assert!(text.contains("apcupsd_ups_status{ups=\"rack\",status=\"ONBATT\"} 1"));
        assert!(text.contains("apcupsd_ups_status{ups=\"rack\",status=\"ONLINE\"} 0"));
    }

    #[test]
    fn test_registry_gathers_nothing_on_failure() {
        let registry = Registry::new();
        registry
            .register(Box::new(UpsExporter::new(FailingSource).unwrap()))
            .unwrap();

        assert!(registry.gather().is_empty());
    }

    #[test]
    fn test_exporter_cannot_be_registered_twice() {
        let registry = Registry::new();
        registry
            .register(Box::new(UpsExporter::new(FailingSource).unwrap()))
            .unwrap();

        assert!(registry
            .register(Box::new(UpsExporter::new(FailingSource).unwrap()))
            .is_err());
    }

    #[test]
    fn test_remove_textfile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apcupsd.prom");

        write_textfile(&path, "stale\n").unwrap();
        remove_textfile(&path).unwrap();
        assert!(!path.exists());

        // Already gone is fine.
        remove_textfile(&path).unwrap();
    }

    #[test]
    fn test_catalogue_is_valid_for_registry() {
        let catalogue = Catalogue::new();
        let descs = descs(&catalogue).unwrap();
        assert_eq!(descs.len(), catalogue.definitions().len());
        assert_eq!(descs[0].fq_name, "apcupsd_ups_load_percent");
    }

    #[test]
    fn test_families_group_by_definition() {
        let catalogue = Catalogue::new();
        let source = FixedSource(StatusSnapshot::default());
        let collection = UpsCollector::new(&catalogue, &source).collect();
        let families = families(collection.measurements());

        // Three timestamp definitions have no series for a default snapshot.
        assert_eq!(families.len(), catalogue.definitions().len() - 3);

        let status = families
            .iter()
            .find(|f| f.get_name() == "apcupsd_ups_status")
            .unwrap();
        assert_eq!(status.get_metric().len(), 13);
        assert_eq!(status.get_field_type(), MetricType::GAUGE);

        let transfers = families
            .iter()
            .find(|f| f.get_name() == "apcupsd_battery_number_transfers_total")
            .unwrap();
        assert_eq!(transfers.get_field_type(), MetricType::COUNTER);
    }

    #[test]
    fn test_render_text() {
        let catalogue = Catalogue::new();
        let source = FixedSource(StatusSnapshot {
            ups_name: "rack".to_string(),
            number_transfers: 2,
            ..Default::default()
        });
        let collection = UpsCollector::new(&catalogue, &source).collect();
        let text = render(collection.measurements()).unwrap();

        assert!(text.contains("# TYPE apcupsd_battery_number_transfers_total counter"));
        assert!(text.contains("apcupsd_battery_number_transfers_total{ups=\"rack\"} 2"));
        assert!(text.contains("apcupsd_ups_status{ups=\"rack\",status=\"ONLINE\"} 0"));
    }

    #[test]
    fn test_write_textfile_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apcupsd.prom");

        write_textfile(&path, "first\n").unwrap();
        write_textfile(&path, "second\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second\n");
        assert!(!dir.path().join("apcupsd.prom.tmp").exists());
    }
}
