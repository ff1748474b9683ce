use std::{process::exit, thread, time};

use anyhow::Context;
use apcupsd_exporter::{exposition, Catalogue, CommandSource, Settings, UpsExporter};
use clap::Parser;
use prometheus::Registry;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Path to the exporter configuration file.
    #[clap(short, long, default_value = "apcupsd_exporter.toml")]
    config: String,

    /// Collect once, write the metrics and exit.
    #[clap(long)]
    once: bool,

    /// List the exported metric definitions and exit.
    #[clap(long)]
    print_schema: bool,
}

fn registry(settings: &Settings) -> anyhow::Result<Registry> {
    let source = CommandSource::new(&settings.apcaccess, &settings.address, settings.timeout());
    let exporter = UpsExporter::new(source).context("invalid metric definitions")?;

    let registry = Registry::new();
    registry
        .register(Box::new(exporter))
        .context("failed to register ups collector")?;
    Ok(registry)
}

// Runs one collection cycle and writes its result. Returns whether the UPS
// status could be read.
fn run_cycle(registry: &Registry, settings: &Settings) -> anyhow::Result<bool> {
    let families = registry.gather();

    // A failed cycle gathers nothing. Drop the previous output so that no
    // series from an earlier cycle is served as current.
    if families.is_empty() {
        if let Some(path) = &settings.textfile {
            exposition::remove_textfile(path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
        }
        return Ok(false);
    }

    let text = exposition::encode(&families).context("failed to encode metrics")?;
    match &settings.textfile {
        Some(path) => exposition::write_textfile(path, &text)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => print!("{}", text),
    }

    Ok(true)
}

fn print_schema(catalogue: &Catalogue) -> anyhow::Result<()> {
    exposition::descs(catalogue).context("invalid metric definitions")?;
    for d in catalogue.definitions() {
        println!("{} {:?} [{}] {}", d.name(), d.kind(), d.labels().join(","), d.help());
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if args.print_schema {
        return print_schema(&Catalogue::new());
    }

    let settings = Settings::load(&args.config).context("failed to read exporter config")?;
    tracing::debug!(?settings, "loaded settings");

    let registry = registry(&settings)?;

    if args.once {
        if !run_cycle(&registry, &settings)? {
            exit(1);
        }
        return Ok(());
    }

    tracing::info!(
        address = %settings.address,
        poll_delay = settings.poll_delay,
        "apcupsd exporter running"
    );

    let mut poll_delay: u64;
    loop {
        match run_cycle(&registry, &settings) {
            Ok(true) => poll_delay = settings.poll_delay,
            Ok(false) => {
                tracing::warn!(
                    "UPS communication failed - retrying in {}s.",
                    settings.communication_failed_poll_delay
                );
                poll_delay = settings.communication_failed_poll_delay;
            }
            Err(e) => {
                tracing::error!(
                    "Writing metrics failed - retrying in {}s: {:#}",
                    settings.communication_failed_poll_delay,
                    e
                );
                poll_delay = settings.communication_failed_poll_delay;
            }
        }

        thread::sleep(time::Duration::from_secs(poll_delay));
    }
}
