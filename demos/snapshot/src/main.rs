//! Connects to a telescope, takes a single snapshot and writes it to disk.

use clap::Parser;
use eyre::{Context, ContextCompat};
use origin_alpaca::{Event, OriginClient, OriginConfig};
use std::path::PathBuf;
use std::time::Duration;

/// Take one snapshot with a Celestron Origin and save it.
#[derive(Debug, Parser)]
struct Args {
    /// Telescope host name or IP address.
    host: String,
    /// Control channel port.
    #[arg(long, default_value_t = 80)]
    port: u16,
    /// Exposure, seconds.
    #[arg(long, default_value_t = 1.0)]
    exposure: f64,
    /// ISO.
    #[arg(long, default_value_t = 200)]
    iso: i64,
    /// Where to write the image.
    #[arg(long, short, default_value = "snapshot.tiff")]
    output: PathBuf,
    /// Also keep the session journal and every downloaded image under this
    /// directory.
    #[arg(long)]
    keep: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let mut config = OriginConfig::default();
    if let Some(root) = &args.keep {
        config = config.with_output_root(root);
    }

    let client = OriginClient::spawn(config);
    let mut events = client.subscribe();
    client
        .connect(&args.host, args.port)
        .await
        .with_context(|| format!("Couldn't connect to {}:{}", args.host, args.port))?;

    client.take_snapshot(args.exposure, args.iso).await?;
    tracing::info!(exposure = args.exposure, iso = args.iso, "Snapshot requested");

    let deadline = Duration::from_secs_f64(args.exposure) + Duration::from_secs(60);
    let image = tokio::time::timeout(deadline, async {
        loop {
            match events.recv().await? {
                Event::SnapshotDownloaded(image) => return Ok::<_, eyre::Report>(Some(image)),
                Event::Disconnected => return Ok(None),
                Event::CommandFailed { command, error, .. } => {
                    tracing::warn!(%command, %error, "Telescope reported an error");
                }
                _ => {}
            }
        }
    })
    .await
    .context("Timed out waiting for the snapshot")??
    .context("Telescope disconnected before the snapshot arrived")?;

    std::fs::write(&args.output, &image.data)
        .with_context(|| format!("Couldn't write {}", args.output.display()))?;
    tracing::info!(
        path = %args.output.display(),
        remote = %image.remote_path,
        bytes = image.data.len(),
        "Snapshot saved"
    );

    client.disconnect()?;
    Ok(())
}
