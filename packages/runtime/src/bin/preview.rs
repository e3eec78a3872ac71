use anyhow::Context;
use clap::Parser;
use folio_engine::{InputSnapshot, Navigate, SessionOutput};
use folio_runtime::sim::{self, Arrival, SimulatedGenerator};
use folio_runtime::{PreviewConfig, PreviewDriver};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Folio preview - run the preview engine against a simulated generator
#[derive(Parser, Debug)]
#[command(name = "folio-preview")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory containing folio.config.json
    #[arg(short, long, default_value = ".")]
    dir: PathBuf,

    /// Selected item ids
    #[arg(short, long, value_delimiter = ',', default_value = "P-100,P-200")]
    items: Vec<String>,

    /// Number of template pages the generator produces
    #[arg(long, default_value_t = 2)]
    templates: u32,

    /// Deliver pages out of order
    #[arg(long)]
    shuffle: bool,

    /// Print updates as JSON lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = PreviewConfig::load(&cli.dir)
        .with_context(|| format!("Failed to load config from {}", cli.dir.display()))?;

    let (frames, stream) = sim::channel(config.event_buffer);
    let generator = SimulatedGenerator::builder(frames)
        .template_pages(cli.templates)
        .arrival(if cli.shuffle { Arrival::Interleaved } else { Arrival::InOrder })
        .build();

    let (handle, driver) =
        PreviewDriver::spawn(&config, generator.clone(), generator.clone(), stream);

    let mut updates = handle.subscribe();
    let json = cli.json;
    let printer = tokio::spawn(async move {
        while let Ok(update) = updates.recv().await {
            if json {
                match update.to_json() {
                    Ok(line) => println!("{}", line),
                    Err(e) => tracing::error!("Failed to encode update: {}", e),
                }
                continue;
            }
            match &update.output {
                SessionOutput::CurrentPageChanged(view) => {
                    info!(state = ?view.state, "Viewport: {}", view)
                }
                SessionOutput::StalenessChanged(stale) => info!(stale, "Preview staleness"),
                SessionOutput::Countdown { remaining_secs } => {
                    info!("Regenerating in {}s", remaining_secs)
                }
                SessionOutput::Progress(progress) if !progress.is_hidden() => {
                    info!(percent = progress.percent, "{}", progress.message)
                }
                SessionOutput::Notification { level, message } => {
                    info!(?level, "{}", message)
                }
                SessionOutput::Regenerate(request) => {
                    info!(epoch = %request.epoch, forced = request.forced, "Regeneration requested")
                }
                _ => {}
            }
        }
    });

    let initial = InputSnapshot::new()
        .with_field("customer", "ACME Corp")
        .with_items(cli.items.clone());
    handle.start(initial).await?;
    tokio::time::sleep(Duration::from_secs(3)).await;

    // Burst of edits: one regeneration after the quiet period
    for name in ["A", "AC", "ACM", "ACME Ltd"] {
        handle.edit("customer", name).await?;
        tokio::time::sleep(Duration::from_millis(300)).await;
    }
    tokio::time::sleep(config.session_options().quiescence + Duration::from_secs(3)).await;

    handle.navigate(Navigate::Last).await?;
    handle.navigate(Navigate::Prev).await?;
    tokio::time::sleep(Duration::from_millis(500)).await;

    info!(
        regenerations = generator.regeneration_count(),
        "Demo finished"
    );
    handle.shutdown().await?;
    driver.await?;
    printer.abort();

    Ok(())
}
