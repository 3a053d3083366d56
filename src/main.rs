use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::info;

use hoval_gw::{
    init_logger, load_env_file, open_bus, Bridge, BusSource, LogPublisher, MqttPublisher,
    Publisher, Settings,
};

#[derive(Parser)]
#[command(name = "hoval-gw")]
#[command(about = "Gateway between the CAN bus of a Hoval heating system and MQTT")]
struct Cli {
    /// Debug output
    #[arg(short, long)]
    verbose: bool,

    /// Read CAN frames from a candump log instead of the interface
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Settings file
    #[arg(short, long)]
    settings: PathBuf,

    /// Environment file (defaults to .env when present)
    #[arg(short, long)]
    environment_file: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    load_env_file(cli.environment_file.as_deref()).context("loading environment file")?;
    let settings = Settings::load(&cli.settings)
        .with_context(|| format!("loading settings from {}", cli.settings.display()))?;

    let source = match cli.file {
        Some(path) => BusSource::Trace(path),
        None => BusSource::Interface(settings.can.interface.clone()),
    };
    let (sender, receiver) = open_bus(&source)
        .await
        .with_context(|| format!("opening {source:?}"))?;

    let registry = Arc::new(settings.registry);
    let (publisher, requests) = if settings.mqtt.enable {
        let (publisher, requests, _connection) =
            MqttPublisher::connect(&settings.mqtt).context("connecting to MQTT broker")?;
        (Arc::new(publisher) as Arc<dyn Publisher>, Some(requests))
    } else {
        info!("MQTT disabled, logging readings only");
        (Arc::new(LogPublisher) as Arc<dyn Publisher>, None)
    };

    let mut bridge = Bridge::new(
        registry,
        sender,
        receiver,
        publisher,
        settings.mqtt.topic.clone(),
        settings.bridge.clone(),
    )
    .with_periodic_polling(source.is_live());
    if let Some(requests) = requests {
        bridge = bridge.with_requests(requests);
    }

    bridge
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Cannot listen for interrupt: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await
        .context("bridge stopped")?;
    Ok(())
}
