use std::{path::PathBuf, sync::Arc};

use avp_pipeline::{
    Config, ElementRegistry, Error, Pipeline, Publisher,
    element::registry::TYPE_RECORDER,
    packet_log::{PacketLogFile, PacketLogWriter},
    publisher::ChannelPublisher,
};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "avp-node", about = "SFU audio/video processing node")]
struct Cli {
    /// JSON configuration file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a persisted packet log through a pipeline
    Replay {
        log: PathBuf,
        /// Pipeline id, also names the recorder output
        #[arg(long, default_value = "replay")]
        id: String,
        /// Element types to attach
        #[arg(long = "element", default_values_t = [TYPE_RECORDER.to_string()])]
        elements: Vec<String>,
    },
    /// List the registered element types
    Elements,
}

fn init_logging() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .filter_module("avp_pipeline", log::LevelFilter::Debug)
        .parse_default_env()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    let config = Arc::new(config);
    let registry = ElementRegistry::with_defaults();

    match cli.command {
        Command::Replay { log, id, elements } => {
            replay(config, &registry, log, &id, &elements).await
        }
        Command::Elements => {
            for element_type in registry.types() {
                println!("{}", element_type);
            }
            Ok(())
        }
    }
}

async fn replay(
    config: Arc<Config>,
    registry: &ElementRegistry,
    log_path: PathBuf,
    id: &str,
    elements: &[String],
) -> anyhow::Result<()> {
    let mut input = PacketLogFile::open(&log_path).await?;

    // with packet logging on, the replayed stream is re-logged on its way in
    if config.packet_log.on && input.is_written_by(&config.packet_log).await {
        anyhow::bail!(
            "packet log output {} is the replay input, change packet_log.id or packet_log.out_dir",
            config.packet_log.path().display()
        );
    }
    let writer = if config.packet_log.on {
        Some(Arc::new(PacketLogWriter::create(&config.packet_log).await?))
    } else {
        None
    };
    let (publisher, tx) = match &writer {
        Some(writer) => (Box::new(writer.reader()) as Box<dyn Publisher>, None),
        None => {
            let (tx, publisher) = ChannelPublisher::channel(256);
            (Box::new(publisher) as Box<dyn Publisher>, Some(tx))
        }
    };

    let pipeline = Pipeline::new(id, publisher, Arc::clone(&config)).await?;
    for element_type in elements {
        if pipeline.get_element(element_type).await.is_some() {
            continue;
        }
        if let Err(e) = pipeline.add_registered(registry, element_type).await {
            pipeline.close().await;
            return Err(e.into());
        }
    }

    let cancel = CancellationToken::new();
    let feeder = {
        let cancel = cancel.clone();
        let writer = writer.clone();
        tokio::spawn(async move {
            let result: anyhow::Result<u64> = async {
                loop {
                    let packet = tokio::select! {
                        _ = cancel.cancelled() => break,
                        packet = input.next_packet() => packet?,
                    };
                    let Some(packet) = packet else {
                        break;
                    };
                    // the pipeline closing its publisher ends the replay
                    match (&writer, &tx) {
                        (Some(writer), _) => match writer.write(packet).await {
                            Ok(()) => {}
                            Err(Error::Closed) => break,
                            Err(e) => return Err(e.into()),
                        },
                        (None, Some(tx)) => {
                            if tx.send(packet).await.is_err() {
                                break;
                            }
                        }
                        (None, None) => break,
                    }
                }
                Ok(input.records())
            }
            .await;
            if let Some(writer) = &writer {
                writer.stop().await;
            }
            drop(tx);
            result
        })
    };

    tokio::select! {
        _ = pipeline.wait_drained() => {
            log::info!("replay {}: input drained", log_path.display());
        },
        _ = tokio::signal::ctrl_c() => {
            log::info!("ctrl+c received");
            cancel.cancel();
        },
    }

    for element_type in pipeline.element_ids().await {
        if let Some(stats) = pipeline.element_stats(&element_type).await {
            log::info!("element {}: {:?}", element_type, stats);
        }
    }
    pipeline.close().await;
    cancel.cancel();

    let records = feeder.await??;
    log::info!("replayed {} records from {}", records, log_path.display());
    Ok(())
}
