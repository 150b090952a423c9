//! CLI streamrelay
//!
//! Подписка на канал с выводом конвертов в stdout и разовая публикация.
//! Внутрипроцессный бэкенд виден только в пределах одного процесса, поэтому
//! для обмена между процессами нужен бэкенд `postgres`.

use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use streamrelay::{init_logging, Publisher, Settings, Subscriber};
use tracing::info;

/// Аргументы командной строки.
#[derive(Parser)]
#[command(name = "streamrelay")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Filtered per-subscriber streams over a shared broadcast channel", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Путь к файлу конфигурации
    #[arg(
        short,
        long,
        global = true,
        env = "STREAMRELAY_CONFIG",
        help = "Путь к файлу конфигурации (TOML)"
    )]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Слушать канал и печатать совпавшие конверты как JSON-строки
    Listen {
        #[arg(long, help = "Имя канала")]
        channel: String,
        #[arg(long, help = "Идентификатор подписки")]
        subscription: String,
    },
    /// Опубликовать одно сообщение
    Publish {
        #[arg(long, help = "Имя канала")]
        channel: String,
        #[arg(long, help = "Идентификатор подписки")]
        subscription: String,
        /// Полезная нагрузка
        data: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("failed to load configuration")?;
    let logging = init_logging(&settings.logging)
        .map_err(|e| anyhow::anyhow!(e))
        .context("failed to initialize logging")?;

    let result = run(cli.command, &settings).await;
    logging.shutdown();
    result
}

async fn run(
    command: Command,
    settings: &Settings,
) -> Result<()> {
    let backend = settings
        .build_backend()
        .context("failed to build backend")?;

    match command {
        Command::Listen {
            channel,
            subscription,
        } => {
            let subscriber = Subscriber::with_config(
                Arc::clone(&backend),
                channel,
                subscription,
                settings.subscriber_config(),
            );
            listen(&subscriber).await
        }
        Command::Publish {
            channel,
            subscription,
            data,
        } => {
            let publisher = Publisher::new(settings.publisher_config());
            publisher.initialize(backend);
            if !publisher.publish(&channel, &subscription, &data).await? {
                bail!("message was not sent to channel '{channel}'");
            }
            info!(%channel, %subscription, "Message published");
            Ok(())
        }
    }
}

async fn listen(subscriber: &Subscriber) -> Result<()> {
    let mut stream = subscriber.stream()?;
    subscriber
        .start()
        .await
        .with_context(|| format!("failed to listen on '{}'", subscriber.channel()))?;

    let outcome = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, closing subscriber");
                break Ok(());
            }
            item = stream.next() => match item {
                Some(Ok(envelope)) => println!("{}", envelope.to_json()?),
                Some(Err(err)) => break Err(anyhow::Error::new(err).context("listening failed")),
                None => break Ok(()),
            },
        }
    };

    subscriber.close().await?;
    outcome
}
