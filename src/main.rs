#[macro_use]
extern crate diesel;
#[macro_use]
extern crate diesel_migrations;

mod audio_urls;
mod clients;
mod configuration;
mod connection_pool;
mod controllers;
mod honeycomb;
mod models;
mod music;
mod rate_limit;
mod repository;
mod schema;
mod storage;
mod util;

use std::sync::Arc;

use anyhow::Context as _;
use diesel::{Connection, PgConnection};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

use clients::google_tts::{GoogleTts, SpeechSynthesizer};
use clients::openai::{AffirmationWriter, OpenAiWriter};
use configuration::Configuration;
use controllers::Context;

embed_migrations!();

fn init_tracing(config: &Configuration) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());
    match &config.honeycomb {
        Some(honeycomb) => {
            let tracer = honeycomb::get_honeycomb_tracer(honeycomb)?;
            let telemetry = tracing_opentelemetry::layer().with_tracer(tracer);
            tracing::subscriber::set_global_default(subscriber.with(telemetry))?;
        }
        None => tracing::subscriber::set_global_default(subscriber)?,
    }
    Ok(())
}

fn run_migrations(config: &Configuration) -> anyhow::Result<()> {
    let conn = PgConnection::establish(config.database_url.expose())
        .context("Failed to connect to the database for migrations")?;
    embedded_migrations::run(&conn).context("Failed to run database migrations")?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let config = Configuration::from_env()?;
    init_tracing(&config)?;

    run_migrations(&config)?;
    info!("Database migrations are up to date.");

    let pool = connection_pool::establish_connection_pool(config.database_url.clone());
    let blobs = storage::S3BlobStore::new(&config.storage)?;
    let writer = config
        .openai
        .as_ref()
        .map(|x| Arc::new(OpenAiWriter::new(x)) as Arc<dyn AffirmationWriter>);
    if writer.is_none() {
        warn!("OPENAI_API_KEY is not set, affirmation generation is disabled.");
    }
    let speech = config
        .speech
        .as_ref()
        .map(|x| Arc::new(GoogleTts::new(x)) as Arc<dyn SpeechSynthesizer>);
    if speech.is_none() {
        warn!("GOOGLE_CLOUD_API_KEY is not set, narration is disabled.");
    }

    let ctx = Context {
        repository: Arc::new(repository::PgRepository::new(pool)),
        blobs: Arc::new(blobs),
        writer,
        speech,
        max_upload_bytes: config.max_upload_bytes,
    };
    info!(address = %config.bind_address, "Starting server.");
    controllers::get_server_future(ctx, config.bind_address, config.rate_limit_per_second).await;
    Ok(())
}
