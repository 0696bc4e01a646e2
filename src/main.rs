#[macro_use]
extern crate diesel;

use std::{sync::Arc, time::Duration};

use chrono::Local;
use clap::Parser;
use serenity::{model::prelude::ChannelId, prelude::*};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod bot;
mod config;
mod error;
mod extensions;
mod leet;
mod messages;
mod models;
mod schema;
mod store;

use bot::Bot;
use leet::{
    clock::Clock,
    reactions::{ReactionQueue, Reconciler},
    scheduler::Scheduler,
    LeetOClock,
};
use store::Store;

/// Pending reaction calls before scoring messages start waiting on the worker
const REACTION_QUEUE_SIZE: usize = 256;

#[derive(Parser, Debug)]
#[command(version, about = "Leet o'Clock discord bot")]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

fn fatal(what: &str, e: impl std::fmt::Display) -> ! {
    tracing::error!("{what}: {e}");
    eprintln!("{what}: {e}");
    std::process::exit(1)
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match config::load_config(&args.config) {
        Ok(config) => config,
        Err(e) => fatal(&format!("Failed to load {}", args.config), e),
    };

    // Install tracing, with a Jaeger sink when configured
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let jaeger = config.tracing_config.as_ref().and_then(|t| t.jaeger.as_deref());
    let registry =
        tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer());
    match jaeger {
        Some(endpoint) => {
            let tracer = opentelemetry_jaeger::new_agent_pipeline()
                .with_endpoint(endpoint)
                .with_service_name(env!("CARGO_PKG_NAME"))
                .install_simple()
                .unwrap_or_else(|e| fatal("Failed to install jaeger tracing", e));
            registry.with(tracing_opentelemetry::layer().with_tracer(tracer)).init();
            tracing::info!("Installed jaeger tracing");
        }
        None => registry.init(),
    }

    let leet_config = config.leet_config;
    let clock = if leet_config.debug {
        let clock = Clock::one_minute_after(&Local::now());
        tracing::debug!("Debug mode, target moved to {:02}:{:02}", clock.hour(), clock.minute());
        clock
    } else {
        Clock::new(leet_config.target_hour, leet_config.target_minute).unwrap_or_else(|| {
            fatal(
                "Invalid target time",
                format!("{}:{}", leet_config.target_hour, leet_config.target_minute),
            )
        })
    };

    // Open the database
    tracing::info!("Opening {}...", config.db_config.database_path);
    let store = match Store::open(&config.db_config.database_path) {
        Ok(store) => Arc::new(store),
        Err(e) => fatal("Failed to open database", e),
    };

    // Create client instance
    tracing::info!("Connecting to discord...");
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES;
    let (queue, reactions) = ReactionQueue::new(REACTION_QUEUE_SIZE);
    let (target_tx, target_rx) = watch::channel(clock.target_on(&Local::now()));
    let leet = Arc::new(LeetOClock::new(
        store,
        Reconciler::new(leet_config.emojis.clone(), queue),
        target_rx,
    ));

    let mut client = match Client::builder(&config.auth.token, intents)
        .event_handler(Bot { leet: leet.clone() })
        .await
    {
        Ok(client) => client,
        Err(e) => fatal("Failed to create discord client", e),
    };

    let _reactions = reactions.spawn(client.http.clone());

    let idle_poll = Duration::from_secs(if leet_config.debug { 1 } else { 60 });
    let channels = leet_config.channels().into_iter().map(ChannelId::new).collect();
    let http = client.http.clone();
    let scheduler = Scheduler::new(leet, http, clock, target_tx, channels, idle_poll);
    tokio::spawn(scheduler.run());

    tracing::info!("Running app...");
    if let Err(e) = client.start().await {
        tracing::error!("Client error: {e}");
    }
    opentelemetry::global::shutdown_tracer_provider();
}
