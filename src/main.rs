use std::sync::Arc;

use serenity::all::Interaction;
use serenity::async_trait;
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::prelude::*;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;
mod db;
mod commands;
mod models;
mod services;
mod utils;

use config::Config;
use services::dialogue_service::DialogueController;
use services::ledger_service::LedgerStore;

struct Handler;

struct Dialogue;

impl TypeMapKey for Dialogue {
    type Value = Arc<DialogueController>;
}

#[async_trait]
impl EventHandler for Handler {
    async fn message(&self, ctx: Context, msg: Message) {
        commands::handle_message(&ctx, &msg).await;
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Component(component) = interaction {
            commands::handle_component(&ctx, &component).await;
        }
    }

    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("{} is connected and listening for direct messages", ready.user.name);
    }
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    // Initialize tracing
    let filter = EnvFilter::from_default_env()
        .add_directive("tabkeeper=debug".parse().expect("static directive"))
        .add_directive("serenity=warn".parse().expect("static directive"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!("🦆 Starting tabkeeper...");

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return;
        }
    };

    // Initialize database
    info!("Initializing database...");
    let pool = match db::init_db(&config.database_url, config.db_max_connections).await {
        Ok(p) => {
            info!("Database initialized successfully");
            p
        }
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            return;
        }
    };

    let controller = Arc::new(DialogueController::new(LedgerStore::new(pool), config.history_limit));

    let intents = GatewayIntents::DIRECT_MESSAGES | GatewayIntents::MESSAGE_CONTENT;

    let mut client = match Client::builder(&config.discord_token, intents)
        .event_handler(Handler)
        .await
    {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to create client: {}", e);
            return;
        }
    };

    {
        let mut data = client.data.write().await;
        data.insert::<Dialogue>(controller);
    }

    if let Err(e) = client.start().await {
        error!("Client error: {}", e);
    }
}
