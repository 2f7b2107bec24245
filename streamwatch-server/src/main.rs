use anyhow::Context;
use clap::Parser;
use dotenv::dotenv;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use streamwatch_core::Error;
use streamwatch_core::platforms::discord::spawn_reaction_listener;
use streamwatch_core::platforms::twitch_eventsub::webhook;
use streamwatch_core::tasks::subscription_sync::{spawn_subscription_sync_task, startup_sync};

mod config;
mod context;

use config::ServerConfig;
use context::ServerContext;

#[derive(Parser, Debug, Clone)]
#[command(name = "streamwatch")]
#[command(author, version, about = "StreamWatch - Twitch live alerts and managed roles for Discord")]
pub struct Args {
    /// Postgres connection URL.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Address the EventSub webhook listens on.
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: String,

    /// Public https base URL Twitch reaches the webhook through.
    #[arg(long, env = "TWITCH_CALLBACK_URL")]
    pub callback_url: Option<String>,

    #[arg(long, env = "TWITCH_WEBHOOK_PATH", default_value = "/twitchhook")]
    pub webhook_path: String,

    /// Shared secret for EventSub message signatures.
    #[arg(long, env = "TWITCH_WEBHOOK_SECRET", hide_env_values = true)]
    pub webhook_secret: Option<String>,

    #[arg(long, env = "TWITCH_CLIENT_ID")]
    pub twitch_client_id: Option<String>,

    #[arg(long, env = "TWITCH_CLIENT_SECRET", hide_env_values = true)]
    pub twitch_client_secret: Option<String>,

    #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true)]
    pub discord_token: Option<String>,

    /// User that passes every admin check.
    #[arg(long, env = "DEV_USER_ID")]
    pub dev_user_id: Option<String>,

    /// Concurrent role removals during a purge.
    #[arg(long, env = "PURGE_CONCURRENCY", default_value_t = 8)]
    pub purge_concurrency: usize,

    /// Seconds between periodic subscription resyncs.
    #[arg(long, env = "RESYNC_INTERVAL_SECS", default_value_t = 900)]
    pub resync_interval_secs: u64,
}

fn init_tracing() {
    let filter = EnvFilter::from_default_env()
        .add_directive("streamwatch=info".parse().unwrap_or_default());
    let sub = fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(sub)
        .expect("Failed to set global subscriber");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_tracing();
    let args = Args::parse();
    info!("StreamWatch starting. listen={}, path={}", args.listen_addr, args.webhook_path);

    if let Err(e) = run_server(args).await {
        error!("Server error: {:?}", e);
        return Err(e).context("streamwatch server stopped with an error");
    }
    info!("Main finished. Goodbye!");
    Ok(())
}

async fn run_server(args: Args) -> Result<(), Error> {
    let config = ServerConfig::from_args(&args)?;
    let ctx = ServerContext::new(config).await?;

    // Converge subscriptions and catch up on streams before accepting webhooks.
    if let Err(e) = startup_sync(ctx.registry.clone(), ctx.reconciler.clone(), ctx.dispatcher.clone()).await {
        warn!("Startup sync failed; the periodic resync retries: {}", e);
    }

    let sync_handle = spawn_subscription_sync_task(
        ctx.registry.clone(),
        ctx.reconciler.clone(),
        ctx.dispatcher.clone(),
        ctx.config.resync_interval,
    );

    let shard_handles = spawn_reaction_listener(
        &ctx.config.discord_token,
        ctx.discord.http(),
        ctx.rules.clone(),
    )
        .await?;

    let app = webhook::router(&ctx.config.webhook_path, ctx.webhook.clone());
    let listener = tokio::net::TcpListener::bind(ctx.config.listen_addr).await?;
    info!("EventSub webhook listening on {}{}", ctx.config.listen_addr, ctx.config.webhook_path);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {:?}", e);
            }
            info!("Ctrl-C detected; shutting down...");
        })
        .await?;

    sync_handle.abort();
    for handle in shard_handles {
        handle.abort();
    }
    ctx.db.pool().close().await;
    Ok(())
}
