use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use pulse::{
    actors::PulseHandle,
    alerts::{
        AlertEngine, ChannelDispatcher, SqliteAlertRepository, UiChannel,
        channels::{DiscordChannel, EmailChannel, WebhookChannel, WhatsappChannel},
    },
    api::{ApiConfig, ApiState, spawn_api_server},
    config::{PulseConfig, load},
    health::HealthAggregator,
    metrics::MetricCollector,
    probes::{
        CacheProbe, DatabaseProbe, GatewayProbe, LlmProviderProbe, ProbeRegistry, QueueProbe,
    },
    service::PulseService,
    storage::{RedisBackend, TimeSeriesBackend, TimeSeriesStorage},
};
use redis::aio::ConnectionManager;
use tracing::{info, instrument, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file (JSON); built-in defaults when omitted
    #[arg(short)]
    file: Option<String>,

    /// Log level for pulse targets
    #[arg(long, default_value = "trace")]
    log_level: LevelFilter,
}

fn init(level: LevelFilter) {
    let filter = filter::Targets::new().with_targets(vec![("pulse", level)]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init(args.log_level);
    trace!("started with args: {args:?}");

    let config = load(args.file.as_deref())?;

    let redis = connect_redis(&config).await;
    let durable = redis
        .clone()
        .map(|manager| Arc::new(RedisBackend::from_manager(manager)) as Arc<dyn TimeSeriesBackend>);
    let storage = Arc::new(TimeSeriesStorage::new(durable));

    let repository = Arc::new(SqliteAlertRepository::new(&config.storage.database_path).await?);
    let collector = Arc::new(MetricCollector::new());
    let http = reqwest::Client::new();

    let probes = Arc::new(build_probes(&config, &repository, redis.as_ref(), &http));
    let aggregator = Arc::new(HealthAggregator::new(
        collector.clone(),
        storage.clone(),
        probes.clone(),
        config.modules.clone(),
    ));
    let engine = Arc::new(AlertEngine::new(
        repository,
        build_dispatcher(&config, &http),
    ));

    let service = Arc::new(PulseService::new(
        collector, storage, probes, aggregator, engine,
    ));

    let scheduler = PulseHandle::spawn(
        service.clone(),
        Duration::from_secs(config.scheduler.interval_secs.max(1)),
    );

    let addr = spawn_api_server(ApiConfig::from(config.api.clone()), ApiState::new(service)).await?;
    info!("pulse running, API on http://{addr}/pulse");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    scheduler.shutdown().await?;

    Ok(())
}

#[instrument(skip_all)]
async fn connect_redis(config: &PulseConfig) -> Option<ConnectionManager> {
    let url = config.storage.redis_url.as_deref()?;
    let connected = match RedisBackend::new(url).await {
        Ok(backend) => backend.ping().await.map(|()| backend),
        Err(e) => Err(e),
    };

    match connected {
        Ok(backend) => {
            info!("using redis time-series backend");
            Some(backend.manager())
        }
        Err(e) => {
            warn!("redis unavailable, continuing with in-memory storage: {e}");
            None
        }
    }
}

fn build_probes(
    config: &PulseConfig,
    repository: &SqliteAlertRepository,
    redis: Option<&ConnectionManager>,
    http: &reqwest::Client,
) -> ProbeRegistry {
    let probes = &config.probes;
    let mut registry = ProbeRegistry::new().with_timeouts(
        Duration::from_millis(probes.shallow_timeout_ms),
        Duration::from_millis(probes.deep_timeout_ms),
    );

    let pool = Arc::new(repository.pool().clone());
    registry.register(Arc::new(DatabaseProbe::shallow(pool.clone())));
    registry.register(Arc::new(DatabaseProbe::deep(pool)));

    match redis {
        Some(manager) => {
            let manager = Arc::new(manager.clone());
            registry.register(Arc::new(CacheProbe::shallow(manager.clone())));
            registry.register(Arc::new(CacheProbe::deep(manager.clone())));
            for deep in [false, true] {
                registry.register(Arc::new(QueueProbe::new(
                    manager.clone(),
                    probes.queues.clone(),
                    probes.max_queue_depth,
                    deep,
                )));
            }
        }
        None => info!("no redis connection, cache and queue probes disabled"),
    }

    for provider in &probes.llm_providers {
        for deep in [false, true] {
            registry.register(Arc::new(LlmProviderProbe::new(
                provider.clone(),
                http.clone(),
                deep,
            )));
        }
    }

    for deep in [false, true] {
        registry.register(Arc::new(GatewayProbe::new(
            probes.gateway.base_url.clone(),
            probes.gateway.token.clone(),
            http.clone(),
            deep,
        )));
    }

    info!("registered {} probes", registry.len());
    registry
}

fn build_dispatcher(config: &PulseConfig, http: &reqwest::Client) -> ChannelDispatcher {
    let (ui, _) = UiChannel::new(64);
    let mut dispatcher = ChannelDispatcher::new().with_channel(Arc::new(ui));

    if let Some(smtp) = &config.channels.smtp {
        match EmailChannel::new(smtp) {
            Ok(email) => dispatcher.register(Arc::new(email)),
            Err(e) => warn!("email channel disabled: {e:#}"),
        }
    }
    if let Some(base_url) = &config.probes.gateway.base_url {
        dispatcher.register(Arc::new(WhatsappChannel::new(
            http.clone(),
            base_url.clone(),
            config.probes.gateway.token.clone(),
        )));
    }
    if let Some(webhook) = &config.channels.webhook {
        dispatcher.register(Arc::new(WebhookChannel::new(http.clone(), webhook.url.clone())));
    }
    if let Some(discord) = &config.channels.discord {
        dispatcher.register(Arc::new(DiscordChannel::new(
            http.clone(),
            discord.url.clone(),
            discord.user_id.clone(),
        )));
    }

    dispatcher
}
