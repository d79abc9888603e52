use std::{net::SocketAddr, path::Path, sync::Arc, time::Duration};

use arc_swap::ArcSwap;
use axum::{
    Router,
    extract::{ConnectInfo, Request},
    middleware,
};
use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use http::StatusCode;
use switchyard::{
    adapters::{
        FileConfigProvider, HttpClientAdapter, HttpHandler, InMemoryCounterStore,
        PropertiesRouteDefinitionLocator, RedisCounterStore, RouterDispatcher,
        request_span_middleware,
    },
    config::{GatewayConfigValidator, loader::load_config_unchecked, models::GatewayConfig},
    core::{
        DistributedRateLimiter, FactoryRegistry, GatewayHandler, RouteCompiler,
        RouteDefinitionRouteLocator, RouteTable, ServiceInstances,
        filters::{ProxyRoutingAction, global_filters, register_builtin_filters},
        predicates::register_builtin_predicates,
    },
    ports::{config_provider::ConfigProvider, counter_store::CounterStore, http_client::HttpClient},
    tracing_setup,
    utils::{GracefulShutdown, ShutdownReason},
};
use tower_http::trace::TraceLayer;
use tracing::Instrument;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "config.yaml")]
    config: String,

    /// Human-readable logs instead of JSON
    #[clap(long)]
    pretty: bool,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "config.yaml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "config.yaml")]
        config: String,
    },
    /// Start the gateway server (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "config.yaml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        Some(Commands::Validate { config }) => validate_config_command(&config).await,
        Some(Commands::Init { config }) => init_config_command(&config).await,
        Some(Commands::Serve { config }) => serve(&config, args.pretty).await,
        None => serve(&args.config, args.pretty).await,
    }
}

/// Everything a configuration reload swaps out.
struct Reloadable {
    config: Arc<ArcSwap<GatewayConfig>>,
    services: Arc<ArcSwap<ServiceInstances>>,
    route_locator: Arc<RouteDefinitionRouteLocator>,
    table: Arc<RouteTable>,
}

impl Reloadable {
    async fn apply(&self, config: GatewayConfig) {
        let services = ServiceInstances::new(&config.services, &config.load_balancer.strategy);
        self.route_locator
            .set_default_filters(config.default_filters.clone());
        self.services.store(Arc::new(services));
        self.config.store(Arc::new(config));

        let report = self.route_locator.refresh(&self.table).await;
        for rejected in &report.rejected {
            tracing::error!(route_id = rejected.route_id(), "Route not loaded: {}", rejected);
        }
        tracing::info!(
            routes = report.published,
            rejected = report.rejected.len(),
            "Route table published"
        );
    }
}

async fn build_counter_store(config: &GatewayConfig) -> Result<Arc<dyn CounterStore>> {
    match &config.rate_limiter.redis_url {
        Some(url) => {
            tracing::info!("Using Redis counter store at {}", url);
            let store = RedisCounterStore::connect(url)
                .await
                .wrap_err("Failed to connect the rate limiter counter store")?;
            Ok(Arc::new(store))
        }
        None => {
            tracing::info!("No redis_url configured; using the in-process counter store");
            Ok(Arc::new(InMemoryCounterStore::new()))
        }
    }
}

async fn serve(config_path: &str, pretty: bool) -> Result<()> {
    let provider = rustls::crypto::aws_lc_rs::default_provider();
    if let Err(e) = rustls::crypto::CryptoProvider::install_default(provider) {
        tracing::warn!(
            "CryptoProvider::install_default for aws-lc-rs reported an error: {:?}. \
            A provider was probably installed already.",
            e
        );
    }

    if pretty {
        tracing_setup::init_console_tracing()?;
    } else {
        tracing_setup::init_tracing()?;
    }

    tracing::info!("Loading initial configuration from {config_path}");
    let config_provider: Arc<dyn ConfigProvider> = Arc::new(
        FileConfigProvider::new(config_path).context("Failed to create config provider")?,
    );
    let initial_config = config_provider
        .load_config()
        .await
        .with_context(|| format!("Failed to load initial config from {config_path}"))?;

    let counter_store = build_counter_store(&initial_config).await?;
    let limiter = Arc::new(
        DistributedRateLimiter::new(counter_store)
            .with_failure_policy(initial_config.rate_limiter.failure_policy)
            .with_complete_on_cancel(initial_config.rate_limiter.complete_on_cancel),
    );
    let deny_status = StatusCode::from_u16(initial_config.rate_limiter.deny_status)
        .context("Invalid rate limiter deny_status")?;

    let mut registry = FactoryRegistry::new();
    register_builtin_predicates(&mut registry);
    register_builtin_filters(&mut registry, limiter, deny_status);
    let compiler = RouteCompiler::new(Arc::new(registry));

    let timeout = initial_config
        .http_client
        .timeout()
        .context("Invalid http_client timeout")?;
    let http_client: Arc<dyn HttpClient> =
        Arc::new(HttpClientAdapter::new(timeout).context("Failed to create HTTP client adapter")?);

    let listen_addr: SocketAddr = initial_config
        .listen_addr
        .parse()
        .context("Failed to parse listen address")?;
    let management_port = initial_config.management_port;

    let config_holder = Arc::new(ArcSwap::from_pointee(initial_config.clone()));
    let table = Arc::new(RouteTable::empty());
    let route_locator = Arc::new(RouteDefinitionRouteLocator::new(
        Arc::new(PropertiesRouteDefinitionLocator::new(config_holder.clone())),
        compiler,
        Vec::new(),
    ));
    let reloadable = Arc::new(Reloadable {
        config: config_holder,
        services: Arc::new(ArcSwap::from_pointee(ServiceInstances::default())),
        route_locator,
        table: table.clone(),
    });
    reloadable.apply(initial_config).await;

    // Config Watcher Task
    if let Some(mut notify_rx) = config_provider.watch() {
        let reloadable = reloadable.clone();
        let config_provider = config_provider.clone();
        let config_path = config_path.to_string();
        let debounce_duration = Duration::from_secs(2);
        let span = tracing_setup::configure_component_tracing("config_watcher");
        tokio::spawn(
            async move {
                tracing::info!("Config watcher task started.");
                while notify_rx.recv().await.is_some() {
                    // Let the editor finish writing, then coalesce the burst.
                    tokio::time::sleep(debounce_duration).await;
                    while notify_rx.try_recv().is_ok() {}

                    tracing::info!("Attempting to reload configuration from {}", config_path);
                    match config_provider.load_config().await {
                        Ok(new_config) => {
                            reloadable.apply(new_config).await;
                            tracing::info!("Configuration reloaded.");
                        }
                        Err(e) => {
                            tracing::error!(
                                "Failed to reload configuration: {:?}. Keeping old configuration.",
                                e
                            );
                        }
                    }
                }
                tracing::info!("Config watcher task is shutting down.");
            }
            .instrument(span),
        );
    }

    let graceful_shutdown = Arc::new(GracefulShutdown::new());
    let signal_handler_shutdown = graceful_shutdown.clone();
    tokio::spawn(async move {
        signal_handler_shutdown.run_signal_handler().await;
    });

    let dispatcher = Arc::new(RouterDispatcher::new(table.clone()));
    let gateway = Arc::new(
        GatewayHandler::new(
            table,
            global_filters(reloadable.services.clone(), dispatcher.clone()),
            Arc::new(ProxyRoutingAction::new(http_client)),
        )
        .with_management_port(management_port),
    );
    let http_handler = HttpHandler::new(gateway, graceful_shutdown.child_token());

    let app = Router::new()
        .fallback(
            move |ConnectInfo(client_addr): ConnectInfo<SocketAddr>, req: Request| {
                let handler = http_handler.clone();
                async move { handler.handle_request(req, Some(client_addr)).await }
            },
        )
        .layer(middleware::from_fn(request_span_middleware))
        .layer(TraceLayer::new_for_http());

    if let Some(port) = management_port {
        let management_addr = SocketAddr::new(listen_addr.ip(), port);
        let listener = tokio::net::TcpListener::bind(management_addr)
            .await
            .with_context(|| format!("Failed to bind management address {management_addr}"))?;
        let router = dispatcher.router();
        let shutdown = graceful_shutdown.clone();
        tracing::info!("Management endpoints listening on {}", management_addr);
        tokio::spawn(async move {
            let server = axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.initiated().await });
            if let Err(e) = server.await {
                tracing::error!("Management server error: {}", e);
            }
        });
    }

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .context("Failed to bind to address")?;
    tracing::info!("Switchyard gateway listening on {}", listen_addr);

    let shutdown = graceful_shutdown.clone();
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.initiated().await });
    let mut server_task = tokio::spawn(async move { server.await });

    tokio::select! {
        result = &mut server_task => {
            result.context("Server task panicked")?.context("Server error")?;
        }
        _ = graceful_shutdown.initiated() => {
            tracing::info!("Draining in-flight requests...");
            let reason = graceful_shutdown
                .drain(async {
                    match (&mut server_task).await {
                        Ok(Err(e)) => tracing::error!("Server error during shutdown: {}", e),
                        Err(e) => tracing::error!("Server task failed during shutdown: {}", e),
                        Ok(Ok(())) => {}
                    }
                })
                .await;
            if reason == ShutdownReason::Force {
                server_task.abort();
            }
            tracing::info!("Shutdown completed ({:?})", reason);
        }
    }

    Ok(())
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        return Err(eyre!("Configuration file '{config_path}' not found"));
    }

    let config = load_config_unchecked(config_path)
        .await
        .wrap_err("Configuration parsing failed")?;
    println!("✅ Configuration parsing: OK");

    match GatewayConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Listen Address: {}", config.listen_addr);
            println!("   • Routes: {}", config.routes.len());
            println!("   • Default Filters: {}", config.default_filters.len());
            println!("   • Services: {}", config.services.len());
            println!(
                "   • Rate Limiter Store: {}",
                if config.rate_limiter.redis_url.is_some() {
                    "redis"
                } else {
                    "in-memory"
                }
            );
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Give every route a unique id and at least one predicate");
            println!("   • Declare every lb:// service under `services`");
            println!("   • Verify listen address format (e.g., '127.0.0.1:8080')");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        return Err(eyre!("Configuration file '{config_path}' already exists"));
    }

    let default_config = r#"# Switchyard gateway configuration

listen_addr: "127.0.0.1:8080"
# management_port: 8081

routes:
  # Proxy /api/** to a single backend, dropping the /api prefix
  - id: api
    uri: http://localhost:3000
    predicates:
      - Path=/api/**
    filters:
      - RewritePath=/api/(?<rest>.*), /$\{rest}
      - AddRequestHeader=X-Gateway, switchyard

  # Load-balance across the instances of the `users` service
  - id: users
    uri: lb://users
    order: 1
    predicates:
      - Path=/users/**
      - Method=GET,POST
    filters:
      - name: RequestRateLimiter
        args:
          replenish_rate: 10
          burst_capacity: 20

  # Answer /gateway/health and /gateway/routes from the gateway itself
  - id: gateway
    uri: forward:/
    predicates:
      - Path=/gateway/**
    filters:
      - RewritePath=/gateway/(?<rest>.*), /$\{rest}

default_filters:
  - AddResponseHeader=X-Served-By, switchyard

services:
  users:
    - http://localhost:3001
    - http://localhost:3002

load_balancer:
  strategy: round_robin

rate_limiter:
  # redis_url: redis://127.0.0.1:6379
  failure_policy: fail_open
  deny_status: 429

http_client:
  timeout: 30s
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'switchyard serve --config {config_path}' to start the server");
    Ok(())
}
