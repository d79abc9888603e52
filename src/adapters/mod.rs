pub mod config_providers;
pub mod http_client;
pub mod http_handler;
pub mod local_dispatcher;
pub mod memory_store;
pub mod middleware;
pub mod redis_store;
pub mod route_locators;

/// Re-export commonly used types from adapters
pub use config_providers::FileConfigProvider;
pub use http_client::HttpClientAdapter;
pub use http_handler::HttpHandler;
pub use local_dispatcher::RouterDispatcher;
pub use memory_store::InMemoryCounterStore;
pub use middleware::*;
pub use redis_store::RedisCounterStore;
pub use route_locators::{
    CompositeRouteDefinitionLocator, InMemoryRouteDefinitionLocator,
    PropertiesRouteDefinitionLocator,
};
