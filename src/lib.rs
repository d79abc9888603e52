//! Switchyard - a route-driven API gateway core.
//!
//! Switchyard matches every incoming request against a table of compiled
//! routes, runs the matched route's filters together with the global filters,
//! and hands the request to a terminal action that proxies it upstream. The
//! crate follows a **hexagonal architecture**: `core` holds the routing and
//! filtering logic, `ports` declares the traits it depends on and `adapters`
//! implements them.
//!
//! # Features
//! - Declarative routes: predicates and filters named by factory, with
//!   compact `Name=arg1, arg2` shortcut text or expanded argument maps
//! - Built-in predicates: `Path`, `Host`, `Method`, `Header`, `After`,
//!   `Before`, `Between`
//! - Built-in filters: `RewritePath`, `PrefixPath`, `AddRequestHeader`,
//!   `AddResponseHeader`, `RedirectTo`, `RequestRateLimiter`
//! - Token-bucket rate limiting backed by Redis or an in-process store
//! - `lb://` routes resolved against named service instances
//! - `forward:` routes answered by in-process endpoints
//! - Atomic route table refresh on configuration reload
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use switchyard::{
//!     core::{FactoryRegistry, RouteCompiler, predicates::register_builtin_predicates},
//!     config::loader::load_config,
//! };
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let config = load_config("config.yaml").await?;
//! let mut registry = FactoryRegistry::new();
//! register_builtin_predicates(&mut registry);
//! let compiler = RouteCompiler::new(Arc::new(registry));
//! let compiled = compiler.compile_all(config.routes.clone(), &config.default_filters);
//! println!("{} routes compiled", compiled.routes.len());
//! # Ok(()) }
//! ```
//!
//! # Error Handling
//! Startup and configuration APIs return `eyre::Result<T>` with context
//! attached via `WrapErr`. The request path uses the typed
//! [`core::GatewayError`], which maps onto an HTTP status.
pub mod adapters;
pub mod config;
pub mod core;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub use crate::{
    adapters::{HttpClientAdapter, HttpHandler},
    core::{GatewayHandler, RouteTable},
    ports::http_client::HttpClient,
    utils::GracefulShutdown,
};
