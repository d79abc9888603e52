//! Ports: the traits the gateway core depends on. Adapters implement them.
pub mod config_provider;
pub mod counter_store;
pub mod http_client;
pub mod local_dispatcher;
pub mod route_definition_locator;
