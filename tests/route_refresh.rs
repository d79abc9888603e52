// Route table refresh driven by configuration files on disk.
use std::{fs, path::Path, sync::Arc};

use arc_swap::ArcSwap;
use switchyard::{
    adapters::PropertiesRouteDefinitionLocator,
    config::loader::load_config,
    core::{
        FactoryRegistry, RouteCompiler, RouteDefinitionRouteLocator, RouteTable,
        predicates::register_builtin_predicates,
    },
};
use tempfile::tempdir;

fn route_ids(table: &RouteTable) -> Vec<String> {
    table
        .snapshot()
        .routes()
        .iter()
        .map(|r| r.id().to_string())
        .collect()
}

fn write(path: &Path, contents: &str) {
    fs::write(path, contents).unwrap();
}

const INITIAL: &str = r#"
listen_addr: "127.0.0.1:8080"
routes:
  - id: orders
    uri: http://orders:8080
    order: 2
    predicates:
      - Path=/orders/**
  - id: users
    uri: http://users:8080
    order: 1
    predicates:
      - name: Path
        args:
          patterns: /users/**
"#;

const UPDATED: &str = r#"
listen_addr: "127.0.0.1:8080"
routes:
  - id: users
    uri: http://users:8080
    predicates:
      - Path=/users/**
  - id: typo
    uri: http://typo:8080
    predicates:
      - Pth=/typo/**
  - id: billing
    uri: http://billing:8080
    order: -1
    predicates:
      - Path=/billing/**
"#;

// Missing predicates fails validation as a whole.
const INVALID: &str = r#"
listen_addr: "127.0.0.1:8080"
routes:
  - id: broken
    uri: http://broken:8080
"#;

async fn reload(
    path: &Path,
    config: &ArcSwap<switchyard::config::models::GatewayConfig>,
    route_locator: &RouteDefinitionRouteLocator,
    table: &RouteTable,
) -> eyre::Result<usize> {
    let loaded = load_config(path.to_str().unwrap()).await?;
    config.store(Arc::new(loaded));
    let report = route_locator.refresh(table).await;
    Ok(report.rejected.len())
}

#[tokio::test]
async fn test_reload_replaces_routes_and_skips_bad_definitions() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("gateway.yaml");
    write(&path, INITIAL);

    let config = Arc::new(ArcSwap::from_pointee(load_config(path.to_str().unwrap()).await.unwrap()));
    let mut registry = FactoryRegistry::new();
    register_builtin_predicates(&mut registry);
    let route_locator = RouteDefinitionRouteLocator::new(
        Arc::new(PropertiesRouteDefinitionLocator::new(config.clone())),
        RouteCompiler::new(Arc::new(registry)),
        Vec::new(),
    );
    let table = RouteTable::empty();

    let rejected = reload(&path, &config, &route_locator, &table).await.unwrap();
    assert_eq!(rejected, 0);
    assert_eq!(route_ids(&table), vec!["users", "orders"]);
    let before = table.snapshot();

    write(&path, UPDATED);
    let rejected = reload(&path, &config, &route_locator, &table).await.unwrap();
    assert_eq!(rejected, 1);
    assert_eq!(route_ids(&table), vec!["billing", "users"]);

    // Snapshots taken earlier are unaffected by the swap.
    assert_eq!(before.len(), 2);
    assert!(before.get("orders").is_some());

    write(&path, INVALID);
    assert!(reload(&path, &config, &route_locator, &table).await.is_err());
    assert_eq!(route_ids(&table), vec!["billing", "users"]);
}
