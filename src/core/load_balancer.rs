use std::{
    collections::HashMap,
    sync::atomic::{AtomicUsize, Ordering},
};

use rand::Rng;
use url::Url;

use crate::config::models::LoadBalanceStrategy;

/// Trait defining the interface for load balancing strategies
pub trait LoadBalancingStrategy: Send + Sync + 'static {
    /// Select an instance from a list of service instances
    fn select_target(&self, targets: &[Url]) -> Option<Url>;
    /// Create a new instance of this strategy as a boxed trait object
    fn boxed(self) -> Box<dyn LoadBalancingStrategy>
    where
        Self: Sized,
    {
        Box::new(self)
    }
}

/// Round-robin load balancing strategy
pub struct RoundRobinStrategy {
    counter: AtomicUsize,
}

impl Default for RoundRobinStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl RoundRobinStrategy {
    /// Create a new round-robin strategy
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }
}

impl LoadBalancingStrategy for RoundRobinStrategy {
    fn select_target(&self, targets: &[Url]) -> Option<Url> {
        if targets.is_empty() {
            return None;
        }
        let count = self.counter.fetch_add(1, Ordering::Relaxed);
        Some(targets[count % targets.len()].clone())
    }
}

/// Random selection load balancing strategy
#[derive(Default)]
pub struct RandomStrategy;

impl LoadBalancingStrategy for RandomStrategy {
    fn select_target(&self, targets: &[Url]) -> Option<Url> {
        if targets.is_empty() {
            return None;
        }
        let index = rand::rng().random_range(0..targets.len());
        Some(targets[index].clone())
    }
}

/// Factory for creating load balancing strategies from configuration
pub struct LoadBalancerFactory;

impl LoadBalancerFactory {
    pub fn create_strategy(strategy: &LoadBalanceStrategy) -> Box<dyn LoadBalancingStrategy> {
        match strategy {
            LoadBalanceStrategy::RoundRobin => RoundRobinStrategy::new().boxed(),
            LoadBalanceStrategy::Random => RandomStrategy.boxed(),
        }
    }
}

struct Service {
    instances: Vec<Url>,
    strategy: Box<dyn LoadBalancingStrategy>,
}

/// Statically configured service instances for `lb://` targets.
///
/// Each service gets its own strategy instance so round-robin state is not
/// shared between services.
#[derive(Default)]
pub struct ServiceInstances {
    services: HashMap<String, Service>,
}

impl ServiceInstances {
    pub fn new(services: &HashMap<String, Vec<Url>>, strategy: &LoadBalanceStrategy) -> Self {
        let services = services
            .iter()
            .map(|(name, instances)| {
                (
                    name.to_ascii_lowercase(),
                    Service {
                        instances: instances.clone(),
                        strategy: LoadBalancerFactory::create_strategy(strategy),
                    },
                )
            })
            .collect();
        Self { services }
    }

    /// Pick an instance of `service_id` (case-insensitive).
    pub fn choose(&self, service_id: &str) -> Option<Url> {
        let service = self.services.get(&service_id.to_ascii_lowercase())?;
        service.strategy.select_target(&service.instances)
    }

    pub fn contains(&self, service_id: &str) -> bool {
        self.services.contains_key(&service_id.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(raw: &[&str]) -> Vec<Url> {
        raw.iter().map(|u| u.parse().unwrap()).collect()
    }

    #[test]
    fn test_round_robin_strategy() {
        let strategy = RoundRobinStrategy::new();
        let targets = urls(&["http://a:1", "http://b:2", "http://c:3"]);

        let picks: Vec<_> = (0..4)
            .map(|_| strategy.select_target(&targets).unwrap())
            .collect();
        assert_eq!(picks[0], targets[0]);
        assert_eq!(picks[1], targets[1]);
        assert_eq!(picks[2], targets[2]);
        assert_eq!(picks[3], targets[0]);
    }

    #[test]
    fn test_empty_targets() {
        assert_eq!(RoundRobinStrategy::new().select_target(&[]), None);
        assert_eq!(RandomStrategy.select_target(&[]), None);
    }

    #[test]
    fn test_random_strategy() {
        let targets = urls(&["http://a:1", "http://b:2"]);
        let selected = RandomStrategy.select_target(&targets).unwrap();
        assert!(targets.contains(&selected));
    }

    #[test]
    fn test_service_lookup_is_case_insensitive_and_isolated() {
        let mut config = HashMap::new();
        config.insert("Orders".to_string(), urls(&["http://o1:1", "http://o2:2"]));
        config.insert("users".to_string(), urls(&["http://u1:1"]));
        let services = ServiceInstances::new(&config, &LoadBalanceStrategy::RoundRobin);

        assert_eq!(services.choose("orders").unwrap().as_str(), "http://o1:1/");
        assert_eq!(services.choose("USERS").unwrap().as_str(), "http://u1:1/");
        assert_eq!(services.choose("ORDERS").unwrap().as_str(), "http://o2:2/");
        assert!(services.choose("billing").is_none());
        assert!(services.contains("Users"));
    }
}
