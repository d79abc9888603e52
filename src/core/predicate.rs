//! Asynchronous route predicates and their combinators.
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{error::GatewayResult, exchange::Exchange};

/// Boolean decision over a request.
///
/// Evaluation may suspend (e.g. to consult external state) and may fail; a
/// failure only removes the owning route from consideration for this request.
#[async_trait]
pub trait RoutePredicate: Send + Sync + 'static {
    async fn test(&self, exchange: &mut Exchange) -> GatewayResult<bool>;
}

pub type SharedPredicate = Arc<dyn RoutePredicate>;

/// Short-circuiting conjunction: `right` is only evaluated when `left` is true.
pub struct AndPredicate {
    left: SharedPredicate,
    right: SharedPredicate,
}

#[async_trait]
impl RoutePredicate for AndPredicate {
    async fn test(&self, exchange: &mut Exchange) -> GatewayResult<bool> {
        if !self.left.test(exchange).await? {
            return Ok(false);
        }
        self.right.test(exchange).await
    }
}

/// Combine two predicates with [`AndPredicate`].
pub fn and(left: SharedPredicate, right: SharedPredicate) -> SharedPredicate {
    Arc::new(AndPredicate { left, right })
}

/// Adapter lifting a synchronous test into a [`RoutePredicate`].
pub struct FnPredicate<F>(F);

#[async_trait]
impl<F> RoutePredicate for FnPredicate<F>
where
    F: Fn(&mut Exchange) -> bool + Send + Sync + 'static,
{
    async fn test(&self, exchange: &mut Exchange) -> GatewayResult<bool> {
        Ok((self.0)(exchange))
    }
}

pub fn from_fn<F>(test: F) -> SharedPredicate
where
    F: Fn(&mut Exchange) -> bool + Send + Sync + 'static,
{
    Arc::new(FnPredicate(test))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::body::Body;
    use http::Request;

    use super::*;

    struct Counting {
        result: bool,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RoutePredicate for Counting {
        async fn test(&self, _exchange: &mut Exchange) -> GatewayResult<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.result)
        }
    }

    fn counting(result: bool) -> (SharedPredicate, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Arc::new(Counting {
                result,
                calls: calls.clone(),
            }),
            calls,
        )
    }

    #[tokio::test]
    async fn test_and_short_circuits_on_false() {
        let (first, _) = counting(false);
        let (second, second_calls) = counting(true);
        let (third, third_calls) = counting(true);
        let combined = and(and(first, second), third);

        let mut ex = Exchange::new(Request::new(Body::empty()));
        assert!(!combined.test(&mut ex).await.unwrap());
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
        assert_eq!(third_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_and_evaluates_all_when_true() {
        let (first, first_calls) = counting(true);
        let (second, second_calls) = counting(true);
        let combined = and(first, second);

        let mut ex = Exchange::new(Request::new(Body::empty()));
        assert!(combined.test(&mut ex).await.unwrap());
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
    }
}
