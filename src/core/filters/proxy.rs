//! Terminal action that proxies `http`/`https` request URLs upstream.
use std::sync::Arc;

use async_trait::async_trait;
use http::{HeaderName, HeaderValue, Uri, header};

use crate::{
    core::{
        error::{GatewayError, GatewayResult},
        exchange::Exchange,
        filter::TerminalAction,
    },
    ports::http_client::HttpClient,
};

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

/// Sends the exchange's request to its resolved `http`/`https` URL and
/// commits the upstream response.
///
/// Any other scheme, a missing request URL, or an exchange that was already
/// routed leaves the response untouched.
pub struct ProxyRoutingAction {
    client: Arc<dyn HttpClient>,
}

impl ProxyRoutingAction {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self { client }
    }

    fn add_forwarded_headers(exchange: &mut Exchange) {
        let client_ip = exchange.client_addr().map(|addr| addr.ip().to_string());
        exchange.mutate_request(|parts| {
            let original_host = parts.headers.get(header::HOST).cloned();
            let headers = &mut parts.headers;
            if let Some(ip) = client_ip.and_then(|ip| HeaderValue::from_str(&ip).ok()) {
                headers.append(X_FORWARDED_FOR, ip);
            }
            headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));
            if let Some(host) = original_host {
                headers.insert(X_FORWARDED_HOST, host);
            }
            headers.remove(header::HOST);
        });
    }
}

#[async_trait]
impl TerminalAction for ProxyRoutingAction {
    async fn execute(&self, exchange: &mut Exchange) -> GatewayResult<()> {
        let Some(url) = exchange.attributes().request_url().cloned() else {
            return Ok(());
        };
        if !matches!(url.scheme(), "http" | "https") || exchange.attributes().is_already_routed() {
            return Ok(());
        }
        exchange.attributes_mut().mark_routed();

        let upstream: Uri = url
            .as_str()
            .parse()
            .map_err(|e| GatewayError::InvalidRequest(format!("request url '{url}': {e}")))?;
        Self::add_forwarded_headers(exchange);
        exchange.mutate_request(|parts| parts.uri = upstream);

        let request = exchange.take_request();
        let response = self.client.send_request(request).await?;
        exchange.response_mut().commit_with(response);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use axum::body::Body;
    use http::{Request, Response, StatusCode};

    use super::*;
    use crate::ports::http_client::{HttpClientError, HttpClientResult};

    #[derive(Default)]
    struct StubClient {
        seen: Mutex<Vec<Request<()>>>,
        fail: bool,
    }

    #[async_trait]
    impl HttpClient for StubClient {
        async fn send_request(&self, req: Request<Body>) -> HttpClientResult<Response<Body>> {
            if self.fail {
                return Err(HttpClientError::Timeout(3));
            }
            let (parts, _) = req.into_parts();
            self.seen.lock().unwrap().push(Request::from_parts(parts, ()));
            Ok(Response::builder()
                .status(StatusCode::CREATED)
                .header("x-upstream", "1")
                .body(Body::empty())
                .unwrap())
        }
    }

    fn exchange_for(url: &str) -> Exchange {
        let mut ex = Exchange::new(
            Request::get("/items")
                .header(header::HOST, "gateway.local")
                .body(Body::empty())
                .unwrap(),
        )
        .with_client_addr("192.168.1.9:4000".parse().unwrap());
        ex.attributes_mut().set_request_url(url.parse().unwrap());
        ex
    }

    #[tokio::test]
    async fn test_proxies_http_url_and_commits() {
        let client = Arc::new(StubClient::default());
        let action = ProxyRoutingAction::new(client.clone());
        let mut ex = exchange_for("http://backend:9000/items?x=1");

        action.execute(&mut ex).await.unwrap();

        let seen = client.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].uri().to_string(), "http://backend:9000/items?x=1");
        assert_eq!(seen[0].headers()["x-forwarded-for"], "192.168.1.9");
        assert_eq!(seen[0].headers()["x-forwarded-host"], "gateway.local");
        assert!(seen[0].headers().get(header::HOST).is_none());
        assert!(ex.attributes().is_already_routed());
        assert_eq!(ex.response().status(), Some(StatusCode::CREATED));
    }

    #[tokio::test]
    async fn test_other_schemes_and_routed_exchanges_are_skipped() {
        let client = Arc::new(StubClient::default());
        let action = ProxyRoutingAction::new(client.clone());

        let mut ex = exchange_for("no://op");
        action.execute(&mut ex).await.unwrap();
        assert!(!ex.response().is_committed());

        let mut ex = exchange_for("http://backend:9000/");
        ex.attributes_mut().mark_routed();
        action.execute(&mut ex).await.unwrap();

        assert!(client.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upstream_timeout_maps_to_gateway_timeout() {
        let action = ProxyRoutingAction::new(Arc::new(StubClient {
            fail: true,
            ..Default::default()
        }));
        let mut ex = exchange_for("https://backend/");
        let err = action.execute(&mut ex).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }
}
