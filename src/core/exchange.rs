//! Per-request exchange context.
//!
//! An [`Exchange`] owns the request being routed, the response under
//! construction and the request-scoped attributes the matcher and filters use
//! to talk to each other. It lives for exactly one request and is passed by
//! `&mut` through the pipeline; nothing in it is shared across requests.
use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use axum::body::Body;
use http::{
    Extensions, HeaderMap, HeaderName, HeaderValue, Request, Response, StatusCode, Uri,
    request::Parts, uri::PathAndQuery,
};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::core::route::Route;

/// Replace the path of `uri`, keeping scheme, authority and query.
pub fn uri_with_path(uri: &Uri, path: &str) -> Result<Uri, http::Error> {
    let path_and_query = match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    };
    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(PathAndQuery::try_from(path_and_query)?);
    Ok(Uri::from_parts(parts)?)
}

/// Request-scoped attributes.
#[derive(Debug, Default)]
pub struct ExchangeAttributes {
    predicate_route_id: Option<String>,
    route: Option<Arc<Route>>,
    request_url: Option<Url>,
    original_request_urls: Vec<Uri>,
    already_routed: bool,
    uri_template_variables: HashMap<String, String>,
    extensions: Extensions,
}

impl ExchangeAttributes {
    /// Id of the route whose predicate is currently being evaluated.
    ///
    /// Present only while the matcher is testing a route; absent otherwise.
    pub fn predicate_route_id(&self) -> Option<&str> {
        self.predicate_route_id.as_deref()
    }

    pub(crate) fn set_predicate_route_id(&mut self, id: Option<String>) {
        self.predicate_route_id = id;
    }

    /// The route selected by the matcher.
    pub fn route(&self) -> Option<&Arc<Route>> {
        self.route.as_ref()
    }

    pub(crate) fn set_route(&mut self, route: Arc<Route>) {
        self.route = Some(route);
    }

    /// Resolved downstream URL (route target + current path).
    pub fn request_url(&self) -> Option<&Url> {
        self.request_url.as_ref()
    }

    pub fn set_request_url(&mut self, url: Url) {
        self.request_url = Some(url);
    }

    /// Request URIs recorded before path rewrites, oldest first.
    pub fn original_request_urls(&self) -> &[Uri] {
        &self.original_request_urls
    }

    /// Record a pre-rewrite URI; repeated URIs are kept once.
    pub fn add_original_request_url(&mut self, uri: Uri) {
        if !self.original_request_urls.contains(&uri) {
            self.original_request_urls.push(uri);
        }
    }

    pub fn is_already_routed(&self) -> bool {
        self.already_routed
    }

    /// Set the one-shot dispatch marker. Returns `false` if it was already set.
    pub fn mark_routed(&mut self) -> bool {
        !std::mem::replace(&mut self.already_routed, true)
    }

    pub fn uri_template_variables(&self) -> &HashMap<String, String> {
        &self.uri_template_variables
    }

    pub fn put_uri_template_variables(&mut self, vars: HashMap<String, String>) {
        self.uri_template_variables.extend(vars);
    }

    /// Typed slot for attributes owned by custom filters.
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }
}

/// Response being assembled for the client.
///
/// Once committed, status and headers are frozen: setters become no-ops and
/// report `false`.
#[derive(Debug, Default)]
pub struct ServerResponse {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Body,
    committed: bool,
}

impl ServerResponse {
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) -> bool {
        if self.committed {
            return false;
        }
        self.status = Some(status);
        true
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) -> bool {
        if self.committed {
            return false;
        }
        self.headers.insert(name, value);
        true
    }

    pub fn append_header(&mut self, name: HeaderName, value: HeaderValue) -> bool {
        if self.committed {
            return false;
        }
        self.headers.append(name, value);
        true
    }

    pub fn set_body(&mut self, body: Body) -> bool {
        if self.committed {
            return false;
        }
        self.body = body;
        true
    }

    /// Finish the response as-is.
    pub fn complete(&mut self) {
        self.committed = true;
    }

    /// Adopt a downstream response and commit. Headers set earlier in the
    /// chain are kept; downstream headers are appended after them.
    pub fn commit_with(&mut self, response: Response<Body>) -> bool {
        if self.committed {
            return false;
        }
        let (parts, body) = response.into_parts();
        self.status = Some(parts.status);
        let mut current = None;
        for (name, value) in parts.headers {
            if let Some(name) = name {
                current = Some(name);
            }
            if let Some(name) = &current {
                self.headers.append(name.clone(), value);
            }
        }
        self.body = body;
        self.committed = true;
        true
    }

    pub fn into_response(self) -> Response<Body> {
        let mut response = Response::new(self.body);
        *response.status_mut() = self.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = self.headers;
        response
    }
}

/// One request's trip through the gateway.
#[derive(Debug)]
pub struct Exchange {
    request: Request<Body>,
    response: ServerResponse,
    attributes: ExchangeAttributes,
    cancellation: CancellationToken,
    client_addr: Option<SocketAddr>,
}

impl Exchange {
    pub fn new(request: Request<Body>) -> Self {
        Self {
            request,
            response: ServerResponse::default(),
            attributes: ExchangeAttributes::default(),
            cancellation: CancellationToken::new(),
            client_addr: None,
        }
    }

    pub fn with_client_addr(mut self, addr: SocketAddr) -> Self {
        self.client_addr = Some(addr);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn request(&self) -> &Request<Body> {
        &self.request
    }

    /// Replace the request with a modified copy of its head; the body moves
    /// over untouched.
    pub fn mutate_request<F>(&mut self, mutate: F)
    where
        F: FnOnce(&mut Parts),
    {
        let (mut parts, body) = std::mem::take(&mut self.request).into_parts();
        mutate(&mut parts);
        self.request = Request::from_parts(parts, body);
    }

    /// Move the request out, leaving an empty one behind. Used by the
    /// dispatching stages that forward the body exactly once.
    pub fn take_request(&mut self) -> Request<Body> {
        let (parts, body) = std::mem::take(&mut self.request).into_parts();
        let mut head = Request::new(Body::empty());
        *head.method_mut() = parts.method.clone();
        *head.uri_mut() = parts.uri.clone();
        *head.version_mut() = parts.version;
        *head.headers_mut() = parts.headers.clone();
        self.request = head;
        Request::from_parts(parts, body)
    }

    pub fn response(&self) -> &ServerResponse {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut ServerResponse {
        &mut self.response
    }

    pub fn attributes(&self) -> &ExchangeAttributes {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut ExchangeAttributes {
        &mut self.attributes
    }

    pub fn client_addr(&self) -> Option<SocketAddr> {
        self.client_addr
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn into_response(self) -> Response<Body> {
        self.response.into_response()
    }
}

#[cfg(test)]
mod tests {
    use http::header;

    use super::*;

    fn exchange(uri: &str) -> Exchange {
        Exchange::new(Request::builder().uri(uri).body(Body::empty()).unwrap())
    }

    #[test]
    fn test_uri_with_path_keeps_query_and_authority() {
        let uri: Uri = "http://example.com:8080/foo/hello?x=1".parse().unwrap();
        let rewritten = uri_with_path(&uri, "/bar/hello").unwrap();
        assert_eq!(rewritten.to_string(), "http://example.com:8080/bar/hello?x=1");
    }

    #[test]
    fn test_mark_routed_is_one_shot() {
        let mut ex = exchange("/");
        assert!(ex.attributes_mut().mark_routed());
        assert!(!ex.attributes_mut().mark_routed());
        assert!(ex.attributes().is_already_routed());
    }

    #[test]
    fn test_original_urls_are_deduplicated() {
        let mut ex = exchange("/a");
        let uri: Uri = "/a".parse().unwrap();
        ex.attributes_mut().add_original_request_url(uri.clone());
        ex.attributes_mut().add_original_request_url(uri);
        assert_eq!(ex.attributes().original_request_urls().len(), 1);
    }

    #[test]
    fn test_committed_response_rejects_mutation() {
        let mut ex = exchange("/");
        assert!(ex.response_mut().set_status(StatusCode::ACCEPTED));
        ex.response_mut().complete();
        assert!(!ex.response_mut().set_status(StatusCode::FOUND));
        assert!(!ex.response_mut().set_header(
            header::LOCATION,
            HeaderValue::from_static("http://x")
        ));
        assert_eq!(ex.response().status(), Some(StatusCode::ACCEPTED));
        assert!(ex.response().headers().get(header::LOCATION).is_none());
    }

    #[test]
    fn test_commit_with_keeps_earlier_headers() {
        let mut ex = exchange("/");
        ex.response_mut()
            .append_header(HeaderName::from_static("x-early"), HeaderValue::from_static("1"));
        let upstream = Response::builder()
            .status(StatusCode::CREATED)
            .header("x-upstream", "2")
            .body(Body::empty())
            .unwrap();
        assert!(ex.response_mut().commit_with(upstream));
        let response = ex.into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-early"], "1");
        assert_eq!(response.headers()["x-upstream"], "2");
    }

    #[test]
    fn test_mutate_request_preserves_other_parts() {
        let mut ex = exchange("/foo?q=1");
        ex.mutate_request(|parts| {
            parts
                .headers
                .append("x-added", HeaderValue::from_static("yes"));
        });
        assert_eq!(ex.request().uri().to_string(), "/foo?q=1");
        assert_eq!(ex.request().headers()["x-added"], "yes");
    }
}
