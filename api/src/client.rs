use crate::{
    payload,
    ApiError,
    ApiTarget,
    AUDIT_TARGET,
};
use reqwest::{
    header::CONTENT_TYPE,
    Method,
    StatusCode,
};
use serde::{
    Deserialize,
    Serialize,
};
use serde_json::{
    Map,
    Value,
};
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Classified body of a successful exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Json(Value),
    /// The body was not JSON.
    Text(String),
    /// Timed out or empty body.
    Empty,
}

impl Reply {
    pub fn into_json(self) -> Option<Value> {
        match self {
            Reply::Json(value) => Some(value),
            Reply::Text(_) | Reply::Empty => None,
        }
    }
}

/// Rank and score of an account on the world leaderboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    pub rank: i64,
    pub score: i64,
}

impl Standing {
    fn from_entry(entry: &Value) -> Self {
        let number = |key: &str| {
            entry
                .get(key)
                .and_then(|value| value.as_i64().or_else(|| value.as_f64().map(|f| f as i64)))
                .unwrap_or_default()
        };
        Self {
            rank: number("rank"),
            score: number("score"),
        }
    }
}

/// Issues single requests against game servers. Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
    timeout: Duration,
}

impl Default for RemoteClient {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl RemoteClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            timeout,
        }
    }

    /// Exchanges username and password for a session token.
    pub async fn sign_in(&self, target: &ApiTarget, password: &str) -> Result<Option<String>, ApiError> {
        let body = serde_json::json!({
            "email": target.username().unwrap_or_default(),
            "password": password,
        });
        let reply = self
            .request(target, Method::POST, "/api/auth/signin", &[], Some(body))
            .await?;
        Ok(reply
            .into_json()
            .and_then(|body| body.get("token").and_then(Value::as_str).map(str::to_string)))
    }

    /// The `stats` memory path of a shard. `None` when there is nothing usable.
    pub async fn memory(&self, target: &ApiTarget, shard: &str) -> Result<Option<Map<String, Value>>, ApiError> {
        const ENDPOINT: &str = "/api/user/memory";
        let reply = self
            .request(target, Method::GET, ENDPOINT, &[("path", "stats"), ("shard", shard)], None)
            .await?;
        let Some(body) = reply.into_json() else {
            return Ok(None);
        };
        let data = match body.get("data") {
            Some(Value::String(data)) if payload::is_compressed(data) => {
                payload::decode_compressed(data).map_err(|source| ApiError::Payload {
                    endpoint: ENDPOINT.to_string(),
                    source,
                })?
            }
            Some(Value::String(data)) => serde_json::from_str(data).unwrap_or(Value::Null),
            Some(data) => data.clone(),
            None => Value::Null,
        };
        Ok(usable_snapshot(data))
    }

    /// A raw memory segment of a shard, expected to hold a JSON document.
    pub async fn memory_segment(
        &self,
        target: &ApiTarget,
        segment: u32,
        shard: &str,
    ) -> Result<Option<Map<String, Value>>, ApiError> {
        let segment = segment.to_string();
        let reply = self
            .request(
                target,
                Method::GET,
                "/api/user/memory-segment",
                &[("segment", segment.as_str()), ("shard", shard)],
                None,
            )
            .await?;
        let data = match reply.into_json().as_ref().and_then(|body| body.get("data")) {
            Some(Value::String(data)) => match serde_json::from_str(data) {
                Ok(data) => data,
                Err(err) => {
                    debug!(shard, %err, "memory segment does not hold json");
                    Value::Null
                }
            },
            _ => Value::Null,
        };
        Ok(usable_snapshot(data))
    }

    /// Information about the signed in account.
    pub async fn me(&self, target: &ApiTarget) -> Result<Option<Value>, ApiError> {
        let reply = self.request(target, Method::GET, "/api/auth/me", &[], None).await?;
        Ok(reply.into_json())
    }

    /// The latest world leaderboard entry of `username`, `None` if it has no entries.
    pub async fn leaderboard(&self, target: &ApiTarget, username: &str) -> Result<Option<Standing>, ApiError> {
        let reply = self
            .request(
                target,
                Method::GET,
                "/api/leaderboard/find",
                &[("username", username), ("mode", "world")],
                None,
            )
            .await?;
        Ok(reply.into_json().and_then(|body| {
            body.get("list")
                .and_then(Value::as_array)
                .and_then(|list| list.last())
                .map(Standing::from_entry)
        }))
    }

    /// Server-wide counters. Only servers that report a `users` field are considered.
    pub async fn server_stats(&self, target: &ApiTarget) -> Result<Option<Value>, ApiError> {
        let reply = self.request(target, Method::GET, "/api/stats/server", &[], None).await?;
        match reply.into_json() {
            Some(stats) if stats.get("users").is_some() => Ok(Some(stats)),
            _ => {
                warn!(target: AUDIT_TARGET, url = %target.base_url(), "server stats unavailable");
                Ok(None)
            }
        }
    }

    /// Statistics of the admin-utils server mod, with the per-user list keyed by username.
    pub async fn admin_server_stats(&self, target: &ApiTarget) -> Result<Option<Value>, ApiError> {
        let reply = self.request(target, Method::GET, "/stats", &[], None).await?;
        match reply.into_json() {
            Some(stats) if has_game_time(&stats) => Ok(Some(rekey_admin_stats(stats))),
            _ => {
                warn!(target: AUDIT_TARGET, url = %target.base_url(), "admin-utils server stats unavailable");
                Ok(None)
            }
        }
    }

    async fn request(
        &self,
        target: &ApiTarget,
        method: Method,
        endpoint: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<Reply, ApiError> {
        let url = target.endpoint_url(endpoint, query);
        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .header(CONTENT_TYPE, "application/json");
        if let Some(username) = target.username() {
            request = request.header("X-Username", username);
        }
        if let Some(token) = target.token() {
            request = request.header("X-Token", token);
        }
        if let Some(body) = &body {
            request = request.json(body);
        }

        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let text = response.text().await?;
            Ok::<_, reqwest::Error>((status, text))
        };

        let (status, text) = match tokio::time::timeout(self.timeout, exchange).await {
            Err(_) => {
                info!(target: AUDIT_TARGET, %method, %url, timeout = ?self.timeout, "Timeout hit");
                return Ok(Reply::Empty);
            }
            Ok(Err(source)) => {
                error!(target: AUDIT_TARGET, %method, %url, error = %source, "request failed");
                return Err(ApiError::Transport {
                    endpoint: endpoint.to_string(),
                    source,
                });
            }
            Ok(Ok(exchange)) => exchange,
        };

        classify(endpoint, &method, &url, status, text)
    }
}

fn classify(endpoint: &str, method: &Method, url: &url::Url, status: StatusCode, text: String) -> Result<Reply, ApiError> {
    if text.starts_with("Rate limit exceeded") {
        error!(target: AUDIT_TARGET, %method, %url, data = %text, "rate limited");
        return Err(ApiError::RateLimited {
            endpoint: endpoint.to_string(),
        });
    }
    if status == StatusCode::UNAUTHORIZED {
        error!(target: AUDIT_TARGET, %method, %url, %status, "unauthorized");
        return Err(ApiError::Unauthorized {
            endpoint: endpoint.to_string(),
        });
    }
    if !status.is_success() {
        error!(target: AUDIT_TARGET, %method, %url, %status, data = %text, "unexpected status");
        return Err(ApiError::Status {
            endpoint: endpoint.to_string(),
            status,
        });
    }

    info!(
        target: AUDIT_TARGET,
        %method,
        %url,
        data = %format!("{} kB", text.len() as f64 / 1000.0),
        "request completed"
    );

    if text.trim().is_empty() {
        return Ok(Reply::Empty);
    }
    Ok(match serde_json::from_str(&text) {
        Ok(value) => Reply::Json(value),
        Err(_) => Reply::Text(text),
    })
}

fn usable_snapshot(data: Value) -> Option<Map<String, Value>> {
    match data {
        Value::Object(map) if !map.is_empty() => Some(map),
        _ => None,
    }
}

/// The mod reports a positive `gametime` once the server is running.
fn has_game_time(stats: &Value) -> bool {
    stats
        .get("gametime")
        .and_then(Value::as_f64)
        .is_some_and(|gametime| gametime > 0.0)
}

fn rekey_admin_stats(mut stats: Value) -> Value {
    if let Some(ticks) = stats.get_mut("ticks").and_then(Value::as_object_mut) {
        ticks.remove("ticks");
    }
    if let Some(users) = stats.get_mut("users") {
        if let Value::Array(list) = users {
            let keyed: Map<String, Value> = std::mem::take(list)
                .into_iter()
                .filter_map(|user| {
                    let username = user.get("username")?.as_str()?.to_string();
                    Some((username, user))
                })
                .collect();
            *users = Value::Object(keyed);
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Query,
        http::{
            HeaderMap,
            StatusCode as HttpStatus,
        },
        routing::{
            get,
            post,
        },
        Json,
        Router,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::{
        collections::HashMap,
        net::SocketAddr,
    };

    async fn serve(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    fn target(addr: SocketAddr) -> ApiTarget {
        ApiTarget::new(format!("http://{addr}"))
            .unwrap()
            .with_username("alice")
            .with_token(Some("secret"))
    }

    #[tokio::test]
    async fn memory_is_decompressed() {
        let stats = json!({"cpu": {"used": 4.2}, "gcl": 3});
        let encoded = payload::encode_compressed(&stats).unwrap();
        let router = Router::new().route(
            "/api/user/memory",
            get(move |Query(query): Query<HashMap<String, String>>, headers: HeaderMap| {
                let encoded = encoded.clone();
                async move {
                    assert_eq!(query.get("path").map(String::as_str), Some("stats"));
                    assert_eq!(query.get("shard").map(String::as_str), Some("shard3"));
                    assert_eq!(headers.get("X-Username").unwrap(), "alice");
                    assert_eq!(headers.get("X-Token").unwrap(), "secret");
                    Json(json!({"ok": 1, "data": encoded}))
                }
            }),
        );
        let addr = serve(router).await;

        let snapshot = RemoteClient::default().memory(&target(addr), "shard3").await.unwrap();
        assert_eq!(snapshot.map(Value::Object), Some(stats));
    }

    #[tokio::test]
    async fn empty_or_missing_memory_is_no_data() {
        let router = Router::new().route("/api/user/memory", get(|| async { Json(json!({"ok": 1})) }));
        let addr = serve(router).await;
        assert_eq!(RemoteClient::default().memory(&target(addr), "shard0").await.unwrap(), None);

        let empty = payload::encode_compressed(&json!({})).unwrap();
        let router = Router::new().route(
            "/api/user/memory",
            get(move || {
                let empty = empty.clone();
                async move { Json(json!({"ok": 1, "data": empty})) }
            }),
        );
        let addr = serve(router).await;
        assert_eq!(RemoteClient::default().memory(&target(addr), "shard0").await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupt_memory_is_a_payload_error() {
        let router = Router::new().route(
            "/api/user/memory",
            get(|| async { Json(json!({"ok": 1, "data": "gz:not base64!"})) }),
        );
        let addr = serve(router).await;
        let err = RemoteClient::default()
            .memory(&target(addr), "shard0")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Payload { .. }), "{err}");
    }

    #[tokio::test]
    async fn memory_segment_is_parsed_leniently() {
        let router = Router::new().route(
            "/api/user/memory-segment",
            get(|Query(query): Query<HashMap<String, String>>| async move {
                match query.get("segment").map(String::as_str) {
                    Some("30") => Json(json!({"ok": 1, "data": "{\"cpu\":{\"bucket\":9000}}"})),
                    _ => Json(json!({"ok": 1, "data": "not json"})),
                }
            }),
        );
        let addr = serve(router).await;
        let client = RemoteClient::default();

        let snapshot = client.memory_segment(&target(addr), 30, "shard0").await.unwrap();
        assert_eq!(snapshot.map(Value::Object), Some(json!({"cpu": {"bucket": 9000}})));
        assert_eq!(client.memory_segment(&target(addr), 31, "shard0").await.unwrap(), None);
    }

    #[tokio::test]
    async fn slow_servers_yield_no_data() {
        let router = Router::new().route(
            "/api/auth/me",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Json(json!({"power": 1}))
            }),
        );
        let addr = serve(router).await;

        let client = RemoteClient::new(Duration::from_millis(100));
        assert_eq!(client.me(&target(addr)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn refused_connections_are_transport_errors() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = RemoteClient::default().me(&target(addr)).await.unwrap_err();
        assert!(matches!(err, ApiError::Transport { .. }), "{err}");
    }

    #[tokio::test]
    async fn classifies_statuses_and_text() {
        let router = Router::new()
            .route("/api/auth/me", get(|| async { (HttpStatus::UNAUTHORIZED, "Unauthorized") }))
            .route(
                "/api/leaderboard/find",
                get(|| async { "Rate limit exceeded, retry after 1000ms" }),
            )
            .route("/stats", get(|| async { (HttpStatus::INTERNAL_SERVER_ERROR, "boom") }));
        let addr = serve(router).await;
        let client = RemoteClient::default();

        assert!(client.me(&target(addr)).await.unwrap_err().is_unauthorized());
        assert!(matches!(
            client.leaderboard(&target(addr), "alice").await.unwrap_err(),
            ApiError::RateLimited { .. }
        ));
        assert!(matches!(
            client.admin_server_stats(&target(addr)).await.unwrap_err(),
            ApiError::Status { .. }
        ));
    }

    #[tokio::test]
    async fn signs_in_with_username_and_password() {
        let router = Router::new().route(
            "/api/auth/signin",
            post(|Json(body): Json<Value>| async move {
                if body == json!({"email": "alice", "password": "hunter2"}) {
                    Json(json!({"ok": 1, "token": "fresh"}))
                } else {
                    Json(json!({"ok": 0}))
                }
            }),
        );
        let addr = serve(router).await;
        let client = RemoteClient::default();
        let target = ApiTarget::new(format!("http://{addr}")).unwrap().with_username("alice");

        assert_eq!(client.sign_in(&target, "hunter2").await.unwrap().as_deref(), Some("fresh"));
        assert_eq!(client.sign_in(&target, "wrong").await.unwrap(), None);
    }

    #[tokio::test]
    async fn leaderboard_takes_the_latest_entry() {
        let router = Router::new().route(
            "/api/leaderboard/find",
            get(|Query(query): Query<HashMap<String, String>>| async move {
                assert_eq!(query.get("mode").map(String::as_str), Some("world"));
                match query.get("username").map(String::as_str) {
                    Some("alice") => Json(json!({"ok": 1, "list": [
                        {"season": "2024-01", "rank": 12, "score": 100},
                        {"season": "2024-02", "rank": 7, "score": 250},
                    ]})),
                    _ => Json(json!({"ok": 1, "list": []})),
                }
            }),
        );
        let addr = serve(router).await;
        let client = RemoteClient::default();

        assert_eq!(
            client.leaderboard(&target(addr), "alice").await.unwrap(),
            Some(Standing { rank: 7, score: 250 })
        );
        assert_eq!(client.leaderboard(&target(addr), "bob").await.unwrap(), None);
    }

    #[tokio::test]
    async fn server_stats_require_their_marker_fields() {
        let router = Router::new()
            .route("/api/stats/server", get(|| async { Json(json!({"ok": 1})) }))
            .route(
                "/stats",
                get(|| async {
                    Json(json!({
                        "gametime": 1234,
                        "ticks": {"avg": 1000, "ticks": [1000, 1001]},
                        "users": [
                            {"username": "alice", "rooms": 3},
                            {"username": "bob", "rooms": 1},
                        ],
                    }))
                }),
            );
        let addr = serve(router).await;
        let client = RemoteClient::default();

        assert_eq!(client.server_stats(&target(addr)).await.unwrap(), None);
        assert_eq!(
            client.admin_server_stats(&target(addr)).await.unwrap(),
            Some(json!({
                "gametime": 1234,
                "ticks": {"avg": 1000},
                "users": {
                    "alice": {"username": "alice", "rooms": 3},
                    "bob": {"username": "bob", "rooms": 1},
                },
            }))
        );
    }

    #[tokio::test]
    async fn admin_stats_need_a_running_game() {
        for gametime in [json!(null), json!(0), json!("")] {
            let router = Router::new().route(
                "/stats",
                get(move || {
                    let gametime = gametime.clone();
                    async move { Json(json!({"gametime": gametime, "users": []})) }
                }),
            );
            let addr = serve(router).await;
            assert_eq!(RemoteClient::default().admin_server_stats(&target(addr)).await.unwrap(), None);
        }
    }
}
