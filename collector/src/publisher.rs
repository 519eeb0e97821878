use crate::{
    batch::AggregateBatch,
    health::PushHealth,
};
use chrono::{
    DateTime,
    Utc,
};
use serde_json::Value;
use std::{
    fmt,
    future::Future,
    io,
    pin::Pin,
    sync::Arc,
    time::Duration,
};
use tokio::{
    io::AsyncWriteExt,
    net::TcpStream,
};

/// One line of the Graphite plaintext protocol.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricLine {
    pub path: String,
    pub value: serde_json::Number,
    pub timestamp: i64,
}

impl fmt::Display for MetricLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.path, self.value, self.timestamp)
    }
}

/// Flattens `tree` below `namespace` into one line per numeric leaf. Array elements are addressed
/// by index; every other leaf is dropped.
pub fn flatten(namespace: &str, tree: &Value, timestamp: i64) -> Vec<MetricLine> {
    fn walk(path: &mut Vec<String>, value: &Value, timestamp: i64, lines: &mut Vec<MetricLine>) {
        match value {
            Value::Number(number) => lines.push(MetricLine {
                path: path.join("."),
                value: number.clone(),
                timestamp,
            }),
            Value::Object(map) => {
                for (key, value) in map {
                    path.push(path_segment(key));
                    walk(path, value, timestamp, lines);
                    path.pop();
                }
            }
            Value::Array(items) => {
                for (index, value) in items.iter().enumerate() {
                    path.push(index.to_string());
                    walk(path, value, timestamp, lines);
                    path.pop();
                }
            }
            _ => {}
        }
    }

    let mut lines = Vec::new();
    let mut path = vec![namespace.to_string()];
    walk(&mut path, tree, timestamp, &mut lines);
    lines
}

fn path_segment(key: &str) -> String {
    key.split_whitespace().collect::<Vec<_>>().join("_")
}

/// Where metric lines end up.
pub trait MetricsSink: Send + Sync {
    fn name(&self) -> &'static str;

    fn write<'a>(&'a self, lines: &'a [MetricLine]) -> Pin<Box<dyn Future<Output = io::Result<()>> + Send + 'a>>;
}

/// Carbon's plaintext listener. A connection is opened per write.
#[derive(Debug, Clone)]
pub struct GraphiteSink {
    address: String,
    connect_timeout: Duration,
}

impl GraphiteSink {
    pub fn new(address: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            address: address.into(),
            connect_timeout,
        }
    }
}

impl MetricsSink for GraphiteSink {
    fn name(&self) -> &'static str {
        "graphite"
    }

    fn write<'a>(&'a self, lines: &'a [MetricLine]) -> Pin<Box<dyn Future<Output = io::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(self.address.as_str()))
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, format!("connecting to {}", self.address)))??;
            let payload: String = lines.iter().map(|line| format!("{line}\n")).collect();
            stream.write_all(payload.as_bytes()).await?;
            stream.shutdown().await
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Pushed { metrics: usize },
    NothingToPush,
}

#[derive(thiserror::Error, Debug)]
pub enum PublishError {
    #[error("Failed to write {metrics} metrics to {sink}: {source}")]
    Sink {
        sink: &'static str,
        metrics: usize,
        #[source]
        source: io::Error,
    },
}

/// Writes finished batches to the sink.
#[derive(Clone)]
pub struct Publisher {
    sink: Arc<dyn MetricsSink>,
    namespace: String,
    health: PushHealth,
}

impl Publisher {
    pub fn new(sink: Arc<dyn MetricsSink>, namespace: impl Into<String>, health: PushHealth) -> Self {
        Self {
            sink,
            namespace: namespace.into(),
            health,
        }
    }

    pub fn health(&self) -> &PushHealth {
        &self.health
    }

    pub fn sink_name(&self) -> &'static str {
        self.sink.name()
    }

    pub async fn publish(&self, batch: AggregateBatch, now: DateTime<Utc>) -> Result<PublishOutcome, PublishError> {
        if batch.is_empty() {
            return Ok(PublishOutcome::NothingToPush);
        }
        let lines = flatten(&self.namespace, &batch.into_tree(), now.timestamp());
        if lines.is_empty() {
            return Ok(PublishOutcome::NothingToPush);
        }

        debug!(sink = self.sink.name(), metrics = lines.len(), "Writing metrics");
        self.sink.write(&lines).await.map_err(|source| PublishError::Sink {
            sink: self.sink.name(),
            metrics: lines.len(),
            source,
        })?;
        self.health.record(Utc::now());
        Ok(PublishOutcome::Pushed { metrics: lines.len() })
    }
}
