//! Server telemetry polling.
//!
//! Telemetry is non-critical: failures are logged and replaced with the zeroed
//! [`ServerMetrics::default`] sample instead of being surfaced.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::ServerMetrics;
use crate::utils::url::service_url;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

pub async fn fetch_metrics(
    client: &reqwest::Client,
    base_url: &str,
) -> Result<ServerMetrics, Box<dyn std::error::Error + Send + Sync>> {
    let metrics_url = service_url(base_url, "metrics");
    let response = client.get(metrics_url).send().await?;

    if !response.status().is_success() {
        let status = response.status();
        return Err(format!("metrics request failed with status {status}").into());
    }

    Ok(response.json::<ServerMetrics>().await?)
}

#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn fetch(&self) -> Result<ServerMetrics, Box<dyn std::error::Error + Send + Sync>>;

    /// Like [`MetricsSource::fetch`], but never fails.
    async fn fetch_or_default(&self) -> ServerMetrics {
        match self.fetch().await {
            Ok(metrics) => metrics,
            Err(err) => {
                warn!(error = %err, "failed to fetch server metrics");
                ServerMetrics::default()
            }
        }
    }
}

pub struct HttpMetricsSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMetricsSource {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl MetricsSource for HttpMetricsSource {
    async fn fetch(&self) -> Result<ServerMetrics, Box<dyn std::error::Error + Send + Sync>> {
        fetch_metrics(&self.client, &self.base_url).await
    }
}

/// Background task publishing the latest sample on a watch channel.
pub struct MetricsPoller {
    latest: watch::Receiver<ServerMetrics>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl MetricsPoller {
    /// Polls immediately, then once per `interval`, until `cancel` fires or
    /// the poller is dropped.
    pub fn spawn(
        source: Arc<dyn MetricsSource>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let (tx, rx) = watch::channel(ServerMetrics::default());
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let sample = source.fetch_or_default().await;
                        if tx.send(sample).is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("metrics poller stopped");
        });

        Self {
            latest: rx,
            cancel,
            handle: Some(handle),
        }
    }

    pub fn latest(&self) -> ServerMetrics {
        self.latest.borrow().clone()
    }

    /// A receiver that can await the next published sample.
    pub fn subscribe(&self) -> watch::Receiver<ServerMetrics> {
        self.latest.clone()
    }

    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for MetricsPoller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub fn format_metrics(metrics: &ServerMetrics) -> String {
    let mut line = format!(
        "CPU {:.1}% | MEM {:.1}%",
        metrics.cpu_usage, metrics.memory_usage
    );
    if let Some(name) = &metrics.gpu_name {
        line.push_str(&format!(" | GPU {name}"));
        if let Some(usage) = metrics.gpu_usage {
            line.push_str(&format!(" {usage:.1}%"));
        }
        if let Some(vram) = metrics.vram_usage {
            line.push_str(&format!(" | VRAM {vram:.1}%"));
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl MetricsSource for CountingSource {
        async fn fetch(&self) -> Result<ServerMetrics, Box<dyn std::error::Error + Send + Sync>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                return Err("connection refused".into());
            }
            Ok(ServerMetrics {
                cpu_usage: call as f64,
                memory_usage: 50.0,
                ..Default::default()
            })
        }
    }

    #[tokio::test]
    async fn failing_source_falls_back_to_zeroed_sample() {
        let source = CountingSource {
            calls: AtomicUsize::new(0),
            fail: true,
        };
        assert_eq!(source.fetch_or_default().await, ServerMetrics::default());
    }

    #[tokio::test(start_paused = true)]
    async fn poller_publishes_on_every_tick() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let poller = MetricsPoller::spawn(
            source.clone(),
            DEFAULT_POLL_INTERVAL,
            CancellationToken::new(),
        );
        let mut rx = poller.subscribe();

        rx.changed().await.expect("first sample");
        assert_eq!(rx.borrow_and_update().cpu_usage, 1.0);

        rx.changed().await.expect("second sample");
        assert_eq!(rx.borrow_and_update().cpu_usage, 2.0);
        assert_eq!(poller.latest().cpu_usage, 2.0);

        poller.stop().await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fetch_metrics_reports_unreachable_server() {
        let client = reqwest::Client::new();
        let result = fetch_metrics(&client, "http://127.0.0.1:9").await;
        assert!(result.is_err());
    }

    #[test]
    fn format_metrics_includes_gpu_when_present() {
        let metrics = ServerMetrics {
            cpu_usage: 12.0,
            memory_usage: 30.5,
            gpu_name: Some("RTX 4090".into()),
            gpu_usage: Some(80.0),
            vram_usage: Some(60.0),
        };
        assert_eq!(
            format_metrics(&metrics),
            "CPU 12.0% | MEM 30.5% | GPU RTX 4090 80.0% | VRAM 60.0%"
        );
        assert_eq!(
            format_metrics(&ServerMetrics::default()),
            "CPU 0.0% | MEM 0.0%"
        );
    }
}
