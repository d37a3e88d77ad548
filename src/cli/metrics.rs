//! `metrics` subcommand.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::api::metrics::{format_metrics, HttpMetricsSource, MetricsPoller, MetricsSource};
use crate::cli::http_client;

pub async fn run_metrics(base_url: &str, interval: Duration, watch: bool) -> Result<(), Box<dyn Error>> {
    let source = HttpMetricsSource::new(http_client()?, base_url);

    if !watch {
        let metrics = source.fetch().await.map_err(|err| err.to_string())?;
        println!("{}", format_metrics(&metrics));
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let poller = MetricsPoller::spawn(Arc::new(source), interval, cancel.clone());
    let mut samples = poller.subscribe();
    eprintln!("Polling {base_url} every {}s (Ctrl+C to stop)", interval.as_secs());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = samples.changed() => {
                if changed.is_err() {
                    break;
                }
                let sample = samples.borrow_and_update().clone();
                println!("{}", format_metrics(&sample));
            }
        }
    }

    poller.stop().await;
    Ok(())
}
