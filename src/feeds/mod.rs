pub mod sources;
pub mod synthetic;

use crate::config::AppConfig;
use crate::state::EngineEvent;
use reqwest::Client;
use sources::{BinanceSource, CryptoCompareSource, PriceSource};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Duration, MissedTickBehavior};

/// Where a quote came from. Synthetic quotes succeed at the interface but
/// mean every upstream source failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum QuoteOrigin {
    Source(&'static str),
    Synthetic,
}

impl std::fmt::Display for QuoteOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source(name) => write!(f, "{name}"),
            Self::Synthetic => write!(f, "synthetic"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct PriceQuote {
    pub price: f64,
    pub origin: QuoteOrigin,
    pub timestamp_ms: i64,
}

impl PriceQuote {
    #[inline]
    pub fn is_synthetic(&self) -> bool {
        self.origin == QuoteOrigin::Synthetic
    }
}

/// Ordered fallback chain over price sources. Sources are tried strictly in
/// sequence; the first finite positive price wins. When all of them fail the
/// synthetic generator answers, so `fetch_price` has no error path.
pub struct PriceFeed {
    client: Client,
    sources: Vec<Box<dyn PriceSource>>,
}

impl PriceFeed {
    pub fn new(client: Client, sources: Vec<Box<dyn PriceSource>>) -> Self {
        Self { client, sources }
    }

    /// Binance first, CryptoCompare second, then synthetic.
    pub fn from_config(config: &AppConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.feed_timeout_ms))
            .build()
            .unwrap_or_default();

        Self::new(
            client,
            vec![
                Box::new(BinanceSource::new(config.primary_feed_url.clone())),
                Box::new(CryptoCompareSource::new(config.secondary_feed_url.clone())),
            ],
        )
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub async fn fetch_price(&self) -> PriceQuote {
        for source in &self.sources {
            match source.fetch(&self.client).await {
                Ok(price) if price.is_finite() && price > 0.0 => {
                    return PriceQuote {
                        price,
                        origin: QuoteOrigin::Source(source.name()),
                        timestamp_ms: chrono::Utc::now().timestamp_millis(),
                    };
                }
                Ok(price) => {
                    tracing::warn!(source = source.name(), price, "price source returned unusable price");
                }
                Err(e) => {
                    tracing::warn!(source = source.name(), error = %e, "price source failed, falling back");
                }
            }
        }

        let now_ms = chrono::Utc::now().timestamp_millis();
        let price = synthetic::sample(now_ms);
        tracing::error!(price, "all price feeds failed, using simulation data");

        PriceQuote {
            price,
            origin: QuoteOrigin::Synthetic,
            timestamp_ms: now_ms,
        }
    }
}

/// Polls the feed on a fixed interval and forwards quotes to the engine.
///
/// Each fetch is awaited before the next interval tick, so quotes reach the
/// engine in chronological order. A late fetch delays the schedule rather
/// than bursting to catch up.
pub async fn run_price_feed(
    feed: Arc<PriceFeed>,
    poll_interval: Duration,
    engine_tx: mpsc::Sender<EngineEvent>,
) {
    tracing::info!(sources = ?feed.source_names(), "price feed started");

    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        // Run the fetch as its own task so a panic inside a source becomes
        // a skipped tick instead of killing the feed.
        let task_feed = Arc::clone(&feed);
        let event = match tokio::spawn(async move { task_feed.fetch_price().await }).await {
            Ok(quote) => EngineEvent::Price(quote),
            Err(e) => EngineEvent::FetchFailed {
                reason: e.to_string(),
            },
        };

        if engine_tx.send(event).await.is_err() {
            tracing::info!("engine channel closed, price feed shutting down");
            return;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::errors::{EngineError, EngineResult};
    use futures_util::future::BoxFuture;
    use futures_util::FutureExt;
    use portable_atomic::{AtomicU64, Ordering};

    /// Scripted source for tests: a fixed answer plus a call counter.
    pub(crate) struct MockSource {
        pub name: &'static str,
        pub answer: Option<f64>,
        pub calls: Arc<AtomicU64>,
    }

    impl MockSource {
        pub(crate) fn ok(name: &'static str, price: f64) -> Self {
            Self { name, answer: Some(price), calls: Arc::new(AtomicU64::new(0)) }
        }

        pub(crate) fn failing(name: &'static str) -> Self {
            Self { name, answer: None, calls: Arc::new(AtomicU64::new(0)) }
        }
    }

    impl PriceSource for MockSource {
        fn name(&self) -> &'static str {
            self.name
        }

        fn fetch<'a>(&'a self, _client: &'a Client) -> BoxFuture<'a, EngineResult<f64>> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let answer = self.answer;
            let name = self.name;
            async move { answer.ok_or_else(|| EngineError::provider(name, "connection refused")) }.boxed()
        }
    }

    struct PanickingSource;

    impl PriceSource for PanickingSource {
        fn name(&self) -> &'static str {
            "panicky"
        }

        fn fetch<'a>(&'a self, _client: &'a Client) -> BoxFuture<'a, EngineResult<f64>> {
            panic!("source blew up")
        }
    }

    #[tokio::test]
    async fn test_primary_wins() {
        let secondary = MockSource::ok("secondary", 2400.0);
        let secondary_calls = Arc::clone(&secondary.calls);
        let feed = PriceFeed::new(
            Client::new(),
            vec![Box::new(MockSource::ok("primary", 2500.0)), Box::new(secondary)],
        );

        let quote = feed.fetch_price().await;
        assert_eq!(quote.price, 2500.0);
        assert_eq!(quote.origin, QuoteOrigin::Source("primary"));
        assert_eq!(secondary_calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_falls_back_to_secondary() {
        let feed = PriceFeed::new(
            Client::new(),
            vec![Box::new(MockSource::failing("primary")), Box::new(MockSource::ok("secondary", 2400.0))],
        );

        let quote = feed.fetch_price().await;
        assert_eq!(quote.price, 2400.0);
        assert_eq!(quote.origin, QuoteOrigin::Source("secondary"));
    }

    #[tokio::test]
    async fn test_unusable_price_falls_through() {
        let feed = PriceFeed::new(
            Client::new(),
            vec![Box::new(MockSource::ok("primary", f64::NAN)), Box::new(MockSource::ok("secondary", 2400.0))],
        );
        assert_eq!(feed.fetch_price().await.origin, QuoteOrigin::Source("secondary"));
    }

    #[tokio::test]
    async fn test_total_failure_is_synthetic_and_positive() {
        let feed = PriceFeed::new(
            Client::new(),
            vec![Box::new(MockSource::failing("primary")), Box::new(MockSource::failing("secondary"))],
        );

        for _ in 0..20 {
            let quote = feed.fetch_price().await;
            assert!(quote.is_synthetic());
            assert!(quote.price.is_finite() && quote.price > 0.0, "price={}", quote.price);
        }
    }

    #[tokio::test]
    async fn test_empty_chain_is_synthetic() {
        let feed = PriceFeed::new(Client::new(), Vec::new());
        assert!(feed.fetch_price().await.is_synthetic());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_loop_forwards_in_order() {
        let feed = Arc::new(PriceFeed::new(Client::new(), vec![Box::new(MockSource::ok("primary", 2500.0))]));
        let (tx, mut rx) = mpsc::channel(16);
        let task = tokio::spawn(run_price_feed(feed, Duration::from_millis(3000), tx));

        let mut last_ts = i64::MIN;
        for _ in 0..3 {
            match rx.recv().await {
                Some(EngineEvent::Price(q)) => {
                    assert_eq!(q.price, 2500.0);
                    assert!(q.timestamp_ms >= last_ts);
                    last_ts = q.timestamp_ms;
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_source_becomes_fetch_failed() {
        let feed = Arc::new(PriceFeed::new(Client::new(), vec![Box::new(PanickingSource)]));
        let (tx, mut rx) = mpsc::channel(4);
        let task = tokio::spawn(run_price_feed(feed, Duration::from_millis(3000), tx));

        match rx.recv().await {
            Some(EngineEvent::FetchFailed { reason }) => assert!(reason.contains("panic"), "{reason}"),
            other => panic!("unexpected event {other:?}"),
        }
        task.abort();
    }
}
