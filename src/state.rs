use crate::config::AppConfig;
use crate::feeds::{PriceQuote, QuoteOrigin};
use crate::models::{OptionParams, PricingResult};
use crate::risk::hedge::HedgePosition;
use portable_atomic::{AtomicU64, Ordering};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

// ── Session Phase Machine ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Bootstrapping,
    Polling,
    Stopped,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bootstrapping => write!(f, "bootstrapping"),
            Self::Polling => write!(f, "polling"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

// ── Bounded ring buffer (oldest evicted first) ──

#[derive(Debug, Clone)]
pub struct BoundedBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append, evicting and returning the oldest item when full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[cfg(test)]
    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    /// Oldest first.
    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<T: Clone> BoundedBuffer<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

// ── Buffer entries ──

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PricePoint {
    pub price: f64,
    /// Wall-clock label for the chart axis (HH:MM:SS)
    pub timestamp: String,
    pub timestamp_ms: i64,
    pub origin: QuoteOrigin,
}

impl PricePoint {
    pub fn from_quote(quote: &PriceQuote) -> Self {
        Self {
            price: quote.price,
            timestamp: clock_label(quote.timestamp_ms),
            timestamp_ms: quote.timestamp_ms,
            origin: quote.origin,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warn,
    Action,
    Ai,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warn => write!(f, "WARN"),
            Self::Action => write!(f, "ACTION"),
            Self::Ai => write!(f, "AI"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct LogEntry {
    pub id: String,
    pub timestamp: String,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            timestamp: clock_label(chrono::Utc::now().timestamp_millis()),
            level,
            message: message.into(),
        }
    }
}

fn clock_label(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms)
        .map(|dt| dt.format("%H:%M:%S").to_string())
        .unwrap_or_default()
}

// ── Session state (owned by the engine task, published as snapshots) ──

pub const INITIAL_ANALYSIS: &str = "Initializing Neural Network...";

#[derive(Debug, Clone)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub current_price: f64,
    pub pricing: PricingResult,
    pub hedge: Option<HedgePosition>,
    pub analysis: String,
    pub history: BoundedBuffer<PricePoint>,
    pub logs: BoundedBuffer<LogEntry>,
}

impl SessionState {
    pub fn new(history_capacity: usize, log_capacity: usize) -> Self {
        Self {
            phase: SessionPhase::Bootstrapping,
            current_price: 0.0,
            pricing: PricingResult::default(),
            hedge: None,
            analysis: INITIAL_ANALYSIS.to_string(),
            history: BoundedBuffer::new(history_capacity),
            logs: BoundedBuffer::new(log_capacity),
        }
    }

    /// Append a session log entry and mirror it to tracing.
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) -> LogEntry {
        let entry = LogEntry::new(level, message);
        match level {
            LogLevel::Info => tracing::info!("{}", entry.message),
            LogLevel::Warn => tracing::warn!("{}", entry.message),
            LogLevel::Action => tracing::info!(kind = "action", "{}", entry.message),
            LogLevel::Ai => tracing::info!(kind = "ai", "{}", entry.message),
        }
        self.logs.push(entry.clone());
        entry
    }

    #[inline]
    pub fn hedge_amount(&self) -> Option<f64> {
        self.hedge.map(|h| h.hedge_required)
    }

    pub fn snapshot(&self, config: &AppConfig) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            asset: config.asset_symbol.clone(),
            price: self.current_price,
            params: config.option_params(self.current_price),
            pricing: self.pricing,
            hedge: self.hedge,
            analysis: self.analysis.clone(),
            history: self.history.to_vec(),
            logs: self.logs.to_vec(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub asset: String,
    pub price: f64,
    pub params: OptionParams,
    pub pricing: PricingResult,
    pub hedge: Option<HedgePosition>,
    pub analysis: String,
    pub history: Vec<PricePoint>,
    pub logs: Vec<LogEntry>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        let config = AppConfig::default();
        SessionState::new(config.history_capacity, config.log_capacity).snapshot(&config)
    }
}

// ── Messages INTO the engine (bounded channel) ──

#[derive(Debug, Clone)]
pub enum EngineEvent {
    Price(PriceQuote),
    /// The fetch task itself failed; the tick is skipped.
    FetchFailed { reason: String },
    /// `seq` identifies the armed request; later arms carry larger numbers.
    AnalysisStarted { seq: u64 },
    AnalysisReady { seq: u64, text: String },
    Shutdown,
}

// ── Messages OUT of the engine ──

#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type")]
pub enum WsMessage {
    #[serde(rename = "tick")]
    Tick {
        price: f64,
        origin: QuoteOrigin,
        value: f64,
        delta: f64,
        gamma: f64,
        theta: f64,
        hedge_amount: f64,
        timestamp: String,
    },

    #[serde(rename = "log")]
    Log(LogEntry),

    #[serde(rename = "analysis")]
    Analysis { text: String },

    #[serde(rename = "phase")]
    Phase { phase: SessionPhase },
}

// ── Performance Counters (lock-free) ──

pub struct PerfCounters {
    pub ticks_processed: AtomicU64,
    pub ticks_skipped: AtomicU64,
    pub synthetic_fallbacks: AtomicU64,
    pub analyses_run: AtomicU64,
    pub ws_messages_sent: AtomicU64,
}

impl PerfCounters {
    pub fn new() -> Self {
        Self {
            ticks_processed: AtomicU64::new(0),
            ticks_skipped: AtomicU64::new(0),
            synthetic_fallbacks: AtomicU64::new(0),
            analyses_run: AtomicU64::new(0),
            ws_messages_sent: AtomicU64::new(0),
        }
    }
}

// ── Application shared state (channels, not locks) ──

pub struct AppState {
    pub config: AppConfig,

    // Engine -> Dashboard: latest snapshot (watch = single producer, multi consumer)
    pub snapshot_tx: watch::Sender<SessionSnapshot>,
    pub snapshot_rx: watch::Receiver<SessionSnapshot>,

    // Engine -> Dashboard: event stream (broadcast for WS clients)
    pub ws_tx: broadcast::Sender<WsMessage>,

    pub counters: PerfCounters,
}

impl AppState {
    pub fn new(config: AppConfig) -> Arc<Self> {
        let (ws_tx, _) = broadcast::channel(256);
        let initial = SessionState::new(config.history_capacity, config.log_capacity).snapshot(&config);
        let (snapshot_tx, snapshot_rx) = watch::channel(initial);

        Arc::new(Self {
            config,
            snapshot_tx,
            snapshot_rx,
            ws_tx,
            counters: PerfCounters::new(),
        })
    }

    #[inline]
    pub fn broadcast(&self, msg: WsMessage) {
        self.counters.ws_messages_sent.fetch_add(1, Ordering::Relaxed);
        let _ = self.ws_tx.send(msg);
    }

    #[inline]
    pub fn publish(&self, session: &SessionState) {
        let _ = self.snapshot_tx.send(session.snapshot(&self.config));
    }
}
