use crate::analyst::debounce::Debouncer;
use crate::analyst::{self, RiskAnalyst, RiskInput};
use crate::config::AppConfig;
use crate::errors::{EngineError, EngineResult};
use crate::feeds::{self, PriceFeed, PriceQuote};
use crate::models::black_scholes::BlackScholesCall;
use crate::models::PricingModel;
use crate::risk::hedge::{HedgePosition, Rebalance};
use crate::state::*;
use portable_atomic::Ordering;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Tick orchestrator. Owns the session state; the only writer of it.
/// Consumers read snapshots from the watch channel in `AppState`.
pub struct Engine {
    app: Arc<AppState>,
    model: Box<dyn PricingModel>,
    analyst: Arc<dyn RiskAnalyst>,
    session: SessionState,
    debouncer: Debouncer,
    /// Sequence number of the most recently armed analysis.
    analysis_armed: u64,
    /// Sequence number of the analysis currently on display.
    analysis_shown: u64,
    events_tx: mpsc::Sender<EngineEvent>,
    rng: StdRng,
}

impl Engine {
    pub fn new(
        app: Arc<AppState>,
        analyst: Arc<dyn RiskAnalyst>,
        events_tx: mpsc::Sender<EngineEvent>,
    ) -> Self {
        let config = &app.config;
        Self {
            session: SessionState::new(config.history_capacity, config.log_capacity),
            debouncer: Debouncer::new(Duration::from_millis(config.analyst_debounce_ms)),
            analysis_armed: 0,
            analysis_shown: 0,
            model: Box::new(BlackScholesCall),
            analyst,
            events_tx,
            rng: StdRng::from_entropy(),
            app,
        }
    }

    #[inline]
    fn config(&self) -> &AppConfig {
        &self.app.config
    }

    /// Bootstrap, then poll until `Shutdown`. Cancels the feed task and any
    /// pending analysis before returning.
    pub async fn run(mut self, feed: Arc<PriceFeed>, mut rx: mpsc::Receiver<EngineEvent>) {
        tracing::info!(model = self.model.name(), analyst = self.analyst.name(), "engine task started");

        self.bootstrap().await;

        let poll_interval = Duration::from_millis(self.config().poll_interval_ms);
        let feed_task = tokio::spawn(feeds::run_price_feed(feed, poll_interval, self.events_tx.clone()));

        while let Some(event) = rx.recv().await {
            if !self.handle(event) {
                break;
            }
        }

        feed_task.abort();
        let _ = feed_task.await;
        self.teardown();

        tracing::info!("engine task shutting down");
    }

    /// Cosmetic start-up sequence with fixed delays. Always ends in Polling.
    async fn bootstrap(&mut self) {
        self.set_phase(SessionPhase::Bootstrapping);
        let step = Duration::from_millis(self.config().bootstrap_step_ms);

        let steps = [
            "Initializing Physics-Informed Neural Network (PINN)...".to_string(),
            format!(
                "Loading parameters: K={}, σ={}, r={}",
                self.config().strike,
                self.config().volatility,
                self.config().risk_free_rate
            ),
            "Connecting to Binance Public API...".to_string(),
        ];

        for message in steps {
            self.log(LogLevel::Info, message);
            self.app.publish(&self.session);
            tokio::time::sleep(step).await;
        }

        self.set_phase(SessionPhase::Polling);
    }

    /// Apply one event. Returns false when the engine should stop.
    pub fn handle(&mut self, event: EngineEvent) -> bool {
        match event {
            EngineEvent::Price(quote) => self.on_quote(quote),

            EngineEvent::FetchFailed { reason } => {
                tracing::warn!(%reason, "price fetch task failed");
                self.app.counters.ticks_skipped.fetch_add(1, Ordering::Relaxed);
                self.log(LogLevel::Warn, "Data fetch failed, retrying...");
                self.app.publish(&self.session);
            }

            EngineEvent::AnalysisStarted { seq } => {
                tracing::debug!(seq, "analysis started");
                self.app.counters.analyses_run.fetch_add(1, Ordering::Relaxed);
                self.log(LogLevel::Ai, "Analyzing market structure...");
                self.app.publish(&self.session);
            }

            EngineEvent::AnalysisReady { seq, text } => {
                // A slow request can land after a newer one; keep the newer text.
                if seq < self.analysis_shown {
                    tracing::debug!(seq, shown = self.analysis_shown, "stale analysis dropped");
                    return true;
                }
                self.analysis_shown = seq;
                self.session.analysis = text.clone();
                self.app.broadcast(WsMessage::Analysis { text });
                self.log(LogLevel::Ai, "Risk report updated.");
                self.app.publish(&self.session);
            }

            EngineEvent::Shutdown => {
                tracing::info!("shutdown event received");
                return false;
            }
        }
        true
    }

    /// One tick: price, hedge, commit, log, maybe re-arm the analyst.
    /// Pricing is validated before anything is written, so a rejected quote
    /// leaves the visible state untouched.
    fn on_quote(&mut self, quote: PriceQuote) {
        let params = self.config().option_params(quote.price);
        let pricing = match self.model.price(&params) {
            Ok(p) => p,
            Err(e) => {
                self.app.counters.ticks_skipped.fetch_add(1, Ordering::Relaxed);
                self.log(LogLevel::Warn, format!("Tick skipped: {e}"));
                self.app.publish(&self.session);
                return;
            }
        };

        let hedge = HedgePosition::new(self.config().position_contracts, pricing.delta);
        let previous_hedge = self.session.hedge_amount();
        tracing::debug!(
            hedge = hedge.hedge_required,
            net_delta = hedge.net_delta(),
            "hedge recomputed"
        );

        // ── Commit ──
        self.app.counters.ticks_processed.fetch_add(1, Ordering::Relaxed);
        let point = PricePoint::from_quote(&quote);
        let timestamp = point.timestamp.clone();
        self.session.current_price = quote.price;
        self.session.history.push(point);
        self.session.pricing = pricing;
        self.session.hedge = Some(hedge);

        if quote.is_synthetic() {
            self.app.counters.synthetic_fallbacks.fetch_add(1, Ordering::Relaxed);
            self.log(LogLevel::Warn, "All price feeds failed. Using simulation data.");
        }

        let asset = self.config().asset_symbol.clone();
        self.log(
            LogLevel::Info,
            format!("Tick: {asset} ${:.2} | Δ: {:.3}", quote.price, pricing.delta),
        );

        // Throttled so the log is not flooded every tick
        let roll: f64 = self.rng.gen();
        if roll < self.config().action_log_probability {
            let rebalance = Rebalance::between(previous_hedge, hedge.hedge_required);
            if rebalance.is_trade() {
                self.log(
                    LogLevel::Action,
                    format!("Rebalancing... {} {:.4} {asset}", rebalance.side, rebalance.quantity),
                );
            }
        }

        self.app.broadcast(WsMessage::Tick {
            price: quote.price,
            origin: quote.origin,
            value: pricing.value,
            delta: pricing.delta,
            gamma: pricing.gamma,
            theta: pricing.theta,
            hedge_amount: hedge.hedge_required,
            timestamp,
        });
        self.app.publish(&self.session);

        let hedge_changed = previous_hedge != Some(hedge.hedge_required);
        if hedge_changed && quote.price > 0.0 && pricing.delta > 0.0 {
            let input = RiskInput::new(self.config(), quote.price, pricing, hedge.hedge_required);
            self.arm_analysis(input);
        }
    }

    /// (Re)start the quiet-period timer; only the last input in a burst is analyzed.
    fn arm_analysis(&mut self, input: RiskInput) {
        self.analysis_armed += 1;
        let seq = self.analysis_armed;
        let analyst = Arc::clone(&self.analyst);
        let tx = self.events_tx.clone();
        self.debouncer.arm(async move {
            if tx.send(EngineEvent::AnalysisStarted { seq }).await.is_err() {
                return;
            }
            let text = analyst::analyze_risk(analyst.as_ref(), &input).await;
            let _ = tx.send(EngineEvent::AnalysisReady { seq, text }).await;
        });
    }

    fn teardown(&mut self) {
        self.debouncer.shutdown();
        self.set_phase(SessionPhase::Stopped);
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        if self.session.phase != phase {
            tracing::info!(from = %self.session.phase, to = %phase, "session phase change");
        }
        self.session.phase = phase;
        self.app.broadcast(WsMessage::Phase { phase });
        self.app.publish(&self.session);
    }

    fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        let entry = self.session.log(level, message);
        self.app.broadcast(WsMessage::Log(entry));
    }
}

/// Running session: the engine task plus its event sender.
pub struct SessionHandle {
    events_tx: mpsc::Sender<EngineEvent>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn spawn(app: Arc<AppState>, feed: Arc<PriceFeed>, analyst: Arc<dyn RiskAnalyst>) -> Self {
        let (events_tx, events_rx) = mpsc::channel::<EngineEvent>(EVENT_CHANNEL_CAPACITY);
        let engine = Engine::new(app, analyst, events_tx.clone());
        let task = tokio::spawn(engine.run(feed, events_rx));
        Self { events_tx, task }
    }

    /// Stop polling, cancel pending analysis and wait for the engine to exit.
    pub async fn shutdown(self) -> EngineResult<()> {
        let sent = self.events_tx.send(EngineEvent::Shutdown).await;
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "engine task ended abnormally");
        }
        sent.map_err(|_| EngineError::ChannelClosed("engine already stopped".into()))
    }
}
