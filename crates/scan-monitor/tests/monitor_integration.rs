use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use scan_core::{Alert, CycleReport, MarketSource, ScanError, TickerPoint};
use scan_market_source::MockMarketSource;
use scan_monitor::TradeMonitor;
use scan_store::{ScanDb, ScanStore};

#[derive(Default)]
struct RecordingAlerter {
    notices: AtomicUsize,
}

#[async_trait]
impl scan_core::Alerter for RecordingAlerter {
    async fn send_alert(&self, _alert: &Alert) -> Result<(), ScanError> {
        Ok(())
    }
    async fn send_cycle_report(&self, _report: &CycleReport) -> Result<(), ScanError> {
        Ok(())
    }
    async fn send_operator_notice(&self, _message: &str) -> Result<(), ScanError> {
        self.notices.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn ticker(price: f64) -> TickerPoint {
    TickerPoint {
        t: 0,
        price,
        vol24: 1000.0,
        bid: price * 0.999,
        ask: price * 1.001,
        per_exchange: Default::default(),
    }
}

#[tokio::test]
async fn stop_hit_closes_the_trade() {
    let db = ScanDb::new("sqlite::memory:").await.unwrap();
    let store: Arc<dyn scan_core::Store> = Arc::new(ScanStore::new(db));
    let alerter = Arc::new(RecordingAlerter::default());
    let source = MockMarketSource::new("mock-exchange");
    source.set_ticker("DROPUSDT", ticker(0.90));
    let sources: Vec<Arc<dyn MarketSource>> = vec![Arc::new(source)];

    let monitor = TradeMonitor::new(store.clone(), sources, alerter.clone() as Arc<dyn scan_core::Alerter>);
    monitor.register_trade("DROPUSDT", 1.0, 5_000.0, 0.05, 60.0).await.unwrap();

    let events = monitor.tick().await.unwrap();
    assert!(events.iter().any(|e| matches!(e, scan_monitor::MonitorEvent::StopHit { .. })));
    assert!(store.get_trade("DROPUSDT").await.unwrap().is_none());
}

#[tokio::test]
async fn trail_moves_stop_up_and_never_back_down() {
    let db = ScanDb::new("sqlite::memory:").await.unwrap();
    let store: Arc<dyn scan_core::Store> = Arc::new(ScanStore::new(db));
    let alerter = Arc::new(RecordingAlerter::default());
    let source = Arc::new(MockMarketSource::new("mock-exchange"));
    source.set_ticker("RUNUSDT", ticker(1.12));
    let sources: Vec<Arc<dyn MarketSource>> = vec![source.clone()];

    let monitor = TradeMonitor::new(store.clone(), sources, alerter as Arc<dyn scan_core::Alerter>);
    monitor.register_trade("RUNUSDT", 1.0, 5_000.0, 0.05, 60.0).await.unwrap();

    monitor.tick().await.unwrap();
    let after_run = store.get_trade("RUNUSDT").await.unwrap().unwrap();
    assert!(after_run.stop > 0.95);

    source.set_ticker("RUNUSDT", ticker(1.01));
    monitor.tick().await.unwrap();
    let after_pullback = store.get_trade("RUNUSDT").await.unwrap().unwrap();
    assert_eq!(after_pullback.stop, after_run.stop);
}

#[tokio::test]
async fn take_profit_is_marked_hit_without_closing_the_trade() {
    let db = ScanDb::new("sqlite::memory:").await.unwrap();
    let store: Arc<dyn scan_core::Store> = Arc::new(ScanStore::new(db));
    let alerter = Arc::new(RecordingAlerter::default());
    let source = Arc::new(MockMarketSource::new("mock-exchange"));
    source.set_ticker("TPUSDT", ticker(1.035));
    let sources: Vec<Arc<dyn MarketSource>> = vec![source.clone()];

    let monitor = TradeMonitor::new(store.clone(), sources, alerter.clone() as Arc<dyn scan_core::Alerter>);
    monitor.register_trade("TPUSDT", 1.0, 5_000.0, 0.05, 60.0).await.unwrap();

    let events = monitor.tick().await.unwrap();
    assert!(events
        .iter()
        .any(|e| matches!(e, scan_monitor::MonitorEvent::TakeProfitHit { index: 0, .. })));

    let trade = store.get_trade("TPUSDT").await.unwrap().unwrap();
    assert_eq!(trade.state, scan_core::TradeState::Open);
    assert!(trade.tps_hit[0]);
    assert!(!trade.tps_hit[1]);
    assert!(alerter.notices.load(Ordering::SeqCst) >= 1);

    // Ticking again at the same price must not re-fire the same take-profit.
    let events_again = monitor.tick().await.unwrap();
    assert!(!events_again
        .iter()
        .any(|e| matches!(e, scan_monitor::MonitorEvent::TakeProfitHit { index: 0, .. })));
}

#[tokio::test]
async fn degradation_warning_fires_once_per_threshold() {
    let db = ScanDb::new("sqlite::memory:").await.unwrap();
    let store: Arc<dyn scan_core::Store> = Arc::new(ScanStore::new(db));
    let alerter = Arc::new(RecordingAlerter::default());
    let source = Arc::new(MockMarketSource::new("mock-exchange"));
    source.set_ticker("DEGUSDT", ticker(1.02));
    let sources: Vec<Arc<dyn MarketSource>> = vec![source];

    let monitor = TradeMonitor::new(store.clone(), sources, alerter.clone() as Arc<dyn scan_core::Alerter>);
    monitor.register_trade("DEGUSDT", 1.0, 5_000.0, 0.05, 70.0).await.unwrap();

    let mut declined_result = make_scan_result("DEGUSDT", 55.0);
    store.push_scan_result(declined_result.clone()).await.unwrap();

    let events = monitor.tick().await.unwrap();
    assert!(events
        .iter()
        .any(|e| matches!(e, scan_monitor::MonitorEvent::Degradation { .. })));
    let notices_after_first = alerter.notices.load(Ordering::SeqCst);

    // Same decline persists; the DECLINED warning must not fire a second time.
    declined_result.t = declined_result.t + 1;
    store.push_scan_result(declined_result).await.unwrap();
    let events_again = monitor.tick().await.unwrap();
    assert!(!events_again
        .iter()
        .any(|e| matches!(e, scan_monitor::MonitorEvent::Degradation { .. })));
    assert_eq!(alerter.notices.load(Ordering::SeqCst), notices_after_first);
}

fn make_scan_result(symbol: &str, final_score: f64) -> scan_core::ScanResult {
    use scan_core::{Classification, Quality, Signal, SignalKind};

    let signals: [Signal; 9] = SignalKind::ALL.map(|kind| Signal {
        kind,
        score: 0.0,
        raw: 0.0,
        quality: Quality::High,
    });

    scan_core::ScanResult {
        symbol: symbol.to_string(),
        t: 1,
        base_score: final_score,
        final_score,
        classification: Classification::from_score(final_score),
        signals,
        bonuses_applied: Vec::new(),
        penalty_applied: 0.0,
        levels: None,
        quality: Quality::High,
    }
}
