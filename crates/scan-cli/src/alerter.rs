use async_trait::async_trait;
use scan_core::{Alert, Alerter, CycleReport, Event, ScanError};

/// `tracing`-based alert sink, grounded on the teacher's Discord digest
/// formatting (`DiscordNotifier::send_message`/`send_daily_report`) but
/// writing to the structured log instead of a webhook. The one concrete
/// `Alerter` wired up by the binary; additional sinks are a trait boundary.
pub struct ConsoleAlerter {
    min_classification: scan_core::Classification,
}

impl ConsoleAlerter {
    pub fn new(min_classification: scan_core::Classification) -> Self {
        Self { min_classification }
    }
}

#[async_trait]
impl Alerter for ConsoleAlerter {
    async fn send_alert(&self, alert: &Alert) -> Result<(), ScanError> {
        if alert.classification.rank() < self.min_classification.rank() {
            return Ok(());
        }

        let bonuses: Vec<&str> = alert.bonuses.iter().map(|b| b.label()).collect();
        let events: Vec<String> = alert.events.iter().map(describe_event).collect();

        tracing::info!(
            symbol = %alert.symbol,
            classification = alert.classification.label(),
            score = format!("{:.1}", alert.score),
            quality = alert.quality.label(),
            bonuses = bonuses.join(","),
            penalty = alert.penalty,
            events = events.join(" | "),
            "ALERT",
        );

        if let Some(levels) = &alert.levels {
            if alert.classification.rank() >= scan_core::Classification::HighAlert.rank() {
                tracing::info!(
                    symbol = %alert.symbol,
                    stop = format!("{:.6}", levels.stop),
                    stop_method = levels.stop_method.label(),
                    entry_ideal = format!("{:.6}", levels.entry.ideal),
                    risk_reward = format!("{:.2}", levels.risk_reward),
                    position_size_usd = format!("{:.2}", levels.position_size_usd),
                    "LEVELS",
                );
            } else {
                tracing::info!(
                    symbol = %alert.symbol,
                    entry_low = format!("{:.6}", levels.entry.low),
                    entry_high = format!("{:.6}", levels.entry.high),
                    "ENTRY_BAND",
                );
            }
        }

        for signal in &alert.signals {
            tracing::debug!(
                symbol = %alert.symbol,
                signal = signal.kind.label(),
                score = format!("{:.1}", signal.score),
                quality = signal.quality.label(),
                "signal",
            );
        }

        Ok(())
    }

    async fn send_cycle_report(&self, report: &CycleReport) -> Result<(), ScanError> {
        tracing::info!(
            symbols_total = report.symbols_total,
            symbols_bootstrap = report.symbols_bootstrap,
            symbols_degraded = report.symbols_degraded,
            elapsed_ms = report.elapsed_ms,
            classifications = ?report.classifications,
            "CYCLE_REPORT",
        );
        Ok(())
    }

    async fn send_operator_notice(&self, message: &str) -> Result<(), ScanError> {
        tracing::warn!(message, "OPERATOR_NOTICE");
        Ok(())
    }
}

fn describe_event(event: &Event) -> String {
    match event {
        Event::ScoreJump { delta } => format!("SCORE_JUMP(+{delta:.1})"),
        Event::Upgrade { from, to } => format!("UPGRADE({}->{})", from.label(), to.label()),
        Event::Ignition { return_6h } => format!("IGNITION({:.1}%)", return_6h * 100.0),
    }
}
