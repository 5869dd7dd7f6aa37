use scan_core::{SeriesKind, Store};

/// Whether a symbol's stored history is deep enough to trust incremental
/// (single most-recent-sample) signal evaluation, or needs a full backfill
/// pass first (§4.8 step 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Bootstrap,
    Incremental,
}

pub async fn assign_mode(store: &dyn Store, symbol: &str) -> Result<Mode, scan_core::ScanError> {
    for kind in [
        SeriesKind::Oi,
        SeriesKind::Funding,
        SeriesKind::Ls,
        SeriesKind::Candle,
    ] {
        let count = store.count(symbol, kind).await?;
        if count < kind.bootstrap_floor() {
            return Ok(Mode::Bootstrap);
        }
    }
    Ok(Mode::Incremental)
}
