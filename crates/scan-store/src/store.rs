use async_trait::async_trait;
use sqlx::Row;

use scan_core::{
    Millis, RegisteredTrade, Sample, ScanError, ScanResult, SeriesKind, Store, TradeState,
};

use crate::db::ScanDb;

fn kind_label(kind: SeriesKind) -> &'static str {
    match kind {
        SeriesKind::Candle => "candle",
        SeriesKind::Oi => "oi",
        SeriesKind::Funding => "funding",
        SeriesKind::Ls => "ls",
        SeriesKind::Ticker => "ticker",
        SeriesKind::Book => "book",
    }
}

/// `scan_core::Store` over an embedded SQLite database. Payloads are stored
/// as JSON text; the schema's job is indexing on `(symbol, kind, t)`, not
/// modeling the payload shape.
pub struct ScanStore {
    db: ScanDb,
}

impl ScanStore {
    pub fn new(db: ScanDb) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Store for ScanStore {
    async fn append(&self, symbol: &str, sample: Sample) -> Result<(), ScanError> {
        let kind = sample.kind();
        let t = sample.t();
        let payload = serde_json::to_string(&sample).map_err(|e| ScanError::Internal(e.to_string()))?;

        sqlx::query(
            "INSERT INTO series (symbol, kind, t, payload) VALUES (?, ?, ?, ?)
             ON CONFLICT(symbol, kind, t) DO UPDATE SET payload = excluded.payload",
        )
        .bind(symbol)
        .bind(kind_label(kind))
        .bind(t)
        .bind(payload)
        .execute(self.db.pool())
        .await
        .map_err(|e| ScanError::StoreIO(e.to_string()))?;

        Ok(())
    }

    async fn range(
        &self,
        symbol: &str,
        kind: SeriesKind,
        t_from: Millis,
        t_to: Millis,
    ) -> Result<Vec<Sample>, ScanError> {
        let rows = sqlx::query(
            "SELECT payload FROM series WHERE symbol = ? AND kind = ? AND t BETWEEN ? AND ? ORDER BY t ASC",
        )
        .bind(symbol)
        .bind(kind_label(kind))
        .bind(t_from)
        .bind(t_to)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| ScanError::StoreIO(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                let payload: String = row.get("payload");
                serde_json::from_str(&payload).map_err(|e| ScanError::StoreCorruption(e.to_string()))
            })
            .collect()
    }

    async fn latest(&self, symbol: &str, kind: SeriesKind, n: usize) -> Result<Vec<Sample>, ScanError> {
        let rows = sqlx::query("SELECT payload FROM series WHERE symbol = ? AND kind = ? ORDER BY t DESC LIMIT ?")
            .bind(symbol)
            .bind(kind_label(kind))
            .bind(n as i64)
            .fetch_all(self.db.pool())
            .await
            .map_err(|e| ScanError::StoreIO(e.to_string()))?;

        let mut samples: Vec<Sample> = rows
            .into_iter()
            .map(|row| {
                let payload: String = row.get("payload");
                serde_json::from_str(&payload).map_err(|e| ScanError::StoreCorruption(e.to_string()))
            })
            .collect::<Result<_, _>>()?;
        samples.reverse();
        Ok(samples)
    }

    async fn count(&self, symbol: &str, kind: SeriesKind) -> Result<usize, ScanError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM series WHERE symbol = ? AND kind = ?")
            .bind(symbol)
            .bind(kind_label(kind))
            .fetch_one(self.db.pool())
            .await
            .map_err(|e| ScanError::StoreIO(e.to_string()))?;
        let n: i64 = row.get("n");
        Ok(n as usize)
    }

    async fn push_scan_result(&self, result: ScanResult) -> Result<(), ScanError> {
        let payload = serde_json::to_string(&result).map_err(|e| ScanError::Internal(e.to_string()))?;
        sqlx::query(
            "INSERT INTO scan_results (symbol, t, payload) VALUES (?, ?, ?)
             ON CONFLICT(symbol, t) DO UPDATE SET payload = excluded.payload",
        )
        .bind(&result.symbol)
        .bind(result.t)
        .bind(payload)
        .execute(self.db.pool())
        .await
        .map_err(|e| ScanError::StoreIO(e.to_string()))?;
        Ok(())
    }

    async fn recent_scan_results(&self, symbol: &str, n: usize) -> Result<Vec<ScanResult>, ScanError> {
        let rows = sqlx::query("SELECT payload FROM scan_results WHERE symbol = ? ORDER BY t DESC LIMIT ?")
            .bind(symbol)
            .bind(n as i64)
            .fetch_all(self.db.pool())
            .await
            .map_err(|e| ScanError::StoreIO(e.to_string()))?;

        let mut results: Vec<ScanResult> = rows
            .into_iter()
            .map(|row| {
                let payload: String = row.get("payload");
                serde_json::from_str(&payload).map_err(|e| ScanError::StoreCorruption(e.to_string()))
            })
            .collect::<Result<_, _>>()?;
        results.reverse();
        Ok(results)
    }

    async fn upsert_trade(&self, trade: &RegisteredTrade) -> Result<(), ScanError> {
        let state = match trade.state {
            TradeState::Open => "open",
            TradeState::Closed => "closed",
        };
        let payload = serde_json::to_string(trade).map_err(|e| ScanError::Internal(e.to_string()))?;
        sqlx::query(
            "INSERT INTO trades (symbol, payload, state) VALUES (?, ?, ?)
             ON CONFLICT(symbol) DO UPDATE SET payload = excluded.payload, state = excluded.state",
        )
        .bind(&trade.symbol)
        .bind(payload)
        .bind(state)
        .execute(self.db.pool())
        .await
        .map_err(|e| ScanError::StoreIO(e.to_string()))?;
        Ok(())
    }

    async fn get_trade(&self, symbol: &str) -> Result<Option<RegisteredTrade>, ScanError> {
        let row = sqlx::query("SELECT payload FROM trades WHERE symbol = ?")
            .bind(symbol)
            .fetch_optional(self.db.pool())
            .await
            .map_err(|e| ScanError::StoreIO(e.to_string()))?;

        row.map(|row| {
            let payload: String = row.get("payload");
            serde_json::from_str(&payload).map_err(|e| ScanError::StoreCorruption(e.to_string()))
        })
        .transpose()
    }

    async fn all_open_trades(&self) -> Result<Vec<RegisteredTrade>, ScanError> {
        let rows = sqlx::query("SELECT payload FROM trades WHERE state = 'open'")
            .fetch_all(self.db.pool())
            .await
            .map_err(|e| ScanError::StoreIO(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                let payload: String = row.get("payload");
                serde_json::from_str(&payload).map_err(|e| ScanError::StoreCorruption(e.to_string()))
            })
            .collect()
    }

    async fn close_trade(&self, symbol: &str) -> Result<(), ScanError> {
        let Some(mut trade) = self.get_trade(symbol).await? else {
            return Ok(());
        };
        trade.state = TradeState::Closed;
        self.upsert_trade(&trade).await
    }

    async fn purge_older_than(&self, cutoff: Millis) -> Result<u64, ScanError> {
        let series_deleted = sqlx::query("DELETE FROM series WHERE t < ?")
            .bind(cutoff)
            .execute(self.db.pool())
            .await
            .map_err(|e| ScanError::StoreIO(e.to_string()))?
            .rows_affected();

        let results_deleted = sqlx::query("DELETE FROM scan_results WHERE t < ?")
            .bind(cutoff)
            .execute(self.db.pool())
            .await
            .map_err(|e| ScanError::StoreIO(e.to_string()))?
            .rows_affected();

        Ok(series_deleted + results_deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_core::{Candle, Quality};

    async fn memory_store() -> ScanStore {
        let db = ScanDb::new("sqlite::memory:").await.unwrap();
        ScanStore::new(db)
    }

    #[tokio::test]
    async fn append_is_idempotent_on_t() {
        let store = memory_store().await;
        let candle = Candle {
            t: 1_000,
            o: 1.0,
            h: 1.1,
            l: 0.9,
            c: 1.05,
            v: 10.0,
        };
        store.append("BTCUSDT", Sample::Candle(candle)).await.unwrap();
        let mut updated = candle;
        updated.c = 1.20;
        store.append("BTCUSDT", Sample::Candle(updated)).await.unwrap();

        assert_eq!(store.count("BTCUSDT", SeriesKind::Candle).await.unwrap(), 1);
        let latest = store.latest("BTCUSDT", SeriesKind::Candle, 1).await.unwrap();
        match &latest[0] {
            Sample::Candle(c) => assert!((c.c - 1.20).abs() < 1e-9),
            _ => panic!("expected candle"),
        }
    }

    #[tokio::test]
    async fn range_returns_ascending_slice() {
        let store = memory_store().await;
        for t in [100, 300, 200] {
            store
                .append(
                    "ETHUSDT",
                    Sample::Candle(Candle {
                        t,
                        o: 1.0,
                        h: 1.0,
                        l: 1.0,
                        c: 1.0,
                        v: 1.0,
                    }),
                )
                .await
                .unwrap();
        }
        let samples = store.range("ETHUSDT", SeriesKind::Candle, 0, 1_000).await.unwrap();
        let ts: Vec<Millis> = samples.iter().map(|s| s.t()).collect();
        assert_eq!(ts, vec![100, 200, 300]);
    }

    #[tokio::test]
    async fn trade_lifecycle_round_trips() {
        let store = memory_store().await;
        let trade = RegisteredTrade {
            symbol: "SOLUSDT".into(),
            entry: 100.0,
            size_usd: 1_000.0,
            stop: 95.0,
            tps: [103.0, 106.0, 110.0, 0.0],
            tps_hit: [false; 4],
            state: TradeState::Open,
            opened_at: chrono::Utc::now(),
            trail_stage: 0,
            opened_final_score: 70.0,
            degradation_warned_at: None,
        };
        store.upsert_trade(&trade).await.unwrap();
        assert_eq!(store.all_open_trades().await.unwrap().len(), 1);

        store.close_trade("SOLUSDT").await.unwrap();
        assert!(store.all_open_trades().await.unwrap().is_empty());
        let fetched = store.get_trade("SOLUSDT").await.unwrap().unwrap();
        assert_eq!(fetched.state, TradeState::Closed);
    }

    #[tokio::test]
    async fn scan_result_history_is_queryable() {
        let store = memory_store().await;
        for (t, score) in [(1, 40.0), (2, 55.0), (3, 73.0)] {
            let signals = scan_core::SignalKind::ALL.map(|kind| scan_core::Signal {
                kind,
                score: 0.0,
                raw: 0.0,
                quality: Quality::High,
            });
            let result = ScanResult {
                symbol: "ADAUSDT".into(),
                t,
                base_score: score,
                final_score: score,
                classification: scan_core::Classification::from_score(score),
                signals,
                bonuses_applied: vec![],
                penalty_applied: false,
                levels: None,
                quality: Quality::High,
            };
            store.push_scan_result(result).await.unwrap();
        }
        let recent = store.recent_scan_results("ADAUSDT", 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].t, 2);
        assert_eq!(recent[1].t, 3);
    }
}
