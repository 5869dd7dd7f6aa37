use async_trait::async_trait;
use dashmap::DashMap;

use scan_core::{
    BookSnapshot, Candle, FundingPoint, LsPoint, MarketSource, OiPoint, ScanError, TickerPoint,
};

/// An in-memory `MarketSource` test double. Every fetch returns whatever was
/// last set via the `set_*` methods, or the documented "absent" value
/// (`None`/empty `Vec`) if nothing was set for that symbol — the scheduler
/// and signal evaluators are exercised against this rather than a live
/// exchange in unit and integration tests.
#[derive(Default)]
pub struct MockMarketSource {
    name: String,
    symbols: Vec<String>,
    candles: DashMap<String, Vec<Candle>>,
    tickers: DashMap<String, TickerPoint>,
    oi: DashMap<String, OiPoint>,
    funding: DashMap<String, FundingPoint>,
    books: DashMap<String, BookSnapshot>,
    ls: DashMap<String, LsPoint>,
}

impl MockMarketSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_symbols(mut self, symbols: Vec<String>) -> Self {
        self.symbols = symbols;
        self
    }

    pub fn set_candles(&self, symbol: &str, candles: Vec<Candle>) {
        self.candles.insert(symbol.to_string(), candles);
    }

    pub fn set_ticker(&self, symbol: &str, ticker: TickerPoint) {
        self.tickers.insert(symbol.to_string(), ticker);
    }

    pub fn set_oi(&self, symbol: &str, oi: OiPoint) {
        self.oi.insert(symbol.to_string(), oi);
    }

    pub fn set_funding(&self, symbol: &str, funding: FundingPoint) {
        self.funding.insert(symbol.to_string(), funding);
    }

    pub fn set_book(&self, symbol: &str, book: BookSnapshot) {
        self.books.insert(symbol.to_string(), book);
    }

    pub fn set_ls_ratio(&self, symbol: &str, ls: LsPoint) {
        self.ls.insert(symbol.to_string(), ls);
    }
}

#[async_trait]
impl MarketSource for MockMarketSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_futures_symbols(&self) -> Result<Vec<String>, ScanError> {
        Ok(self.symbols.clone())
    }

    async fn fetch_candles(&self, symbol: &str, limit: usize) -> Result<Vec<Candle>, ScanError> {
        Ok(self
            .candles
            .get(symbol)
            .map(|v| {
                let all = v.value();
                let start = all.len().saturating_sub(limit);
                all[start..].to_vec()
            })
            .unwrap_or_default())
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Option<TickerPoint>, ScanError> {
        Ok(self.tickers.get(symbol).map(|v| v.value().clone()))
    }

    async fn fetch_oi(&self, symbol: &str) -> Result<Option<OiPoint>, ScanError> {
        Ok(self.oi.get(symbol).map(|v| v.value().clone()))
    }

    async fn fetch_funding(&self, symbol: &str) -> Result<Option<FundingPoint>, ScanError> {
        Ok(self.funding.get(symbol).map(|v| v.value().clone()))
    }

    async fn fetch_book(&self, symbol: &str, _depth: usize) -> Result<Option<BookSnapshot>, ScanError> {
        Ok(self.books.get(symbol).map(|v| v.value().clone()))
    }

    async fn fetch_ls_ratio(&self, symbol: &str) -> Result<Option<LsPoint>, ScanError> {
        Ok(self.ls.get(symbol).map(|v| v.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_symbol_reports_absent_not_zero() {
        let source = MockMarketSource::new("mock-exchange");
        assert!(source.fetch_ticker("NOPE").await.unwrap().is_none());
        assert!(source.fetch_candles("NOPE", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn set_candles_trims_to_limit() {
        let source = MockMarketSource::new("mock-exchange");
        let candles: Vec<Candle> = (0..10)
            .map(|i| Candle {
                t: i,
                o: 1.0,
                h: 1.0,
                l: 1.0,
                c: 1.0,
                v: 1.0,
            })
            .collect();
        source.set_candles("BTCUSDT", candles);
        let fetched = source.fetch_candles("BTCUSDT", 3).await.unwrap();
        assert_eq!(fetched.len(), 3);
        assert_eq!(fetched.last().unwrap().t, 9);
    }
}
