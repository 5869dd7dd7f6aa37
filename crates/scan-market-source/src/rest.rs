use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use serde::Deserialize;

use scan_core::{
    BookLevel, BookSnapshot, Candle, FundingPoint, LsPoint, MarketSource, OiPoint, ScanError,
    TickerPoint,
};

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// HTTP-backed `MarketSource`. One instance per exchange; the rate limiter
/// is shared across every call this instance makes so a burst of per-symbol
/// fetches never exceeds the exchange's published limit.
pub struct RestMarketSource {
    name: String,
    base_url: String,
    client: reqwest::Client,
    limiter: DirectRateLimiter,
    timeout: Duration,
    max_retries: u32,
}

impl RestMarketSource {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, requests_per_second: u32) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(requests_per_second.max(1)).unwrap());
        Self {
            name: name.into(),
            base_url: base_url.into(),
            client: reqwest::Client::new(),
            limiter: RateLimiter::direct(quota),
            timeout: Duration::from_secs(8),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn transient(&self, symbol: &str, detail: impl Into<String>) -> ScanError {
        ScanError::TransientFetch {
            exchange: self.name.clone(),
            symbol: symbol.to_string(),
            detail: detail.into(),
        }
    }

    fn permanent(&self, symbol: &str, detail: impl Into<String>) -> ScanError {
        ScanError::PermanentFetch {
            exchange: self.name.clone(),
            symbol: symbol.to_string(),
            detail: detail.into(),
        }
    }

    /// Waits for a rate-limit slot, issues the request with a hard timeout,
    /// and retries transient failures (timeouts, 5xx, 429) with exponential
    /// backoff up to `max_retries`. `absent_on_404` controls whether a 404
    /// is reported as `Ok(None)` (series that may legitimately not exist
    /// for a symbol) or as a permanent error (endpoints with no absence
    /// representation, e.g. the symbol list); any other 4xx is always
    /// permanent.
    async fn get_raw(&self, symbol: &str, path: &str, absent_on_404: bool) -> Result<Option<reqwest::Response>, ScanError> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0;
        loop {
            self.limiter.until_ready().await;

            let request = self.client.get(&url).timeout(self.timeout).send();
            let result = tokio::time::timeout(self.timeout, request).await;

            match result {
                Ok(Ok(response)) if absent_on_404 && response.status() == reqwest::StatusCode::NOT_FOUND => {
                    return Ok(None);
                }
                Ok(Ok(response)) if response.status().is_success() => return Ok(Some(response)),
                Ok(Ok(response)) if response.status().is_client_error() => {
                    return Err(self.permanent(symbol, format!("http {}", response.status())));
                }
                Ok(Ok(response)) => {
                    if attempt >= self.max_retries {
                        return Err(self.transient(symbol, format!("http {} after {attempt} retries", response.status())));
                    }
                }
                Ok(Err(e)) => {
                    if attempt >= self.max_retries {
                        return Err(self.transient(symbol, e.to_string()));
                    }
                }
                Err(_) => {
                    if attempt >= self.max_retries {
                        return Err(self.transient(symbol, "request timed out"));
                    }
                }
            }

            attempt += 1;
            tokio::time::sleep(Duration::from_millis(200 * 2u64.pow(attempt))).await;
        }
    }

    /// Issues a request where a 4xx always means failure (no absence
    /// representation for this endpoint).
    async fn get(&self, symbol: &str, path: &str) -> Result<reqwest::Response, ScanError> {
        Ok(self
            .get_raw(symbol, path, false)
            .await?
            .expect("get_raw always returns Some when absent_on_404 is false"))
    }

    /// Issues a request where a 404 means "this exchange doesn't have this
    /// series for this symbol" rather than failure (§4.2).
    async fn get_optional(&self, symbol: &str, path: &str) -> Result<Option<reqwest::Response>, ScanError> {
        self.get_raw(symbol, path, true).await
    }
}

#[derive(Debug, Deserialize)]
struct CandleDto {
    t: i64,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
}

#[derive(Debug, Deserialize)]
struct TickerDto {
    price: f64,
    vol24: f64,
    bid: f64,
    ask: f64,
}

#[derive(Debug, Deserialize)]
struct OiDto {
    oi_usd: f64,
}

#[derive(Debug, Deserialize)]
struct FundingDto {
    rate: f64,
}

#[derive(Debug, Deserialize)]
struct LsDto {
    ratio: f64,
}

#[derive(Debug, Deserialize)]
struct BookLevelDto {
    price: f64,
    size: f64,
}

#[derive(Debug, Deserialize)]
struct BookDto {
    bids: Vec<BookLevelDto>,
    asks: Vec<BookLevelDto>,
}

#[async_trait]
impl MarketSource for RestMarketSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_futures_symbols(&self) -> Result<Vec<String>, ScanError> {
        let response = self.get("*", "/symbols").await?;
        response
            .json::<Vec<String>>()
            .await
            .map_err(|e| self.transient("*", e.to_string()))
    }

    async fn fetch_candles(&self, symbol: &str, limit: usize) -> Result<Vec<Candle>, ScanError> {
        let path = format!("/candles?symbol={symbol}&interval=1h&limit={limit}");
        let response = self.get(symbol, &path).await?;
        let dtos: Vec<CandleDto> = response
            .json()
            .await
            .map_err(|e| self.transient(symbol, e.to_string()))?;
        Ok(dtos
            .into_iter()
            .map(|d| Candle {
                t: d.t,
                o: d.o,
                h: d.h,
                l: d.l,
                c: d.c,
                v: d.v,
            })
            .collect())
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Option<TickerPoint>, ScanError> {
        let path = format!("/ticker?symbol={symbol}");
        let Some(response) = self.get_optional(symbol, &path).await? else {
            return Ok(None);
        };
        let dto: TickerDto = response
            .json()
            .await
            .map_err(|e| self.transient(symbol, e.to_string()))?;
        Ok(Some(TickerPoint {
            t: now_millis(),
            price: dto.price,
            vol24: dto.vol24,
            bid: dto.bid,
            ask: dto.ask,
            per_exchange: Default::default(),
        }))
    }

    async fn fetch_oi(&self, symbol: &str) -> Result<Option<OiPoint>, ScanError> {
        let path = format!("/open-interest?symbol={symbol}");
        let Some(response) = self.get_optional(symbol, &path).await? else {
            return Ok(None);
        };
        let dto: OiDto = response
            .json()
            .await
            .map_err(|e| self.transient(symbol, e.to_string()))?;
        let mut oi_usd_by_exchange = std::collections::BTreeMap::new();
        oi_usd_by_exchange.insert(self.name.clone(), dto.oi_usd);
        Ok(Some(OiPoint {
            t: now_millis(),
            oi_usd_by_exchange,
        }))
    }

    async fn fetch_funding(&self, symbol: &str) -> Result<Option<FundingPoint>, ScanError> {
        let path = format!("/funding?symbol={symbol}");
        let Some(response) = self.get_optional(symbol, &path).await? else {
            return Ok(None);
        };
        let dto: FundingDto = response
            .json()
            .await
            .map_err(|e| self.transient(symbol, e.to_string()))?;
        let mut rate_by_exchange = std::collections::BTreeMap::new();
        rate_by_exchange.insert(self.name.clone(), dto.rate);
        Ok(Some(FundingPoint {
            t: now_millis(),
            rate_by_exchange,
        }))
    }

    async fn fetch_book(&self, symbol: &str, depth: usize) -> Result<Option<BookSnapshot>, ScanError> {
        let path = format!("/book?symbol={symbol}&depth={depth}");
        let Some(response) = self.get_optional(symbol, &path).await? else {
            return Ok(None);
        };
        let dto: BookDto = response
            .json()
            .await
            .map_err(|e| self.transient(symbol, e.to_string()))?;
        Ok(Some(BookSnapshot {
            t: now_millis(),
            bids: dto
                .bids
                .into_iter()
                .map(|l| BookLevel {
                    price: l.price,
                    size: l.size,
                })
                .collect(),
            asks: dto
                .asks
                .into_iter()
                .map(|l| BookLevel {
                    price: l.price,
                    size: l.size,
                })
                .collect(),
            per_exchange: vec![self.name.clone()],
        }))
    }

    async fn fetch_ls_ratio(&self, symbol: &str) -> Result<Option<LsPoint>, ScanError> {
        let path = format!("/long-short-ratio?symbol={symbol}");
        let Some(response) = self.get_optional(symbol, &path).await? else {
            return Ok(None);
        };
        let dto: LsDto = response
            .json()
            .await
            .map_err(|e| self.transient(symbol, e.to_string()))?;
        let mut ratio_by_exchange = std::collections::BTreeMap::new();
        ratio_by_exchange.insert(self.name.clone(), dto.ratio);
        Ok(Some(LsPoint {
            t: now_millis(),
            ratio_by_exchange,
        }))
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
