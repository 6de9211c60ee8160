//! Venue REST history download.
//!
//! Pulls futures klines and funding prints for both legs and writes them as a
//! JSON-lines feed. Binance serves `BIDUSDT`, Gate serves `BID_USDT`.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use reqwest::{Client as HttpClient, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{Config, HistoryConfig};
use crate::domain::Leg;
use crate::exchanges::utils::venue_symbol;

use super::{FeedError, FeedRecord, write_records};

/// Binance USDT-margined futures API.
const BINANCE_FUTURES_URL: &str = "https://fapi.binance.com";

/// Gate v4 API.
const GATE_API_URL: &str = "https://api.gateio.ws/api/v4";

/// HTTP request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest funding page either venue serves.
const FUNDING_PAGE_LIMIT: u32 = 1000;

/// Venues with a history source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Venue {
    Binance,
    Gate,
}

impl Venue {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "binance" => Some(Venue::Binance),
            "gate" | "gateio" | "gate.io" => Some(Venue::Gate),
            _ => None,
        }
    }
}

impl std::fmt::Display for Venue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Venue::Binance => write!(f, "binance"),
            Venue::Gate => write!(f, "gate"),
        }
    }
}

/// Error body returned by a venue.
#[derive(Debug, Error)]
#[error("{venue} api error {code}: {message}")]
pub struct ApiError {
    pub venue: Venue,
    pub code: String,
    pub message: String,
}

/// History download errors.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("no history source for venue {0}")]
    UnsupportedVenue(String),

    #[error("malformed {venue} response: {reason}")]
    Malformed { venue: Venue, reason: String },

    #[error("invalid history window: {0}")]
    Window(String),

    #[error(transparent)]
    Feed(#[from] FeedError),
}

pub type Result<T> = std::result::Result<T, HistoryError>;

/// Bar-aligned time range of one download. `end` is exclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryWindow {
    /// Interval in venue notation.
    pub interval: String,
    pub bar: Duration,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub limit: u32,
}

impl HistoryWindow {
    /// Builds the window from config. Without a start it ends at the bar
    /// containing `now`.
    pub fn from_config(cfg: &HistoryConfig, now: DateTime<Utc>) -> Result<Self> {
        let bar = cfg
            .bar_interval()
            .ok_or_else(|| HistoryError::Window(format!("bad interval {:?}", cfg.interval)))?;
        let span = bar
            .checked_mul(cfg.limit)
            .and_then(|d| TimeDelta::from_std(d).ok())
            .ok_or_else(|| HistoryError::Window("span out of range".into()))?;

        let start = match cfg.start {
            Some(start) => start,
            None => now
                .checked_sub_signed(span)
                .ok_or_else(|| HistoryError::Window("start out of range".into()))?,
        };
        let start = align_to_bar(start, bar);
        let end = start
            .checked_add_signed(span)
            .ok_or_else(|| HistoryError::Window("end out of range".into()))?;

        Ok(Self {
            interval: cfg.interval.clone(),
            bar,
            start,
            end,
            limit: cfg.limit,
        })
    }

    fn contains(&self, time: DateTime<Utc>) -> bool {
        time >= self.start && time < self.end
    }
}

/// Floors a timestamp to the open of its bar.
fn align_to_bar(time: DateTime<Utc>, bar: Duration) -> DateTime<Utc> {
    let step = i64::try_from(bar.as_millis()).unwrap_or(i64::MAX);
    if step <= 1 {
        return time;
    }
    let ms = time.timestamp_millis();
    DateTime::from_timestamp_millis(ms - ms.rem_euclid(step)).unwrap_or(time)
}

/// REST client for venue history.
pub struct HistoryClient {
    http_client: HttpClient,
    binance_url: String,
    gate_url: String,
}

impl HistoryClient {
    pub fn new() -> Result<Self> {
        let http_client = HttpClient::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http_client,
            binance_url: BINANCE_FUTURES_URL.to_string(),
            gate_url: GATE_API_URL.to_string(),
        })
    }

    async fn get(&self, venue: Venue, url: &str, params: &[(&str, String)]) -> Result<Vec<u8>> {
        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let url = if query.is_empty() {
            url.to_string()
        } else {
            format!("{}?{}", url, query)
        };

        debug!(venue = %venue, url = %url, "sending history request");

        let response = self.http_client.get(&url).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if status.is_client_error() || status.is_server_error() {
            return Err(parse_error_response(venue, status, &body));
        }

        Ok(body.to_vec())
    }

    /// Downloads bars and funding for one leg, restricted to the window.
    pub async fn fetch_leg(
        &self,
        leg: Leg,
        venue_name: &str,
        symbol: &str,
        window: &HistoryWindow,
    ) -> Result<Vec<FeedRecord>> {
        let venue = Venue::from_name(venue_name)
            .ok_or_else(|| HistoryError::UnsupportedVenue(venue_name.to_string()))?;
        let contract = venue_symbol(venue_name, symbol);
        let start_ms = window.start.timestamp_millis();
        let end_ms = window.end.timestamp_millis() - 1;
        let funding_limit = window.limit.min(FUNDING_PAGE_LIMIT).to_string();

        let mut records = match venue {
            Venue::Binance => {
                let url = format!("{}/fapi/v1/klines", self.binance_url);
                let body = self
                    .get(
                        venue,
                        &url,
                        &[
                            ("symbol", contract.clone()),
                            ("interval", window.interval.clone()),
                            ("startTime", start_ms.to_string()),
                            ("endTime", end_ms.to_string()),
                            ("limit", window.limit.to_string()),
                        ],
                    )
                    .await?;
                let mut records = parse_binance_klines(leg, &body)?;

                let url = format!("{}/fapi/v1/fundingRate", self.binance_url);
                let body = self
                    .get(
                        venue,
                        &url,
                        &[
                            ("symbol", contract.clone()),
                            ("startTime", start_ms.to_string()),
                            ("endTime", end_ms.to_string()),
                            ("limit", funding_limit),
                        ],
                    )
                    .await?;
                records.extend(parse_binance_funding(leg, &body, window.bar)?);
                records
            }
            Venue::Gate => {
                let url = format!("{}/futures/usdt/candlesticks", self.gate_url);
                let body = self
                    .get(
                        venue,
                        &url,
                        &[
                            ("contract", contract.clone()),
                            ("from", window.start.timestamp().to_string()),
                            ("to", (window.end.timestamp() - 1).to_string()),
                            ("interval", window.interval.clone()),
                        ],
                    )
                    .await?;
                let mut records = parse_gate_candles(leg, &body)?;

                // Gate pages funding by count only; out-of-window prints are
                // dropped below.
                let url = format!("{}/futures/usdt/funding_rate", self.gate_url);
                let body = self
                    .get(
                        venue,
                        &url,
                        &[("contract", contract.clone()), ("limit", funding_limit)],
                    )
                    .await?;
                records.extend(parse_gate_funding(leg, &body, window.bar)?);
                records
            }
        };

        records.retain(|r| window.contains(record_time(r)));
        debug!(
            leg = %leg,
            venue = %venue,
            contract = %contract,
            records = records.len(),
            "Leg history fetched"
        );
        Ok(records)
    }

    /// Downloads both legs. Records are ordered by time, leg A first.
    pub async fn fetch_records(
        &self,
        config: &Config,
        window: &HistoryWindow,
    ) -> Result<Vec<FeedRecord>> {
        let (a, b) = tokio::try_join!(
            self.fetch_leg(Leg::A, &config.legs.a.venue, &config.symbol, window),
            self.fetch_leg(Leg::B, &config.legs.b.venue, &config.symbol, window),
        )?;

        let mut records = a;
        records.extend(b);
        records.sort_by_key(record_time);
        Ok(records)
    }
}

/// Downloads the configured window and writes it to `feed.path`.
///
/// Returns the number of records written.
pub async fn download(config: &Config) -> Result<usize> {
    let window = HistoryWindow::from_config(&config.feed.history, Utc::now())?;
    info!(
        symbol = %config.symbol,
        leg_a = %config.legs.a.venue,
        leg_b = %config.legs.b.venue,
        interval = %window.interval,
        start = %window.start,
        end = %window.end,
        "Downloading history"
    );

    let client = HistoryClient::new()?;
    let records = client.fetch_records(config, &window).await?;
    write_records(&config.feed.path, &records)?;

    info!(path = %config.feed.path, records = records.len(), "History written");
    Ok(records.len())
}

fn record_time(record: &FeedRecord) -> DateTime<Utc> {
    match *record {
        FeedRecord::Bar { time, .. } | FeedRecord::Funding { time, .. } => time,
    }
}

fn malformed(venue: Venue, reason: impl Into<String>) -> HistoryError {
    HistoryError::Malformed {
        venue,
        reason: reason.into(),
    }
}

fn parse_number(venue: Venue, field: &str, raw: &str) -> Result<f64> {
    raw.trim()
        .parse()
        .map_err(|_| malformed(venue, format!("{} is not a number: {:?}", field, raw)))
}

fn millis_to_time(venue: Venue, ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| malformed(venue, format!("timestamp out of range: {}", ms)))
}

fn secs_to_time(venue: Venue, secs: f64) -> Result<DateTime<Utc>> {
    millis_to_time(venue, (secs * 1000.0).round() as i64)
}

/// Parses `/fapi/v1/klines`. Each row is `[openTime, open, high, low, close, ...]`.
pub fn parse_binance_klines(leg: Leg, body: &[u8]) -> Result<Vec<FeedRecord>> {
    let venue = Venue::Binance;
    let rows: Vec<Vec<serde_json::Value>> = serde_json::from_slice(body)?;

    rows.iter()
        .map(|row| {
            let open_ms = row
                .first()
                .and_then(|v| v.as_i64())
                .ok_or_else(|| malformed(venue, "kline without open time"))?;
            let close = row
                .get(4)
                .and_then(|v| v.as_str())
                .ok_or_else(|| malformed(venue, "kline without close"))?;
            Ok(FeedRecord::Bar {
                leg,
                time: millis_to_time(venue, open_ms)?,
                close: parse_number(venue, "close", close)?,
            })
        })
        .collect()
}

/// Parses `/fapi/v1/fundingRate`. Settlement times carry a few ms of jitter,
/// so they are floored to the bar open.
pub fn parse_binance_funding(leg: Leg, body: &[u8], bar: Duration) -> Result<Vec<FeedRecord>> {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct FundingRow {
        funding_time: i64,
        funding_rate: String,
    }

    let venue = Venue::Binance;
    let rows: Vec<FundingRow> = serde_json::from_slice(body)?;
    rows.iter()
        .map(|row| {
            Ok(FeedRecord::Funding {
                leg,
                time: align_to_bar(millis_to_time(venue, row.funding_time)?, bar),
                rate: parse_number(venue, "fundingRate", &row.funding_rate)?,
            })
        })
        .collect()
}

/// Parses `/futures/usdt/candlesticks`. `t` is the bar open in seconds.
pub fn parse_gate_candles(leg: Leg, body: &[u8]) -> Result<Vec<FeedRecord>> {
    #[derive(Deserialize)]
    struct Candle {
        t: f64,
        c: String,
    }

    let venue = Venue::Gate;
    let rows: Vec<Candle> = serde_json::from_slice(body)?;
    rows.iter()
        .map(|row| {
            Ok(FeedRecord::Bar {
                leg,
                time: secs_to_time(venue, row.t)?,
                close: parse_number(venue, "c", &row.c)?,
            })
        })
        .collect()
}

/// Parses `/futures/usdt/funding_rate`.
pub fn parse_gate_funding(leg: Leg, body: &[u8], bar: Duration) -> Result<Vec<FeedRecord>> {
    #[derive(Deserialize)]
    struct FundingRow {
        t: f64,
        r: String,
    }

    let venue = Venue::Gate;
    let rows: Vec<FundingRow> = serde_json::from_slice(body)?;
    rows.iter()
        .map(|row| {
            Ok(FeedRecord::Funding {
                leg,
                time: align_to_bar(secs_to_time(venue, row.t)?, bar),
                rate: parse_number(venue, "r", &row.r)?,
            })
        })
        .collect()
}

/// Builds an ApiError from a Binance `{code, msg}` or Gate `{label, message}` body.
fn parse_error_response(venue: Venue, status: StatusCode, body: &[u8]) -> HistoryError {
    #[derive(Deserialize)]
    struct ErrorResponse {
        code: Option<i64>,
        msg: Option<String>,
        label: Option<String>,
        message: Option<String>,
    }

    let raw = || String::from_utf8_lossy(body).to_string();
    let api_err = match serde_json::from_slice::<ErrorResponse>(body) {
        Ok(resp) => ApiError {
            venue,
            code: resp
                .label
                .or_else(|| resp.code.map(|c| c.to_string()))
                .unwrap_or_else(|| status.as_u16().to_string()),
            message: resp.msg.or(resp.message).unwrap_or_else(raw),
        },
        Err(_) => ApiError {
            venue,
            code: status.as_u16().to_string(),
            message: raw(),
        },
    };

    warn!(venue = %venue, code = %api_err.code, message = %api_err.message, "api error");

    HistoryError::Api(api_err)
}
