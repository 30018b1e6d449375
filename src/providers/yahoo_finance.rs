use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::util::{RetryPolicy, send_with_retry};
use crate::core::cache::Cache;
use crate::core::price::{HistoryProvider, HistoryRequest, PricePoint, PriceSeries};

const RETRY: RetryPolicy = RetryPolicy::new(2, Duration::from_millis(500));

/// Closing price history from the Yahoo Finance chart API.
pub struct YahooHistoryProvider {
    base_url: String,
    cache: Arc<Cache<String, PriceSeries>>,
}

impl YahooHistoryProvider {
    pub fn new(base_url: &str, cache: Arc<Cache<String, PriceSeries>>) -> Self {
        YahooHistoryProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            cache,
        }
    }
}

#[derive(Deserialize, Debug)]
struct YahooChartResponse {
    chart: ChartResult,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    result: Option<Vec<ChartItem>>,
    error: Option<ChartError>,
}

#[derive(Deserialize, Debug)]
struct ChartError {
    code: String,
    description: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ChartItem {
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: Option<Indicators>,
}

#[derive(Deserialize, Debug)]
struct ChartMeta {
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Deserialize, Debug)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
    #[serde(default)]
    adjclose: Vec<AdjClose>,
}

#[derive(Deserialize, Debug)]
struct Quote {
    close: Option<Vec<Option<f64>>>,
}

#[derive(Deserialize, Debug)]
struct AdjClose {
    adjclose: Option<Vec<Option<f64>>>,
}

fn to_unix(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

/// Pairs timestamps with closing prices, preferring adjusted closes.
/// Missing or non-positive prices are skipped, repeated dates keep the last
/// observation.
fn extract_points(item: &ChartItem) -> Vec<PricePoint> {
    let Some(timestamps) = item.timestamp.as_ref() else {
        return Vec::new();
    };
    let closes = item.indicators.as_ref().and_then(|inds| {
        inds.adjclose
            .first()
            .and_then(|a| a.adjclose.as_ref())
            .or_else(|| inds.quote.first().and_then(|q| q.close.as_ref()))
    });
    let Some(closes) = closes else {
        return Vec::new();
    };
    let offset = item.meta.as_ref().map_or(0, |m| m.gmtoffset);

    let mut by_date = BTreeMap::new();
    for (ts, close) in timestamps.iter().zip(closes.iter()) {
        let Some(price) = close.filter(|p| p.is_finite() && *p > 0.0) else {
            continue;
        };
        match DateTime::from_timestamp(ts + offset, 0) {
            Some(dt) => {
                by_date.insert(dt.date_naive(), price);
            }
            None => warn!(timestamp = ts, "Skipping out of range timestamp"),
        }
    }

    by_date
        .into_iter()
        .map(|(date, price)| PricePoint { date, price })
        .collect()
}

#[async_trait]
impl HistoryProvider for YahooHistoryProvider {
    #[instrument(
        name = "YahooHistoryFetch",
        skip(self),
        fields(symbol = %symbol)
    )]
    async fn fetch_history(&self, symbol: &str, request: &HistoryRequest) -> Result<PriceSeries> {
        let interval = request.interval.as_yahoo_code();
        let cache_key = format!("{symbol}:{}:{}:{interval}", request.start, request.end);
        if let Some(cached) = self.cache.get(&cache_key).await {
            return Ok(cached);
        }

        let url = format!(
            "{}/v8/finance/chart/{}?period1={}&period2={}&interval={}&events=div,split",
            self.base_url,
            symbol,
            to_unix(request.start),
            to_unix(request.end),
            interval
        );
        debug!("Requesting price history from {}", url);

        let client = reqwest::Client::builder().user_agent("dcasim/1.0").build()?;
        let response = send_with_retry(RETRY, || client.get(&url).send())
            .await
            .map_err(|e| anyhow!("Request error: {} for symbol: {} URL: {}", e, symbol, url))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for symbol: {}",
                response.status(),
                symbol
            ));
        }

        let text = response.text().await?;
        let data: YahooChartResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse JSON response for {}: {}", symbol, e))?;

        if let Some(err) = &data.chart.error {
            debug!(code = %err.code, description = ?err.description, "Yahoo returned an error");
        }

        let points = data
            .chart
            .result
            .as_ref()
            .and_then(|r| r.first())
            .map(extract_points)
            .unwrap_or_default();
        if points.is_empty() {
            return Err(anyhow!("No price data found for symbol: {}", symbol));
        }
        debug!(rows = points.len(), "Received price history");

        let series = PriceSeries::new(symbol, points)?;
        self.cache.put(cache_key, series.clone()).await;
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::price::Interval;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub async fn create_mock_server(symbol: &str, mock_response: &str) -> MockServer {
        let mock_server = MockServer::start().await;
        let request_path = format!("/v8/finance/chart/{symbol}");

        Mock::given(method("GET"))
            .and(path(request_path))
            .respond_with(ResponseTemplate::new(200).set_body_string(mock_response))
            .mount(&mock_server)
            .await;

        mock_server
    }

    fn request() -> HistoryRequest {
        HistoryRequest {
            start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            interval: Interval::Monthly,
        }
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    // 2024-01-01, 2024-02-01, 2024-03-01 at 14:30 UTC
    const JAN: i64 = 1704119400;
    const FEB: i64 = 1706797800;
    const MAR: i64 = 1709303400;

    #[tokio::test]
    async fn test_successful_history_fetch_prefers_adjclose() {
        let mock_response = format!(
            r#"{{
                "chart": {{
                    "result": [{{
                        "meta": {{ "currency": "USD", "gmtoffset": -18000 }},
                        "timestamp": [{JAN}, {FEB}, {MAR}],
                        "indicators": {{
                            "quote": [{{ "close": [190.0, 185.0, 180.0] }}],
                            "adjclose": [{{ "adjclose": [188.5, 183.2, 179.1] }}]
                        }}
                    }}],
                    "error": null
                }}
            }}"#
        );

        let mock_server = create_mock_server("AAPL", &mock_response).await;
        let cache = Arc::new(Cache::new());
        let provider = YahooHistoryProvider::new(&mock_server.uri(), cache);

        let series = provider.fetch_history("AAPL", &request()).await.unwrap();
        assert_eq!(series.symbol(), "AAPL");
        assert_eq!(
            series.points(),
            &[
                PricePoint { date: date("2024-01-01"), price: 188.5 },
                PricePoint { date: date("2024-02-01"), price: 183.2 },
                PricePoint { date: date("2024-03-01"), price: 179.1 },
            ]
        );
    }

    #[tokio::test]
    async fn test_sends_range_and_interval() {
        let mock_server = MockServer::start().await;
        let body = format!(
            r#"{{"chart": {{"result": [{{
                "timestamp": [{JAN}, {FEB}],
                "indicators": {{"quote": [{{"close": [10.0, 11.0]}}]}}
            }}]}}}}"#
        );
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/SPY"))
            .and(query_param("interval", "1mo"))
            .and(query_param("period1", "1704067200"))
            .and(query_param("period2", "1711929600"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = YahooHistoryProvider::new(&mock_server.uri(), Arc::new(Cache::new()));
        let series = provider.fetch_history("SPY", &request()).await.unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.first().unwrap().price, 10.0);
    }

    #[tokio::test]
    async fn test_skips_missing_closes() {
        let mock_response = format!(
            r#"{{"chart": {{"result": [{{
                "timestamp": [{JAN}, {FEB}, {MAR}],
                "indicators": {{"quote": [{{"close": [100.0, null, 0.0]}}]}}
            }}]}}}}"#
        );
        let mock_server = create_mock_server("QQQ", &mock_response).await;
        let provider = YahooHistoryProvider::new(&mock_server.uri(), Arc::new(Cache::new()));

        let series = provider.fetch_history("QQQ", &request()).await.unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series.first().unwrap().date, date("2024-01-01"));
    }

    #[tokio::test]
    async fn test_no_price_result_data() {
        let mock_response = r#"{"chart": {"result": [], "error": null}}"#;
        let mock_server = create_mock_server("INVALID", mock_response).await;
        let provider = YahooHistoryProvider::new(&mock_server.uri(), Arc::new(Cache::new()));

        let result = provider.fetch_history("INVALID", &request()).await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "No price data found for symbol: INVALID"
        );
    }

    #[tokio::test]
    async fn test_chart_error_is_reported_as_missing_data() {
        let mock_response = r#"{"chart": {"result": null, "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}}}"#;
        let mock_server = create_mock_server("GONE", mock_response).await;
        let provider = YahooHistoryProvider::new(&mock_server.uri(), Arc::new(Cache::new()));

        let result = provider.fetch_history("GONE", &request()).await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "No price data found for symbol: GONE"
        );
    }

    #[tokio::test]
    async fn test_http_error_response() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/AAPL"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&mock_server)
            .await;

        let provider = YahooHistoryProvider::new(&mock_server.uri(), Arc::new(Cache::new()));
        let result = provider.fetch_history("AAPL", &request()).await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "HTTP error: 500 Internal Server Error for symbol: AAPL"
        );
    }

    #[tokio::test]
    async fn test_malformed_response() {
        let mock_response = r#"{"chart": {"results": []}}"#;
        let mock_server = create_mock_server("AAPL", mock_response).await;
        let provider = YahooHistoryProvider::new(&mock_server.uri(), Arc::new(Cache::new()));

        let result = provider.fetch_history("AAPL", &request()).await;
        let err = result.unwrap_err().to_string();
        // `result` is optional, so a renamed field yields no rows rather than a parse error
        assert_eq!(err, "No price data found for symbol: AAPL");
    }

    #[tokio::test]
    async fn test_history_is_cached() {
        let mock_server = MockServer::start().await;
        let body = format!(
            r#"{{"chart": {{"result": [{{
                "timestamp": [{JAN}, {FEB}],
                "indicators": {{"quote": [{{"close": [10.0, 11.0]}}]}}
            }}]}}}}"#
        );
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/SPY"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(&mock_server)
            .await;

        let cache = Arc::new(Cache::new());
        let provider = YahooHistoryProvider::new(&mock_server.uri(), Arc::clone(&cache));
        let first = provider.fetch_history("SPY", &request()).await.unwrap();
        let second = provider.fetch_history("SPY", &request()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.len().await, 1);
    }
}
