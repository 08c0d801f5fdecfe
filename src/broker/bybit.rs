//! REST-only Bybit linear-perpetual broker adapter.
//!
//! Grounded on `bybit_api.rs`: HMAC request signing (`sign`,
//! `signed_headers`), the retCode/HTTP-status error classification
//! (`classify_error`), and the exponential-backoff retry wrapper
//! (`with_retry`) are kept verbatim in spirit and re-targeted to return
//! [`EngineError`] instead of the teacher's local `BybitError`.

use crate::broker::{AccountInfo, BrokerAdapter, BrokerPosition, Quote, SymbolInfo};
use crate::config::Secrets;
use crate::error::{EngineError, EngineResult};
use crate::types::{Bar, Side};
use async_trait::async_trait;
use chrono_tz::Tz;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

/// Disposition assigned to one REST call's outcome, mirroring the teacher's
/// `BybitError` three-way split before it is folded into [`EngineError`].
enum Disposition {
    RateLimit { retry_after: u64 },
    Transient(String),
    Permanent(String),
}

fn classify(ret_code: i64, http_status: u16, msg: &str) -> Disposition {
    match (ret_code, http_status) {
        (10006, _) | (_, 429) => Disposition::RateLimit { retry_after: 10 },
        (10016, _) | (_, 500..=599) => Disposition::Transient(msg.to_string()),
        _ => Disposition::Permanent(format!("retCode={ret_code} msg={msg}")),
    }
}

async fn with_retry<F, Fut, T>(symbol: &str, max_retries: u32, operation: F) -> EngineResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, Disposition>>,
{
    let mut retries = 0;
    let mut delay: u64 = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(Disposition::RateLimit { retry_after }) => {
                if retries >= max_retries {
                    return Err(EngineError::BrokerTransient {
                        symbol: symbol.to_string(),
                        detail: format!("rate limited, retry after {retry_after}s"),
                    });
                }
                tracing::warn!(symbol, retry_after, attempt = retries + 1, max_retries, "rate limited, backing off");
                tokio::time::sleep(Duration::from_secs(retry_after)).await;
                retries += 1;
            }
            Err(Disposition::Transient(msg)) => {
                if retries >= max_retries {
                    return Err(EngineError::BrokerTransient { symbol: symbol.to_string(), detail: msg });
                }
                tracing::warn!(symbol, %msg, delay, attempt = retries + 1, max_retries, "transient broker error, retrying");
                tokio::time::sleep(Duration::from_secs(delay)).await;
                delay = (delay * 2).min(60);
                retries += 1;
            }
            Err(Disposition::Permanent(msg)) => {
                return Err(EngineError::BrokerRefused { symbol: symbol.to_string(), detail: msg });
            }
        }
    }
}

pub struct BybitBroker {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    zone: Tz,
}

impl BybitBroker {
    pub fn new(base_url: impl Into<String>, secrets: &Secrets, zone: Tz) -> EngineResult<Self> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| EngineError::BrokerFatal(format!("failed to build HTTP client: {e}")))?;

        Ok(BybitBroker {
            client,
            base_url: base_url.into(),
            api_key: secrets.bybit_api_key.clone(),
            api_secret: secrets.bybit_secret.clone(),
            zone,
        })
    }

    fn timestamp_ms() -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as u64
    }

    fn sign(&self, payload: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes()).expect("HMAC init failed");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn signed_headers(&self, body: &str) -> reqwest::header::HeaderMap {
        let ts = Self::timestamp_ms().to_string();
        let recv_window = "5000";
        let payload = format!("{}{}{}{}", ts, self.api_key, recv_window, body);
        let signature = self.sign(&payload);

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("X-BAPI-API-KEY", self.api_key.parse().unwrap());
        headers.insert("X-BAPI-TIMESTAMP", ts.parse().unwrap());
        headers.insert("X-BAPI-SIGN", signature.parse().unwrap());
        headers.insert("X-BAPI-RECV-WINDOW", recv_window.parse().unwrap());
        headers.insert(reqwest::header::CONTENT_TYPE, "application/json".parse().unwrap());
        headers
    }

    async fn place_order_raw(&self, symbol: &str, side: Side, qty: f64, stop_loss: f64, take_profit: f64) -> Result<String, Disposition> {
        let body = serde_json::json!({
            "category": "linear",
            "symbol": symbol,
            "side": side.as_str(),
            "orderType": "Market",
            "qty": format!("{:.4}", qty),
            "stopLoss": format!("{:.2}", stop_loss),
            "takeProfit": format!("{:.2}", take_profit),
            "tpslMode": "Full",
            "timeInForce": "GTC"
        })
        .to_string();

        let url = format!("{}/v5/order/create", self.base_url);
        let headers = self.signed_headers(&body);
        let resp = self.client.post(&url).headers(headers).body(body).send().await.map_err(|e| Disposition::Transient(e.to_string()))?;
        let http_status = resp.status().as_u16();
        let json: serde_json::Value = resp.json().await.map_err(|e| Disposition::Transient(e.to_string()))?;

        let ret_code = json["retCode"].as_i64().unwrap_or(-1);
        if ret_code == 0 {
            Ok(json["result"]["orderId"].as_str().unwrap_or("unknown").to_string())
        } else {
            Err(classify(ret_code, http_status, json["retMsg"].as_str().unwrap_or("unknown")))
        }
    }

    async fn close_position_raw(&self, symbol: &str, side: Side, qty: f64) -> Result<String, Disposition> {
        let close_side = side.opposite();
        let body = serde_json::json!({
            "category": "linear",
            "symbol": symbol,
            "side": close_side.as_str(),
            "orderType": "Market",
            "qty": format!("{:.4}", qty),
            "reduceOnly": true,
            "timeInForce": "GTC"
        })
        .to_string();

        let url = format!("{}/v5/order/create", self.base_url);
        let headers = self.signed_headers(&body);
        let resp = self.client.post(&url).headers(headers).body(body).send().await.map_err(|e| Disposition::Transient(e.to_string()))?;
        let http_status = resp.status().as_u16();
        let json: serde_json::Value = resp.json().await.map_err(|e| Disposition::Transient(e.to_string()))?;

        let ret_code = json["retCode"].as_i64().unwrap_or(-1);
        if ret_code == 0 {
            Ok(json["result"]["orderId"].as_str().unwrap_or("unknown").to_string())
        } else {
            Err(classify(ret_code, http_status, json["retMsg"].as_str().unwrap_or("unknown")))
        }
    }

    async fn get_position_raw(&self, symbol: &str) -> Result<serde_json::Value, Disposition> {
        let ts = Self::timestamp_ms().to_string();
        let recv_window = "5000";
        let query = format!("category=linear&symbol={symbol}");
        let payload = format!("{}{}{}{}", ts, self.api_key, recv_window, query);
        let signature = self.sign(&payload);

        let url = format!("{}/v5/position/list?{}", self.base_url, query);
        let resp = self
            .client
            .get(&url)
            .header("X-BAPI-API-KEY", &self.api_key)
            .header("X-BAPI-TIMESTAMP", &ts)
            .header("X-BAPI-SIGN", signature)
            .header("X-BAPI-RECV-WINDOW", recv_window)
            .send()
            .await
            .map_err(|e| Disposition::Transient(e.to_string()))?;

        let http_status = resp.status().as_u16();
        let json: serde_json::Value = resp.json().await.map_err(|e| Disposition::Transient(e.to_string()))?;
        let ret_code = json["retCode"].as_i64().unwrap_or(-1);
        if ret_code == 0 {
            Ok(json)
        } else {
            Err(classify(ret_code, http_status, json["retMsg"].as_str().unwrap_or("unknown")))
        }
    }

    async fn fetch_klines_raw(&self, symbol: &str, limit: usize) -> Result<Vec<Bar>, Disposition> {
        let url = format!("{}/v5/market/kline?category=linear&symbol={}&interval=1&limit={}", self.base_url, symbol, limit);
        let resp = self.client.get(&url).send().await.map_err(|e| Disposition::Transient(e.to_string()))?;
        let http_status = resp.status().as_u16();
        let json: serde_json::Value = resp.json().await.map_err(|e| Disposition::Transient(e.to_string()))?;

        let ret_code = json["retCode"].as_i64().unwrap_or(-1);
        if ret_code != 0 {
            return Err(classify(ret_code, http_status, json["retMsg"].as_str().unwrap_or("unknown")));
        }

        let list = json["result"]["list"].as_array().ok_or_else(|| Disposition::Transient("missing result.list".into()))?;
        let mut bars: Vec<Bar> = list
            .iter()
            .filter_map(|row| {
                let arr = row.as_array()?;
                let ts_ms: i64 = arr[0].as_str()?.parse().ok()?;
                let start_time = chrono::DateTime::from_timestamp_millis(ts_ms)?.with_timezone(&self.zone);
                let open: f64 = arr[1].as_str()?.parse().ok()?;
                let high: f64 = arr[2].as_str()?.parse().ok()?;
                let low: f64 = arr[3].as_str()?.parse().ok()?;
                let close: f64 = arr[4].as_str()?.parse().ok()?;
                let volume: f64 = arr[5].as_str()?.parse().ok()?;
                Some(Bar { start_time, open, high, low, close, volume })
            })
            .collect();
        // Bybit returns newest-first; the rest of the crate expects oldest-first.
        bars.reverse();
        Ok(bars)
    }

    async fn quote_raw(&self, symbol: &str) -> Result<Quote, Disposition> {
        let url = format!("{}/v5/market/tickers?category=linear&symbol={}", self.base_url, symbol);
        let resp = self.client.get(&url).send().await.map_err(|e| Disposition::Transient(e.to_string()))?;
        let http_status = resp.status().as_u16();
        let json: serde_json::Value = resp.json().await.map_err(|e| Disposition::Transient(e.to_string()))?;

        let ret_code = json["retCode"].as_i64().unwrap_or(-1);
        if ret_code != 0 {
            return Err(classify(ret_code, http_status, json["retMsg"].as_str().unwrap_or("unknown")));
        }
        let entry = json["result"]["list"].as_array().and_then(|a| a.first()).ok_or_else(|| Disposition::Transient("missing ticker".into()))?;
        let bid: f64 = entry["bid1Price"].as_str().and_then(|s| s.parse().ok()).unwrap_or(0.0);
        let ask: f64 = entry["ask1Price"].as_str().and_then(|s| s.parse().ok()).unwrap_or(0.0);
        Ok(Quote { bid, ask })
    }

    async fn account_info_raw(&self) -> Result<AccountInfo, Disposition> {
        let ts = Self::timestamp_ms().to_string();
        let recv_window = "5000";
        let query = "accountType=UNIFIED";
        let payload = format!("{}{}{}{}", ts, self.api_key, recv_window, query);
        let signature = self.sign(&payload);

        let url = format!("{}/v5/account/wallet-balance?{}", self.base_url, query);
        let resp = self
            .client
            .get(&url)
            .header("X-BAPI-API-KEY", &self.api_key)
            .header("X-BAPI-TIMESTAMP", &ts)
            .header("X-BAPI-SIGN", signature)
            .header("X-BAPI-RECV-WINDOW", recv_window)
            .send()
            .await
            .map_err(|e| Disposition::Transient(e.to_string()))?;

        let http_status = resp.status().as_u16();
        let json: serde_json::Value = resp.json().await.map_err(|e| Disposition::Transient(e.to_string()))?;
        let ret_code = json["retCode"].as_i64().unwrap_or(-1);
        if ret_code != 0 {
            return Err(classify(ret_code, http_status, json["retMsg"].as_str().unwrap_or("unknown")));
        }

        let account = json["result"]["list"].as_array().and_then(|a| a.first()).ok_or_else(|| Disposition::Transient("missing wallet balance".into()))?;
        let equity: f64 = account["totalEquity"].as_str().and_then(|s| s.parse().ok()).unwrap_or(0.0);
        let margin_free: f64 = account["totalAvailableBalance"].as_str().and_then(|s| s.parse().ok()).unwrap_or(0.0);
        Ok(AccountInfo { equity, margin_free })
    }

    async fn symbol_info_raw(&self, symbol: &str) -> Result<SymbolInfo, Disposition> {
        let url = format!("{}/v5/market/instruments-info?category=linear&symbol={}", self.base_url, symbol);
        let resp = self.client.get(&url).send().await.map_err(|e| Disposition::Transient(e.to_string()))?;
        let http_status = resp.status().as_u16();
        let json: serde_json::Value = resp.json().await.map_err(|e| Disposition::Transient(e.to_string()))?;

        let ret_code = json["retCode"].as_i64().unwrap_or(-1);
        if ret_code != 0 {
            return Err(classify(ret_code, http_status, json["retMsg"].as_str().unwrap_or("unknown")));
        }
        let entry = json["result"]["list"].as_array().and_then(|a| a.first()).ok_or_else(|| Disposition::Transient("missing instrument info".into()))?;
        let tick_size: f64 = entry["priceFilter"]["tickSize"].as_str().and_then(|s| s.parse().ok()).unwrap_or(0.00001);
        let lot = &entry["lotSizeFilter"];
        let volume_min: f64 = lot["minOrderQty"].as_str().and_then(|s| s.parse().ok()).unwrap_or(0.001);
        let volume_max: f64 = lot["maxOrderQty"].as_str().and_then(|s| s.parse().ok()).unwrap_or(100.0);
        let volume_step: f64 = lot["qtyStep"].as_str().and_then(|s| s.parse().ok()).unwrap_or(0.001);
        let digits = entry["priceScale"].as_str().and_then(|s| s.parse().ok()).unwrap_or(5);
        Ok(SymbolInfo { point: tick_size, contract_size: 1.0, volume_min, volume_max, volume_step, digits })
    }

    async fn all_open_positions_raw(&self) -> Result<Vec<BrokerPosition>, Disposition> {
        let ts = Self::timestamp_ms().to_string();
        let recv_window = "5000";
        let query = "category=linear&settleCoin=USDT";
        let payload = format!("{}{}{}{}", ts, self.api_key, recv_window, query);
        let signature = self.sign(&payload);

        let url = format!("{}/v5/position/list?{}", self.base_url, query);
        let resp = self
            .client
            .get(&url)
            .header("X-BAPI-API-KEY", &self.api_key)
            .header("X-BAPI-TIMESTAMP", &ts)
            .header("X-BAPI-SIGN", signature)
            .header("X-BAPI-RECV-WINDOW", recv_window)
            .send()
            .await
            .map_err(|e| Disposition::Transient(e.to_string()))?;

        let http_status = resp.status().as_u16();
        let json: serde_json::Value = resp.json().await.map_err(|e| Disposition::Transient(e.to_string()))?;
        let ret_code = json["retCode"].as_i64().unwrap_or(-1);
        if ret_code != 0 {
            return Err(classify(ret_code, http_status, json["retMsg"].as_str().unwrap_or("unknown")));
        }

        let list = json["result"]["list"].as_array().cloned().unwrap_or_default();
        Ok(list
            .iter()
            .filter_map(|entry| {
                let size: f64 = entry["size"].as_str().and_then(|s| s.parse().ok()).unwrap_or(0.0);
                if size == 0.0 {
                    return None;
                }
                let side = if entry["side"].as_str() == Some("Sell") { Side::Sell } else { Side::Buy };
                let symbol = entry["symbol"].as_str().unwrap_or_default().to_string();
                Some(BrokerPosition {
                    ticket: format!("{symbol}:{}", side.as_str()),
                    symbol,
                    side,
                    size,
                    avg_price: entry["avgPrice"].as_str().and_then(|s| s.parse().ok()).unwrap_or(0.0),
                    stop_loss: entry["stopLoss"].as_str().and_then(|s| s.parse().ok()).unwrap_or(0.0),
                    take_profit: entry["takeProfit"].as_str().and_then(|s| s.parse().ok()).unwrap_or(0.0),
                })
            })
            .collect())
    }
}

#[async_trait]
impl BrokerAdapter for BybitBroker {
    async fn fetch_klines(&self, symbol: &str, limit: usize) -> EngineResult<Vec<Bar>> {
        with_retry(symbol, 3, || self.fetch_klines_raw(symbol, limit)).await
    }

    async fn quote(&self, symbol: &str) -> EngineResult<Quote> {
        with_retry(symbol, 3, || self.quote_raw(symbol)).await
    }

    async fn place_market_order(&self, symbol: &str, side: Side, qty: f64, stop_loss: f64, take_profit: f64) -> EngineResult<String> {
        let order_id = with_retry(symbol, 3, || self.place_order_raw(symbol, side, qty, stop_loss, take_profit)).await?;
        tracing::info!(symbol, %side, order_id, "order placed");
        // Bybit is a netting venue: position/list never echoes the order id
        // that opened a position back out, so (symbol, side) is the only key
        // `open_positions` can reliably reuse for reconciliation.
        Ok(format!("{symbol}:{}", side.as_str()))
    }

    async fn close_position(&self, symbol: &str, side: Side, qty: f64) -> EngineResult<String> {
        with_retry(symbol, 3, || self.close_position_raw(symbol, side, qty)).await
    }

    async fn open_positions(&self, symbol: &str) -> EngineResult<Vec<BrokerPosition>> {
        let json = with_retry(symbol, 5, || self.get_position_raw(symbol)).await?;
        let list = json["result"]["list"].as_array().cloned().unwrap_or_default();
        Ok(list
            .iter()
            .filter_map(|entry| {
                let size: f64 = entry["size"].as_str().and_then(|s| s.parse().ok()).unwrap_or(0.0);
                if size == 0.0 {
                    return None;
                }
                let side = if entry["side"].as_str() == Some("Sell") { Side::Sell } else { Side::Buy };
                Some(BrokerPosition {
                    symbol: symbol.to_string(),
                    ticket: format!("{symbol}:{}", side.as_str()),
                    side,
                    size,
                    avg_price: entry["avgPrice"].as_str().and_then(|s| s.parse().ok()).unwrap_or(0.0),
                    stop_loss: entry["stopLoss"].as_str().and_then(|s| s.parse().ok()).unwrap_or(0.0),
                    take_profit: entry["takeProfit"].as_str().and_then(|s| s.parse().ok()).unwrap_or(0.0),
                })
            })
            .collect())
    }

    async fn all_open_positions(&self) -> EngineResult<Vec<BrokerPosition>> {
        with_retry("*", 3, || self.all_open_positions_raw()).await
    }

    async fn account_info(&self) -> EngineResult<AccountInfo> {
        with_retry("*", 3, || self.account_info_raw()).await
    }

    async fn symbol_info(&self, symbol: &str) -> EngineResult<SymbolInfo> {
        with_retry(symbol, 3, || self.symbol_info_raw(symbol)).await
    }
}
