use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use tokio::sync::OnceCell;
use tracing::debug;

use common::{
    Balance, Candle, Error, ExchangeClient, MarginMode, OpenOrder, OrderKind, OrderRequest,
    OrderSide, Position, PositionMode, Result, Side, Ticker,
};

const BASE_URL: &str = "https://www.okx.com";

/// REST v5 client for OKX perpetual swaps.
///
/// Sizes cross this boundary in base currency; the client converts to and
/// from contracts using the instrument's contract value.
pub struct OkxClient {
    api_key: String,
    secret: String,
    passphrase: String,
    /// Route requests to the demo-trading environment.
    demo: bool,
    http: Client,
    instrument: OnceCell<Instrument>,
}

/// Contract specification of the traded swap.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Instrument {
    ct_val: f64,
    lot_sz: f64,
}

impl Instrument {
    fn to_contracts(&self, base_size: f64) -> f64 {
        let lots = (base_size / self.ct_val / self.lot_sz + 1e-9).floor();
        lots * self.lot_sz
    }

    fn to_base(&self, contracts: f64) -> f64 {
        contracts * self.ct_val
    }
}

impl OkxClient {
    pub fn new(
        api_key: impl Into<String>,
        secret: impl Into<String>,
        passphrase: impl Into<String>,
        demo: bool,
    ) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            api_key: api_key.into(),
            secret: secret.into(),
            passphrase: passphrase.into(),
            demo,
            http,
            instrument: OnceCell::new(),
        })
    }

    fn timestamp() -> String {
        Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
    }

    /// base64(HMAC-SHA256(secret, timestamp + METHOD + path + body))
    fn sign(&self, timestamp: &str, method: &Method, path: &str, body: &str) -> Result<String> {
        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| Error::Config(format!("invalid OKX secret: {e}")))?;
        mac.update(timestamp.as_bytes());
        mac.update(method.as_str().as_bytes());
        mac.update(path.as_bytes());
        mac.update(body.as_bytes());
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        signed: bool,
    ) -> Result<Vec<T>> {
        let body = body.map(|b| b.to_string()).unwrap_or_default();
        let mut req = self
            .http
            .request(method.clone(), format!("{BASE_URL}{path}"))
            .header("Content-Type", "application/json");

        if signed {
            let ts = Self::timestamp();
            let signature = self.sign(&ts, &method, path, &body)?;
            req = req
                .header("OK-ACCESS-KEY", &self.api_key)
                .header("OK-ACCESS-SIGN", signature)
                .header("OK-ACCESS-TIMESTAMP", ts)
                .header("OK-ACCESS-PASSPHRASE", &self.passphrase);
        }
        if self.demo {
            req = req.header("x-simulated-trading", "1");
        }
        if !body.is_empty() {
            req = req.body(body);
        }

        let resp = req.send().await.map_err(|e| Error::Http(e.to_string()))?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::Http(format!("HTTP {status}: {text}")));
        }
        if !status.is_success() {
            return Err(Error::Exchange(format!("HTTP {status}: {text}")));
        }
        debug!(%method, path, "OKX request ok");
        parse_envelope(&text)
    }

    async fn instrument(&self, symbol: &str) -> Result<Instrument> {
        self.instrument
            .get_or_try_init(|| async {
                let path = format!("/api/v5/public/instruments?instType=SWAP&instId={symbol}");
                let rows: Vec<InstrumentRow> = self.request(Method::GET, &path, None, false).await?;
                let row = rows
                    .first()
                    .ok_or_else(|| Error::Exchange(format!("unknown instrument {symbol}")))?;
                Ok::<_, Error>(Instrument {
                    ct_val: num("ctVal", &row.ct_val)?,
                    lot_sz: num("lotSz", &row.lot_sz)?,
                })
            })
            .await
            .copied()
    }

    async fn algo_orders(&self, symbol: &str, inst: Instrument) -> Result<Vec<OpenOrder>> {
        let path = format!("/api/v5/trade/orders-algo-pending?instId={symbol}&ordType=conditional");
        let rows: Vec<AlgoRow> = self.request(Method::GET, &path, None, true).await?;
        rows.into_iter()
            .map(|r| -> Result<OpenOrder> {
                Ok(OpenOrder {
                    id: r.algo_id,
                    symbol: r.inst_id,
                    side: order_side(&r.side)?,
                    kind: OrderKind::Trigger { trigger_price: num("slTriggerPx", &r.sl_trigger_px)? },
                    size: inst.to_base(num("sz", &r.sz)?),
                    reduce_only: r.reduce_only == "true",
                })
            })
            .collect()
    }
}

#[async_trait]
impl ExchangeClient for OkxClient {
    async fn ticker(&self, symbol: &str) -> Result<Ticker> {
        let path = format!("/api/v5/market/ticker?instId={symbol}");
        let rows: Vec<TickerRow> = self.request(Method::GET, &path, None, false).await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| Error::Exchange(format!("empty ticker for {symbol}")))?;
        let last = num("last", &row.last)?;
        Ok(Ticker {
            symbol: row.inst_id,
            last,
            // swap volCcy24h is in base currency
            quote_volume_24h: num("volCcy24h", &row.vol_ccy_24h)? * last,
            timestamp: millis(&row.ts)?,
        })
    }

    async fn candles(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<Candle>> {
        let path = format!("/api/v5/market/candles?instId={symbol}&bar={timeframe}&limit={limit}");
        let rows: Vec<Vec<String>> = self.request(Method::GET, &path, None, false).await?;
        parse_candles(rows)
    }

    async fn open_positions(&self, symbol: &str) -> Result<Vec<Position>> {
        let inst = self.instrument(symbol).await?;
        let path = format!("/api/v5/account/positions?instType=SWAP&instId={symbol}");
        let rows: Vec<PositionRow> = self.request(Method::GET, &path, None, true).await?;
        let mut out = Vec::new();
        for row in rows {
            let pos = num("pos", &row.pos)?;
            if pos == 0.0 {
                continue;
            }
            let side = match row.pos_side.as_str() {
                "long" => Side::Long,
                "short" => Side::Short,
                // net mode: the sign carries the direction
                _ if pos > 0.0 => Side::Long,
                _ => Side::Short,
            };
            out.push(Position {
                symbol: row.inst_id,
                side,
                size: inst.to_base(pos.abs()),
                entry_price: num("avgPx", &row.avg_px)?,
                unrealized_pnl: num("upl", &row.upl)?,
                open_time: Some(millis(&row.c_time)?),
            });
        }
        Ok(out)
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<String> {
        let inst = self.instrument(&order.symbol).await?;
        let contracts = inst.to_contracts(order.size);
        if contracts <= 0.0 {
            return Err(Error::Exchange(format!(
                "size {} is below one lot of {}",
                order.size, order.symbol
            )));
        }
        let (path, body) = order_body(order, contracts);
        let rows: Vec<OrderAck> = self.request(Method::POST, path, Some(body), true).await?;
        let ack = rows
            .into_iter()
            .next()
            .ok_or_else(|| Error::Exchange("empty order acknowledgement".into()))?;
        if ack.s_code != "0" {
            return Err(Error::Exchange(format!("order rejected ({}): {}", ack.s_code, ack.s_msg)));
        }
        Ok(if ack.algo_id.is_empty() { ack.ord_id } else { ack.algo_id })
    }

    async fn cancel_order(&self, symbol: &str, order: &OpenOrder) -> Result<()> {
        let (path, body) = if order.kind.is_trigger() {
            (
                "/api/v5/trade/cancel-algos",
                json!([{ "instId": symbol, "algoId": order.id }]),
            )
        } else {
            (
                "/api/v5/trade/cancel-order",
                json!({ "instId": symbol, "ordId": order.id }),
            )
        };
        let rows: Vec<OrderAck> = self.request(Method::POST, path, Some(body), true).await?;
        match rows.first() {
            Some(ack) if ack.s_code != "0" => Err(Error::Exchange(format!(
                "cancel rejected ({}): {}",
                ack.s_code, ack.s_msg
            ))),
            _ => Ok(()),
        }
    }

    async fn open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>> {
        let inst = self.instrument(symbol).await?;
        let path = format!("/api/v5/trade/orders-pending?instType=SWAP&instId={symbol}");
        let rows: Vec<PendingRow> = self.request(Method::GET, &path, None, true).await?;
        let mut out = rows
            .into_iter()
            .map(|r| -> Result<OpenOrder> {
                Ok(OpenOrder {
                    id: r.ord_id,
                    symbol: r.inst_id,
                    side: order_side(&r.side)?,
                    kind: OrderKind::Limit { price: num("px", &r.px)? },
                    size: inst.to_base(num("sz", &r.sz)?),
                    reduce_only: r.reduce_only == "true",
                })
            })
            .collect::<Result<Vec<_>>>()?;
        out.extend(self.algo_orders(symbol, inst).await?);
        Ok(out)
    }

    async fn balance(&self, currency: &str) -> Result<Balance> {
        let path = format!("/api/v5/account/balance?ccy={currency}");
        let rows: Vec<BalanceRow> = self.request(Method::GET, &path, None, true).await?;
        let detail = rows
            .into_iter()
            .flat_map(|r| r.details)
            .find(|d| d.ccy == currency)
            .ok_or_else(|| Error::Exchange(format!("no {currency} balance on account")))?;
        Ok(Balance {
            currency: detail.ccy,
            total: num("eq", &detail.eq)?,
            free: num("availBal", &detail.avail_bal)?,
        })
    }
}

/// Endpoint and JSON body for an order. Trigger orders go through the algo endpoint.
fn order_body(order: &OrderRequest, contracts: f64) -> (&'static str, Value) {
    let mut body = json!({
        "instId": order.symbol,
        "tdMode": order.margin_mode.to_string(),
        "side": order.side.to_string(),
        "sz": format_num(contracts),
        "reduceOnly": order.reduce_only,
    });
    if order.position_mode == PositionMode::LongShort {
        // long/short mode names the position side being opened or reduced
        let pos_side = match (order.side, order.reduce_only) {
            (OrderSide::Buy, false) | (OrderSide::Sell, true) => "long",
            _ => "short",
        };
        body["posSide"] = json!(pos_side);
    }
    if order.margin_mode == MarginMode::Cross {
        body["ccy"] = json!("USDT");
    }

    match order.kind {
        OrderKind::Market => {
            body["ordType"] = json!("market");
            body["clOrdId"] = json!(order.client_id);
            ("/api/v5/trade/order", body)
        }
        OrderKind::Limit { price } => {
            body["ordType"] = json!("limit");
            body["px"] = json!(format_num(price));
            body["clOrdId"] = json!(order.client_id);
            ("/api/v5/trade/order", body)
        }
        OrderKind::Trigger { trigger_price } => {
            body["ordType"] = json!("conditional");
            body["slTriggerPx"] = json!(format_num(trigger_price));
            // -1: execute at market once triggered
            body["slOrdPx"] = json!("-1");
            body["algoClOrdId"] = json!(order.client_id);
            ("/api/v5/trade/order-algo", body)
        }
    }
}

fn parse_envelope<T: DeserializeOwned>(text: &str) -> Result<Vec<T>> {
    let env: Envelope<T> = serde_json::from_str(text)?;
    if env.code != "0" {
        return Err(Error::Exchange(format!("OKX error {}: {}", env.code, env.msg)));
    }
    Ok(env.data)
}

/// OKX returns candles newest first; the core wants oldest first. Swap rows
/// carry volume in contracts at index 5 and in base currency at index 6.
fn parse_candles(rows: Vec<Vec<String>>) -> Result<Vec<Candle>> {
    let mut candles = rows
        .iter()
        .map(|r| -> Result<Candle> {
            if r.len() < 6 {
                return Err(Error::Exchange(format!("short candle row: {r:?}")));
            }
            Ok(Candle {
                open_time: millis(&r[0])?,
                open: num("o", &r[1])?,
                high: num("h", &r[2])?,
                low: num("l", &r[3])?,
                close: num("c", &r[4])?,
                volume: match r.get(6) {
                    Some(base) => num("volCcy", base)?,
                    None => num("vol", &r[5])?,
                },
            })
        })
        .collect::<Result<Vec<_>>>()?;
    candles.sort_by_key(|c| c.open_time);
    Ok(candles)
}

/// OKX encodes numbers as strings; an empty string means zero.
fn num(field: &str, s: &str) -> Result<f64> {
    if s.is_empty() {
        return Ok(0.0);
    }
    s.parse::<f64>()
        .map_err(|e| Error::Exchange(format!("bad {field} '{s}': {e}")))
}

fn millis(s: &str) -> Result<DateTime<Utc>> {
    let ms: i64 = s
        .parse()
        .map_err(|e| Error::Exchange(format!("bad timestamp '{s}': {e}")))?;
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| Error::Exchange(format!("timestamp out of range: {ms}")))
}

fn order_side(s: &str) -> Result<OrderSide> {
    match s {
        "buy" => Ok(OrderSide::Buy),
        "sell" => Ok(OrderSide::Sell),
        other => Err(Error::Exchange(format!("unknown order side '{other}'"))),
    }
}

fn format_num(x: f64) -> String {
    let s = format!("{x:.8}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() {
        "0".to_string()
    } else {
        s.to_string()
    }
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct Envelope<T> {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstrumentRow {
    ct_val: String,
    lot_sz: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickerRow {
    inst_id: String,
    last: String,
    #[serde(rename = "volCcy24h")]
    vol_ccy_24h: String,
    ts: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionRow {
    inst_id: String,
    pos: String,
    #[serde(default)]
    pos_side: String,
    #[serde(default)]
    avg_px: String,
    #[serde(default)]
    upl: String,
    c_time: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderAck {
    #[serde(default)]
    ord_id: String,
    #[serde(default)]
    algo_id: String,
    #[serde(default)]
    s_code: String,
    #[serde(default)]
    s_msg: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PendingRow {
    ord_id: String,
    inst_id: String,
    side: String,
    px: String,
    sz: String,
    #[serde(default)]
    reduce_only: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlgoRow {
    algo_id: String,
    inst_id: String,
    side: String,
    sz: String,
    #[serde(default)]
    sl_trigger_px: String,
    #[serde(default)]
    reduce_only: String,
}

#[derive(Deserialize)]
struct BalanceRow {
    details: Vec<BalanceDetail>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceDetail {
    ccy: String,
    eq: String,
    avail_bal: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_matches_reference_vector() {
        let client = OkxClient::new("key", "secret", "pass", true).unwrap();
        let sig = client
            .sign("2020-12-08T09:08:57.715Z", &Method::GET, "/api/v5/account/balance?ccy=BTC", "")
            .unwrap();

        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(b"secret").unwrap();
        mac.update(b"2020-12-08T09:08:57.715ZGET/api/v5/account/balance?ccy=BTC");
        assert_eq!(sig, BASE64.encode(mac.finalize().into_bytes()));
        // base64 of a 32-byte digest
        assert_eq!(sig.len(), 44);
    }

    #[test]
    fn candles_come_out_oldest_first() {
        let text = r#"{"code":"0","msg":"","data":[
            ["1700000900000","101","102","100","101.5","10","0.1","1015","1"],
            ["1700000000000","100","101","99","101","12","0.12","1212","1"]
        ]}"#;
        let rows: Vec<Vec<String>> = parse_envelope(text).unwrap();
        let candles = parse_candles(rows).unwrap();
        assert_eq!(candles.len(), 2);
        assert!(candles[0].open_time < candles[1].open_time);
        assert_eq!(candles[0].close, 101.0);
        assert_eq!(candles[1].high, 102.0);
        assert_eq!(candles[0].volume, 0.12);
    }

    #[test]
    fn error_envelope_is_an_exchange_error() {
        let text = r#"{"code":"51008","msg":"Insufficient balance","data":[]}"#;
        let res: Result<Vec<Value>> = parse_envelope(text);
        match res {
            Err(Error::Exchange(msg)) => assert!(msg.contains("51008")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn trigger_orders_use_the_algo_endpoint() {
        let order = OrderRequest::trigger("BTC-USDT-SWAP", OrderSide::Sell, 0.05, 58_123.4).reduce_only();
        let (path, body) = order_body(&order, 5.0);
        assert_eq!(path, "/api/v5/trade/order-algo");
        assert_eq!(body["ordType"], "conditional");
        assert_eq!(body["slTriggerPx"], "58123.4");
        assert_eq!(body["sz"], "5");
        assert_eq!(body["reduceOnly"], true);
        assert_eq!(body["tdMode"], "isolated");
        assert!(body.get("posSide").is_none());
    }

    #[test]
    fn limit_orders_carry_price_and_client_id() {
        let order = OrderRequest::limit("BTC-USDT-SWAP", OrderSide::Buy, 0.02, 60_000.0);
        let (path, body) = order_body(&order, 2.0);
        assert_eq!(path, "/api/v5/trade/order");
        assert_eq!(body["ordType"], "limit");
        assert_eq!(body["px"], "60000");
        assert_eq!(body["clOrdId"], order.client_id.as_str());
    }

    #[test]
    fn sizes_convert_through_contract_value() {
        let inst = Instrument { ct_val: 0.01, lot_sz: 0.1 };
        assert!((inst.to_contracts(0.057) - 5.7).abs() < 1e-9);
        assert_eq!(inst.to_contracts(0.0005), 0.0);
        assert!((inst.to_base(3.0) - 0.03).abs() < 1e-12);
    }

    #[test]
    fn numbers_parse_leniently() {
        assert_eq!(num("avgPx", "").unwrap(), 0.0);
        assert_eq!(num("last", "42.5").unwrap(), 42.5);
        assert!(num("last", "abc").is_err());
        assert_eq!(format_num(0.10000), "0.1");
    }
}
