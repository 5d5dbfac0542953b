//! Trade-stream websocket for wallet discovery.
//!
//! Subscribes to the trades channel for every configured asset and
//! forwards the counterparty addresses of each trade to the registry
//! owner. Connection loss triggers exponential reconnect with
//! resubscription.

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::error::{HyperliquidError, Result};
use crate::types::Trade;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const PING_INTERVAL: Duration = Duration::from_secs(50);

#[derive(Debug, Deserialize)]
struct WsFrame {
    #[serde(default)]
    channel: String,
    #[serde(default)]
    data: serde_json::Value,
}

pub struct TradeStream {
    ws_url: String,
    assets: Vec<String>,
    addresses: mpsc::Sender<String>,
}

impl TradeStream {
    #[must_use]
    pub fn new(ws_url: String, assets: Vec<String>, addresses: mpsc::Sender<String>) -> Self {
        Self {
            ws_url,
            assets,
            addresses,
        }
    }

    /// Runs the stream until the address receiver is dropped. Reconnects
    /// on failure with exponential backoff, resubscribing every time.
    ///
    /// # Errors
    /// Never returns an error today; the signature leaves room for a
    /// terminal failure mode.
    pub async fn run(&mut self) -> Result<()> {
        let mut backoff = INITIAL_BACKOFF;

        loop {
            let connected_at = Instant::now();
            match self.connect_and_stream().await {
                Ok(()) => {
                    tracing::info!("trade stream exiting: address receiver dropped");
                    return Ok(());
                }
                Err(e) => {
                    tracing::error!("trade stream error: {}", e);
                }
            }

            // A connection that lived a while earns a fresh backoff.
            if connected_at.elapsed() > Duration::from_secs(60) {
                backoff = INITIAL_BACKOFF;
            }
            tracing::info!("reconnecting trade stream in {:?}", backoff);
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    /// One connection lifetime. Returns Ok only when the receiver is gone.
    async fn connect_and_stream(&mut self) -> Result<()> {
        let (mut stream, _) = connect_async(&self.ws_url)
            .await
            .map_err(|e| HyperliquidError::WebSocket(e.to_string()))?;

        for coin in &self.assets {
            let subscribe = json!({
                "method": "subscribe",
                "subscription": {"type": "trades", "coin": coin}
            });
            stream
                .send(Message::Text(subscribe.to_string()))
                .await
                .map_err(|e| HyperliquidError::WebSocket(e.to_string()))?;
        }
        tracing::info!(
            "trade stream connected, subscribed to {} assets",
            self.assets.len()
        );

        let mut ping_interval = tokio::time::interval(PING_INTERVAL);
        ping_interval.tick().await; // the first tick fires immediately

        loop {
            tokio::select! {
                _ = ping_interval.tick() => {
                    let ping = json!({"method": "ping"});
                    stream
                        .send(Message::Text(ping.to_string()))
                        .await
                        .map_err(|e| HyperliquidError::WebSocket(e.to_string()))?;
                }
                msg = stream.next() => {
                    let Some(msg) = msg else {
                        return Err(HyperliquidError::WebSocket("stream ended".to_string()));
                    };
                    let msg = msg.map_err(|e| HyperliquidError::WebSocket(e.to_string()))?;
                    match msg {
                        Message::Text(text) => {
                            if !self.handle_frame(&text).await {
                                return Ok(());
                            }
                        }
                        Message::Close(_) => {
                            return Err(HyperliquidError::WebSocket(
                                "server closed connection".to_string(),
                            ));
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    /// Forwards trade counterparties; returns false once the receiver is
    /// dropped.
    async fn handle_frame(&self, text: &str) -> bool {
        let Some(trades) = Self::parse_trades(text) else {
            return true;
        };
        for trade in trades {
            for user in trade.users {
                if self.addresses.send(user).await.is_err() {
                    return false;
                }
            }
        }
        true
    }

    /// Decodes a trades frame; other channels and malformed frames yield
    /// None.
    fn parse_trades(text: &str) -> Option<Vec<Trade>> {
        let frame: WsFrame = serde_json::from_str(text).ok()?;
        if frame.channel != "trades" {
            return None;
        }
        serde_json::from_value(frame.data).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_trades_frame() {
        let text = r#"{
            "channel": "trades",
            "data": [
                {"coin": "BTC", "px": "65000", "sz": "0.5", "time": 1700000000000,
                 "users": ["0xAAA", "0xBBB"]},
                {"coin": "BTC", "px": "65001", "sz": "0.1", "time": 1700000000001,
                 "users": ["0xCCC", "0xDDD"]}
            ]
        }"#;

        let trades = TradeStream::parse_trades(text).unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].users, vec!["0xAAA", "0xBBB"]);
    }

    #[test]
    fn ignores_other_channels() {
        let text = r#"{"channel": "subscriptionResponse", "data": {"method": "subscribe"}}"#;
        assert!(TradeStream::parse_trades(text).is_none());
    }

    #[test]
    fn ignores_malformed_frames() {
        assert!(TradeStream::parse_trades("not json").is_none());
        assert!(TradeStream::parse_trades(r#"{"channel": "trades", "data": 42}"#).is_none());
    }

    #[tokio::test]
    async fn handle_frame_forwards_addresses() {
        let (tx, mut rx) = mpsc::channel(16);
        let stream = TradeStream::new("wss://unused".to_string(), vec![], tx);

        let text = r#"{"channel": "trades", "data": [
            {"coin": "ETH", "users": ["0x111", "0x222"]}
        ]}"#;
        assert!(stream.handle_frame(text).await);

        assert_eq!(rx.recv().await.unwrap(), "0x111");
        assert_eq!(rx.recv().await.unwrap(), "0x222");
    }

    #[tokio::test]
    async fn handle_frame_reports_dropped_receiver() {
        let (tx, rx) = mpsc::channel(16);
        drop(rx);
        let stream = TradeStream::new("wss://unused".to_string(), vec![], tx);

        let text = r#"{"channel": "trades", "data": [{"coin": "ETH", "users": ["0x111"]}]}"#;
        assert!(!stream.handle_frame(text).await);
    }
}
