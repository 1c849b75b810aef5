use super::{now_ns, GazeSource, SourceError};
use crate::types::GazeSample;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub const GAZE_UDP_ADDR_ENV: &str = "SCREENGAZE_GAZE_UDP_ADDR";

#[derive(Debug, Clone, Deserialize)]
struct JsonGazeMsg {
    x: f32,
    y: f32,
    #[serde(default)]
    worn: Option<bool>,
    #[serde(default, alias = "timestamp", alias = "ts")]
    timestamp_ns: Option<u64>,
}

fn parse_bool(v: &str) -> Option<bool> {
    match v {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

pub fn parse_gaze_message(msg: &str) -> Option<GazeSample> {
    let msg = msg.trim();
    if msg.is_empty() {
        return None;
    }

    // JSON: {"x":0.5,"y":0.5,"worn":true,"timestamp_ns":123}
    if msg.starts_with('{') {
        let j = serde_json::from_str::<JsonGazeMsg>(msg).ok()?;
        return Some(GazeSample {
            timestamp_ns: j.timestamp_ns.unwrap_or_else(now_ns),
            gx: j.x,
            gy: j.y,
            worn: j.worn.unwrap_or(true),
        });
    }

    // k=v tokens: x=0.5 y=0.5 worn=1 ts=123
    let mut x: Option<f32> = None;
    let mut y: Option<f32> = None;
    let mut worn: Option<bool> = None;
    let mut timestamp: Option<u64> = None;

    for tok in msg.split_whitespace() {
        let (k, v) = tok.split_once('=')?;
        match k {
            "x" => x = v.parse().ok(),
            "y" => y = v.parse().ok(),
            "worn" => worn = parse_bool(v),
            "ts" | "timestamp" | "timestamp_ns" => timestamp = v.parse().ok(),
            _ => {}
        }
    }

    Some(GazeSample {
        timestamp_ns: timestamp.unwrap_or_else(now_ns),
        gx: x?,
        gy: y?,
        worn: worn.unwrap_or(true),
    })
}

/// Gaze samples received as UDP datagrams; only the newest unread sample is kept
pub struct UdpGazeSource {
    latest: Arc<Mutex<Option<GazeSample>>>,
    wait: Duration,
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl UdpGazeSource {
    pub async fn bind(bind_addr: SocketAddr, wait: Duration) -> Result<Self, SourceError> {
        let sock = UdpSocket::bind(bind_addr).await?;
        let local_addr = sock.local_addr()?;
        log::info!("UDP gaze listener bound on {local_addr}");

        let latest = Arc::new(Mutex::new(None));
        let storage = Arc::clone(&latest);
        let task = tokio::spawn(async move {
            let mut buf = [0u8; 2048];
            loop {
                let (len, _src) = match sock.recv_from(&mut buf).await {
                    Ok(v) => v,
                    Err(e) => {
                        log::warn!("UDP gaze recv error: {e}");
                        continue;
                    }
                };

                match std::str::from_utf8(&buf[..len]).ok().and_then(parse_gaze_message) {
                    Some(g) => *storage.lock() = Some(g),
                    None => log::debug!("Ignoring unparseable gaze datagram ({len} bytes)"),
                }
            }
        });

        Ok(Self {
            latest,
            wait,
            local_addr,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for UdpGazeSource {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[async_trait]
impl GazeSource for UdpGazeSource {
    async fn next_gaze(&mut self) -> Result<Option<GazeSample>, SourceError> {
        let deadline = Instant::now() + self.wait;
        loop {
            let taken = self.latest.lock().take();
            if let Some(sample) = taken {
                return Ok(Some(sample));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
}
