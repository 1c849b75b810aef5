//! Telemetry wire protocol
//!
//! One UDP datagram per mapped gaze sample, fixed 24-byte little-endian
//! layout:
//!
//! | offset | size | field       |
//! |--------|------|-------------|
//! | 0      | 8    | `timestamp` (f64) |
//! | 8      | 4    | `gx` (f32)  |
//! | 12     | 4    | `gy` (f32)  |
//! | 16     | 4    | `px` (f32)  |
//! | 20     | 4    | `py` (f32)  |
//!
//! No framing, no sequence numbers. Values are not validated on decode.

use crate::types::TelemetryPacket;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use tokio::net::UdpSocket;

pub const PACKET_LEN: usize = 24;

/// Default producer destination and overlay bind address
pub const DEFAULT_TELEMETRY_ADDR: &str = "127.0.0.1:5005";

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed telemetry payload: expected {expected} bytes, got {got}")]
    Length { expected: usize, got: usize },
}

pub fn encode(packet: &TelemetryPacket) -> [u8; PACKET_LEN] {
    let mut buf = [0u8; PACKET_LEN];
    buf[0..8].copy_from_slice(&packet.timestamp.to_le_bytes());
    buf[8..12].copy_from_slice(&packet.gx.to_le_bytes());
    buf[12..16].copy_from_slice(&packet.gy.to_le_bytes());
    buf[16..20].copy_from_slice(&packet.px.to_le_bytes());
    buf[20..24].copy_from_slice(&packet.py.to_le_bytes());
    buf
}

pub fn decode(buf: &[u8]) -> Result<TelemetryPacket, DecodeError> {
    let buf: &[u8; PACKET_LEN] = buf.try_into().map_err(|_| DecodeError::Length {
        expected: PACKET_LEN,
        got: buf.len(),
    })?;

    let f32_at = |at: usize| f32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
    let mut ts = [0u8; 8];
    ts.copy_from_slice(&buf[0..8]);

    Ok(TelemetryPacket {
        timestamp: f64::from_le_bytes(ts),
        gx: f32_at(8),
        gy: f32_at(12),
        px: f32_at(16),
        py: f32_at(20),
    })
}

/// Fire-and-forget UDP sender for telemetry packets
pub struct TelemetrySender {
    socket: UdpSocket,
    destination: SocketAddr,
}

impl TelemetrySender {
    /// Bind an ephemeral local socket aimed at `destination`
    pub async fn bind(destination: SocketAddr) -> Result<Self> {
        let local: SocketAddr = if destination.is_ipv6() {
            "[::]:0".parse()?
        } else {
            "0.0.0.0:0".parse()?
        };
        let socket = UdpSocket::bind(local)
            .await
            .with_context(|| format!("binding telemetry socket on {local}"))?;
        log::info!(
            "Telemetry sender ready ({} -> {destination})",
            socket.local_addr()?
        );
        Ok(Self {
            socket,
            destination,
        })
    }

    pub fn destination(&self) -> SocketAddr {
        self.destination
    }

    /// Send one packet. A UDP send never waits on the receiver; returns whether
    /// the OS accepted the datagram.
    pub async fn send(&self, packet: &TelemetryPacket) -> bool {
        match self.socket.send_to(&encode(packet), self.destination).await {
            Ok(_) => true,
            Err(e) => {
                log::debug!("Telemetry send to {} dropped: {e}", self.destination);
                false
            }
        }
    }
}
