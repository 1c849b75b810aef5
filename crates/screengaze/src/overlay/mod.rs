//! Overlay consumer
//!
//! Receives telemetry datagrams on a non-blocking UDP socket and keeps a
//! single circle drawn at the latest mapped gaze point. The surface is
//! redrawn only when the clamped point actually moves.

mod surface;
#[cfg(windows)]
mod win32;

pub use surface::{OverlaySurface, RasterSurface, SurfaceEvent};
#[cfg(windows)]
pub use win32::Win32Surface;

use crate::telemetry;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    #[error("failed to bind telemetry socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("overlay surface error: {0}")]
    Surface(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayStyle {
    pub radius: i32,
    pub stroke: u32,
    pub color: [u8; 3],
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            radius: 30,
            stroke: 3,
            color: [255, 0, 0],
        }
    }
}

/// Last rendered point, in integer screen pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayState {
    pub x: i32,
    pub y: i32,
}

impl OverlayState {
    fn centered(width: u32, height: u32) -> Self {
        Self {
            x: (width / 2) as i32,
            y: (height / 2) as i32,
        }
    }
}

/// Bind the telemetry port. Failure is fatal for the overlay.
pub async fn bind_telemetry_socket(addr: SocketAddr) -> Result<UdpSocket, OverlayError> {
    let socket = UdpSocket::bind(addr)
        .await
        .map_err(|source| OverlayError::Bind { addr, source })?;
    log::info!("Overlay listening for telemetry on {addr}");
    Ok(socket)
}

pub struct Overlay<S: OverlaySurface> {
    surface: S,
    style: OverlayStyle,
    state: OverlayState,
    redraws: u64,
}

impl<S: OverlaySurface> Overlay<S> {
    pub fn new(surface: S, style: OverlayStyle) -> Self {
        let (width, height) = surface.size();
        Self {
            surface,
            style,
            state: OverlayState::centered(width, height),
            redraws: 0,
        }
    }

    pub fn state(&self) -> OverlayState {
        self.state
    }

    pub fn redraw_count(&self) -> u64 {
        self.redraws
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Truncate to integer pixels, then clamp into the surface
    fn clamp(&self, px: f32, py: f32) -> (i32, i32) {
        let (width, height) = self.surface.size();
        let max_x = width.saturating_sub(1) as i32;
        let max_y = height.saturating_sub(1) as i32;
        ((px as i32).clamp(0, max_x), (py as i32).clamp(0, max_y))
    }

    fn redraw(&mut self) -> Result<(), OverlayError> {
        self.surface.clear()?;
        self.surface.stroke_circle(
            (self.state.x, self.state.y),
            self.style.radius,
            self.style.stroke,
            self.style.color,
        )?;
        self.surface.present()?;
        self.redraws += 1;
        Ok(())
    }

    /// Apply one received payload. Returns whether the surface was redrawn.
    pub fn handle_datagram(&mut self, payload: &[u8]) -> Result<bool, OverlayError> {
        let packet = match telemetry::decode(payload) {
            Ok(p) => p,
            Err(e) => {
                log::debug!("Dropping datagram: {e}");
                return Ok(false);
            }
        };
        if !packet.px.is_finite() || !packet.py.is_finite() {
            log::debug!("Ignoring non-finite point ({}, {})", packet.px, packet.py);
            return Ok(false);
        }

        let (x, y) = self.clamp(packet.px, packet.py);
        if (x, y) == (self.state.x, self.state.y) {
            return Ok(false);
        }
        self.state = OverlayState { x, y };
        self.redraw()?;
        Ok(true)
    }

    /// Event/receive loop. Ends when the surface closes or `shutdown` is raised.
    pub async fn run(
        &mut self,
        socket: &UdpSocket,
        poll_interval: Duration,
        shutdown: Arc<AtomicBool>,
    ) -> Result<(), OverlayError> {
        self.redraw()?;
        let mut buf = [0u8; 64];

        loop {
            if self.surface.pump_events() == SurfaceEvent::Closed {
                log::info!("Overlay window closed");
                break;
            }
            if shutdown.load(Ordering::SeqCst) {
                log::info!("Overlay shutting down");
                break;
            }

            match socket.try_recv_from(&mut buf) {
                Ok((len, _src)) => {
                    self.handle_datagram(&buf[..len])?;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                // Oversized datagrams surface as errors on some platforms.
                Err(e) => log::debug!("Telemetry receive failed: {e}"),
            }

            tokio::time::sleep(poll_interval).await;
        }

        log::info!("Overlay stopped after {} redraws", self.redraws);
        Ok(())
    }
}
