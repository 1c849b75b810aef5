//! Drawing surfaces the overlay renders onto

use super::OverlayError;
use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_hollow_circle_mut;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceEvent {
    Continue,
    /// The window was closed or destroyed; the overlay loop should end
    Closed,
}

/// A full-screen, transparent, click-through, always-on-top drawing target.
///
/// Dropping the surface releases every window and graphics handle it owns.
pub trait OverlaySurface {
    /// Drawable size in pixels
    fn size(&self) -> (u32, u32);

    /// Handle all pending window events without blocking
    fn pump_events(&mut self) -> SurfaceEvent;

    /// Fill the whole surface with the transparent color
    fn clear(&mut self) -> Result<(), OverlayError>;

    fn stroke_circle(
        &mut self,
        center: (i32, i32),
        radius: i32,
        stroke: u32,
        color: [u8; 3],
    ) -> Result<(), OverlayError>;

    /// Called once after each complete redraw
    fn present(&mut self) -> Result<(), OverlayError> {
        Ok(())
    }
}

/// In-memory RGBA surface for headless runs and tests
pub struct RasterSurface {
    buffer: RgbaImage,
    snapshot: Option<PathBuf>,
    closed: Arc<AtomicBool>,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buffer: RgbaImage::new(width, height),
            snapshot: None,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Write the buffer as a PNG to `path` after every redraw
    pub fn with_snapshot(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot = Some(path.into());
        self
    }

    /// Raising the returned flag makes the next event pump report [`SurfaceEvent::Closed`]
    pub fn close_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }

    pub fn buffer(&self) -> &RgbaImage {
        &self.buffer
    }
}

impl OverlaySurface for RasterSurface {
    fn size(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    fn pump_events(&mut self) -> SurfaceEvent {
        if self.closed.load(Ordering::SeqCst) {
            SurfaceEvent::Closed
        } else {
            SurfaceEvent::Continue
        }
    }

    fn clear(&mut self) -> Result<(), OverlayError> {
        for pixel in self.buffer.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }
        Ok(())
    }

    fn stroke_circle(
        &mut self,
        center: (i32, i32),
        radius: i32,
        stroke: u32,
        color: [u8; 3],
    ) -> Result<(), OverlayError> {
        let color = Rgba([color[0], color[1], color[2], 255]);
        // Pen centered on the nominal radius
        let inner = radius - (stroke as i32 - 1) / 2;
        for r in inner..inner + stroke.max(1) as i32 {
            if r > 0 {
                draw_hollow_circle_mut(&mut self.buffer, center, r, color);
            }
        }
        Ok(())
    }

    fn present(&mut self) -> Result<(), OverlayError> {
        if let Some(path) = &self.snapshot {
            self.buffer
                .save(path)
                .map_err(|e| OverlayError::Surface(format!("snapshot {}: {e}", path.display())))?;
        }
        Ok(())
    }
}
