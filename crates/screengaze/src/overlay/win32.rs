//! Native Windows overlay window
//!
//! A layered, color-keyed, click-through, topmost tool window covering the
//! primary monitor, drawn with GDI.

use super::surface::{OverlaySurface, SurfaceEvent};
use super::OverlayError;
use windows::core::{w, PCWSTR};
use windows::Win32::Foundation::{COLORREF, HINSTANCE, HWND, LPARAM, LRESULT, RECT, WPARAM};
use windows::Win32::Graphics::Gdi::{
    CreatePen, CreateSolidBrush, DeleteObject, Ellipse, FillRect, GetDC, GetStockObject,
    ReleaseDC, SelectObject, HBRUSH, HDC, HGDIOBJ, HPEN, NULL_BRUSH, PS_SOLID,
};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, GetSystemMetrics,
    PeekMessageW, PostQuitMessage, RegisterClassW, SetLayeredWindowAttributes, ShowWindow,
    TranslateMessage, UnregisterClassW, LWA_COLORKEY, MSG, PM_REMOVE, SM_CXSCREEN, SM_CYSCREEN,
    SW_SHOW, WM_DESTROY, WM_QUIT, WNDCLASSW, WS_EX_LAYERED, WS_EX_TOOLWINDOW, WS_EX_TOPMOST,
    WS_EX_TRANSPARENT, WS_POPUP,
};

const CLASS_NAME: PCWSTR = w!("ScreenGazeOverlay");

/// Pixels in this color are fully transparent
const KEY: [u8; 3] = [1, 2, 3];

fn colorref([r, g, b]: [u8; 3]) -> COLORREF {
    COLORREF(r as u32 | (g as u32) << 8 | (b as u32) << 16)
}

extern "system" fn wndproc(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    unsafe {
        match msg {
            WM_DESTROY => {
                PostQuitMessage(0);
                LRESULT(0)
            }
            _ => DefWindowProcW(hwnd, msg, wparam, lparam),
        }
    }
}

pub struct Win32Surface {
    instance: HINSTANCE,
    class_registered: bool,
    hwnd: HWND,
    destroyed: bool,
    hdc: HDC,
    key_brush: HBRUSH,
    pen: HPEN,
    pen_style: Option<(u32, [u8; 3])>,
    old_pen: HGDIOBJ,
    old_brush: HGDIOBJ,
    width: u32,
    height: u32,
}

impl Win32Surface {
    /// Create and show the overlay window. Handles acquired before a failure
    /// are released when the partially built surface drops.
    pub fn create() -> Result<Self, OverlayError> {
        let mut surface = Self {
            instance: HINSTANCE::default(),
            class_registered: false,
            hwnd: HWND::default(),
            destroyed: false,
            hdc: HDC::default(),
            key_brush: HBRUSH::default(),
            pen: HPEN::default(),
            pen_style: None,
            old_pen: HGDIOBJ::default(),
            old_brush: HGDIOBJ::default(),
            width: 0,
            height: 0,
        };

        unsafe {
            let module = GetModuleHandleW(PCWSTR::null())
                .map_err(|e| OverlayError::Surface(format!("GetModuleHandleW: {e}")))?;
            surface.instance = module.into();

            let class = WNDCLASSW {
                lpfnWndProc: Some(wndproc),
                hInstance: surface.instance,
                lpszClassName: CLASS_NAME,
                ..Default::default()
            };
            if RegisterClassW(&class) == 0 {
                return Err(OverlayError::Surface("RegisterClassW failed".into()));
            }
            surface.class_registered = true;

            let width = GetSystemMetrics(SM_CXSCREEN);
            let height = GetSystemMetrics(SM_CYSCREEN);
            if width <= 0 || height <= 0 {
                return Err(OverlayError::Surface("could not query screen size".into()));
            }
            surface.width = width as u32;
            surface.height = height as u32;

            surface.hwnd = CreateWindowExW(
                WS_EX_LAYERED | WS_EX_TRANSPARENT | WS_EX_TOPMOST | WS_EX_TOOLWINDOW,
                CLASS_NAME,
                w!("ScreenGaze"),
                WS_POPUP,
                0,
                0,
                width,
                height,
                None,
                None,
                surface.instance,
                None,
            )
            .map_err(|e| OverlayError::Surface(format!("CreateWindowExW: {e}")))?;

            SetLayeredWindowAttributes(surface.hwnd, colorref(KEY), 0, LWA_COLORKEY)
                .map_err(|e| OverlayError::Surface(format!("SetLayeredWindowAttributes: {e}")))?;

            surface.hdc = GetDC(surface.hwnd);
            if surface.hdc.is_invalid() {
                return Err(OverlayError::Surface("GetDC failed".into()));
            }

            surface.key_brush = CreateSolidBrush(colorref(KEY));
            if surface.key_brush.is_invalid() {
                return Err(OverlayError::Surface("CreateSolidBrush failed".into()));
            }

            surface.old_brush = SelectObject(surface.hdc, GetStockObject(NULL_BRUSH));
            let _ = ShowWindow(surface.hwnd, SW_SHOW);
        }

        log::info!(
            "Overlay window created ({}x{})",
            surface.width,
            surface.height
        );
        Ok(surface)
    }

    fn ensure_pen(&mut self, stroke: u32, color: [u8; 3]) -> Result<(), OverlayError> {
        if self.pen_style == Some((stroke, color)) {
            return Ok(());
        }
        unsafe {
            let pen = CreatePen(PS_SOLID, stroke.max(1) as i32, colorref(color));
            if pen.is_invalid() {
                return Err(OverlayError::Surface("CreatePen failed".into()));
            }
            let previous = SelectObject(self.hdc, pen);
            if self.pen.is_invalid() {
                self.old_pen = previous;
            } else {
                let _ = DeleteObject(self.pen);
            }
            self.pen = pen;
        }
        self.pen_style = Some((stroke, color));
        Ok(())
    }
}

impl OverlaySurface for Win32Surface {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn pump_events(&mut self) -> SurfaceEvent {
        let mut msg = MSG::default();
        unsafe {
            while PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE).as_bool() {
                if msg.message == WM_QUIT {
                    self.destroyed = true;
                    return SurfaceEvent::Closed;
                }
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }
        SurfaceEvent::Continue
    }

    fn clear(&mut self) -> Result<(), OverlayError> {
        let rect = RECT {
            left: 0,
            top: 0,
            right: self.width as i32,
            bottom: self.height as i32,
        };
        unsafe {
            FillRect(self.hdc, &rect, self.key_brush);
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
        self.ensure_pen(stroke, color)?;
        let (x, y) = center;
        unsafe {
            let _ = Ellipse(self.hdc, x - radius, y - radius, x + radius, y + radius);
        }
        Ok(())
    }
}

impl Drop for Win32Surface {
    fn drop(&mut self) {
        unsafe {
            if !self.hdc.is_invalid() {
                if !self.old_pen.is_invalid() {
                    SelectObject(self.hdc, self.old_pen);
                }
                if !self.old_brush.is_invalid() {
                    SelectObject(self.hdc, self.old_brush);
                }
            }
            if !self.pen.is_invalid() {
                let _ = DeleteObject(self.pen);
            }
            if !self.key_brush.is_invalid() {
                let _ = DeleteObject(self.key_brush);
            }
            if !self.hdc.is_invalid() {
                ReleaseDC(self.hwnd, self.hdc);
            }
            if !self.hwnd.is_invalid() && !self.destroyed {
                let _ = DestroyWindow(self.hwnd);
            }
            if self.class_registered {
                let _ = UnregisterClassW(CLASS_NAME, self.instance);
            }
        }
        log::info!("Overlay window released");
    }
}
