//! Live scene-camera frames through OpenCV

use super::{FrameSource, SourceError};
use async_trait::async_trait;
use image::RgbImage;
use opencv::{core, imgproc, prelude::*, videoio};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

pub struct CameraSource {
    camera: Arc<Mutex<videoio::VideoCapture>>,
    wait: Duration,
}

impl CameraSource {
    pub fn open(index: i32, wait: Duration) -> Result<Self, SourceError> {
        log::info!("Opening camera {index}...");
        let camera = videoio::VideoCapture::new(index, videoio::CAP_ANY).map_err(cv_err)?;
        if !camera.is_opened().map_err(cv_err)? {
            return Err(SourceError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("camera {index} could not be opened"),
            )));
        }
        Ok(Self {
            camera: Arc::new(Mutex::new(camera)),
            wait,
        })
    }
}

fn cv_err(e: opencv::Error) -> SourceError {
    SourceError::Decode(e.to_string())
}

fn read_rgb(camera: &Mutex<videoio::VideoCapture>) -> Result<Option<RgbImage>, SourceError> {
    let mut frame = core::Mat::default();
    if !camera.lock().read(&mut frame).map_err(cv_err)? || frame.empty() {
        return Ok(None);
    }

    let mut rgb = core::Mat::default();
    imgproc::cvt_color(&frame, &mut rgb, imgproc::COLOR_BGR2RGB, 0).map_err(cv_err)?;
    let (width, height) = (rgb.cols() as u32, rgb.rows() as u32);
    let bytes = rgb.data_bytes().map_err(cv_err)?.to_vec();

    RgbImage::from_raw(width, height, bytes)
        .map(Some)
        .ok_or_else(|| SourceError::Decode("frame buffer size mismatch".into()))
}

#[async_trait]
impl FrameSource for CameraSource {
    async fn next_frame(&mut self) -> Result<Option<RgbImage>, SourceError> {
        let camera = Arc::clone(&self.camera);
        let read = tokio::task::spawn_blocking(move || read_rgb(&camera));
        match tokio::time::timeout(self.wait, read).await {
            Ok(joined) => joined.map_err(|e| SourceError::Decode(e.to_string()))?,
            Err(_) => Ok(None),
        }
    }
}
