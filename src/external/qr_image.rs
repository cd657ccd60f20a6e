use crate::error::{AppError, AppResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{DynamicImage, ImageFormat, Luma};
use qrcode::QrCode;
use std::io::Cursor;

/// 将票码渲染为 PNG 二维码并包装成 base64 data URL
pub fn render_qr_data_url(code: &str) -> AppResult<String> {
    let qr = QrCode::new(code.as_bytes())
        .map_err(|e| AppError::InternalError(format!("QR encoding failed: {e}")))?;

    let img = qr.render::<Luma<u8>>().min_dimensions(200, 200).build();

    let mut bytes: Vec<u8> = Vec::new();
    DynamicImage::ImageLuma8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| AppError::InternalError(format!("QR image rendering failed: {e}")))?;

    Ok(format!("data:image/png;base64,{}", STANDARD.encode(bytes)))
}
