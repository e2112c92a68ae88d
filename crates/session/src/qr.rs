//! Pairing QR code rendering.

use image::Luma;
use qrcode::QrCode;

use crate::error::SessionError;

/// Render a pairing code as a 256×256 PNG.
pub fn encode_png(code: &str) -> Result<Vec<u8>, SessionError> {
    let qr = QrCode::new(code.as_bytes()).map_err(|e| SessionError::Qr(e.to_string()))?;
    let img = qr.render::<Luma<u8>>().min_dimensions(256, 256).build();

    let mut png = Vec::new();
    image::DynamicImage::ImageLuma8(img)
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| SessionError::Qr(e.to_string()))?;
    Ok(png)
}
