//! PNG stills from read-back frames.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::RgbaImage;
use procgen::{PixelBuffer, Rgba};

/// Writes `frame` as an 8-bit RGBA PNG, creating parent directories.
pub fn save_png(frame: &PixelBuffer, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let image = RgbaImage::from_raw(frame.width, frame.height, frame.to_rgba8()).ok_or_else(|| {
        anyhow!(
            "frame holds {} pixels, expected {}x{}",
            frame.pixels.len(),
            frame.width,
            frame.height
        )
    })?;
    image
        .save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::debug!(path = %path.display(), "saved still frame");
    Ok(())
}

/// Reads an image file into a top-row-first pixel buffer.
pub fn load_image(path: &Path) -> Result<PixelBuffer> {
    let image = image::open(path)
        .with_context(|| format!("failed to open image at {}", path.display()))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    anyhow::ensure!(
        width > 0 && height > 0,
        "image at {} has zero extent ({width}x{height})",
        path.display()
    );
    let pixels = image
        .pixels()
        .map(|px| Rgba::from_rgba8(px.0))
        .collect();
    Ok(PixelBuffer {
        width,
        height,
        pixels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/frame-00000.png");
        let mut frame = PixelBuffer::filled(3, 2, Rgba::new(0.0, 0.0, 1.0, 1.0));
        frame.pixels[0] = Rgba::from_rgba8([255, 0, 0, 255]);

        save_png(&frame, &path).expect("save");
        let loaded = load_image(&path).expect("load");
        assert_eq!((loaded.width, loaded.height), (3, 2));
        assert_eq!(loaded.pixels[0].to_rgba8(), [255, 0, 0, 255]);
        assert_eq!(loaded.pixels[5].to_rgba8(), [0, 0, 255, 255]);
    }

    #[test]
    fn mismatched_frame_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let frame = PixelBuffer {
            width: 4,
            height: 4,
            pixels: vec![Rgba::TRANSPARENT; 3],
        };
        let err = save_png(&frame, &dir.path().join("bad.png")).unwrap_err();
        assert!(err.to_string().contains("expected 4x4"));
    }
}
