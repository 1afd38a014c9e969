use std::path::Path;

use anyhow::Context;
use rand::Rng;
use resvg::tiny_skia::{FilterQuality, Pixmap, PixmapPaint, Transform};

/// Turns a radiograph PNG into a normalized `[3, size, size]` buffer.
#[derive(Debug, Clone, Copy)]
pub struct ImageTransform {
    pub size: usize,
    /// Random crop and horizontal flip, used for the training split only.
    pub augment: bool,
}

impl ImageTransform {
    pub fn eval(size: usize) -> Self {
        Self {
            size,
            augment: false,
        }
    }

    pub fn train(size: usize) -> Self {
        Self {
            size,
            augment: true,
        }
    }

    pub fn load(&self, path: &Path) -> anyhow::Result<Vec<f32>> {
        let pixmap = decode(path)?;
        self.apply(&pixmap)
            .with_context(|| format!("cannot transform '{}'", path.display()))
    }

    pub fn apply(&self, source: &Pixmap) -> anyhow::Result<Vec<f32>> {
        let base = if self.augment {
            self.size * 9 / 8
        } else {
            self.size
        };
        let resized = resize(source, base)?;

        let (offset_x, offset_y, flip) = if self.augment {
            let mut rng = rand::thread_rng();
            (
                rng.gen_range(0..=base - self.size),
                rng.gen_range(0..=base - self.size),
                rng.gen_bool(0.5),
            )
        } else {
            (0, 0, false)
        };

        let plane = self.size * self.size;
        let mut buffer = vec![0.0f32; 3 * plane];
        let pixels = resized.pixels();
        for y in 0..self.size {
            for x in 0..self.size {
                let source_x = if flip { self.size - 1 - x } else { x } + offset_x;
                let pixel = pixels[(y + offset_y) * base + source_x].demultiply();
                let at = y * self.size + x;
                buffer[at] = normalize(pixel.red());
                buffer[plane + at] = normalize(pixel.green());
                buffer[2 * plane + at] = normalize(pixel.blue());
            }
        }

        Ok(buffer)
    }
}

pub fn decode(path: &Path) -> anyhow::Result<Pixmap> {
    Pixmap::load_png(path).map_err(|err| anyhow::anyhow!("cannot decode '{}': {err}", path.display()))
}

fn normalize(channel: u8) -> f32 {
    channel as f32 / 255.0 * 2.0 - 1.0
}

fn resize(source: &Pixmap, size: usize) -> anyhow::Result<Pixmap> {
    let mut target = Pixmap::new(size as u32, size as u32)
        .ok_or_else(|| anyhow::anyhow!("invalid target image size {size}"))?;
    let scale_x = size as f32 / source.width() as f32;
    let scale_y = size as f32 / source.height() as f32;
    let paint = PixmapPaint {
        quality: FilterQuality::Bicubic,
        ..Default::default()
    };
    target.draw_pixmap(
        0,
        0,
        source.as_ref(),
        &paint,
        Transform::from_scale(scale_x, scale_y),
        None,
    );
    Ok(target)
}
