use std::path::Path;

use anyhow::Context;
use resvg::tiny_skia;
use resvg::usvg::{self, fontdb};
use resvg::usvg::{TreeParsing, TreeTextToPath};

use crate::record::LossRecord;

const WIDTH: f64 = 800.0;
const HEIGHT: f64 = 500.0;
const MARGIN: f64 = 60.0;

const CHART_TEMPLATE: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="{{ width }}" height="{{ height }}" viewBox="0 0 {{ width }} {{ height }}">
  <rect width="100%" height="100%" fill="white"/>
  <text x="{{ width / 2 }}" y="30" font-family="sans-serif" font-size="18" text-anchor="middle">{{ name }}</text>
  <line x1="{{ left }}" y1="{{ bottom }}" x2="{{ right }}" y2="{{ bottom }}" stroke="black"/>
  <line x1="{{ left }}" y1="{{ top }}" x2="{{ left }}" y2="{{ bottom }}" stroke="black"/>
  <text x="{{ left - 8 }}" y="{{ top + 4 }}" font-family="sans-serif" font-size="12" text-anchor="end">{{ max_label }}</text>
  <text x="{{ left - 8 }}" y="{{ bottom + 4 }}" font-family="sans-serif" font-size="12" text-anchor="end">{{ min_label }}</text>
  <text x="{{ left }}" y="{{ bottom + 20 }}" font-family="sans-serif" font-size="12" text-anchor="middle">1</text>
  <text x="{{ right }}" y="{{ bottom + 20 }}" font-family="sans-serif" font-size="12" text-anchor="middle">{{ epochs }}</text>
  <text x="{{ width / 2 }}" y="{{ bottom + 40 }}" font-family="sans-serif" font-size="14" text-anchor="middle">epoch</text>
  {% for series in series %}
  <polyline fill="none" stroke="{{ series.color }}" stroke-width="2" points="{{ series.points }}"/>
  <line x1="{{ right - 120 }}" y1="{{ top + 20 * loop.index }}" x2="{{ right - 90 }}" y2="{{ top + 20 * loop.index }}" stroke="{{ series.color }}" stroke-width="2"/>
  <text x="{{ right - 82 }}" y="{{ top + 20 * loop.index + 4 }}" font-family="sans-serif" font-size="12">{{ series.label }}</text>
  {% endfor %}
</svg>
"##;

#[derive(serde::Serialize)]
struct Series {
    label: &'static str,
    color: &'static str,
    points: String,
}

/// Renders the train/val loss curves of a finished run as an SVG document.
pub fn loss_chart_svg(record: &LossRecord, epochs: usize, name: &str) -> anyhow::Result<String> {
    let finite = record
        .train_losses()
        .chain(record.val_losses())
        .filter(|v| v.is_finite());
    let (min, max) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    let (min, max) = if min.is_finite() { (min, max) } else { (0.0, 1.0) };
    let span = if max > min { max - min } else { 1.0 };

    let (left, right, top, bottom) = (MARGIN, WIDTH - MARGIN, MARGIN, HEIGHT - MARGIN);
    let x_step = (right - left) / (epochs.max(2) - 1) as f64;
    let points = |values: &mut dyn Iterator<Item = f64>| -> String {
        record
            .entries()
            .iter()
            .zip(values)
            .filter(|(_, v)| v.is_finite())
            .map(|(entry, v)| {
                let x = left + (entry.epoch.saturating_sub(1)) as f64 * x_step;
                let y = bottom - (v - min) / span * (bottom - top);
                format!("{x:.2},{y:.2}")
            })
            .collect::<Vec<_>>()
            .join(" ")
    };

    let series = vec![
        Series {
            label: "train_loss",
            color: "#1f77b4",
            points: points(&mut record.train_losses()),
        },
        Series {
            label: "val_loss",
            color: "#ff7f0e",
            points: points(&mut record.val_losses()),
        },
    ];

    let mut context = tera::Context::new();
    context.insert("width", &WIDTH);
    context.insert("height", &HEIGHT);
    context.insert("left", &left);
    context.insert("right", &right);
    context.insert("top", &top);
    context.insert("bottom", &bottom);
    context.insert("epochs", &epochs);
    context.insert("name", name);
    context.insert("min_label", &format!("{min:.3}"));
    context.insert("max_label", &format!("{max:.3}"));
    context.insert("series", &series);

    tera::Tera::one_off(CHART_TEMPLATE, &context, true).context("cannot render loss chart")
}

/// Rasterizes the loss chart to a PNG file.
pub fn save_loss_chart(record: &LossRecord, epochs: usize, path: &Path) -> anyhow::Result<()> {
    let svg = loss_chart_svg(record, epochs, "loss")?;
    let pixmap = rasterize(&svg)?;
    pixmap
        .save_png(path)
        .map_err(|err| anyhow::anyhow!("cannot write '{}': {err}", path.display()))?;

    tracing::info!("loss chart saved to '{}'", path.display());
    Ok(())
}

fn rasterize(svg: &str) -> anyhow::Result<tiny_skia::Pixmap> {
    let svg_tree = {
        let opt = usvg::Options::default();
        let mut font_db = fontdb::Database::new();
        font_db.load_system_fonts();

        let mut tree = usvg::Tree::from_data(svg.as_bytes(), &opt)
            .map_err(|err| anyhow::anyhow!("invalid chart svg: {err}"))?;
        tree.convert_text(&font_db);
        resvg::Tree::from_usvg(&tree)
    };
    let pixmap_size = svg_tree.size.to_int_size();
    let mut pixmap = tiny_skia::Pixmap::new(pixmap_size.width(), pixmap_size.height())
        .ok_or(anyhow::Error::msg("chart has an empty canvas"))?;
    svg_tree.render(tiny_skia::Transform::default(), &mut pixmap.as_mut());

    Ok(pixmap)
}

#[cfg(test)]
mod tests {
    use std::{env, fs};

    use super::*;

    fn record() -> LossRecord {
        let mut record = LossRecord::default();
        for epoch in 1..=5 {
            record.push(epoch, 5.0 / epoch as f64, 6.0 / epoch as f64);
        }
        record
    }

    #[test]
    fn svg_has_one_polyline_per_series() {
        let svg = loss_chart_svg(&record(), 5, "loss").unwrap();

        assert_eq!(svg.matches("<polyline").count(), 2);
        assert!(svg.contains("train_loss"));
        assert!(svg.contains("val_loss"));
    }

    #[test]
    fn png_is_written() {
        let path = env::temp_dir().join(format!("loss-{}.png", std::process::id()));
        save_loss_chart(&record(), 5, &path).unwrap();

        let bytes = fs::read(&path).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
        fs::remove_file(&path).ok();
    }
}
