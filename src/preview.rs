use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span, Text};
use tracing::warn;

use crate::catalog::{ItemId, MediaItem};
use crate::viewer::ZoomOrigin;

const UPPER_HALF_BLOCK: &str = "▀";
const ZOOM_FACTOR: u32 = 2;

/// A raster sized for a terminal area. `width`/`height` are the cells actually painted.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub text: Text<'static>,
    pub width: u16,
    pub height: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct RenderKey {
    item_id: ItemId,
    cols: u16,
    rows: u16,
    zoom: Option<(u8, u8)>,
}

/// Decoded images by source, plus the most recent render.
#[derive(Default)]
pub struct PreviewCache {
    decoded: HashMap<String, Option<DynamicImage>>,
    last: Option<(RenderKey, Rendered)>,
}

impl PreviewCache {
    pub fn render(
        &mut self,
        item: &MediaItem,
        cols: u16,
        rows: u16,
        zoom: Option<ZoomOrigin>,
    ) -> Rendered {
        let key = RenderKey {
            item_id: item.id,
            cols,
            rows,
            zoom: zoom.map(|origin| (origin.x.round() as u8, origin.y.round() as u8)),
        };
        if let Some((last_key, rendered)) = &self.last {
            if *last_key == key {
                return rendered.clone();
            }
        }

        let image = self
            .decoded
            .entry(item.source.clone())
            .or_insert_with(|| match load(&item.source) {
                Ok(image) => Some(image),
                Err(err) => {
                    warn!(item_id = item.id, error = %err, "preview: image unavailable");
                    None
                }
            });
        let rendered = match image {
            Some(image) => {
                let cropped;
                let source = match zoom {
                    Some(origin) => {
                        cropped = crop_for_zoom(image, origin);
                        &cropped
                    }
                    None => &*image,
                };
                half_blocks(source, cols, rows)
            }
            None => placeholder(&item.title),
        };
        self.last = Some((key, rendered.clone()));
        rendered
    }
}

fn load(source: &str) -> Result<DynamicImage> {
    let path = match source.strip_prefix("file://") {
        Some(path) => PathBuf::from(path),
        None if source.contains("://") => bail!("preview: remote source {source}"),
        None => PathBuf::from(source),
    };
    image::open(&path).with_context(|| format!("preview: decode {}", path.display()))
}

/// Window of 1/ZOOM_FACTOR of the image centred on `origin`, kept inside the image bounds.
fn crop_for_zoom(image: &DynamicImage, origin: ZoomOrigin) -> DynamicImage {
    let (width, height) = image.dimensions();
    let crop_w = (width / ZOOM_FACTOR).max(1);
    let crop_h = (height / ZOOM_FACTOR).max(1);
    let x = window_start(width, crop_w, origin.x);
    let y = window_start(height, crop_h, origin.y);
    image.crop_imm(x, y, crop_w, crop_h)
}

fn window_start(total: u32, window: u32, percent: f32) -> u32 {
    let center = (total as f32 * percent / 100.0).round() as i64;
    let start = center - i64::from(window) / 2;
    start.clamp(0, i64::from(total.saturating_sub(window))) as u32
}

/// Two pixel rows per cell: foreground paints the top half, background the bottom.
fn half_blocks(image: &DynamicImage, cols: u16, rows: u16) -> Rendered {
    if cols == 0 || rows == 0 {
        return Rendered {
            text: Text::default(),
            width: 0,
            height: 0,
        };
    }
    let scaled = image
        .resize(u32::from(cols), u32::from(rows) * 2, FilterType::Triangle)
        .to_rgb8();
    let (width, height) = scaled.dimensions();

    let mut lines = Vec::with_capacity(height.div_ceil(2) as usize);
    for y in (0..height).step_by(2) {
        let spans: Vec<Span<'static>> = (0..width)
            .map(|x| {
                let top = scaled.get_pixel(x, y);
                let style = Style::default().fg(Color::Rgb(top[0], top[1], top[2]));
                let style = if y + 1 < height {
                    let bottom = scaled.get_pixel(x, y + 1);
                    style.bg(Color::Rgb(bottom[0], bottom[1], bottom[2]))
                } else {
                    style
                };
                Span::styled(UPPER_HALF_BLOCK, style)
            })
            .collect();
        lines.push(Line::from(spans));
    }
    Rendered {
        width: width as u16,
        height: lines.len() as u16,
        text: Text::from(lines),
    }
}

fn placeholder(title: &str) -> Rendered {
    let label = format!("[image: {title}]");
    Rendered {
        width: unicode_width::UnicodeWidthStr::width(label.as_str()) as u16,
        height: 1,
        text: Text::from(label),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::tempdir;

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 10) as u8, (y * 10) as u8, 0])
        }))
    }

    #[test]
    fn half_blocks_pack_two_rows_per_cell() {
        let rendered = half_blocks(&gradient(8, 8), 8, 4);
        assert_eq!(rendered.width, 8);
        assert_eq!(rendered.height, 4);
        let first = &rendered.text.lines[0].spans[0];
        assert_eq!(first.content, UPPER_HALF_BLOCK);
        assert!(matches!(first.style.fg, Some(Color::Rgb(..))));
        assert!(first.style.bg.is_some());
    }

    #[test]
    fn zoom_window_stays_inside_image() {
        let image = gradient(100, 60);
        let crop = crop_for_zoom(&image, ZoomOrigin::new(100.0, 0.0));
        assert_eq!(crop.dimensions(), (50, 30));
        assert_eq!(window_start(100, 50, 100.0), 50);
        assert_eq!(window_start(100, 50, 0.0), 0);
        assert_eq!(window_start(100, 50, 50.0), 25);
    }

    #[test]
    fn missing_image_renders_placeholder() {
        let mut cache = PreviewCache::default();
        let item = MediaItem {
            id: 1,
            source: "https://cdn.example.com/a.jpg".into(),
            title: "Harbor".into(),
            category: "Street".into(),
        };
        let rendered = cache.render(&item, 20, 10, None);
        assert_eq!(rendered.height, 1);
        assert_eq!(rendered.text.lines[0].spans[0].content, "[image: Harbor]");
    }

    #[test]
    fn local_image_is_decoded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tiny.png");
        gradient(4, 4).save(&path).unwrap();
        let item = MediaItem {
            id: 2,
            source: path.display().to_string(),
            title: "Tiny".into(),
            category: "Street".into(),
        };
        let mut cache = PreviewCache::default();
        let rendered = cache.render(&item, 4, 2, Some(ZoomOrigin::default()));
        assert_eq!(rendered.height, 2);
    }
}
