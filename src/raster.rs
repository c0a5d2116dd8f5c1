//! Software rasterizer for chart snapshots.
//!
//! Produces the static image behind `getDataURL` and image export. It draws
//! the background, value split lines, the category axis, and `bar` / `line` /
//! `scatter` series. Text (titles, labels) and other series types are not
//! drawn.

use std::io::Cursor;
use std::sync::OnceLock;

use base64::engine::general_purpose::STANDARD as BASE64_ENGINE;
use base64::Engine as _;
use image::{DynamicImage, Rgba, RgbaImage};
use regex::Regex;
use serde_json::Value;

use crate::namespace::DEFAULT_PALETTE;

pub const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);
const AXIS_COLOR: Rgba<u8> = Rgba([110, 112, 121, 255]);
const SPLIT_LINE_COLOR: Rgba<u8> = Rgba([224, 230, 241, 255]);
const BAR_BACKGROUND: Rgba<u8> = Rgba([180, 180, 180, 51]);

/// Largest canvas side, in device pixels.
pub const MAX_CANVAS_SIDE: u32 = 16_384;
/// Largest canvas area, in device pixels (256 MiB of RGBA).
pub const MAX_CANVAS_PIXELS: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "png" => Some(ImageFormat::Png),
            "jpeg" | "jpg" => Some(ImageFormat::Jpeg),
            _ => None,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }

    fn codec(&self) -> image::ImageFormat {
        match self {
            ImageFormat::Png => image::ImageFormat::Png,
            ImageFormat::Jpeg => image::ImageFormat::Jpeg,
        }
    }
}

/// What `getDataURL` was asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub format: ImageFormat,
    pub pixel_ratio: f64,
    /// `None` leaves the canvas transparent (PNG) or white (JPEG).
    pub background: Option<Rgba<u8>>,
}

impl Default for ImageRequest {
    fn default() -> Self {
        Self {
            format: ImageFormat::Png,
            pixel_ratio: 1.0,
            background: None,
        }
    }
}

impl ImageRequest {
    /// The fixed request used by image export: JPEG, 2x, white background.
    pub fn export() -> Self {
        Self {
            format: ImageFormat::Jpeg,
            pixel_ratio: 2.0,
            background: Some(WHITE),
        }
    }

    /// Parse `#{ type, pixelRatio, backgroundColor }`. Missing keys keep defaults.
    pub fn from_options(options: &Value) -> Result<Self, String> {
        let mut request = ImageRequest::default();
        let Some(map) = options.as_object() else {
            return Err("getDataURL options must be a map".to_string());
        };

        if let Some(kind) = map.get("type") {
            let name = kind.as_str().ok_or("getDataURL type must be a string")?;
            request.format = ImageFormat::parse(name)
                .ok_or_else(|| format!("unsupported image type: {}", name))?;
        }

        if let Some(ratio) = map.get("pixelRatio") {
            let ratio = ratio.as_f64().ok_or("pixelRatio must be a number")?;
            if !(ratio.is_finite() && ratio > 0.0 && ratio <= 8.0) {
                return Err(format!("pixelRatio out of range: {}", ratio));
            }
            request.pixel_ratio = ratio;
        }

        if let Some(color) = map.get("backgroundColor") {
            let text = color.as_str().ok_or("backgroundColor must be a string")?;
            request.background =
                Some(parse_color(text).ok_or_else(|| format!("invalid color: {}", text))?);
        }

        Ok(request)
    }
}

/// An encoded snapshot.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

impl EncodedImage {
    pub fn data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.format.mime(),
            BASE64_ENGINE.encode(&self.bytes)
        )
    }
}

fn hex_color_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^#([0-9a-fA-F]{3}|[0-9a-fA-F]{6}|[0-9a-fA-F]{8})$").unwrap())
}

fn rgb_color_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^rgba?\(\s*(\d{1,3})\s*,\s*(\d{1,3})\s*,\s*(\d{1,3})\s*(?:,\s*([0-9]*\.?[0-9]+)\s*)?\)$",
        )
        .unwrap()
    })
}

/// Parse a CSS color: `#rgb`, `#rrggbb`, `#rrggbbaa`, `rgb()`, `rgba()` or a basic name.
pub fn parse_color(text: &str) -> Option<Rgba<u8>> {
    let text = text.trim();

    if let Some(caps) = hex_color_regex().captures(text) {
        let hex = &caps[1];
        let digits: Vec<u8> = if hex.len() == 3 {
            hex.chars()
                .map(|c| c.to_digit(16).map(|d| (d * 17) as u8))
                .collect::<Option<Vec<_>>>()?
        } else {
            (0..hex.len())
                .step_by(2)
                .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
                .collect::<Option<Vec<_>>>()?
        };
        let alpha = digits.get(3).copied().unwrap_or(255);
        return Some(Rgba([digits[0], digits[1], digits[2], alpha]));
    }

    if let Some(caps) = rgb_color_regex().captures(text) {
        let channel = |i: usize| caps[i].parse::<u16>().ok().map(|v| v.min(255) as u8);
        let alpha = match caps.get(4) {
            Some(a) => (a.as_str().parse::<f64>().ok()?.clamp(0.0, 1.0) * 255.0).round() as u8,
            None => 255,
        };
        return Some(Rgba([channel(1)?, channel(2)?, channel(3)?, alpha]));
    }

    match text.to_ascii_lowercase().as_str() {
        "white" => Some(WHITE),
        "black" => Some(Rgba([0, 0, 0, 255])),
        "red" => Some(Rgba([255, 0, 0, 255])),
        "green" => Some(Rgba([0, 128, 0, 255])),
        "blue" => Some(Rgba([0, 0, 255, 255])),
        "gray" | "grey" => Some(Rgba([128, 128, 128, 255])),
        "transparent" => Some(TRANSPARENT),
        _ => None,
    }
}

fn blend(dst: &mut Rgba<u8>, src: Rgba<u8>) {
    let sa = src[3] as f64 / 255.0;
    if sa <= 0.0 {
        return;
    }
    let da = dst[3] as f64 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    for c in 0..3 {
        let s = src[c] as f64 * sa;
        let d = dst[c] as f64 * da * (1.0 - sa);
        dst[c] = ((s + d) / out_a).round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round() as u8;
}

fn fill_rect(img: &mut RgbaImage, x0: f64, y0: f64, x1: f64, y1: f64, color: Rgba<u8>) {
    let (w, h) = img.dimensions();
    let clamp_x = |v: f64| v.round().clamp(0.0, w as f64) as u32;
    let clamp_y = |v: f64| v.round().clamp(0.0, h as f64) as u32;
    let (xa, xb) = (clamp_x(x0.min(x1)), clamp_x(x0.max(x1)));
    let (ya, yb) = (clamp_y(y0.min(y1)), clamp_y(y0.max(y1)));
    for y in ya..yb {
        for x in xa..xb {
            blend(img.get_pixel_mut(x, y), color);
        }
    }
}

fn fill_circle(img: &mut RgbaImage, cx: f64, cy: f64, radius: f64, color: Rgba<u8>) {
    let (w, h) = img.dimensions();
    let x_start = (cx - radius).floor().max(0.0) as u32;
    let y_start = (cy - radius).floor().max(0.0) as u32;
    let x_end = ((cx + radius).ceil().max(0.0) as u32).min(w);
    let y_end = ((cy + radius).ceil().max(0.0) as u32).min(h);
    for y in y_start..y_end {
        for x in x_start..x_end {
            let dx = x as f64 + 0.5 - cx;
            let dy = y as f64 + 0.5 - cy;
            if dx * dx + dy * dy <= radius * radius {
                blend(img.get_pixel_mut(x, y), color);
            }
        }
    }
}

fn draw_segment(img: &mut RgbaImage, from: (f64, f64), to: (f64, f64), width: f64, color: Rgba<u8>) {
    let length = ((to.0 - from.0).powi(2) + (to.1 - from.1).powi(2)).sqrt();
    let steps = length.ceil().max(1.0) as usize;
    let radius = (width / 2.0).max(0.5);
    for i in 0..=steps {
        let t = i as f64 / steps as f64;
        let x = from.0 + (to.0 - from.0) * t;
        let y = from.1 + (to.1 - from.1) * t;
        fill_circle(img, x, y, radius, color);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeriesKind {
    Bar,
    Line,
    Scatter,
}

struct SeriesView {
    kind: SeriesKind,
    values: Vec<Option<f64>>,
    color: Rgba<u8>,
    background: Option<Rgba<u8>>,
}

fn data_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        Value::Array(items) => items.last().and_then(data_value),
        Value::Object(map) => map.get("value").and_then(data_value),
        _ => None,
    }
}

fn series_entries(option: &Value) -> Vec<&Value> {
    match option.get("series") {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(single @ Value::Object(_)) => vec![single],
        _ => Vec::new(),
    }
}

fn color_at(value: Option<&Value>) -> Option<Rgba<u8>> {
    value.and_then(Value::as_str).and_then(parse_color)
}

fn palette_color(option: &Value, index: usize) -> Rgba<u8> {
    if let Some(Value::Array(colors)) = option.get("color") {
        let parsed: Vec<Rgba<u8>> = colors.iter().filter_map(|c| color_at(Some(c))).collect();
        if !parsed.is_empty() {
            return parsed[index % parsed.len()];
        }
    }
    parse_color(DEFAULT_PALETTE[index % DEFAULT_PALETTE.len()]).unwrap_or(AXIS_COLOR)
}

fn series_views(option: &Value) -> Vec<SeriesView> {
    let mut views = Vec::new();
    for (index, entry) in series_entries(option).into_iter().enumerate() {
        let kind = match entry.get("type").and_then(Value::as_str) {
            Some("bar") => SeriesKind::Bar,
            Some("line") => SeriesKind::Line,
            Some("scatter") => SeriesKind::Scatter,
            other => {
                log::debug!("series type {:?} is not rasterized", other);
                continue;
            }
        };
        let values = match entry.get("data") {
            Some(Value::Array(items)) => items.iter().map(data_value).collect(),
            _ => Vec::new(),
        };
        let color = color_at(entry.pointer("/itemStyle/color"))
            .or_else(|| color_at(entry.get("color")))
            .unwrap_or_else(|| palette_color(option, index));
        let background = match entry.get("showBackground").and_then(Value::as_bool) {
            Some(true) => {
                Some(color_at(entry.pointer("/backgroundStyle/color")).unwrap_or(BAR_BACKGROUND))
            }
            _ => None,
        };
        views.push(SeriesView {
            kind,
            values,
            color,
            background,
        });
    }
    views
}

fn category_count(option: &Value, series: &[SeriesView]) -> usize {
    let axis = match option.get("xAxis") {
        Some(Value::Array(axes)) => axes.first(),
        other => other,
    };
    let from_axis = axis
        .and_then(|a| a.get("data"))
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0);
    let from_series = series.iter().map(|s| s.values.len()).max().unwrap_or(0);
    from_axis.max(from_series).max(1)
}

/// Smallest "nice" number (1, 2, 2.5, 5 x 10^k) at or above `value`.
fn nice_ceil(value: f64) -> f64 {
    if value <= 0.0 {
        return 0.0;
    }
    let magnitude = 10f64.powf(value.log10().floor());
    for step in [1.0, 2.0, 2.5, 5.0, 10.0] {
        if step * magnitude >= value {
            return step * magnitude;
        }
    }
    10.0 * magnitude
}

/// Device-pixel size of a `css_width` x `css_height` canvas at `ratio`, or an
/// error if it is larger than the rasterizer will allocate.
pub fn canvas_size(css_width: u32, css_height: u32, ratio: f64) -> Result<(u32, u32), String> {
    let width = (css_width as f64 * ratio).round().max(1.0);
    let height = (css_height as f64 * ratio).round().max(1.0);
    let too_large = || {
        format!(
            "canvas {}x{} is too large to render (limit {} px per side, {} px total)",
            width, height, MAX_CANVAS_SIDE, MAX_CANVAS_PIXELS
        )
    };
    if width > MAX_CANVAS_SIDE as f64 || height > MAX_CANVAS_SIDE as f64 {
        return Err(too_large());
    }
    let (width, height) = (width as u32, height as u32);
    match (width as u64).checked_mul(height as u64) {
        Some(pixels) if pixels <= MAX_CANVAS_PIXELS => Ok((width, height)),
        _ => Err(too_large()),
    }
}

/// Draw `option` onto a canvas of `css_width` x `css_height` scaled by the request's pixel ratio.
pub fn rasterize(
    option: &Value,
    css_width: u32,
    css_height: u32,
    request: &ImageRequest,
) -> Result<RgbaImage, String> {
    let ratio = request.pixel_ratio;
    let (width, height) = canvas_size(css_width, css_height, ratio)?;

    let background = request
        .background
        .or_else(|| color_at(option.get("backgroundColor")))
        .unwrap_or(match request.format {
            ImageFormat::Jpeg => WHITE,
            ImageFormat::Png => TRANSPARENT,
        });
    let mut img = RgbaImage::from_pixel(width, height, background);

    let series = series_views(option);
    if series.is_empty() {
        return Ok(img);
    }

    let (w, h) = (width as f64, height as f64);
    let left = w * 0.1;
    let right = w * 0.9;
    let (mut top, mut bottom) = (60.0 * ratio, h - 60.0 * ratio);
    if bottom - top < h * 0.2 {
        top = h * 0.1;
        bottom = h * 0.9;
    }

    let values = series.iter().flat_map(|s| s.values.iter().flatten().copied());
    let (min_v, max_v) = values.fold((0.0f64, 0.0f64), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let (min_v, mut max_v) = (-nice_ceil(-min_v), nice_ceil(max_v));
    if max_v <= min_v {
        max_v = min_v + 1.0;
    }
    let y_of = |v: f64| bottom - (v - min_v) / (max_v - min_v) * (bottom - top);

    let split_width = ratio.max(1.0);
    for i in 0..=5 {
        let y = top + (bottom - top) * i as f64 / 5.0;
        fill_rect(&mut img, left, y, right, y + split_width, SPLIT_LINE_COLOR);
    }
    let axis_y = y_of(0.0);
    fill_rect(&mut img, left, axis_y, right, axis_y + split_width, AXIS_COLOR);

    let categories = category_count(option, &series);
    let band = (right - left) / categories as f64;
    let bars: Vec<&SeriesView> = series.iter().filter(|s| s.kind == SeriesKind::Bar).collect();
    let group = band * 0.6;
    let bar_width = if bars.is_empty() { 0.0 } else { group / bars.len() as f64 };

    for (slot, bar) in bars.iter().enumerate() {
        for (i, value) in bar.values.iter().enumerate() {
            let x0 = left + band * i as f64 + (band - group) / 2.0 + bar_width * slot as f64;
            if let Some(bg) = bar.background {
                fill_rect(&mut img, x0, top, x0 + bar_width, bottom, bg);
            }
            if let Some(v) = value {
                fill_rect(&mut img, x0, y_of(*v), x0 + bar_width, axis_y, bar.color);
            }
        }
    }

    for view in series.iter().filter(|s| s.kind != SeriesKind::Bar) {
        let points: Vec<Option<(f64, f64)>> = view
            .values
            .iter()
            .enumerate()
            .map(|(i, v)| v.map(|v| (left + band * (i as f64 + 0.5), y_of(v))))
            .collect();
        if view.kind == SeriesKind::Line {
            for pair in points.windows(2) {
                if let [Some(a), Some(b)] = pair {
                    draw_segment(&mut img, *a, *b, 2.0 * ratio, view.color);
                }
            }
        }
        let radius = (if view.kind == SeriesKind::Scatter { 5.0 } else { 2.0 }) * ratio;
        for (x, y) in points.into_iter().flatten() {
            fill_circle(&mut img, x, y, radius, view.color);
        }
    }

    Ok(img)
}

/// Encode a canvas. JPEG output is flattened onto white since it has no alpha.
pub fn encode(img: RgbaImage, format: ImageFormat) -> Result<EncodedImage, image::ImageError> {
    let (width, height) = img.dimensions();
    let dynamic = match format {
        ImageFormat::Png => DynamicImage::ImageRgba8(img),
        ImageFormat::Jpeg => {
            let mut flat = RgbaImage::from_pixel(width, height, WHITE);
            for (x, y, pixel) in img.enumerate_pixels() {
                blend(flat.get_pixel_mut(x, y), *pixel);
            }
            DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(flat).to_rgb8())
        }
    };

    let mut cursor = Cursor::new(Vec::new());
    dynamic.write_to(&mut cursor, format.codec())?;
    Ok(EncodedImage {
        format,
        width,
        height,
        bytes: cursor.into_inner(),
    })
}
