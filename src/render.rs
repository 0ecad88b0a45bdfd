//! # Field Rendering
//!
//! Quick-look pseudocolor plots of a field in plate carrée display space.
//! Every pixel centre is taken back into the field's own frame and coloured
//! by the cell containing it, so projected and geographic fields share the
//! same display. Masked cells and pixels outside the grid stay transparent.
//!
//! A graticule and optional coastline polylines (`[[[lon, lat], ...], ...]`
//! JSON) are drawn on top.

use crate::error::{RegridError, Result};
use crate::field::{Axis, GriddedField};
use image::codecs::png::PngEncoder;
use image::{ImageEncoder, Rgba, RgbaImage};
use imageproc::drawing::draw_line_segment_mut;
use log::debug;
use std::path::Path;

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);
const GRATICULE_COLOUR: Rgba<u8> = Rgba([90, 90, 90, 200]);
const COASTLINE_COLOUR: Rgba<u8> = Rgba([20, 20, 20, 255]);

/// Viridis sampled at five points
const COLOUR_STOPS: [(f32, [u8; 3]); 5] = [
    (0.0, [68, 1, 84]),
    (0.25, [59, 82, 139]),
    (0.5, [33, 145, 140]),
    (0.75, [94, 201, 98]),
    (1.0, [253, 231, 37]),
];

/// Candidate graticule spacings in degrees
const NICE_STEPS: [f64; 12] = [0.05, 0.1, 0.2, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 15.0, 30.0, 45.0];

/// A coastline as a list of `(lon, lat)` vertices
pub type Polyline = Vec<(f64, f64)>;

#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Image width in pixels
    pub width: u32,
    /// Upper limit on the image height; the width shrinks to respect it
    pub max_height: u32,
    /// Values mapped to the ends of the colour ramp (default: valid range)
    pub value_range: Option<(f32, f32)>,
    pub graticule: bool,
    /// Graticule spacing in degrees (default: picked from the extent)
    pub graticule_step: Option<f64>,
    pub coastlines: Vec<Polyline>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            width: 800,
            max_height: 1200,
            value_range: None,
            graticule: true,
            graticule_step: None,
            coastlines: Vec::new(),
        }
    }
}

/// Geographic display window
#[derive(Debug, Clone, Copy, PartialEq)]
struct Extent {
    lon_min: f64,
    lon_max: f64,
    lat_min: f64,
    lat_max: f64,
}

impl Extent {
    fn lon_span(&self) -> f64 {
        self.lon_max - self.lon_min
    }

    fn lat_span(&self) -> f64 {
        self.lat_max - self.lat_min
    }
}

/// Maps display pixels to geographic coordinates and back.
struct Viewport {
    extent: Extent,
    width: u32,
    height: u32,
}

impl Viewport {
    fn pixel_centre(&self, px: u32, py: u32) -> (f64, f64) {
        let lon = self.extent.lon_min + (px as f64 + 0.5) / self.width as f64 * self.extent.lon_span();
        let lat = self.extent.lat_max - (py as f64 + 0.5) / self.height as f64 * self.extent.lat_span();
        (lon, lat)
    }

    fn to_pixel(&self, lon: f64, lat: f64) -> (f32, f32) {
        let px = (lon - self.extent.lon_min) / self.extent.lon_span() * self.width as f64;
        let py = (self.extent.lat_max - lat) / self.extent.lat_span() * self.height as f64;
        (px as f32, py as f32)
    }
}

/// Renders `field` to an RGBA image.
pub fn render_field(field: &GriddedField, options: &RenderOptions) -> Result<RgbaImage> {
    if field.is_empty() {
        return Err(RegridError::Render(format!("field '{}' is empty", field.name)));
    }
    let crs = field.crs.as_ref().ok_or_else(|| {
        RegridError::Render(format!("field '{}' has no reference frame", field.name))
    })?;
    let y_edges = edges(&field.y)?;
    let x_edges = edges(&field.x)?;

    let extent = geographic_extent(field, &y_edges, &x_edges).ok_or_else(|| {
        RegridError::Render(format!("field '{}' has no geographic footprint", field.name))
    })?;
    let (width, height) = image_size(&extent, options.width, options.max_height);
    let viewport = Viewport {
        extent,
        width,
        height,
    };

    let (vmin, vmax) = options
        .value_range
        .or_else(|| field.valid_range())
        .unwrap_or((0.0, 1.0));

    let mut img = RgbaImage::from_pixel(width, height, TRANSPARENT);
    for py in 0..height {
        for px in 0..width {
            let (lon, lat) = viewport.pixel_centre(px, py);
            let Some((x, y)) = crs.from_geographic(lon, lat) else {
                continue;
            };
            let (Some(i), Some(j)) = (locate_cell(&y_edges, y), locate_cell(&x_edges, x)) else {
                continue;
            };
            if field.is_masked(i, j) {
                continue;
            }
            img.put_pixel(px, py, colour_for(field.value(i, j), vmin, vmax));
        }
    }

    if options.graticule {
        let step = options
            .graticule_step
            .filter(|s| s.is_finite() && *s > 0.0)
            .unwrap_or_else(|| nice_step(extent.lon_span().max(extent.lat_span())));
        draw_graticule(&mut img, &viewport, step);
    }
    for line in &options.coastlines {
        draw_polyline(&mut img, &viewport, line);
    }

    debug!(
        "Rendered '{}' {:?} as {}x{} px over lon [{:.3}, {:.3}] lat [{:.3}, {:.3}]",
        field.name,
        field.shape(),
        width,
        height,
        extent.lon_min,
        extent.lon_max,
        extent.lat_min,
        extent.lat_max
    );
    Ok(img)
}

/// PNG encoding of a rendered image.
pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    PngEncoder::new(&mut bytes).write_image(
        img.as_raw(),
        img.width(),
        img.height(),
        image::ColorType::Rgba8,
    )?;
    Ok(bytes)
}

/// Reads coastline polylines from a JSON file of `[[[lon, lat], ...], ...]`.
pub fn load_coastlines<P: AsRef<Path>>(path: P) -> Result<Vec<Polyline>> {
    let text = std::fs::read_to_string(path.as_ref())?;
    parse_coastlines(&text)
}

pub fn parse_coastlines(json: &str) -> Result<Vec<Polyline>> {
    let raw: Vec<Vec<[f64; 2]>> = serde_json::from_str(json)
        .map_err(|e| RegridError::format(format!("invalid coastline JSON: {}", e)))?;
    Ok(raw
        .into_iter()
        .map(|line| line.into_iter().map(|[lon, lat]| (lon, lat)).collect())
        .collect())
}

/// Cell edges of an axis, `len + 1` values in axis order.
fn edges(axis: &Axis) -> Result<Vec<f64>> {
    let bounds = match &axis.bounds {
        Some(bounds) => bounds.clone(),
        None => axis
            .guess_bounds()
            .map_err(|e| RegridError::Render(e.to_string()))?,
    };
    let mut edges = Vec::with_capacity(bounds.len() + 1);
    if let Some(first) = bounds.first() {
        edges.push(first[0]);
    }
    edges.extend(bounds.iter().map(|b| b[1]));
    Ok(edges)
}

/// Index of the cell whose edges enclose `v`.
fn locate_cell(edges: &[f64], v: f64) -> Option<usize> {
    let n = edges.len();
    if n < 2 || !v.is_finite() {
        return None;
    }
    let (first, last) = (edges[0], edges[n - 1]);
    if v < first.min(last) || v > first.max(last) {
        return None;
    }
    let count = if last > first {
        edges.partition_point(|&e| e <= v)
    } else {
        edges.partition_point(|&e| e >= v)
    };
    Some(count.saturating_sub(1).min(n - 2))
}

/// Geographic envelope of the grid outline, sampled along every cell edge.
fn geographic_extent(field: &GriddedField, y_edges: &[f64], x_edges: &[f64]) -> Option<Extent> {
    let crs = field.crs.as_ref()?;
    let (first_y, last_y) = (*y_edges.first()?, *y_edges.last()?);
    let (first_x, last_x) = (*x_edges.first()?, *x_edges.last()?);

    let outline = x_edges
        .iter()
        .flat_map(|&x| [(x, first_y), (x, last_y)])
        .chain(y_edges.iter().flat_map(|&y| [(first_x, y), (last_x, y)]));

    let mut extent: Option<Extent> = None;
    for (x, y) in outline {
        let Some((lon, lat)) = crs.to_geographic(x, y) else {
            continue;
        };
        extent = Some(match extent {
            None => Extent {
                lon_min: lon,
                lon_max: lon,
                lat_min: lat,
                lat_max: lat,
            },
            Some(e) => Extent {
                lon_min: e.lon_min.min(lon),
                lon_max: e.lon_max.max(lon),
                lat_min: e.lat_min.min(lat),
                lat_max: e.lat_max.max(lat),
            },
        });
    }
    extent.filter(|e| e.lon_span() > 0.0 && e.lat_span() > 0.0)
}

fn image_size(extent: &Extent, width: u32, max_height: u32) -> (u32, u32) {
    let aspect = extent.lat_span() / extent.lon_span();
    let width = width.max(1);
    let height = (width as f64 * aspect).round().max(1.0);
    if height > max_height.max(1) as f64 {
        let height = max_height.max(1);
        let width = (height as f64 / aspect).round().max(1.0) as u32;
        (width, height)
    } else {
        (width, height as u32)
    }
}

fn colour_for(value: f32, vmin: f32, vmax: f32) -> Rgba<u8> {
    let t = if vmax > vmin { (value - vmin) / (vmax - vmin) } else { 0.5 };
    let t = t.clamp(0.0, 1.0);

    let upper = COLOUR_STOPS
        .iter()
        .position(|(stop, _)| *stop >= t)
        .unwrap_or(COLOUR_STOPS.len() - 1)
        .max(1);
    let (t0, c0) = COLOUR_STOPS[upper - 1];
    let (t1, c1) = COLOUR_STOPS[upper];
    let f = ((t - t0) / (t1 - t0)).clamp(0.0, 1.0);
    let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * f).round() as u8;
    Rgba([mix(c0[0], c1[0]), mix(c0[1], c1[1]), mix(c0[2], c1[2]), 255])
}

/// Spacing giving roughly four to ten lines over `span` degrees.
fn nice_step(span: f64) -> f64 {
    NICE_STEPS
        .iter()
        .copied()
        .find(|step| span / step <= 8.0)
        .unwrap_or(90.0)
}

fn draw_graticule(img: &mut RgbaImage, viewport: &Viewport, step: f64) {
    let e = viewport.extent;
    let mut lon = (e.lon_min / step).ceil() * step;
    while lon <= e.lon_max {
        let (x0, y0) = viewport.to_pixel(lon, e.lat_max);
        let (x1, y1) = viewport.to_pixel(lon, e.lat_min);
        draw_line_segment_mut(img, (x0, y0), (x1, y1), GRATICULE_COLOUR);
        lon += step;
    }
    let mut lat = (e.lat_min / step).ceil() * step;
    while lat <= e.lat_max {
        let (x0, y0) = viewport.to_pixel(e.lon_min, lat);
        let (x1, y1) = viewport.to_pixel(e.lon_max, lat);
        draw_line_segment_mut(img, (x0, y0), (x1, y1), GRATICULE_COLOUR);
        lat += step;
    }
}

fn draw_polyline(img: &mut RgbaImage, viewport: &Viewport, line: &[(f64, f64)]) {
    for pair in line.windows(2) {
        let ((lon0, lat0), (lon1, lat1)) = (pair[0], pair[1]);
        // Segments jumping across the dateline
        if (lon1 - lon0).abs() > 180.0 {
            continue;
        }
        let start = viewport.to_pixel(lon0, lat0);
        let end = viewport.to_pixel(lon1, lat1);
        draw_line_segment_mut(img, start, end, COASTLINE_COLOUR);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::CoordinateReferenceFrame;

    fn field() -> GriddedField {
        GriddedField::new(
            "air_temperature",
            "K",
            Axis::new("latitude", "degrees_north", vec![50.0, 51.0, 52.0, 53.0]),
            Axis::new("longitude", "degrees_east", vec![0.0, 1.0, 2.0, 3.0]),
            (0..16).map(|v| 270.0 + v as f32).collect(),
            Some(CoordinateReferenceFrame::geographic()),
        )
        .unwrap()
        .with_mask((0..16).map(|k| k == 0).collect())
        .unwrap()
    }

    fn plain(width: u32) -> RenderOptions {
        RenderOptions {
            width,
            graticule: false,
            ..RenderOptions::default()
        }
    }

    #[test]
    fn test_image_size_follows_extent() {
        let img = render_field(&field(), &plain(40)).unwrap();
        assert_eq!(img.dimensions(), (40, 40));

        let tall = RenderOptions {
            max_height: 20,
            ..plain(40)
        };
        let img = render_field(&field(), &tall).unwrap();
        assert_eq!(img.dimensions(), (20, 20));
    }

    #[test]
    fn test_masked_cells_are_transparent() {
        let img = render_field(&field(), &plain(40)).unwrap();
        // Bottom-left cell (lat 50, lon 0) is masked
        assert_eq!(img.get_pixel(5, 35)[3], 0);
        // Top-right cell is valid and gets the top of the ramp
        assert_eq!(*img.get_pixel(35, 5), Rgba([253, 231, 37, 255]));
        // Second cell of the bottom row is the lowest valid value
        assert_eq!(*img.get_pixel(15, 35), Rgba([68, 1, 84, 255]));
    }

    #[test]
    fn test_projected_field_renders() {
        let field = GriddedField::new(
            "air_temperature",
            "K",
            Axis::new("projection_y_coordinate", "m", vec![-100_000.0, 0.0, 100_000.0]),
            Axis::new("projection_x_coordinate", "m", vec![-100_000.0, 0.0, 100_000.0]),
            vec![280.0; 9],
            Some(CoordinateReferenceFrame::ukv_laea()),
        )
        .unwrap();
        let img = render_field(&field, &RenderOptions::default()).unwrap();
        assert_eq!(img.width(), 800);
        // The centre of the image falls on the grid
        let centre = img.get_pixel(img.width() / 2, img.height() / 2);
        assert_eq!(centre[3], 255);
    }

    #[test]
    fn test_render_errors() {
        let mut no_frame = field();
        no_frame.crs = None;
        assert!(matches!(
            render_field(&no_frame, &RenderOptions::default()),
            Err(RegridError::Render(_))
        ));

        let empty = field().select(&[], &[0, 1]);
        assert!(matches!(
            render_field(&empty, &RenderOptions::default()),
            Err(RegridError::Render(_))
        ));
    }

    #[test]
    fn test_encode_png_signature() {
        let img = render_field(&field(), &RenderOptions::default()).unwrap();
        let png = encode_png(&img).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_colour_ramp_ends() {
        assert_eq!(colour_for(0.0, 0.0, 1.0), Rgba([68, 1, 84, 255]));
        assert_eq!(colour_for(1.0, 0.0, 1.0), Rgba([253, 231, 37, 255]));
        assert_eq!(colour_for(2.0, 0.0, 1.0), Rgba([253, 231, 37, 255]));
        assert_eq!(colour_for(0.5, 0.0, 1.0), Rgba([33, 145, 140, 255]));
        assert_eq!(colour_for(5.0, 5.0, 5.0), Rgba([33, 145, 140, 255]));
    }

    #[test]
    fn test_nice_step() {
        assert_eq!(nice_step(12.0), 2.0);
        assert_eq!(nice_step(1.0), 0.2);
        assert_eq!(nice_step(360.0), 45.0);
    }

    #[test]
    fn test_coastlines_parse_and_draw() {
        let lines = parse_coastlines("[[[0.0, 50.0], [3.0, 53.0]], [[1.0, 51.0]]]").unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], vec![(0.0, 50.0), (3.0, 53.0)]);

        let options = RenderOptions {
            coastlines: lines,
            ..plain(40)
        };
        let img = render_field(&field(), &options).unwrap();
        // The diagonal crosses the centre of the image
        assert_eq!(*img.get_pixel(20, 20), COASTLINE_COLOUR);

        assert!(matches!(parse_coastlines("{\"not\": 1}"), Err(RegridError::Format(_))));
    }
}
