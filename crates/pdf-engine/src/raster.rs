//! Page rasterization backends.

use crate::annotate::{highlights, multiply};
use crate::error::{EngineError, EngineResult};
use crate::geometry::{device_size, Rect, Zoom};
use crate::layout::{interpret, Glyph};
use crate::objects::{page_box, page_id, page_rotation};
use image::{imageops, Rgb, RgbImage};
use lopdf::Document;
use std::path::Path;

const FRAME: Rgb<u8> = Rgb([220, 220, 220]);
const PAPER: Rgb<u8> = Rgb([255, 255, 255]);

/// An RGB page image, three bytes per pixel, rows packed without padding.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterPage {
    image: RgbImage,
}

impl RasterPage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn stride(&self) -> usize {
        self.image.width() as usize * 3
    }

    pub fn samples(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }
}

/// What a backend needs to draw one page of the working copy.
pub struct RenderInput<'a> {
    pub document: &'a Document,
    pub working_copy: &'a Path,
    pub page: usize,
    pub zoom: Zoom,
}

pub trait PageRasterizer: Send {
    fn render(&self, input: RenderInput<'_>) -> EngineResult<RasterPage>;
}

fn render_error(page: usize, err: impl ToString) -> EngineError {
    EngineError::PageRender { page, reason: err.to_string() }
}

/// Pure Rust preview: greeked glyphs in their fill colour on white paper,
/// with highlight annotations multiplied on top.
#[derive(Debug, Default, Clone, Copy)]
pub struct PreviewRasterizer;

impl PageRasterizer for PreviewRasterizer {
    fn render(&self, input: RenderInput<'_>) -> EngineResult<RasterPage> {
        let RenderInput { document, page, zoom, .. } = input;
        let page_id = page_id(document, page).map_err(|err| render_error(page, err))?;
        let (width, height) = device_size(page_box(document, page_id).size(), zoom);
        let mut image = RgbImage::from_pixel(width, height, PAPER);

        if width >= 4 && height >= 4 {
            for x in 0..width {
                image.put_pixel(x, 0, FRAME);
                image.put_pixel(x, height - 1, FRAME);
            }
            for y in 0..height {
                image.put_pixel(0, y, FRAME);
                image.put_pixel(width - 1, y, FRAME);
            }
        }

        let layout = interpret(document, page_id).map_err(|err| render_error(page, err))?;
        for glyph in layout.glyphs.iter().filter(|glyph| !glyph.is_blank()) {
            let [r, g, b] = glyph.color.to_rgb8();
            paint(&mut image, &ink(glyph), zoom, |_| [r, g, b]);
        }
        for (rect, color) in highlights(document, page_id) {
            paint(&mut image, &rect, zoom, |pixel| multiply(pixel, color));
        }

        let image = match page_rotation(document, page_id) {
            90 => imageops::rotate90(&image),
            180 => imageops::rotate180(&image),
            270 => imageops::rotate270(&image),
            _ => image,
        };
        Ok(RasterPage { image })
    }
}

/// The part of a glyph box that gets inked: the x-height band above the
/// baseline, slightly narrower than the advance.
fn ink(glyph: &Glyph) -> Rect {
    let bbox = glyph.bbox;
    let inset = bbox.width() * 0.1;
    let top = (glyph.origin.y - 0.7 * glyph.size).max(bbox.y0);
    let bottom = glyph.origin.y.min(bbox.y1);
    if bottom <= top {
        return bbox;
    }
    Rect::new(bbox.x0 + inset, top, bbox.x1 - inset, bottom)
}

fn paint(image: &mut RgbImage, rect: &Rect, zoom: Zoom, shade: impl Fn([u8; 3]) -> [u8; 3]) {
    let z = zoom.value();
    let clamp_x = |v: f32| (v.max(0.0) as u32).min(image.width());
    let clamp_y = |v: f32| (v.max(0.0) as u32).min(image.height());
    let (x0, x1) = (clamp_x((rect.x0 * z).floor()), clamp_x((rect.x1 * z).ceil()));
    let (y0, y1) = (clamp_y((rect.y0 * z).floor()), clamp_y((rect.y1 * z).ceil()));

    for y in y0..y1 {
        for x in x0..x1 {
            let pixel = image.get_pixel_mut(x, y);
            pixel.0 = shade(pixel.0);
        }
    }
}

#[cfg(feature = "pdfium")]
pub use pdfium_backend::PdfiumRasterizer;

#[cfg(feature = "pdfium")]
mod pdfium_backend {
    use super::*;
    use pdfium_render::prelude::*;

    /// Full-fidelity rendering through the system PDFium library.
    pub struct PdfiumRasterizer {
        pdfium: Pdfium,
    }

    impl PdfiumRasterizer {
        pub fn from_system_library() -> EngineResult<Self> {
            let bindings = Pdfium::bind_to_system_library()
                .map_err(|err| render_error(0, format!("failed to bind pdfium: {err}")))?;
            Ok(Self { pdfium: Pdfium::new(bindings) })
        }
    }

    impl PageRasterizer for PdfiumRasterizer {
        fn render(&self, input: RenderInput<'_>) -> EngineResult<RasterPage> {
            let RenderInput { working_copy, page, zoom, .. } = input;
            let bytes = std::fs::read(working_copy).map_err(|err| render_error(page, err))?;
            let document = self
                .pdfium
                .load_pdf_from_byte_slice(&bytes, None)
                .map_err(|err| render_error(page, err))?;
            let index = u16::try_from(page).map_err(|err| render_error(page, err))?;
            let pdf_page = document.pages().get(index).map_err(|err| render_error(page, err))?;

            let config = PdfRenderConfig::new().scale_page_by_factor(zoom.value());
            let bitmap =
                pdf_page.render_with_config(&config).map_err(|err| render_error(page, err))?;
            let width = bitmap.width().max(1) as u32;
            let height = bitmap.height().max(1) as u32;
            let rgb: Vec<u8> = bitmap
                .as_rgba_bytes()
                .chunks_exact(4)
                .flat_map(|pixel| [pixel[0], pixel[1], pixel[2]])
                .collect();

            let image = RgbImage::from_raw(width, height, rgb)
                .ok_or_else(|| render_error(page, "pdfium returned a short bitmap"))?;
            Ok(RasterPage { image })
        }
    }
}
