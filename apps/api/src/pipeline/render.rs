//! PDF → page images (and text layer) for the vision stage.
//!
//! pdfium keeps thread-local state and is CPU-bound, so all of its work runs on the blocking
//! pool. The longest edge of each page is capped at `max_pixels` regardless of physical size.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::{debug, info, warn};

use crate::errors::PipelineError;
use crate::llm_client::ImageInput;

pub const PAGE_IMAGE_EXTENSION: &str = "png";
const PAGE_IMAGE_MEDIA_TYPE: &str = "image/png";

/// One rasterised page, PNG-encoded.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub index: usize,
    pub png: Bytes,
}

impl RenderedPage {
    pub fn to_image_input(&self) -> ImageInput {
        ImageInput {
            media_type: PAGE_IMAGE_MEDIA_TYPE.to_string(),
            data: STANDARD.encode(&self.png),
        }
    }
}

/// Everything the worker extracts from an uploaded PDF.
#[derive(Debug, Clone)]
pub struct ConvertedResume {
    pub pages: Vec<RenderedPage>,
    /// Embedded text layer, if the PDF has one.
    pub text: Option<String>,
}

#[async_trait]
pub trait ResumeConverter: Send + Sync {
    async fn convert(&self, pdf: Bytes) -> Result<ConvertedResume, PipelineError>;
}

pub struct PdfiumConverter {
    lib_dir: Option<PathBuf>,
    max_pixels: u32,
}

impl PdfiumConverter {
    pub fn new(lib_dir: Option<PathBuf>, max_pixels: u32) -> Self {
        Self {
            lib_dir,
            max_pixels,
        }
    }
}

#[async_trait]
impl ResumeConverter for PdfiumConverter {
    async fn convert(&self, pdf: Bytes) -> Result<ConvertedResume, PipelineError> {
        let lib_dir = self.lib_dir.clone();
        let max_pixels = self.max_pixels;
        let render_input = pdf.clone();

        let pages = tokio::task::spawn_blocking(move || {
            render_pages_blocking(&render_input, lib_dir.as_deref(), max_pixels)
        })
        .await
        .map_err(|e| PipelineError::Render(format!("render task panicked: {e}")))??;

        if pages.is_empty() {
            return Err(PipelineError::NoPages);
        }

        let text = extract_text(pdf).await;
        Ok(ConvertedResume { pages, text })
    }
}

fn bind_pdfium(lib_dir: Option<&Path>) -> Result<Pdfium, PipelineError> {
    let bindings = match lib_dir {
        Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| PipelineError::Render(format!("pdfium library unavailable: {e:?}")))?;
    Ok(Pdfium::new(bindings))
}

fn render_pages_blocking(
    pdf: &[u8],
    lib_dir: Option<&Path>,
    max_pixels: u32,
) -> Result<Vec<RenderedPage>, PipelineError> {
    let pdfium = bind_pdfium(lib_dir)?;

    let document = pdfium
        .load_pdf_from_byte_slice(pdf, None)
        .map_err(|e| PipelineError::Render(format!("could not open PDF: {e:?}")))?;

    let pages = document.pages();
    info!("PDF loaded: {} pages", pages.len());

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut rendered = Vec::with_capacity(pages.len() as usize);
    for (index, page) in pages.iter().enumerate() {
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| PipelineError::Render(format!("page {}: {e:?}", index + 1)))?;
        let img = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            index + 1,
            img.width(),
            img.height()
        );
        let png = encode_png(&img)
            .map_err(|e| PipelineError::Render(format!("page {}: {e}", index + 1)))?;
        rendered.push(RenderedPage { index, png });
    }

    Ok(rendered)
}

/// Lossless PNG keeps small print legible for the vision model.
pub fn encode_png(img: &DynamicImage) -> Result<Bytes, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(Bytes::from(buf))
}

/// Best-effort text layer. Scanned resumes have none, and some PDFs make the extractor fail or
/// panic; all of those yield `None`.
pub async fn extract_text(pdf: Bytes) -> Option<String> {
    let extracted = tokio::task::spawn_blocking(move || {
        pdf_extract::extract_text_from_mem(&pdf).map_err(|e| e.to_string())
    })
    .await;

    match extracted {
        Ok(Ok(text)) => {
            let text = text.trim();
            (!text.is_empty()).then(|| text.to_string())
        }
        Ok(Err(e)) => {
            warn!("Resume text extraction failed: {e}");
            None
        }
        Err(e) => {
            warn!("Resume text extraction panicked: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_encode_png_produces_png_signature() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([0, 0, 255, 255])));
        let png = encode_png(&img).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_page_image_input_is_base64_png() {
        let page = RenderedPage {
            index: 0,
            png: Bytes::from_static(b"png-bytes"),
        };
        let input = page.to_image_input();
        assert_eq!(input.media_type, "image/png");
        assert_eq!(STANDARD.decode(&input.data).unwrap(), b"png-bytes");
    }

    #[tokio::test]
    async fn test_extract_text_from_garbage_is_none() {
        assert_eq!(extract_text(Bytes::from_static(b"definitely not a pdf")).await, None);
    }
}
