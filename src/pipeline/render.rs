//! PDF rasterisation: render every page of a document to a model-ready image.
//!
//! ## Why a trait?
//!
//! The document processor only needs "path in, page images out". Hiding
//! pdfium behind [`DocumentRenderer`] lets tests feed scripted pages and lets
//! callers swap in another backend without touching the pipeline.
//!
//! ## Blocking
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! [`DocumentRenderer::render`] is synchronous; the processor runs it on
//! `tokio::task::spawn_blocking`.
//!
//! ## Why cap pixels as well as DPI?
//!
//! Page sizes vary wildly: an A0 poster at 144 DPI would produce a
//! 6,700 × 9,500 px image. `max_rendered_pixels` caps the longest edge
//! regardless of physical size, keeping memory bounded.

use crate::config::ExtractionConfig;
use crate::error::RenderError;
use crate::pipeline::encode::encode_page;
use edgequake_llm::ImageData;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Turns a document on disk into one encoded image per page.
pub trait DocumentRenderer: Send + Sync {
    /// Render every page, in page order. An empty vector means the document
    /// has no pages.
    fn render(&self, path: &Path) -> Result<Vec<ImageData>, RenderError>;
}

/// [`DocumentRenderer`] backed by pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumRenderer {
    dpi: u32,
    max_pixels: u32,
    password: Option<String>,
}

impl PdfiumRenderer {
    pub fn new(dpi: u32, max_pixels: u32) -> Self {
        Self {
            dpi,
            max_pixels,
            password: None,
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            dpi: config.dpi,
            max_pixels: config.max_rendered_pixels,
            password: config.password.clone(),
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    fn render_config(&self) -> PdfRenderConfig {
        PdfRenderConfig::new()
            .scale_page_by_factor(self.dpi as f32 / 72.0)
            .set_maximum_width(self.max_pixels as i32)
            .set_maximum_height(self.max_pixels as i32)
    }
}

impl DocumentRenderer for PdfiumRenderer {
    fn render(&self, path: &Path) -> Result<Vec<ImageData>, RenderError> {
        let pdfium = pdfium_auto::bind_pdfium_silent()
            .map_err(|e| RenderError::EngineUnavailable(e.to_string()))?;

        let document = pdfium
            .load_pdf_from_file(path, self.password.as_deref())
            .map_err(|e| {
                let err_str = format!("{:?}", e);
                let detail = if err_str.contains("Password") || err_str.contains("password") {
                    if self.password.is_some() {
                        "wrong password".to_string()
                    } else {
                        "document is password-protected".to_string()
                    }
                } else {
                    err_str
                };
                RenderError::Unreadable {
                    path: path.to_path_buf(),
                    detail,
                }
            })?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        info!("{}: {} pages", path.display(), total_pages);

        let render_config = self.render_config();
        let mut images = Vec::with_capacity(total_pages);

        for idx in 0..total_pages {
            let page = pages
                .get(idx as u16)
                .map_err(|e| RenderError::PageFailed {
                    page: idx + 1,
                    detail: format!("{:?}", e),
                })?;

            let bitmap = page
                .render_with_config(&render_config)
                .map_err(|e| RenderError::PageFailed {
                    page: idx + 1,
                    detail: format!("{:?}", e),
                })?;

            let image = bitmap.as_image();
            debug!(
                "Rendered page {} → {}x{} px",
                idx + 1,
                image.width(),
                image.height()
            );

            let encoded = encode_page(&image).map_err(|e| RenderError::PageFailed {
                page: idx + 1,
                detail: format!("Image encoding failed: {}", e),
            })?;
            images.push(encoded);
        }

        Ok(images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_copies_render_knobs() {
        let config = ExtractionConfig::builder()
            .dpi(200)
            .max_rendered_pixels(1500)
            .password("secret")
            .build()
            .unwrap();
        let renderer = PdfiumRenderer::from_config(&config);
        assert_eq!(renderer.dpi, 200);
        assert_eq!(renderer.max_pixels, 1500);
        assert_eq!(renderer.password.as_deref(), Some("secret"));
    }

    #[test]
    fn renderer_is_object_safe() {
        let renderer: Box<dyn DocumentRenderer> = Box::new(PdfiumRenderer::new(144, 2000));
        let _ = renderer;
    }
}
