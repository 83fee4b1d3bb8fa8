//! Pipeline stages for invoice extraction.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own and the I/O-bound ends (render, llm) can be replaced by
//! scripted fakes.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ llm ──▶ normalize ──▶ [merge] ──▶ reconcile
//! (*.pdf)   (pdfium)   (base64)   (VLM)   (text→JSON)   (per-page)  (record)
//! ```
//!
//! 1. [`input`]    : list the PDFs of the input directory in stable order
//! 2. [`render`]   : rasterise pages; synchronous, run on `spawn_blocking`
//! 3. [`encode`]   : PNG-encode and base64-wrap each page image
//! 4. [`llm`]      : the model call with retry, backoff and timeout
//! 5. [`normalize`]: recover one JSON object from free-form model text
//! 6. [`merge`]    : stitch per-page fragments (per-page strategy only)
//! 7. [`reconcile`]: coerce the open JSON shape into the canonical record

pub mod encode;
pub mod input;
pub mod llm;
pub mod merge;
pub mod normalize;
pub mod reconcile;
pub mod render;
