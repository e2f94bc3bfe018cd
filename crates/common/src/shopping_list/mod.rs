//! Shopping list export
//!
//! Turns the recipes a user has put in their shopping cart into one merged
//! ingredient list and renders it as a downloadable document:
//!
//! ```text
//! CartStore::load_cart -> aggregate_usages -> format_line -> DocumentRenderer::render
//! ```
//!
//! Nothing here is cached; every export recomputes from the current cart.

mod aggregate;
mod font;
mod render;
mod service;

pub use aggregate::{aggregate_usages, capitalize, AggregatedLine, IngredientUsage};
pub use render::{artifact_file_name, format_line, ArtifactRef, DocumentRenderer, PdfRenderer};
pub use service::{CartSnapshot, CartStore, ShoppingListExport, ShoppingListService};
