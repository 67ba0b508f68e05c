//! Supported locales.
//!
//! # Architecture
//!
//! - `registry`: the ordered catalog of locales and the countries each serves
//! - `language`: `LanguageCode`, a code validated against a catalog
//!
//! # Example
//!
//! ```rust,ignore
//! use geo_language_switcher::i18n::{LanguageCatalog, LanguageCode};
//!
//! let catalog = LanguageCatalog::get();
//! let portuguese = LanguageCode::from_code(catalog, "pt")?;
//! let for_brazil = catalog.entries_by_region("br");
//! ```

mod language;
mod registry;

pub use language::LanguageCode;
pub use registry::{LanguageCatalog, LanguageEntry};
