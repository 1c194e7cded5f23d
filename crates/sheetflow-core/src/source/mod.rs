//! Spreadsheet sources: locators, the client seam, and the cached reader

pub mod client;
pub mod http;
pub mod locator;
pub mod reader;

pub use client::{FetchError, SheetClient, SheetRecord};
pub use http::HttpSheetClient;
pub use locator::Locator;
pub use reader::{cache_key, records_to_table, SourceDescriptor, SourceReader};
