//! Business logic services

pub mod client_import;
pub mod document;
pub mod header_resolver;
pub mod import_history;
pub mod import_processor;
pub mod invoice_import;
pub mod normalize;
pub mod orchestrator;
pub mod pipeline;
pub mod report;
pub mod tabular;
pub mod text;
pub mod workbook;
