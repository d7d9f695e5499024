//! Import worker for the GD solar CRM
//!
//! Reads client-base and invoice spreadsheets (CSV, XLSX, XLS), proposes a
//! column mapping for operator review and imports the confirmed rows into a
//! tenant-scoped client store.

pub mod cli;
pub mod commands;
pub mod config;
pub mod db;
pub mod defaults;
pub mod error;
pub mod handlers;
pub mod services;
pub mod types;
