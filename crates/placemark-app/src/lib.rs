//! # placemark-app
//!
//! Startup wiring for placemark: environment configuration, backend
//! selection and construction of the review and engagement stores. The
//! `placemark` binary in this crate is a thin operator CLI over
//! [`Services`].

pub mod config;
pub mod services;

pub use config::{AppConfig, BlobBackend, CompressorChoice, DocumentBackend, LogConfig};
pub use services::{CheckReport, Services};
