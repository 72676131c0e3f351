//! Document extraction worker
//!
//! Consumes extraction jobs from a Redis queue, downloads the uploaded image
//! from MinIO, cleans it up for recognition, runs Tesseract, and stores the
//! normalized text in PostgreSQL and (optionally) Elasticsearch.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
pub mod shutdown;
pub mod worker;
