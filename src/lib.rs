//! Artwork provenance registry: artworks, certificates of authenticity,
//! NFC tag bindings and verification levels, stored in SQLite with images
//! in object storage.

pub mod artist;
pub mod auth;
pub mod database;
pub mod error;
pub mod ingest;
pub mod media;
pub mod models;
pub mod services;
pub mod simulate;
pub mod storage;
pub mod utils;
pub mod views;
pub mod wizard;

pub use database::Database;
pub use error::{Error, Result};
