//! Route modules for Hashstore Server

pub mod blobs;
pub mod health;
