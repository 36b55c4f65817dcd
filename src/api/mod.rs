// src/api/mod.rs

pub mod chat;
pub mod error;
pub mod router;
pub mod whatsapp;

pub use router::router;
