//! TechInsights - An AI-generated technology blog
//!
//! This library provides the backend (generation, caching, HTTP API) and a
//! client library with retry and offline storage.

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
