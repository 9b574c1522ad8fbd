pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod web;
