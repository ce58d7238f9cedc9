//! Invoice service: invoicing, payment links, webhook reconciliation and
//! reminder batch jobs behind a REST API.

pub mod config;
pub mod dtos;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;

pub use startup::Application;
