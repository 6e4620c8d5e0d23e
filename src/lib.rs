//! Passwordless magic-link authentication for the Ebookchi backend.
//!
//! A user asks for a sign-in link by email, redeems the single-use token it
//! carries, and receives a signed session credential in an `authToken`
//! cookie.

pub mod auth;
pub mod config;
pub mod db;
pub mod mail;
pub mod models;
pub mod server;
pub mod validation;
