//! Request handlers

pub mod domains;
pub mod health;
