//! Library crate for hitster-back: a shared music-timeline match driven by a
//! TV screen and player controllers, exposed for binaries and tests.

pub mod config;
pub mod dao;
pub mod dto;
pub mod error;
pub mod routes;
pub mod services;
pub mod state;
