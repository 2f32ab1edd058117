//! Decentralized medical research demo.
//!
//! A wallet-backed session drives calls to an identity-token contract and a
//! research-results contract, simulated research runs are kept in a local
//! result store, and a generative-language API summarizes and explains
//! results. The [`app::App`] container ties these together for the terminal
//! front end in [`channels`].

pub mod app;
pub mod assist;
pub mod bootstrap;
pub mod channels;
pub mod cli;
pub mod config;
pub mod contracts;
pub mod error;
pub mod research;
pub mod session;
pub mod settings;
pub mod wallet;

pub use error::{Error, ErrorKind};
