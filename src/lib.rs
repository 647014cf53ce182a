// ABOUTME: Library crate for dev-tutorial exposing the session core for the binary and tests

#![allow(missing_docs)]

pub mod cli;
pub mod command;
pub mod config;
pub mod docker;
pub mod hooks;
pub mod server;
pub mod session;
pub mod tutorial;
pub mod validators;
