//! wabot core library: messaging client seam, lifecycle supervisor, chat commands and the
//! HTTP surface, used by the `wabot` CLI.

pub mod bot;
pub mod client;
pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod exec;
pub mod gateway;
pub mod init;
pub mod logging;
pub mod supervisor;
