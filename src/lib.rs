pub mod cli;
pub mod config;
pub mod device;
pub mod selftest;
pub mod threads;
pub mod utils;
