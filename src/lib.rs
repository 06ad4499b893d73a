pub mod config;
pub mod db;
pub mod engine;
pub mod replay;
