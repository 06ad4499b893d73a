pub mod mutes;
pub mod settings;
