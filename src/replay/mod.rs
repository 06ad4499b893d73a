//! Scripted playback of a comment session, used by the command-line tool.

pub mod runner;
pub mod script;
pub mod transport;
