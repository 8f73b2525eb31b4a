//! Terminal voice client: configuration, cpal devices, and the terminal UI.

pub mod audio;
pub mod config;
pub mod resample;
pub mod terminal;
