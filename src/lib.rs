pub mod app;
pub mod command;
pub mod concat;
pub mod config;
pub mod encoder;
pub mod error;
pub mod events;
pub mod logging;
pub mod meta;
pub mod output;
pub mod playlist;
pub mod profile;
pub mod scan;
pub mod settings;
pub mod tasks {
    pub mod runner;
    pub mod supervisor;
}
