pub mod archive;
pub mod badge;
pub mod config;
pub mod dates;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod record;
pub mod update;
