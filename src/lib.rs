pub mod backend;
pub mod console_keyboard;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod fake_backend;
pub mod handler;
pub mod notes;
pub mod player;
pub mod receiver;
pub mod types;

#[cfg(feature = "hardware")]
pub mod midir_backend;
