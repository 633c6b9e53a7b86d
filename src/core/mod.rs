pub mod config;
pub mod descriptor;
pub mod error;
pub mod event;
pub mod model;
