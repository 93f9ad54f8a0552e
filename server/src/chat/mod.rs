pub mod commands;
pub mod history;
pub mod message;
pub mod rooms;
pub mod service;
pub mod users;
