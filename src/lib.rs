pub mod callback;
pub mod config;
pub mod db;
pub mod handlers;
pub mod menu;
pub mod model;
pub mod notifier;
pub mod stock;
pub mod telegram;
