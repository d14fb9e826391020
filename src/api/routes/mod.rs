pub mod alerts;
pub mod commands;
pub mod data;
pub mod health;
pub mod nodes;
pub mod stats;
