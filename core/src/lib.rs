pub mod brewing;
pub mod db;
pub mod leaderboard;
pub mod level;
pub mod models;
pub mod service;
pub mod session;
pub mod store;
pub mod sync;
