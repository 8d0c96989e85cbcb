//! Types representing the data the system works with.

pub mod api;
pub mod common;
pub mod db;
pub mod mongodb;
