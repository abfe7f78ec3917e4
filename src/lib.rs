pub mod board;
pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod providers;
pub mod util;

pub use board::{Board, BoardConfig};
pub use error::BoardError;
