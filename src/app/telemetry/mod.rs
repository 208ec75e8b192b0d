pub mod monitor;
pub mod parse;
