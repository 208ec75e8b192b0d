#[cfg(test)]
pub mod fake;
pub mod locator;
pub mod runner;
