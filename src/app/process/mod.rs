pub mod child;
#[cfg(test)]
pub mod fake;
pub mod lines;
pub mod runner;
