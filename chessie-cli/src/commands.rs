pub mod ask;
pub mod build;
pub mod retrieve;
pub mod stats;
