pub mod oracle;
pub mod resolver;

#[cfg(test)]
pub mod fake;

pub use oracle::HttpAccessOracle;
pub use resolver::{AccessPolicy, AccessResolver};
