pub mod config;
pub mod error;
pub mod replication;

#[cfg(test)]
pub mod test_utils;
