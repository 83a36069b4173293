pub mod app;
pub mod applications;
pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod feed;
pub mod opportunities;
pub mod scoring;
pub mod state;
pub mod storage;
pub mod users;

#[cfg(test)]
pub(crate) mod test_support;
