#[cfg(test)]
pub mod http_tests;
#[cfg(test)]
pub mod nonce_pool_tests;
#[cfg(test)]
pub mod utils;
