pub mod log_util;
pub mod shared_types;

#[cfg(test)]
pub mod tests;
