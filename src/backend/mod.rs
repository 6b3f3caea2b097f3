pub mod local;
pub mod traits;
