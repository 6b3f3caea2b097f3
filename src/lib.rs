pub mod analysis;
pub mod backend;
pub mod budget;
pub mod mechanisms;
pub mod util;
