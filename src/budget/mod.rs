pub mod naive_accountant;
pub mod request;
pub mod traits;
