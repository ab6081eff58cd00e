pub mod error;
pub mod exchange;
pub mod fill;
pub mod instrument;
pub mod order;
