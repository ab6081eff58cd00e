pub mod accounting;
pub mod gateway;
pub mod lifecycle;
