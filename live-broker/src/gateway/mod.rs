pub mod paper;
pub mod retry;
pub mod stream;

#[cfg(test)]
pub mod mock;
