pub mod commission;
pub mod market;
pub mod portfolio;
pub mod position;
pub mod settings;

pub use commission::*;
pub use market::*;
pub use portfolio::*;
pub use position::*;
pub use settings::*;
