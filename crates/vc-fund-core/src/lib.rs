pub mod error;
pub mod fund;
pub mod monte_carlo;
pub mod scenarios;
pub mod time_value;
pub mod types;
pub mod waterfall;

pub use error::FundModelError;
pub use types::*;

pub type FundModelResult<T> = Result<T, FundModelError>;
