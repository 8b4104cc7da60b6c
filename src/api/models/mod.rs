pub mod error;
pub mod inspection;

pub use error::ApiError;
pub use inspection::*;
