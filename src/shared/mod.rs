pub mod shutdown;
pub mod utills;
pub mod validations;

pub use shutdown::*;
pub use utills::*;
pub use validations::*;
