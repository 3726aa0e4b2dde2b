pub mod errors;
pub mod measure;
pub mod space;

pub use errors::*;
pub use measure::*;
pub use space::*;
