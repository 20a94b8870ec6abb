pub mod errors;
pub mod record;
pub mod values;

pub use errors::*;
pub use record::*;
pub use values::*;
