pub mod layout;
pub mod provisioner;
pub mod retarget;

pub use layout::*;
pub use provisioner::*;
pub use retarget::*;
