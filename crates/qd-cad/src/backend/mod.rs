//! Drawing backends

pub mod gds;
mod hfss;
mod traits;

pub use gds::GdsBackend;
pub use hfss::{HfssBackend, HfssCommand, HfssDesign, ObjectKind};
pub use traits::{Backend, BackendError, BackendResult, Material};
