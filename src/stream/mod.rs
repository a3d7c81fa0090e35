//! Stream combinators for frame delivery

mod paced;

pub use paced::{PaceExt, Paced};
