//! NAS Information Elements (IEs)
//!
//! Only the fixed-length (type 3) elements the MME tasks decode are
//! implemented: [`DrxParameter`] and [`GprsTimer`].

pub mod ie3;

pub use ie3::*;
