//! EPS NAS information element codecs
//!
//! Stateless encode/decode routines invoked by the protocol tasks. They work
//! on plain byte slices and never touch the bus.
//!
//! - [`codec`]: [`CodecError`] and the [`InformationElement3`] trait
//! - [`ies`]: DRX parameter and GPRS timer elements

pub mod codec;
pub mod ies;

pub use codec::{CodecError, CodecResult, InformationElement3};
pub use ies::{DrxParameter, GprsTimer, GprsTimerUnit, DRX_PARAMETER_IEI, T3412_VALUE_IEI};
