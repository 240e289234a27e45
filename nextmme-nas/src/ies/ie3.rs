//! Type 3 Information Elements (fixed length)
//!
//! 3GPP TS 24.008 / TS 24.301 elements used by the MME tasks.

use std::fmt;
use std::time::Duration;

use num_enum::{FromPrimitive, IntoPrimitive};

use crate::codec::{decode_iei, encode_iei, CodecResult, InformationElement3};

/// IEI of the DRX parameter in EPS mobility management messages
pub const DRX_PARAMETER_IEI: u8 = 0x5C;

/// IEI of the T3412 value (GPRS timer) in EPS mobility management messages
pub const T3412_VALUE_IEI: u8 = 0x5A;

// ============================================================================
// DRX Parameter
// ============================================================================

/// DRX parameter IE (3GPP TS 24.008 Section 10.5.5.6)
///
/// ```text
///   8   7   6   5   4   3   2   1
/// +-------------------------------+
/// |              IEI              |  octet 1
/// +-------------------------------+
/// |     SPLIT PG CYCLE CODE       |  octet 2
/// +---------------+---+-----------+
/// | CN coefficient|SPL| non-DRX   |  octet 3
/// +---------------+---+-----------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrxParameter {
    /// SPLIT PG CYCLE CODE
    pub split_pg_cycle_code: u8,
    /// CN specific DRX cycle length coefficient and DRX value for S1 mode (4 bits)
    pub cn_specific_drx_coefficient: u8,
    /// SPLIT on CCCH
    pub split_on_ccch: bool,
    /// Non-DRX timer (3 bits)
    pub non_drx_timer: u8,
}

impl DrxParameter {
    /// Creates a DRX parameter; oversized bit fields are truncated.
    pub fn new(
        split_pg_cycle_code: u8,
        cn_specific_drx_coefficient: u8,
        split_on_ccch: bool,
        non_drx_timer: u8,
    ) -> Self {
        Self {
            split_pg_cycle_code,
            cn_specific_drx_coefficient: cn_specific_drx_coefficient & 0x0F,
            split_on_ccch,
            non_drx_timer: non_drx_timer & 0x07,
        }
    }

    fn pack_octet3(&self) -> u8 {
        ((self.cn_specific_drx_coefficient & 0x0F) << 4)
            | (u8::from(self.split_on_ccch) << 3)
            | (self.non_drx_timer & 0x07)
    }

    fn unpack_octet3(octet: u8) -> (u8, bool, u8) {
        ((octet >> 4) & 0x0F, (octet >> 3) & 0x01 == 1, octet & 0x07)
    }
}

impl InformationElement3 for DrxParameter {
    const MIN_LENGTH: usize = 3;
    const MAX_LENGTH: usize = 3;

    fn encode(&self, iei: u8, buf: &mut [u8]) -> CodecResult<usize> {
        let offset = encode_iei(iei, Self::MAX_LENGTH, buf)?;
        buf[offset] = self.split_pg_cycle_code;
        buf[offset + 1] = self.pack_octet3();
        Ok(offset + 2)
    }

    fn decode(iei: u8, buf: &[u8]) -> CodecResult<Self> {
        let value = decode_iei(iei, Self::MIN_LENGTH, buf)?;
        let (cn_specific_drx_coefficient, split_on_ccch, non_drx_timer) =
            Self::unpack_octet3(value[1]);
        Ok(Self {
            split_pg_cycle_code: value[0],
            cn_specific_drx_coefficient,
            split_on_ccch,
            non_drx_timer,
        })
    }
}

impl fmt::Display for DrxParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DRX(split_pg_cycle_code={}, cn_coefficient={}, split_on_ccch={}, non_drx_timer={})",
            self.split_pg_cycle_code,
            self.cn_specific_drx_coefficient,
            u8::from(self.split_on_ccch),
            self.non_drx_timer
        )
    }
}

// ============================================================================
// GPRS Timer
// ============================================================================

/// GPRS timer value unit (3GPP TS 24.008 Section 10.5.7.3)
///
/// Reserved unit values (011-110) are kept as read and count as multiples
/// of 1 minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum GprsTimerUnit {
    /// Value is incremented in multiples of 2 seconds
    MultiplesOf2Seconds = 0b000,
    /// Value is incremented in multiples of 1 minute
    MultiplesOf1Minute = 0b001,
    /// Value is incremented in multiples of decihours (6 minutes)
    MultiplesOfDecihours = 0b010,
    /// Timer is deactivated
    Deactivated = 0b111,
    /// Reserved unit, interpreted as multiples of 1 minute
    #[num_enum(catch_all)]
    Reserved(u8),
}

impl Default for GprsTimerUnit {
    fn default() -> Self {
        GprsTimerUnit::MultiplesOf1Minute
    }
}

/// GPRS timer IE (3GPP TS 24.008 Section 10.5.7.3), e.g. T3412 value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GprsTimer {
    /// Timer value unit (bits 8-6)
    pub unit: GprsTimerUnit,
    /// Timer value (bits 5-1)
    pub value: u8,
}

impl GprsTimer {
    /// Creates a GPRS timer; the value is truncated to 5 bits.
    pub fn new(unit: GprsTimerUnit, value: u8) -> Self {
        Self {
            unit,
            value: value & 0x1F,
        }
    }

    /// Timer duration, `None` when deactivated.
    pub fn duration(&self) -> Option<Duration> {
        let step = match self.unit {
            GprsTimerUnit::MultiplesOf2Seconds => 2,
            GprsTimerUnit::MultiplesOf1Minute | GprsTimerUnit::Reserved(_) => 60,
            GprsTimerUnit::MultiplesOfDecihours => 360,
            GprsTimerUnit::Deactivated => return None,
        };
        Some(Duration::from_secs(step * u64::from(self.value)))
    }
}

impl InformationElement3 for GprsTimer {
    const MIN_LENGTH: usize = 2;
    const MAX_LENGTH: usize = 2;

    fn encode(&self, iei: u8, buf: &mut [u8]) -> CodecResult<usize> {
        let offset = encode_iei(iei, Self::MAX_LENGTH, buf)?;
        let unit: u8 = self.unit.into();
        buf[offset] = ((unit & 0x07) << 5) | (self.value & 0x1F);
        Ok(offset + 1)
    }

    fn decode(iei: u8, buf: &[u8]) -> CodecResult<Self> {
        let value = decode_iei(iei, Self::MIN_LENGTH, buf)?;
        Ok(Self {
            unit: GprsTimerUnit::from((value[0] >> 5) & 0x07),
            value: value[0] & 0x1F,
        })
    }
}
