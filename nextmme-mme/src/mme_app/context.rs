//! Per-association UE context kept by MME_APP

use nextmme_itti::TimerHandle;
use nextmme_nas::DrxParameter;

/// Why MME_APP armed a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPurpose {
    /// Guards the time between ESTABLISH and the first accepted NAS element
    Guard,
    /// Periodic update timer (T3412)
    PeriodicUpdate,
}

/// UE context bound to one eNB association.
#[derive(Debug, Clone)]
pub struct UeContext {
    /// Association the context is bound to
    pub association_id: i32,
    /// Inbound streams of the association
    pub in_streams: u16,
    /// Outbound streams of the association
    pub out_streams: u16,
    /// Last DRX parameter received from the UE
    pub drx: Option<DrxParameter>,
    /// Running guard timer
    pub guard: Option<TimerHandle>,
    /// Running periodic update timer
    pub periodic_update: Option<TimerHandle>,
    /// Number of periodic update expiries seen
    pub periodic_updates: u64,
}

impl UeContext {
    pub fn new(association_id: i32, in_streams: u16, out_streams: u16) -> Self {
        Self {
            association_id,
            in_streams,
            out_streams,
            drx: None,
            guard: None,
            periodic_update: None,
            periodic_updates: 0,
        }
    }

    /// Running timers of the context.
    pub fn timers(&self) -> impl Iterator<Item = TimerHandle> + '_ {
        self.guard.iter().chain(self.periodic_update.iter()).copied()
    }
}
