//! MME_APP Task Implementation
//!
//! MME_APP keeps one [`UeContext`] per eNB association reported by S1AP:
//! - ESTABLISH creates the context and arms its guard timer
//! - UPLINK_NAS is decoded by its leading IEI; a DRX parameter is stored and
//!   answered with the assigned T3412 value, a T3412 value re-arms the
//!   periodic update timer
//! - RELEASE cancels the context's timers and drops it
//!
//! A guard timer expiry drops the context. Elements that fail to decode are
//! logged and dropped.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use nextmme_common::config::MmeAppConfig;
use nextmme_itti::{
    Envelope, Payload, Task, TaskContext, TaskId, TimerError, TimerHandle, TimerId, TimerKind,
};
use nextmme_nas::{
    DrxParameter, GprsTimer, GprsTimerUnit, InformationElement3, DRX_PARAMETER_IEI,
    T3412_VALUE_IEI,
};
use tracing::{debug, info, warn};

use super::context::{TimerPurpose, UeContext};
use crate::tasks::S1AP_TASK_ID;

/// MME_APP task.
pub struct MmeAppTask {
    config: MmeAppConfig,
    s1ap: TaskId,
    contexts: HashMap<i32, UeContext>,
    timers: HashMap<TimerId, (i32, TimerPurpose)>,
}

impl MmeAppTask {
    /// Creates the task answering through the node's S1AP task.
    pub fn new(config: MmeAppConfig) -> Self {
        Self::with_peer(config, S1AP_TASK_ID)
    }

    /// Creates the task answering through an explicit S1AP peer.
    pub fn with_peer(config: MmeAppConfig, s1ap: TaskId) -> Self {
        Self {
            config,
            s1ap,
            contexts: HashMap::new(),
            timers: HashMap::new(),
        }
    }

    fn arm(
        &mut self,
        ctx: &TaskContext,
        association_id: i32,
        purpose: TimerPurpose,
        duration: Duration,
    ) -> Option<TimerHandle> {
        let kind = match purpose {
            TimerPurpose::Guard => TimerKind::OneShot,
            TimerPurpose::PeriodicUpdate => TimerKind::Periodic,
        };
        match ctx.arm_timer(kind, duration) {
            Ok(handle) => {
                self.timers.insert(handle.id(), (association_id, purpose));
                Some(handle)
            }
            Err(e) => {
                warn!(association_id, ?purpose, "Failed to arm timer: {}", e);
                None
            }
        }
    }

    async fn cancel(&mut self, ctx: &TaskContext, handle: TimerHandle) {
        self.timers.remove(&handle.id());
        match ctx.cancel_timer(&handle).await {
            Ok(()) => {}
            // One-shot expiry already consumed
            Err(TimerError::UnknownTimer(id)) => debug!(timer = %id, "Timer already gone"),
            Err(e) => warn!(timer = %handle.id(), "Failed to cancel timer: {}", e),
        }
    }

    async fn release_context(&mut self, ctx: &TaskContext, association_id: i32) -> bool {
        let Some(ue) = self.contexts.remove(&association_id) else {
            return false;
        };
        for handle in ue.timers().collect::<Vec<_>>() {
            self.cancel(ctx, handle).await;
        }
        true
    }

    async fn handle_establish(
        &mut self,
        ctx: &TaskContext,
        association_id: i32,
        in_streams: u16,
        out_streams: u16,
    ) {
        if self.release_context(ctx, association_id).await {
            debug!(association_id, "Replacing existing UE context");
        }

        let mut ue = UeContext::new(association_id, in_streams, out_streams);
        ue.guard = self.arm(ctx, association_id, TimerPurpose::Guard, self.config.guard_timer());
        self.contexts.insert(association_id, ue);
        info!(association_id, contexts = self.contexts.len(), "UE context created");
    }

    async fn handle_uplink_nas(
        &mut self,
        ctx: &TaskContext,
        association_id: i32,
        stream: u16,
        pdu: Bytes,
    ) {
        if !self.contexts.contains_key(&association_id) {
            warn!(association_id, "Uplink NAS without UE context dropped");
            return;
        }

        match pdu.first().copied() {
            Some(DRX_PARAMETER_IEI) => match DrxParameter::decode(DRX_PARAMETER_IEI, &pdu) {
                Ok(drx) => self.accept_drx(ctx, association_id, stream, drx).await,
                Err(e) => warn!(association_id, "Dropping malformed DRX parameter: {}", e),
            },
            Some(T3412_VALUE_IEI) => match GprsTimer::decode(T3412_VALUE_IEI, &pdu) {
                Ok(timer) => self.update_periodic_timer(ctx, association_id, timer).await,
                Err(e) => warn!(association_id, "Dropping malformed T3412 value: {}", e),
            },
            Some(iei) => debug!(association_id, iei, "Unsupported NAS element ignored"),
            None => debug!(association_id, "Empty NAS PDU ignored"),
        }
    }

    async fn accept_drx(
        &mut self,
        ctx: &TaskContext,
        association_id: i32,
        stream: u16,
        drx: DrxParameter,
    ) {
        info!(association_id, %drx, "DRX parameter accepted");

        let (guard, periodic) = match self.contexts.get_mut(&association_id) {
            Some(ue) => {
                ue.drx = Some(drx);
                (ue.guard.take(), ue.periodic_update.take())
            }
            None => return,
        };
        for handle in guard.into_iter().chain(periodic) {
            self.cancel(ctx, handle).await;
        }

        let t3412 = self.arm(
            ctx,
            association_id,
            TimerPurpose::PeriodicUpdate,
            self.config.t3412(),
        );
        if let Some(ue) = self.contexts.get_mut(&association_id) {
            ue.periodic_update = t3412;
        }

        let value = GprsTimer::new(GprsTimerUnit::MultiplesOf1Minute, self.config.t3412_minutes);
        let mut buf = [0u8; GprsTimer::MAX_LENGTH];
        match value.encode(T3412_VALUE_IEI, &mut buf) {
            Ok(len) => {
                let payload = Payload::DownlinkData {
                    association_id,
                    stream,
                    data: Bytes::copy_from_slice(&buf[..len]),
                };
                if let Err(e) = ctx.send(self.s1ap, payload).await {
                    warn!(association_id, "Failed to send downlink: {}", e);
                }
            }
            Err(e) => warn!(association_id, "Failed to encode T3412 value: {}", e),
        }
    }

    async fn update_periodic_timer(
        &mut self,
        ctx: &TaskContext,
        association_id: i32,
        timer: GprsTimer,
    ) {
        let previous = match self.contexts.get_mut(&association_id) {
            Some(ue) => ue.periodic_update.take(),
            None => return,
        };
        if let Some(handle) = previous {
            self.cancel(ctx, handle).await;
        }

        let handle = match timer.duration() {
            Some(duration) if !duration.is_zero() => {
                debug!(association_id, ?duration, "Periodic update timer re-armed");
                self.arm(ctx, association_id, TimerPurpose::PeriodicUpdate, duration)
            }
            _ => {
                debug!(association_id, "Periodic update timer deactivated");
                None
            }
        };
        if let Some(ue) = self.contexts.get_mut(&association_id) {
            ue.periodic_update = handle;
        }
    }

    async fn handle_release(&mut self, ctx: &TaskContext, association_id: i32) {
        if self.release_context(ctx, association_id).await {
            info!(association_id, contexts = self.contexts.len(), "UE context released");
        } else {
            debug!(association_id, "Release for unknown context ignored");
        }
    }

    async fn handle_timer_expired(&mut self, ctx: &TaskContext, timer_id: TimerId) {
        let Some(&(association_id, purpose)) = self.timers.get(&timer_id) else {
            debug!(timer = %timer_id, "Expiry of unknown timer ignored");
            return;
        };

        match purpose {
            TimerPurpose::Guard => {
                self.timers.remove(&timer_id);
                if let Some(ue) = self.contexts.get_mut(&association_id) {
                    ue.guard = None;
                }
                warn!(association_id, "Guard timer expired, UE context dropped");
                self.release_context(ctx, association_id).await;
            }
            TimerPurpose::PeriodicUpdate => {
                if let Some(ue) = self.contexts.get_mut(&association_id) {
                    ue.periodic_updates += 1;
                    debug!(association_id, count = ue.periodic_updates, "Periodic update timer expired");
                }
            }
        }
    }
}

#[async_trait]
impl Task for MmeAppTask {
    async fn handle(&mut self, ctx: &TaskContext, envelope: Envelope) {
        match envelope.into_payload() {
            Payload::Establish {
                association_id,
                in_streams,
                out_streams,
            } => {
                self.handle_establish(ctx, association_id, in_streams, out_streams)
                    .await
            }
            Payload::UplinkNas {
                association_id,
                stream,
                pdu,
            } => {
                self.handle_uplink_nas(ctx, association_id, stream, pdu)
                    .await
            }
            Payload::Release { association_id } => self.handle_release(ctx, association_id).await,
            Payload::TimerExpired { timer_id, .. } => self.handle_timer_expired(ctx, timer_id).await,
            other => debug!(kind = %other.kind(), "MME_APP task ignoring envelope"),
        }
    }

    async fn on_shutdown(&mut self, ctx: &TaskContext) {
        info!(contexts = self.contexts.len(), "MME_APP task stopping");
        let associations: Vec<i32> = self.contexts.keys().copied().collect();
        for association_id in associations {
            self.release_context(ctx, association_id).await;
        }
    }
}
