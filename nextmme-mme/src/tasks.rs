//! Task identities of the MME node

use nextmme_itti::TaskId;

/// S1AP task: terminates eNB signaling
pub const S1AP_TASK_ID: TaskId = TaskId::new(1);
/// MME_APP task: UE contexts and mobility management
pub const MME_APP_TASK_ID: TaskId = TaskId::new(2);
/// SCTP task: transport associations towards the eNBs
pub const SCTP_TASK_ID: TaskId = TaskId::new(3);

pub const S1AP_TASK_NAME: &str = "S1AP";
pub const MME_APP_TASK_NAME: &str = "MME_APP";
pub const SCTP_TASK_NAME: &str = "SCTP";

/// Name of one of the node's tasks.
pub fn task_name(id: TaskId) -> Option<&'static str> {
    match id {
        S1AP_TASK_ID => Some(S1AP_TASK_NAME),
        MME_APP_TASK_ID => Some(MME_APP_TASK_NAME),
        SCTP_TASK_ID => Some(SCTP_TASK_NAME),
        _ => None,
    }
}
