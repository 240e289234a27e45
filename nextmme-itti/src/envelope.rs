//! Task identities and the message envelope
//!
//! An [`Envelope`] is the only thing tasks exchange. Its kind is derived from
//! the payload variant, so kind and payload can never disagree. Ownership of
//! the envelope moves into the destination mailbox on send; byte payloads are
//! [`Bytes`] so broadcast copies share one buffer.

use std::fmt;
use std::time::Instant;

use bytes::Bytes;

use crate::timer::TimerId;

// ============================================================================
// Task Identity
// ============================================================================

/// Identity of a registered task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u16);

impl TaskId {
    /// Origin of TERMINATE envelopes. Cannot be registered.
    pub const LIFECYCLE: TaskId = TaskId(0);
    /// Origin of TIMER_EXPIRED envelopes. Cannot be registered.
    pub const TIMER_SERVICE: TaskId = TaskId(u16::MAX);

    /// Creates a task identity from its raw value.
    pub const fn new(raw: u16) -> Self {
        TaskId(raw)
    }

    /// Returns the raw identity value.
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Returns true for identities used by the bus itself.
    pub fn is_reserved(self) -> bool {
        self == TaskId::LIFECYCLE || self == TaskId::TIMER_SERVICE
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            TaskId::LIFECYCLE => write!(f, "LIFECYCLE"),
            TaskId::TIMER_SERVICE => write!(f, "TIMER"),
            TaskId(raw) => write!(f, "task#{raw}"),
        }
    }
}

/// Where an envelope is going.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    /// A single registered task
    Task(TaskId),
    /// Every live task except the origin
    Broadcast,
}

impl From<TaskId> for Destination {
    fn from(id: TaskId) -> Self {
        Destination::Task(id)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Task(id) => write!(f, "{id}"),
            Destination::Broadcast => write!(f, "BROADCAST"),
        }
    }
}

/// Mailbox lane an envelope travels in.
///
/// CONTROL envelopes are always dequeued before NORMAL ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Priority {
    /// Regular signaling traffic
    #[default]
    Normal,
    /// Lifecycle traffic
    Control,
}

// ============================================================================
// Message Kinds and Payloads
// ============================================================================

/// Message-kind discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Terminate,
    TimerExpired,
    AssociationUp,
    DataReceived,
    AssociationDown,
    Establish,
    UplinkNas,
    DownlinkData,
    Release,
    Application,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::Terminate => "TERMINATE",
            MessageKind::TimerExpired => "TIMER_EXPIRED",
            MessageKind::AssociationUp => "ASSOCIATION_UP",
            MessageKind::DataReceived => "DATA_RECEIVED",
            MessageKind::AssociationDown => "ASSOCIATION_DOWN",
            MessageKind::Establish => "ESTABLISH",
            MessageKind::UplinkNas => "UPLINK_NAS",
            MessageKind::DownlinkData => "DOWNLINK_DATA",
            MessageKind::Release => "RELEASE",
            MessageKind::Application => "APPLICATION",
        };
        f.write_str(name)
    }
}

/// Envelope payload, one variant per message kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Stop the receiving task
    Terminate,
    /// A timer owned by the receiving task expired
    TimerExpired {
        /// Timer that fired
        timer_id: TimerId,
        /// Generation that fired
        generation: u64,
    },
    /// Transport association established
    AssociationUp {
        /// Association ID
        association_id: i32,
        /// Number of inbound streams
        in_streams: u16,
        /// Number of outbound streams
        out_streams: u16,
    },
    /// Data received on an association
    DataReceived {
        /// Association ID
        association_id: i32,
        /// Stream the data arrived on
        stream: u16,
        /// Number of inbound streams
        in_streams: u16,
        /// Number of outbound streams
        out_streams: u16,
        /// Received bytes
        data: Bytes,
    },
    /// Transport association lost
    AssociationDown {
        /// Association ID
        association_id: i32,
    },
    /// Signaling connection established over an association
    Establish {
        /// Association ID
        association_id: i32,
        /// Number of inbound streams
        in_streams: u16,
        /// Number of outbound streams
        out_streams: u16,
    },
    /// NAS PDU received from the radio side
    UplinkNas {
        /// Association ID
        association_id: i32,
        /// Stream the PDU arrived on
        stream: u16,
        /// NAS PDU
        pdu: Bytes,
    },
    /// Data to transmit on an association
    DownlinkData {
        /// Association ID
        association_id: i32,
        /// Outbound stream
        stream: u16,
        /// Bytes to transmit
        data: Bytes,
    },
    /// Signaling connection released
    Release {
        /// Association ID
        association_id: i32,
    },
    /// Opaque application message
    Application {
        /// Application-defined tag
        tag: u32,
        /// Application data
        data: Bytes,
    },
}

impl Payload {
    /// Returns the message kind carried by this payload.
    pub fn kind(&self) -> MessageKind {
        match self {
            Payload::Terminate => MessageKind::Terminate,
            Payload::TimerExpired { .. } => MessageKind::TimerExpired,
            Payload::AssociationUp { .. } => MessageKind::AssociationUp,
            Payload::DataReceived { .. } => MessageKind::DataReceived,
            Payload::AssociationDown { .. } => MessageKind::AssociationDown,
            Payload::Establish { .. } => MessageKind::Establish,
            Payload::UplinkNas { .. } => MessageKind::UplinkNas,
            Payload::DownlinkData { .. } => MessageKind::DownlinkData,
            Payload::Release { .. } => MessageKind::Release,
            Payload::Application { .. } => MessageKind::Application,
        }
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// Unit of inter-task communication.
#[derive(Debug, Clone)]
pub struct Envelope {
    origin: TaskId,
    destination: Destination,
    priority: Priority,
    payload: Payload,
    created_at: Option<Instant>,
}

impl Envelope {
    /// Creates a NORMAL priority envelope stamped with the current time.
    pub fn new(origin: TaskId, destination: impl Into<Destination>, payload: Payload) -> Self {
        Self {
            origin,
            destination: destination.into(),
            priority: Priority::Normal,
            payload,
            created_at: Some(Instant::now()),
        }
    }

    /// Creates a CONTROL priority envelope.
    pub fn control(origin: TaskId, destination: impl Into<Destination>, payload: Payload) -> Self {
        Self::new(origin, destination, payload).with_priority(Priority::Control)
    }

    /// Creates the TERMINATE envelope the lifecycle coordinator sends to `task`.
    pub fn terminate(task: TaskId) -> Self {
        Self::control(TaskId::LIFECYCLE, task, Payload::Terminate)
    }

    /// Creates the expiry envelope the timer service sends to a timer owner.
    pub fn timer_expired(owner: TaskId, timer_id: TimerId, generation: u64) -> Self {
        Self::new(
            TaskId::TIMER_SERVICE,
            owner,
            Payload::TimerExpired {
                timer_id,
                generation,
            },
        )
    }

    /// Sets the priority class.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Drops the creation timestamp.
    pub fn without_timestamp(mut self) -> Self {
        self.created_at = None;
        self
    }

    /// Returns the message kind.
    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }

    /// Returns the sending task.
    pub fn origin(&self) -> TaskId {
        self.origin
    }

    /// Returns the destination.
    pub fn destination(&self) -> Destination {
        self.destination
    }

    /// Returns the priority class.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Returns the payload.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Consumes the envelope and returns its payload.
    pub fn into_payload(self) -> Payload {
        self.payload
    }

    /// Returns the creation timestamp, if stamped.
    pub fn created_at(&self) -> Option<Instant> {
        self.created_at
    }

    /// Returns true for TERMINATE envelopes.
    pub fn is_terminate(&self) -> bool {
        matches!(self.payload, Payload::Terminate)
    }

    /// Copy of this envelope addressed to a single task, used for broadcast.
    pub(crate) fn readdressed(&self, destination: TaskId) -> Self {
        Self {
            destination: Destination::Task(destination),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_reserved() {
        assert!(TaskId::LIFECYCLE.is_reserved());
        assert!(TaskId::TIMER_SERVICE.is_reserved());
        assert!(!TaskId::new(1).is_reserved());
        assert_eq!(TaskId::new(7).raw(), 7);
    }

    #[test]
    fn test_task_id_display() {
        assert_eq!(TaskId::new(3).to_string(), "task#3");
        assert_eq!(TaskId::LIFECYCLE.to_string(), "LIFECYCLE");
        assert_eq!(TaskId::TIMER_SERVICE.to_string(), "TIMER");
        assert_eq!(Destination::Broadcast.to_string(), "BROADCAST");
    }

    #[test]
    fn test_kind_follows_payload() {
        let env = Envelope::new(
            TaskId::new(3),
            TaskId::new(1),
            Payload::AssociationUp {
                association_id: 7,
                in_streams: 32,
                out_streams: 32,
            },
        );
        assert_eq!(env.kind(), MessageKind::AssociationUp);
        assert_eq!(env.priority(), Priority::Normal);
        assert_eq!(env.destination(), Destination::Task(TaskId::new(1)));
        assert!(env.created_at().is_some());
        assert_eq!(env.kind().to_string(), "ASSOCIATION_UP");
    }

    #[test]
    fn test_terminate_is_control_from_lifecycle() {
        let env = Envelope::terminate(TaskId::new(2));
        assert!(env.is_terminate());
        assert_eq!(env.priority(), Priority::Control);
        assert_eq!(env.origin(), TaskId::LIFECYCLE);
    }

    #[test]
    fn test_timer_expired_envelope() {
        let env = Envelope::timer_expired(TaskId::new(2), TimerId::new(9), 4);
        assert_eq!(env.origin(), TaskId::TIMER_SERVICE);
        assert_eq!(env.priority(), Priority::Normal);
        assert_eq!(
            env.into_payload(),
            Payload::TimerExpired {
                timer_id: TimerId::new(9),
                generation: 4
            }
        );
    }

    #[test]
    fn test_readdressed_shares_buffer() {
        let data = Bytes::from_static(b"\x00\x11");
        let env = Envelope::new(
            TaskId::new(1),
            Destination::Broadcast,
            Payload::Application { tag: 1, data },
        )
        .without_timestamp();
        let copy = env.readdressed(TaskId::new(5));
        assert_eq!(copy.destination(), Destination::Task(TaskId::new(5)));
        assert_eq!(copy.payload(), env.payload());
        assert!(copy.created_at().is_none());
    }
}
