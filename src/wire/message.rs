use crate::node::{Epoch, Sid};
use crate::route::{Invoker, RouteInfo};
use crate::store::LogPosition;
use crate::wire::reader::{put_short_string, ByteReader};
use crate::wire::{DecodeError, RunningMode};
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::BTreeMap;
use std::fmt;

/// MessageKind is the explicit tag that selects a payload decoder.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum MessageKind {
    Vote,
    Proposal,
    Refuse,
    Sync,
}

impl MessageKind {
    pub(crate) const ALL: [MessageKind; 4] = [
        MessageKind::Vote,
        MessageKind::Proposal,
        MessageKind::Refuse,
        MessageKind::Sync,
    ];

    pub fn tag(&self) -> u8 {
        match self {
            MessageKind::Vote => 1,
            MessageKind::Proposal => 2,
            MessageKind::Refuse => 3,
            MessageKind::Sync => 4,
        }
    }
}

/// QuorumMessage is the payload of every envelope exchanged between peers.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum QuorumMessage {
    Vote(Vote),
    Proposal(Proposal),
    Refuse(Refuse),
    Sync(Sync),
}

impl QuorumMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            QuorumMessage::Vote(_) => MessageKind::Vote,
            QuorumMessage::Proposal(_) => MessageKind::Proposal,
            QuorumMessage::Refuse(_) => MessageKind::Refuse,
            QuorumMessage::Sync(_) => MessageKind::Sync,
        }
    }

    /// Sid of the node that sent this message.
    pub fn sender(&self) -> Sid {
        match self {
            QuorumMessage::Vote(m) => m.sid,
            QuorumMessage::Proposal(m) => m.sid,
            QuorumMessage::Refuse(m) => m.sid,
            QuorumMessage::Sync(m) => m.sid,
        }
    }

    pub(crate) fn encode_payload(&self, buf: &mut BytesMut) {
        match self {
            QuorumMessage::Vote(m) => m.encode(buf),
            QuorumMessage::Proposal(m) => m.encode(buf),
            QuorumMessage::Refuse(m) => m.encode(buf),
            QuorumMessage::Sync(m) => m.encode(buf),
        }
    }
}

/// VoterState is the election state of the node that cast a vote. Votes from nodes that already
/// follow or lead let a searching node join an established leader.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum VoterState {
    Searching,
    Following,
    Leading,
}

impl VoterState {
    fn as_u8(&self) -> u8 {
        match self {
            VoterState::Searching => 0,
            VoterState::Following => 1,
            VoterState::Leading => 2,
        }
    }

    fn from_u8(value: u8) -> Result<Self, DecodeError> {
        match value {
            0 => Ok(VoterState::Searching),
            1 => Ok(VoterState::Following),
            2 => Ok(VoterState::Leading),
            other => Err(DecodeError::UnknownVoterState(other)),
        }
    }

    pub fn is_established(&self) -> bool {
        !matches!(self, VoterState::Searching)
    }
}

/// Ballot is the comparable part of a vote.
///
/// Ordering is lexicographic in field order: higher election epoch wins, then higher peer epoch,
/// then higher leader sid. Two ballots compare equal only if all three fields are equal.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Ballot {
    pub election_epoch: Epoch,
    pub peer_epoch: Epoch,
    pub leader: Sid,
}

impl fmt::Debug for Ballot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(epoch={}, peer_epoch={}, leader={})",
            self.election_epoch, self.peer_epoch, self.leader
        )
    }
}

/// Vote is a node's election ballot, tagged with the voter's sid and state.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Vote {
    pub sid: Sid,
    pub election_epoch: Epoch,
    pub leader: Sid,
    pub peer_epoch: Epoch,
    pub state: VoterState,
}

impl Vote {
    pub fn new(sid: Sid, ballot: Ballot, state: VoterState) -> Self {
        Vote {
            sid,
            election_epoch: ballot.election_epoch,
            leader: ballot.leader,
            peer_epoch: ballot.peer_epoch,
            state,
        }
    }

    pub fn ballot(&self) -> Ballot {
        Ballot {
            election_epoch: self.election_epoch,
            peer_epoch: self.peer_epoch,
            leader: self.leader,
        }
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.sid.as_u32());
        buf.put_u64(self.election_epoch.as_u64());
        buf.put_u32(self.leader.as_u32());
        buf.put_u64(self.peer_epoch.as_u64());
        buf.put_u8(self.state.as_u8());
    }

    pub(crate) fn decode(reader: &mut ByteReader<'_>) -> Result<QuorumMessage, DecodeError> {
        Ok(QuorumMessage::Vote(Vote {
            sid: Sid::new(reader.u32()?),
            election_epoch: Epoch::new(reader.u64()?),
            leader: Sid::new(reader.u32()?),
            peer_epoch: Epoch::new(reader.u64()?),
            state: VoterState::from_u8(reader.u8()?)?,
        }))
    }
}

/// Proposal is the leader's heartbeat and, in the other direction, a follower's acknowledgement.
///
/// `leader` and `epoch` name the leadership the sender takes part in: a heartbeat carries the
/// sender itself as leader, an acknowledgement the leader it follows. `position` is where the
/// sender's log ends.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Proposal {
    pub sid: Sid,
    pub leader: Sid,
    pub epoch: Epoch,
    pub position: LogPosition,
}

impl Proposal {
    pub fn heartbeat(sid: Sid, epoch: Epoch, position: LogPosition) -> Self {
        Proposal {
            sid,
            leader: sid,
            epoch,
            position,
        }
    }

    pub fn ack(sid: Sid, leader: Sid, epoch: Epoch, position: LogPosition) -> Self {
        Proposal {
            sid,
            leader,
            epoch,
            position,
        }
    }

    pub fn is_heartbeat(&self) -> bool {
        self.sid == self.leader
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.sid.as_u32());
        buf.put_u32(self.leader.as_u32());
        buf.put_u64(self.epoch.as_u64());
        buf.put_u64(self.position.epoch.as_u64());
        buf.put_u64(self.position.offset);
    }

    pub(crate) fn decode(reader: &mut ByteReader<'_>) -> Result<QuorumMessage, DecodeError> {
        Ok(QuorumMessage::Proposal(Proposal {
            sid: Sid::new(reader.u32()?),
            leader: Sid::new(reader.u32()?),
            epoch: Epoch::new(reader.u64()?),
            position: LogPosition::new(Epoch::new(reader.u64()?), reader.u64()?),
        }))
    }
}

/// Refuse rejects a vote or sync attempt. It is terminal for the exchange that produced it and
/// never advances anyone's epoch.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Refuse {
    pub sid: Sid,
    pub reason: String,
}

impl Refuse {
    pub fn new<R: Into<String>>(sid: Sid, reason: R) -> Self {
        Refuse {
            sid,
            reason: reason.into(),
        }
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.sid.as_u32());
        put_short_string(buf, &self.reason);
    }

    pub(crate) fn decode(reader: &mut ByteReader<'_>) -> Result<QuorumMessage, DecodeError> {
        Ok(QuorumMessage::Refuse(Refuse {
            sid: Sid::new(reader.u32()?),
            reason: reader.short_string("refuse reason")?,
        }))
    }
}

/// Sync is the catch-up payload. `data` holds encoded component records starting at
/// `start_offset`, and may be empty when the receiver is already caught up. Once applied, the
/// receiver's log is a copy of the log written under `log_epoch`.
///
/// Leaders send it to followers. A follower whose log is ahead of a new leader's sends it the
/// other way, so that the leader can catch up before it serves writes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Sync {
    pub sid: Sid,
    pub epoch: Epoch,
    pub log_epoch: Epoch,
    pub start_offset: u64,
    pub mode: RunningMode,
    pub route: RouteInfo,
    pub data: Bytes,
}

impl Sync {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.sid.as_u32());
        buf.put_u64(self.epoch.as_u64());
        buf.put_u64(self.log_epoch.as_u64());
        buf.put_u64(self.start_offset);
        buf.put_u8(self.mode.as_u32() as u8);

        put_short_string(buf, self.route.maintainer.as_deref().unwrap_or(""));
        put_short_string(buf, &self.route.strategy);
        buf.put_u32(self.route.learners.len() as u32);
        for (sid, invoker) in self.route.learners.iter() {
            buf.put_u32(sid.as_u32());
            put_short_string(buf, invoker.address());
            buf.put_u32(invoker.weight());
        }

        buf.put_u32(self.data.len() as u32);
        buf.put_slice(&self.data);
    }

    pub(crate) fn decode(reader: &mut ByteReader<'_>) -> Result<QuorumMessage, DecodeError> {
        let sid = Sid::new(reader.u32()?);
        let epoch = Epoch::new(reader.u64()?);
        let log_epoch = Epoch::new(reader.u64()?);
        let start_offset = reader.u64()?;
        let mode = RunningMode::from_u32(reader.u8()? as u32)?;

        let maintainer = reader.short_string("maintainer")?;
        let strategy = reader.short_string("strategy")?;
        let num_learners = reader.u32()?;
        let mut learners = BTreeMap::new();
        for _ in 0..num_learners {
            let learner_sid = Sid::new(reader.u32()?);
            let address = reader.short_string("learner address")?;
            let weight = reader.u32()?;
            let invoker = Invoker::new(address, weight).map_err(|_| DecodeError::EmptyAddress)?;
            if learners.insert(learner_sid, invoker).is_some() {
                return Err(DecodeError::DuplicateLearner(learner_sid.as_u32()));
            }
        }

        let data_len = reader.u32()? as usize;
        let data = Bytes::copy_from_slice(reader.bytes(data_len)?);

        Ok(QuorumMessage::Sync(Sync {
            sid,
            epoch,
            log_epoch,
            start_offset,
            mode,
            route: RouteInfo {
                maintainer: if maintainer.is_empty() { None } else { Some(maintainer) },
                learners,
                strategy,
            },
            data,
        }))
    }
}
