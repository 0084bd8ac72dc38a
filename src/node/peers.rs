use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;

/// Sid is the site-id of a cluster node. It is stable for the node's lifetime.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Sid(u32);

impl Sid {
    pub const fn new(sid: u32) -> Self {
        Sid(sid)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct MemberMetadata {
    sid: Sid,
    // Where peers dial us for quorum traffic.
    quorum_addr: SocketAddr,
    // Where clients reach us for route discovery and ID requests. This is the address we
    // publish in route tables.
    client_addr: SocketAddr,
    weight: u32,
}

impl MemberMetadata {
    pub(crate) fn new(sid: Sid, quorum_addr: SocketAddr, client_addr: SocketAddr, weight: u32) -> Self {
        MemberMetadata {
            sid,
            quorum_addr,
            client_addr,
            weight,
        }
    }

    pub(crate) fn sid(&self) -> Sid {
        self.sid
    }

    pub(crate) fn quorum_addr(&self) -> SocketAddr {
        self.quorum_addr
    }

    pub(crate) fn client_addr(&self) -> SocketAddr {
        self.client_addr
    }

    pub(crate) fn weight(&self) -> u32 {
        self.weight
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum InvalidClusterError {
    #[error("Cluster has no members")]
    EmptyCluster,
    #[error("Sid {0} appears more than once in the cluster config")]
    DuplicateSid(Sid),
    #[error("My sid {0} is not in the cluster config")]
    MeNotInCluster(Sid),
}

/// ClusterTracker holds the statically configured membership of the cluster. Membership never
/// changes while a node is running; learner registration is tracked separately by the route
/// tables.
#[derive(Clone)]
pub(crate) struct ClusterTracker {
    my_sid: Sid,
    members: BTreeMap<Sid, MemberMetadata>,
}

impl ClusterTracker {
    pub(crate) fn create_valid_cluster(
        my_sid: Sid,
        members: Vec<MemberMetadata>,
    ) -> Result<Self, InvalidClusterError> {
        if members.is_empty() {
            return Err(InvalidClusterError::EmptyCluster);
        }

        let mut by_sid = BTreeMap::new();
        for member in members {
            let sid = member.sid();
            if by_sid.insert(sid, member).is_some() {
                return Err(InvalidClusterError::DuplicateSid(sid));
            }
        }

        if !by_sid.contains_key(&my_sid) {
            return Err(InvalidClusterError::MeNotInCluster(my_sid));
        }

        Ok(ClusterTracker {
            my_sid,
            members: by_sid,
        })
    }

    pub(crate) fn my_sid(&self) -> Sid {
        self.my_sid
    }

    pub(crate) fn my_metadata(&self) -> &MemberMetadata {
        // Presence is checked on construction.
        &self.members[&self.my_sid]
    }

    pub(crate) fn metadata(&self, sid: Sid) -> Option<&MemberMetadata> {
        self.members.get(&sid)
    }

    pub(crate) fn contains_member(&self, sid: Sid) -> bool {
        self.members.contains_key(&sid)
    }

    pub(crate) fn num_members(&self) -> usize {
        self.members.len()
    }

    /// Strict majority of the configured membership.
    pub(crate) fn quorum_size(&self) -> usize {
        (self.members.len() / 2) + 1
    }

    pub(crate) fn max_sid(&self) -> Sid {
        // Non-empty is checked on construction.
        self.members.keys().next_back().copied().unwrap_or(self.my_sid)
    }

    pub(crate) fn peer_sids(&self) -> Vec<Sid> {
        self.members.keys().copied().filter(|sid| *sid != self.my_sid).collect()
    }

    pub(crate) fn iter_peers(&self) -> impl Iterator<Item = &MemberMetadata> {
        let my_sid = self.my_sid;
        self.members.values().filter(move |m| m.sid() != my_sid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(sid: u32) -> MemberMetadata {
        let quorum_addr = format!("127.0.0.1:{}", 7000 + sid).parse().unwrap();
        let client_addr = format!("127.0.0.1:{}", 8000 + sid).parse().unwrap();
        MemberMetadata::new(Sid::new(sid), quorum_addr, client_addr, 1)
    }

    #[test]
    fn quorum_size_is_strict_majority() {
        fn run(expected: usize, num_members: u32) {
            let members = (1..=num_members).map(member).collect();
            let tracker = ClusterTracker::create_valid_cluster(Sid::new(1), members).unwrap();
            assert_eq!(expected, tracker.quorum_size());
        }

        run(1, 1);
        run(2, 2);
        run(2, 3);
        run(3, 4);
        run(3, 5);
        run(4, 6);
        run(4, 7);
    }

    #[test]
    fn rejects_invalid_membership() {
        assert_eq!(
            Err(InvalidClusterError::EmptyCluster),
            ClusterTracker::create_valid_cluster(Sid::new(1), vec![]).map(|_| ())
        );
        assert_eq!(
            Err(InvalidClusterError::DuplicateSid(Sid::new(2))),
            ClusterTracker::create_valid_cluster(Sid::new(1), vec![member(1), member(2), member(2)]).map(|_| ())
        );
        assert_eq!(
            Err(InvalidClusterError::MeNotInCluster(Sid::new(9))),
            ClusterTracker::create_valid_cluster(Sid::new(9), vec![member(1), member(2)]).map(|_| ())
        );
    }

    #[test]
    fn peers_exclude_me() {
        let tracker =
            ClusterTracker::create_valid_cluster(Sid::new(2), vec![member(1), member(2), member(3)]).unwrap();
        assert_eq!(vec![Sid::new(1), Sid::new(3)], tracker.peer_sids());
        assert_eq!(2, tracker.iter_peers().count());
        assert_eq!(Sid::new(3), tracker.max_sid());
        assert_eq!(Sid::new(2), tracker.my_metadata().sid());
    }
}
