use obscuro_wire::PeerId;
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

/// The state of a peer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerState {
    /// The last successful contact with the peer.
    pub last_seen: Option<Instant>,
    /// The first failed contact since the last successful one.
    pub unreachable_since: Option<Instant>,
    /// The inconsistent responses since the last blacklisting.
    pub strikes: u32,
    /// The end of the current blacklisting.
    pub blacklisted_until: Option<Instant>,
}

impl PeerState {
    fn is_blacklisted(&self, now: Instant) -> bool {
        self.blacklisted_until.is_some_and(|until| until > now)
    }
}

/// Tracks the reachability and reputation of the peers.
#[derive(Debug, Clone)]
pub struct PeerBook {
    peers: HashMap<PeerId, PeerState>,
    max_strikes: u32,
    cooldown: Duration,
}

impl PeerBook {
    /// Returns a new [`PeerBook`] holding the provided peers.
    pub fn new(peers: impl IntoIterator<Item = PeerId>, max_strikes: u32, cooldown: Duration) -> Self {
        let peers = peers.into_iter().map(|peer| (peer, PeerState::default())).collect();
        Self { peers, max_strikes: max_strikes.max(1), cooldown }
    }

    /// Adds a peer. Returns false if the peer was known.
    pub fn add(&mut self, peer: PeerId) -> bool {
        let known = self.peers.contains_key(&peer);
        self.peers.entry(peer).or_default();
        !known
    }

    /// Returns the state of the peer.
    pub fn get(&self, peer: &PeerId) -> Option<&PeerState> {
        self.peers.get(peer)
    }

    /// Returns the amount of known peers.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Returns true if no peer is known.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Records a successful contact with the peer.
    pub fn record_contact(&mut self, peer: &PeerId, now: Instant) {
        let state = self.peers.entry(peer.clone()).or_default();
        state.last_seen = Some(now);
        state.unreachable_since = None;
    }

    /// Records a failed contact with the peer.
    pub fn record_failure(&mut self, peer: &PeerId, now: Instant) {
        let state = self.peers.entry(peer.clone()).or_default();
        state.unreachable_since.get_or_insert(now);
    }

    /// Records an inconsistent response from the peer. Returns true if the peer got blacklisted.
    pub fn record_strike(&mut self, peer: &PeerId, now: Instant) -> bool {
        let state = self.peers.entry(peer.clone()).or_default();
        state.strikes += 1;
        if state.strikes < self.max_strikes {
            return false
        }
        state.strikes = 0;
        state.blacklisted_until = Some(now + self.cooldown);
        true
    }

    /// Returns true if the peer is blacklisted.
    pub fn is_blacklisted(&self, peer: &PeerId, now: Instant) -> bool {
        self.peers.get(peer).is_some_and(|state| state.is_blacklisted(now))
    }

    /// Returns the amount of blacklisted peers.
    pub fn blacklisted(&self, now: Instant) -> usize {
        self.peers.values().filter(|state| state.is_blacklisted(now)).count()
    }

    /// Returns the peers which are not blacklisted.
    pub fn available(&self, now: Instant) -> Vec<PeerId> {
        let mut peers = self
            .peers
            .iter()
            .filter(|(_, state)| !state.is_blacklisted(now))
            .map(|(peer, _)| peer.clone())
            .collect::<Vec<_>>();
        peers.sort();
        peers
    }

    /// Selects the peer to sync from: a reachable peer is preferred over an unreachable one, then
    /// the most recently seen.
    pub fn select(&self, now: Instant) -> Option<PeerId> {
        self.peers
            .iter()
            .filter(|(_, state)| !state.is_blacklisted(now))
            .max_by(|(a_id, a), (b_id, b)| {
                b.unreachable_since
                    .is_some()
                    .cmp(&a.unreachable_since.is_some())
                    .then(a.last_seen.cmp(&b.last_seen))
                    .then(b_id.cmp(a_id))
            })
            .map(|(peer, _)| peer.clone())
    }

    /// Returns the longest time any peer has been unreachable.
    pub fn longest_unreachable(&self, now: Instant) -> Option<Duration> {
        self.peers
            .values()
            .filter_map(|state| state.unreachable_since)
            .map(|since| now.saturating_duration_since(since))
            .max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> PeerBook {
        PeerBook::new(["a".into(), "b".into()], 2, Duration::from_secs(60))
    }

    #[test]
    fn test_blacklists_after_strikes_for_cooldown() {
        let mut book = book();
        let now = Instant::now();
        let peer = PeerId::new("a");

        assert!(!book.record_strike(&peer, now));
        assert!(book.record_strike(&peer, now));
        assert!(book.is_blacklisted(&peer, now + Duration::from_secs(59)));
        assert!(!book.is_blacklisted(&peer, now + Duration::from_secs(60)));
        assert_eq!(book.available(now), vec![PeerId::new("b")]);
        assert_eq!(book.blacklisted(now), 1);
    }

    #[test]
    fn test_tracks_unreachable_peers() {
        let mut book = book();
        let now = Instant::now();
        let peer = PeerId::new("a");
        assert_eq!(book.longest_unreachable(now), None);

        book.record_failure(&peer, now);
        book.record_failure(&peer, now + Duration::from_secs(5));
        assert_eq!(
            book.longest_unreachable(now + Duration::from_secs(10)),
            Some(Duration::from_secs(10))
        );

        book.record_contact(&peer, now + Duration::from_secs(11));
        assert_eq!(book.longest_unreachable(now + Duration::from_secs(12)), None);
    }

    #[test]
    fn test_selects_reachable_recent_peer() {
        let mut book = book();
        let now = Instant::now();
        book.record_contact(&"a".into(), now);
        book.record_contact(&"b".into(), now + Duration::from_secs(1));
        assert_eq!(book.select(now), Some("b".into()));

        book.record_failure(&"b".into(), now + Duration::from_secs(2));
        assert_eq!(book.select(now), Some("a".into()));

        book.record_strike(&"a".into(), now);
        book.record_strike(&"a".into(), now);
        assert_eq!(book.select(now), Some("b".into()));
    }
}
