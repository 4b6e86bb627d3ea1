//! Connection registry and participant list for one node.
//!
//! The host holds one link per guest; a guest holds a single link to the
//! host. Fan-out is fire-and-forget: a closed link simply doesn't count.

use std::collections::HashMap;
use tracing::debug;

use crate::message::{Participant, PeerId};
use crate::protocol::Payload;
use crate::transport::PeerLink;

#[derive(Debug)]
pub struct Room {
    local: Participant,
    links: HashMap<PeerId, PeerLink>,
    participants: Vec<Participant>,
}

impl Room {
    pub fn new(local: Participant) -> Self {
        Room {
            participants: vec![local.clone()],
            local,
            links: HashMap::new(),
        }
    }

    pub fn local(&self) -> &Participant {
        &self.local
    }

    pub fn set_local_username(&mut self, username: impl Into<String>) {
        let username = username.into();
        self.local.username = username.clone();
        if let Some(p) = self
            .participants
            .iter_mut()
            .find(|p| p.peer_id == self.local.peer_id)
        {
            p.username = username;
        }
    }

    /// Add a link, replacing (and thereby closing) any previous link for the
    /// same peer.
    pub fn register(&mut self, link: PeerLink) -> Option<PeerLink> {
        debug!(peer_id = %link.peer_id(), "registering link");
        self.links.insert(link.peer_id().to_string(), link)
    }

    /// Drop a peer's link. Returns whether it was registered.
    pub fn unlink(&mut self, peer_id: &str) -> bool {
        let had_link = self.links.remove(peer_id).is_some();
        if had_link {
            debug!(peer_id, "link dropped");
        }
        had_link
    }

    /// Drop a peer's participant record, returning it if present.
    pub fn remove_participant(&mut self, peer_id: &str) -> Option<Participant> {
        let pos = self.participants.iter().position(|p| p.peer_id == peer_id)?;
        Some(self.participants.remove(pos))
    }

    pub fn link(&self, peer_id: &str) -> Option<&PeerLink> {
        self.links.get(peer_id)
    }

    pub fn is_linked(&self, peer_id: &str) -> bool {
        self.links.contains_key(peer_id)
    }

    /// Queue `payload` on every link except `exclude`. Returns how many links
    /// accepted it.
    pub fn broadcast(&self, payload: &Payload, exclude: Option<&str>) -> usize {
        self.links
            .values()
            .filter(|link| Some(link.peer_id()) != exclude)
            .filter(|link| link.send(payload.clone()))
            .count()
    }

    pub fn send_to(&self, peer_id: &str, payload: Payload) -> bool {
        match self.links.get(peer_id) {
            Some(link) => link.send(payload),
            None => false,
        }
    }

    /// Insert or update a participant, keyed by peer id.
    pub fn upsert_participant(&mut self, participant: Participant) {
        match self
            .participants
            .iter_mut()
            .find(|p| p.peer_id == participant.peer_id)
        {
            Some(existing) => *existing = participant,
            None => self.participants.push(participant),
        }
    }

    /// Replace the whole list (guest side, last writer wins).
    pub fn sync_participants(&mut self, participants: Vec<Participant>) {
        self.participants = participants;
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn participant(&self, peer_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.peer_id == peer_id)
    }

    pub fn connection_count(&self) -> usize {
        self.links.len()
    }

    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.links.keys().cloned().collect()
    }

    /// Drop every link (closing their sockets) and seed the participant list
    /// with only the local user.
    pub fn reset(&mut self) {
        self.links.clear();
        self.participants = vec![self.local.clone()];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn me() -> Participant {
        Participant {
            peer_id: "host".into(),
            username: "Ali".into(),
            is_host: true,
        }
    }

    fn guest(id: &str) -> Participant {
        Participant {
            peer_id: id.into(),
            username: format!("user-{id}"),
            is_host: false,
        }
    }

    fn link(id: &str) -> (PeerLink, mpsc::UnboundedReceiver<Payload>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (PeerLink::new(id, tx), rx)
    }

    #[test]
    fn test_new_room_contains_only_local() {
        let room = Room::new(me());
        assert_eq!(room.participants(), &[me()]);
        assert_eq!(room.connection_count(), 0);
    }

    #[test]
    fn test_broadcast_excludes_sender() {
        let mut room = Room::new(me());
        let (a, mut rx_a) = link("a");
        let (b, mut rx_b) = link("b");
        let (c, mut rx_c) = link("c");
        room.register(a);
        room.register(b);
        room.register(c);
        let sent = room.broadcast(&Payload::message("hey", "a"), Some("a"));
        assert_eq!(sent, 2);
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_c.try_recv().is_ok());
    }

    #[test]
    fn test_broadcast_skips_closed_links() {
        let mut room = Room::new(me());
        let (a, rx_a) = link("a");
        let (b, _rx_b) = link("b");
        room.register(a);
        room.register(b);
        drop(rx_a);
        assert_eq!(room.broadcast(&Payload::Typing { username: None }, None), 1);
    }

    #[test]
    fn test_register_replaces_existing_key() {
        let mut room = Room::new(me());
        let (a1, _r1) = link("a");
        let (a2, _r2) = link("a");
        assert!(room.register(a1).is_none());
        assert!(room.register(a2).is_some());
        assert_eq!(room.connection_count(), 1);
    }

    #[test]
    fn test_upsert_then_remove_participant() {
        let mut room = Room::new(me());
        let (a, _rx) = link("a");
        room.register(a);
        room.upsert_participant(guest("a"));
        let mut renamed = guest("a");
        renamed.username = "Sara".into();
        room.upsert_participant(renamed);
        assert_eq!(room.participants().len(), 2);
        assert_eq!(room.participant("a").unwrap().username, "Sara");
        assert!(room.unlink("a"));
        let removed = room.remove_participant("a").unwrap();
        assert_eq!(removed.username, "Sara");
        assert_eq!(room.participants(), &[me()]);
        assert!(!room.is_linked("a"));
    }

    #[test]
    fn test_remove_unknown_peer() {
        let mut room = Room::new(me());
        assert!(!room.unlink("ghost"));
        assert!(room.remove_participant("ghost").is_none());
    }

    #[test]
    fn test_reset_seeds_only_local() {
        let mut room = Room::new(me());
        let (a, mut rx) = link("a");
        room.register(a);
        room.upsert_participant(guest("a"));
        room.reset();
        assert_eq!(room.participants(), &[me()]);
        assert_eq!(room.connection_count(), 0);
        // sender dropped, so the receiver sees the channel close
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_local_rename_updates_list() {
        let mut room = Room::new(me());
        room.set_local_username("Khan");
        assert_eq!(room.local().username, "Khan");
        assert_eq!(room.participants()[0].username, "Khan");
    }

    #[test]
    fn test_sync_replaces_list() {
        let mut room = Room::new(me());
        room.sync_participants(vec![guest("x"), guest("y")]);
        assert_eq!(room.participants().len(), 2);
        assert!(room.participant("host").is_none());
    }
}
