//! Invite links.
//!
//! An invite is the host's public page URL with a `join=<peerId>` query
//! parameter. Guests turn it into the WebSocket endpoint
//! `ws://<authority>/ws/<peerId>`.

use url::Url;

use crate::error::{ChatError, Result};
use crate::message::PeerId;

/// Where a guest should dial, derived from an invite URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invite {
    /// `ws://host:port/ws/<host_id>` (or `wss://` for https invites).
    pub ws_url: String,
    pub host_id: PeerId,
}

impl Invite {
    /// The URL a guest actually connects to, carrying its own peer id.
    pub fn dial_url(&self, guest_id: &str) -> String {
        format!("{}?peer={}", self.ws_url, guest_id)
    }
}

/// Build the invite URL for `peer_id`, replacing any query or fragment
/// already on `base`.
pub fn invite_url(base: &str, peer_id: &str) -> String {
    match Url::parse(base) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.query_pairs_mut().clear().append_pair("join", peer_id);
            url.into()
        }
        Err(_) => {
            let base = base.split(['?', '#']).next().unwrap_or(base);
            format!("{}?join={}", base, peer_id)
        }
    }
}

/// Parse an invite URL (`http(s)://authority/...?join=ID`) or a bare
/// `ws(s)://authority/ws/ID` endpoint.
pub fn parse_invite(url: &str) -> Result<Invite> {
    let url = url.trim();
    let invalid = || ChatError::InvalidInvite(url.to_string());

    let parsed = Url::parse(url).map_err(|_| invalid())?;
    let ws_scheme = match parsed.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return Err(invalid()),
    };
    let host = parsed.host_str().filter(|h| !h.is_empty()).ok_or_else(invalid)?;
    let authority = match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    let joined = parsed
        .query_pairs()
        .find(|(k, _)| k == "join")
        .map(|(_, v)| v.into_owned());
    let host_id = match joined {
        Some(id) => id,
        None => {
            let segments: Vec<&str> = parsed
                .path_segments()
                .map(|s| s.filter(|seg| !seg.is_empty()).collect())
                .unwrap_or_default();
            match segments.as_slice() {
                ["ws", id] => id.to_string(),
                _ => return Err(invalid()),
            }
        }
    };
    if host_id.is_empty() || host_id.contains(['/', '?', '#']) {
        return Err(invalid());
    }

    Ok(Invite {
        ws_url: format!("{}://{}/ws/{}", ws_scheme, authority, host_id),
        host_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invite_url_appends_join() {
        assert_eq!(
            invite_url("http://10.0.0.2:7878/", "abc"),
            "http://10.0.0.2:7878/?join=abc"
        );
    }

    #[test]
    fn test_invite_url_strips_existing_query() {
        assert_eq!(
            invite_url("http://h:1/?join=old&x=1", "new"),
            "http://h:1/?join=new"
        );
    }

    #[test]
    fn test_parse_invite_http() {
        let inv = parse_invite("http://10.0.0.2:7878/?join=abc-123").unwrap();
        assert_eq!(inv.host_id, "abc-123");
        assert_eq!(inv.ws_url, "ws://10.0.0.2:7878/ws/abc-123");
    }

    #[test]
    fn test_parse_invite_https_maps_to_wss() {
        let inv = parse_invite("https://chat.example.com/room?join=xyz").unwrap();
        assert_eq!(inv.ws_url, "wss://chat.example.com/ws/xyz");
    }

    #[test]
    fn test_parse_invite_bare_ws_endpoint() {
        let inv = parse_invite("ws://127.0.0.1:9000/ws/host1").unwrap();
        assert_eq!(inv.host_id, "host1");
        assert_eq!(inv.ws_url, "ws://127.0.0.1:9000/ws/host1");
    }

    #[test]
    fn test_parse_invite_round_trip() {
        let url = invite_url("http://localhost:7878/", "peer-42");
        let inv = parse_invite(&url).unwrap();
        assert_eq!(inv.host_id, "peer-42");
    }

    #[test]
    fn test_parse_invite_rejects_garbage() {
        assert!(parse_invite("not a url").is_err());
        assert!(parse_invite("ftp://h/?join=a").is_err());
        assert!(parse_invite("http://h:1/").is_err());
        assert!(parse_invite("ws://h:1/ws/").is_err());
    }

    #[test]
    fn test_dial_url_carries_guest_id() {
        let inv = parse_invite("http://h:1/?join=host").unwrap();
        assert_eq!(inv.dial_url("guest"), "ws://h:1/ws/host?peer=guest");
    }

    #[test]
    fn test_parse_invite_ignores_fragment() {
        let inv = parse_invite("http://h:1/?join=abc#top").unwrap();
        assert_eq!(inv.host_id, "abc");
        assert_eq!(inv.ws_url, "ws://h:1/ws/abc");
        let inv = parse_invite("ws://h:1/ws/abc#top").unwrap();
        assert_eq!(inv.host_id, "abc");
    }

    #[test]
    fn test_parse_invite_decodes_query_and_keeps_other_params() {
        let inv = parse_invite("http://h:1/?utm=x&join=a%2Db").unwrap();
        assert_eq!(inv.host_id, "a-b");
    }

    #[test]
    fn test_parse_invite_ipv6_authority() {
        let inv = parse_invite("http://[::1]:7878/?join=abc").unwrap();
        assert_eq!(inv.ws_url, "ws://[::1]:7878/ws/abc");
    }

    #[test]
    fn test_invite_url_drops_fragment() {
        assert_eq!(invite_url("http://h:1/#top", "abc"), "http://h:1/?join=abc");
    }
}
