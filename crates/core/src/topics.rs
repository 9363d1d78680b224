// Topic layout helpers and constants shared by the relay and the wearable

pub const VIBRATION_TOPIC: &str = "Output/Vibration";
pub const DIRECTION_TOPIC: &str = "Output/Direction";
pub const COMMAND_TOPIC: &str = "Command/Haptic";

// Default root for peer traffic carried over the broker
pub const PEER_ROOT: &str = "haptic";

// Peer message paths
pub const VIBRATE_PATH: &str = "/vibrate";
pub const DIRECTION_PATH: &str = "/direction";
pub const CANCEL_PATH: &str = "/cancel";

// Retained presence payloads
pub const PRESENCE_ONLINE: &str = "online";
pub const PRESENCE_OFFLINE: &str = "offline";

pub fn presence_topic(root: &str, node_id: &str) -> String {
    format!("{}/nodes/{}", root, node_id)
}

pub fn presence_wildcard(root: &str) -> String {
    format!("{}/nodes/+", root)
}

/// `{root}/peer/{node_id}` followed by the path, e.g. `haptic/peer/watch/vibrate`.
pub fn peer_topic(root: &str, node_id: &str, path: &str) -> String {
    format!("{}/peer/{}{}", root, node_id, path)
}

pub fn peer_wildcard(root: &str, node_id: &str) -> String {
    format!("{}/peer/{}/#", root, node_id)
}

/// Returns the node id of a presence topic under `root`.
pub fn parse_presence_topic<'a>(root: &str, topic: &'a str) -> Option<&'a str> {
    let rest = topic.strip_prefix(root)?.strip_prefix("/nodes/")?;
    if rest.is_empty() || rest.contains('/') {
        return None;
    }
    Some(rest)
}

/// Returns the peer path (`/vibrate`, ...) of a peer topic addressed to `node_id`.
pub fn parse_peer_topic<'a>(root: &str, node_id: &str, topic: &'a str) -> Option<&'a str> {
    let rest = topic
        .strip_prefix(root)?
        .strip_prefix("/peer/")?
        .strip_prefix(node_id)?;
    if rest.len() > 1 && rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}
