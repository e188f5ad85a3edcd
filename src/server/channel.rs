//! Channel membership (no modes, no topics — both are explicit non-goals).

use std::collections::HashSet;
use std::net::SocketAddr;

/// Largest payload (channel name + space + space-separated nicknames) one
/// `RPL_NAMEREPLY` may carry, keeping the whole framed line at or under the
/// 512-byte wire limit once the prefix, code, recipient nick and trailing
/// colon are accounted for.
pub fn names_batch_size(channel_name: &str) -> usize {
    506 - channel_name.len() - 1
}

/// A channel is just the set of its current members, identified by their
/// connection's peer address.
#[derive(Default)]
pub struct Channel {
    members: HashSet<SocketAddr>,
}

impl Channel {
    pub fn new() -> Self {
        Channel::default()
    }

    pub fn join(&mut self, addr: SocketAddr) {
        self.members.insert(addr);
    }

    pub fn part(&mut self, addr: SocketAddr) {
        self.members.remove(&addr);
    }

    pub fn contains(&self, addr: SocketAddr) -> bool {
        self.members.contains(&addr)
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> impl Iterator<Item = &SocketAddr> {
        self.members.iter()
    }

    /// Splits `nicknames` into batches, each short enough that a
    /// `RPL_NAMEREPLY` for `channel_name` carrying that batch fits the wire
    /// limit.
    pub fn names_batches<'a>(channel_name: &str, nicknames: &'a [String]) -> Vec<Vec<&'a str>> {
        let limit = names_batch_size(channel_name);
        let mut batches = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut current_len = 0usize;

        for nick in nicknames {
            let joined_len = if current.is_empty() { nick.len() } else { nick.len() + 1 };
            if !current.is_empty() && current_len + joined_len > limit {
                batches.push(std::mem::take(&mut current));
                current_len = 0;
            }
            current_len += if current.is_empty() { nick.len() } else { nick.len() + 1 };
            current.push(nick.as_str());
        }
        if !current.is_empty() {
            batches.push(current);
        }
        batches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_and_part_track_membership() {
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let mut channel = Channel::new();
        assert!(!channel.contains(addr));
        channel.join(addr);
        assert!(channel.contains(addr));
        channel.part(addr);
        assert!(!channel.contains(addr));
    }

    #[test]
    fn names_batches_stay_under_the_wire_limit() {
        let nicknames: Vec<String> = (0..200).map(|i| format!("nick{i}")).collect();
        let batches = Channel::names_batches("#global", &nicknames);
        let limit = names_batch_size("#global");
        for batch in &batches {
            let payload_len: usize = batch.iter().map(|n| n.len()).sum::<usize>() + batch.len() - 1;
            assert!(payload_len <= limit);
        }
        let total: usize = batches.iter().map(|b| b.len()).sum();
        assert_eq!(total, nicknames.len());
    }

    #[test]
    fn single_small_batch_for_a_short_member_list() {
        let nicknames = vec!["Drew".to_owned()];
        let batches = Channel::names_batches("#global", &nicknames);
        assert_eq!(batches, vec![vec!["Drew"]]);
    }
}
