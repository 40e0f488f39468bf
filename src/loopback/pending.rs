use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;

/// Packets waiting for their release time.
///
/// Ordered by release time; packets sharing a release time keep insertion
/// order.
#[derive(Debug, Default)]
pub struct PendingPackets {
    queue: BTreeMap<Duration, Vec<Bytes>>,
    len: usize,
}

impl PendingPackets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, release: Duration, packet: Bytes) {
        self.queue.entry(release).or_default().push(packet);
        self.len += 1;
    }

    /// Remove every packet with a release time at or before `now`, in
    /// release order. Stops at the first packet still in the future.
    pub fn drain_due(&mut self, now: Duration) -> Vec<(Duration, Bytes)> {
        let mut due = Vec::new();
        while let Some(entry) = self.queue.first_entry() {
            if *entry.key() > now {
                break;
            }
            let release = *entry.key();
            let batch = entry.remove();
            self.len -= batch.len();
            due.extend(batch.into_iter().map(|packet| (release, packet)));
        }
        due
    }

    /// Remove the packet with the earliest release time
    pub fn pop_earliest(&mut self) -> Option<(Duration, Bytes)> {
        let mut entry = self.queue.first_entry()?;
        let release = *entry.key();
        let packet = entry.get_mut().remove(0);
        if entry.get().is_empty() {
            entry.remove();
        }
        self.len -= 1;
        Some((release, packet))
    }

    /// Earliest pending release time
    pub fn next_release(&self) -> Option<Duration> {
        self.queue.keys().next().copied()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_prefix_drain() {
        let mut pending = PendingPackets::new();
        pending.insert(ms(30), Bytes::from_static(b"c"));
        pending.insert(ms(10), Bytes::from_static(b"a"));
        pending.insert(ms(20), Bytes::from_static(b"b"));

        let due = pending.drain_due(ms(20));
        let packets: Vec<_> = due.into_iter().map(|(_, p)| p).collect();
        assert_eq!(packets, vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending.next_release(), Some(ms(30)));
    }

    #[test]
    fn test_equal_release_times_keep_insertion_order() {
        let mut pending = PendingPackets::new();
        for tag in [b"1", b"2", b"3"] {
            pending.insert(ms(5), Bytes::from_static(tag));
        }
        let due = pending.drain_due(ms(5));
        let packets: Vec<_> = due.into_iter().map(|(_, p)| p).collect();
        assert_eq!(packets, vec![&b"1"[..], &b"2"[..], &b"3"[..]]);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_pop_earliest() {
        let mut pending = PendingPackets::new();
        pending.insert(ms(7), Bytes::from_static(b"late"));
        pending.insert(ms(3), Bytes::from_static(b"first"));
        pending.insert(ms(3), Bytes::from_static(b"second"));

        assert_eq!(pending.pop_earliest(), Some((ms(3), Bytes::from_static(b"first"))));
        assert_eq!(pending.pop_earliest(), Some((ms(3), Bytes::from_static(b"second"))));
        assert_eq!(pending.next_release(), Some(ms(7)));
        assert_eq!(pending.len(), 1);
        assert!(pending.pop_earliest().is_some());
        assert!(pending.pop_earliest().is_none());
    }

    proptest! {
        #[test]
        fn drained_once_in_release_order(
            releases in prop::collection::vec(0u64..500, 0..64),
            polls in prop::collection::vec(0u64..600, 1..16),
        ) {
            let mut pending = PendingPackets::new();
            for (id, release) in releases.iter().enumerate() {
                pending.insert(ms(*release), Bytes::from((id as u32).to_be_bytes().to_vec()));
            }

            let mut polls = polls;
            polls.sort_unstable();
            polls.push(600);

            let mut seen = vec![false; releases.len()];
            let mut last = Duration::ZERO;
            for now in polls {
                for (release, packet) in pending.drain_due(ms(now)) {
                    prop_assert!(release <= ms(now));
                    prop_assert!(release >= last);
                    last = release;

                    let id = u32::from_be_bytes([packet[0], packet[1], packet[2], packet[3]]) as usize;
                    prop_assert_eq!(ms(releases[id]), release);
                    prop_assert!(!seen[id]);
                    seen[id] = true;
                }
            }

            prop_assert!(seen.into_iter().all(|s| s));
            prop_assert!(pending.is_empty());
        }
    }
}
