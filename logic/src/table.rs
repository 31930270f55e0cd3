use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::RoutingConfig;
use crate::contact::Contact;
use crate::id::{Id, IdRange};
use crate::kbucket::{Insertion, KBucket};

/// What `add_contact` wants its caller to do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddOutcome {
    /// The contact landed in (or already occupied) a live list.
    Added,
    /// The containing bucket was full and may not split; the contact
    /// was parked in its replacement cache.
    Buffered,
    /// As `Buffered`, but the caller should ping `oldest` and, if it
    /// stays silent, remove it and re-add the contact once.
    ProbeOldest { oldest: Contact },
    /// The local id is never routed.
    SelfId,
}

/// A dynamic prefix tree of k-buckets, kept as an ordered sequence
/// whose ranges partition the id space.
pub struct RoutingTable {
    self_id: Id,
    config: RoutingConfig,
    buckets: Vec<KBucket>,
}

impl RoutingTable {
    pub fn new(self_id: Id, config: RoutingConfig) -> Self {
        RoutingTable {
            self_id,
            config,
            buckets: vec![KBucket::new(IdRange::FULL)],
        }
    }

    pub fn self_id(&self) -> Id {
        self.self_id
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Total live contacts across all buckets.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(|b| b.is_empty())
    }

    pub fn bucket_range(&self, index: usize) -> IdRange {
        self.buckets[index].range()
    }

    /// Index of the unique bucket whose range holds `id`.
    pub fn bucket_for(&self, id: &Id) -> usize {
        self.buckets
            .iter()
            .position(|b| b.contains(id))
            .expect("bucket ranges must partition the id space")
    }

    pub fn is_new(&self, id: &Id) -> bool {
        self.buckets[self.bucket_for(id)].is_new(id)
    }

    /// Moves a known live contact to its bucket's most-recently-seen
    /// position.
    pub fn touch(&mut self, id: &Id) -> bool {
        let index = self.bucket_for(id);
        self.buckets[index].touch(id)
    }

    /// Routes the contact to its bucket. A full bucket is split while
    /// the split policy allows it: the bucket covers the local id, or
    /// its depth is not a multiple of the relaxation modulus.
    pub fn add_contact(&mut self, contact: Contact) -> AddOutcome {
        if contact.id == self.self_id {
            return AddOutcome::SelfId;
        }

        loop {
            let index = self.bucket_for(&contact.id);
            let bucket = &mut self.buckets[index];
            match bucket.add(contact, &self.config) {
                Insertion::Accepted => return AddOutcome::Added,
                Insertion::Full => {
                    let may_split = bucket.contains(&self.self_id)
                        || bucket.depth() % self.config.split_relaxation != 0;
                    if may_split {
                        self.split_bucket(index);
                        continue;
                    }
                    // `add` already parked the contact in the cache
                    return match bucket.oldest() {
                        Some(oldest) => AddOutcome::ProbeOldest { oldest: *oldest },
                        None => AddOutcome::Buffered,
                    };
                }
            }
        }
    }

    fn split_bucket(&mut self, index: usize) {
        let (lower, upper) = self.buckets[index].split();
        debug!(
            "splitting bucket {index} ({} live / {} cached)",
            lower.len() + upper.len(),
            lower.replacements().len() + upper.replacements().len()
        );
        self.buckets[index] = lower;
        self.buckets.insert(index + 1, upper);
    }

    pub fn remove_contact(&mut self, id: &Id) -> bool {
        let index = self.bucket_for(id);
        self.buckets[index].remove(id)
    }

    /// Up to `n` known contacts, ascending by XOR distance to `target`.
    ///
    /// Contacts are gathered from the target's bucket outward,
    /// alternating between the nearest unvisited bucket on each side,
    /// then sorted; the true distance order is imposed at the end.
    pub fn closest(&mut self, target: &Id, n: usize) -> Vec<Contact> {
        let index = self.bucket_for(target);
        self.buckets[index].refresh_last_updated();

        let mut found: Vec<Contact> = Vec::new();
        found.extend_from_slice(self.buckets[index].live());

        let (mut left, mut right) = (index, index + 1);
        while found.len() < n && (left > 0 || right < self.buckets.len()) {
            if left > 0 {
                left -= 1;
                found.extend_from_slice(self.buckets[left].live());
            }
            if found.len() >= n {
                break;
            }
            if right < self.buckets.len() {
                found.extend_from_slice(self.buckets[right].live());
                right += 1;
            }
        }

        found.retain(|c| c.id != self.self_id);
        found.sort_unstable_by_key(|c| c.id ^ *target);
        found.truncate(n);
        found
    }

    /// Indices of buckets that have seen no traffic for `threshold`.
    pub fn lonely_buckets(&self, threshold: Duration) -> Vec<usize> {
        let now = Instant::now();
        self.buckets
            .iter()
            .enumerate()
            .filter(|(_, b)| now.duration_since(b.last_updated()) > threshold)
            .map(|(index, _)| index)
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn buckets(&self) -> &[KBucket] {
        &self.buckets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{contact, id, test_routing};
    use rand::Rng;

    fn table(self_id: Id, bucket_size: usize) -> RoutingTable {
        RoutingTable::new(self_id, test_routing(bucket_size, 5))
    }

    fn assert_partition(table: &RoutingTable) {
        let buckets = table.buckets();
        assert_eq!(buckets[0].range().start, Id::ZERO);
        assert_eq!(buckets.last().unwrap().range().end, Id::MAX);
        for pair in buckets.windows(2) {
            assert_eq!(pair[0].range().end.succ(), pair[1].range().start);
        }
        let holding_self = buckets
            .iter()
            .filter(|b| b.contains(&table.self_id()))
            .count();
        assert_eq!(holding_self, 1);
    }

    #[test]
    fn add_routes_and_splits_around_self() {
        let mut table = table(id(1), 2);
        assert_eq!(table.add_contact(contact(2)), AddOutcome::Added);
        assert_eq!(table.add_contact(contact(3)), AddOutcome::Added);
        assert_eq!(table.bucket_count(), 1);

        // The single bucket is full and covers the local id: it splits
        // until the new contact finds room.
        assert_eq!(table.add_contact(contact(4)), AddOutcome::Added);
        assert!(table.bucket_count() > 1);
        assert_eq!(table.len(), 3);
        assert_partition(&table);
    }

    #[test]
    fn self_id_is_never_routed() {
        let mut table = table(id(1), 2);
        assert_eq!(table.add_contact(contact(1)), AddOutcome::SelfId);
        assert!(table.is_empty());
    }

    #[test]
    fn add_is_idempotent_for_live_contacts() {
        let mut table = table(id(1), 2);
        table.add_contact(contact(2));
        table.add_contact(contact(3));
        assert_eq!(table.add_contact(contact(2)), AddOutcome::Added);
        assert_eq!(table.len(), 2);
        assert!(!table.is_new(&id(2)));
        assert!(table.is_new(&id(50)));
    }

    #[test]
    fn full_far_bucket_asks_for_a_probe() {
        // Local id in the lower half; fill a bucket in the upper half
        // whose depth is a multiple of the relaxation modulus.
        let mut far_a = Id::ZERO;
        far_a.0[0] = 0b1000_0000;
        let mut far_b = Id::ZERO;
        far_b.0[0] = 0b1000_0100; // shares exactly 5 leading bits with far_a
        let mut far_c = Id::ZERO;
        far_c.0[0] = 0b1001_0000;

        let mut table = table(id(1), 2);
        let a = Contact::new(far_a, "127.0.0.1:4000".parse().unwrap());
        let b = Contact::new(far_b, "127.0.0.1:4001".parse().unwrap());
        let c = Contact::new(far_c, "127.0.0.1:4002".parse().unwrap());
        assert_eq!(table.add_contact(a), AddOutcome::Added);
        assert_eq!(table.add_contact(b), AddOutcome::Added);

        // depth 5 % 5 == 0 and the bucket does not hold the local id
        assert_eq!(table.add_contact(c), AddOutcome::ProbeOldest { oldest: a });
        let bucket = &table.buckets()[table.bucket_for(&far_c)];
        assert_eq!(bucket.replacements(), &[c]);

        // A silent oldest contact is removed; the retried add promotes
        // the candidate.
        assert!(table.remove_contact(&a.id));
        assert_eq!(table.add_contact(c), AddOutcome::Added);
        assert!(!table.is_new(&c.id));
    }

    #[test]
    fn partition_invariant_under_random_churn() {
        let mut rng = rand::thread_rng();
        let self_id: Id = rng.gen();
        let mut table = RoutingTable::new(self_id, test_routing(4, 2));

        for n in 0..500u64 {
            let addr = format!("127.0.0.1:{}", 1024 + (n % 40000)).parse().unwrap();
            table.add_contact(Contact::new(rng.gen(), addr));
            if n % 7 == 0 {
                let victim: Id = rng.gen();
                let index = table.bucket_for(&victim);
                if let Some(oldest) = table.buckets()[index].oldest().copied() {
                    table.remove_contact(&oldest.id);
                }
            }
        }

        assert_partition(&table);
        for bucket in table.buckets() {
            assert!(bucket.len() <= 4);
            assert!(bucket.replacements().len() <= 8);
            for c in bucket.live() {
                assert!(bucket.contains(&c.id));
                assert!(!bucket.replacements().contains(c));
            }
            for c in bucket.replacements() {
                assert!(bucket.contains(&c.id));
            }
        }
    }

    #[test]
    fn closest_orders_by_distance() {
        let mut table = table(id(1), 20);
        for n in 2..12 {
            table.add_contact(contact(n));
        }

        let found = table.closest(&id(10), 3);
        assert_eq!(found, vec![contact(10), contact(11), contact(8)]);

        // Fewer known than asked for: everything comes back
        let all = table.closest(&id(10), 64);
        assert_eq!(all.len(), 10);
    }

    #[test]
    fn closest_walks_outward_over_buckets() {
        let mut table = table(id(1), 2);
        for n in 2..40 {
            table.add_contact(contact(n));
        }
        assert!(table.bucket_count() > 1);
        assert_partition(&table);

        let found = table.closest(&id(6), 4);
        assert_eq!(found.len(), 4);
        for pair in found.windows(2) {
            assert!((pair[0].id ^ id(6)) < (pair[1].id ^ id(6)));
        }
    }

    #[test]
    fn lonely_buckets_tracks_traversal_refreshes() {
        let mut table = table(id(1), 2);
        for n in 2..10 {
            table.add_contact(contact(n));
        }
        // Everything was just created
        assert!(table.lonely_buckets(Duration::from_secs(1)).is_empty());

        std::thread::sleep(Duration::from_millis(40));
        let refreshed = table.bucket_for(&id(3));
        table.closest(&id(3), 2);

        let lonely = table.lonely_buckets(Duration::from_millis(20));
        assert!(!lonely.contains(&refreshed));
        assert_eq!(lonely.len(), table.bucket_count() - 1);
    }
}
