use std::time::Instant;

use crate::config::RoutingConfig;
use crate::consts::ID_LEN_BITS;
use crate::contact::Contact;
use crate::id::{Id, IdRange};

/// Outcome of offering a contact to a bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Insertion {
    /// The contact is now (or already was) in the live list.
    Accepted,
    /// The live list is at capacity; the contact went to the
    /// replacement cache instead.
    Full,
}

/// An ordered set of up to k contacts covering a sub-range of the id
/// space, oldest first, plus a replacement cache of contacts seen while
/// the live list was full.
#[derive(Clone, Debug)]
pub struct KBucket {
    range: IdRange,
    live: Vec<Contact>,
    replacements: Vec<Contact>,
    last_updated: Instant,
}

impl KBucket {
    pub fn new(range: IdRange) -> Self {
        KBucket {
            range,
            live: Vec::new(),
            replacements: Vec::new(),
            last_updated: Instant::now(),
        }
    }

    pub fn range(&self) -> IdRange {
        self.range
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.range.contains(id)
    }

    pub fn live(&self) -> &[Contact] {
        &self.live
    }

    pub fn replacements(&self) -> &[Contact] {
        &self.replacements
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// The least recently seen live contact.
    pub fn oldest(&self) -> Option<&Contact> {
        self.live.first()
    }

    pub fn is_new(&self, id: &Id) -> bool {
        !self.live.iter().any(|c| c.id == *id)
    }

    pub fn last_updated(&self) -> Instant {
        self.last_updated
    }

    pub fn refresh_last_updated(&mut self) {
        self.last_updated = Instant::now();
    }

    /// Moves the contact to the most-recently-seen position.
    pub fn touch(&mut self, id: &Id) -> bool {
        match self.live.iter().position(|c| c.id == *id) {
            Some(index) => {
                // Bring element at index to the back
                self.live[index..].rotate_left(1);
                true
            }
            None => false,
        }
    }

    /// Offer a contact to the bucket.
    ///
    /// Known live contacts are touched; new ones are appended while
    /// there is room; once full, the contact is parked at the tail of
    /// the replacement cache, evicting the cache's oldest entry if the
    /// cache overflows.
    pub fn add(&mut self, contact: Contact, config: &RoutingConfig) -> Insertion {
        if self.touch(&contact.id) {
            return Insertion::Accepted;
        }
        if self.live.len() < config.bucket_size {
            // A stale cached copy must not shadow the live entry
            self.remove_replacement(&contact.id);
            self.live.push(contact);
            return Insertion::Accepted;
        }

        self.remove_replacement(&contact.id);
        self.replacements.push(contact);
        while self.replacements.len() > config.replacement_cache_size() {
            self.replacements.remove(0);
        }
        Insertion::Full
    }

    /// Removes a contact by id. A vacated live slot is refilled by
    /// promoting the most recently seen replacement.
    pub fn remove(&mut self, id: &Id) -> bool {
        if let Some(index) = self.live.iter().position(|c| c.id == *id) {
            self.live.remove(index);
            if let Some(promoted) = self.replacements.pop() {
                self.live.push(promoted);
            }
            true
        } else {
            self.remove_replacement(id)
        }
    }

    fn remove_replacement(&mut self, id: &Id) -> bool {
        match self.replacements.iter().position(|c| c.id == *id) {
            Some(index) => {
                self.replacements.remove(index);
                true
            }
            None => false,
        }
    }

    /// Length of the longest common bit prefix of the live ids.
    pub fn depth(&self) -> usize {
        let first = match self.live.first() {
            Some(c) => c.id,
            None => return 0,
        };
        self.live
            .iter()
            .map(|c| (first ^ c.id).leading_zeros() as usize)
            .min()
            .unwrap_or(ID_LEN_BITS)
    }

    /// Splits at the range midpoint, distributing both live and
    /// replacement contacts into the matching child.
    pub fn split(&self) -> (KBucket, KBucket) {
        let (low, high) = self.range.halves();
        let mut lower = KBucket::new(low);
        let mut upper = KBucket::new(high);

        for c in &self.live {
            if lower.contains(&c.id) {
                lower.live.push(*c);
            } else {
                upper.live.push(*c);
            }
        }
        for c in &self.replacements {
            if lower.contains(&c.id) {
                lower.replacements.push(*c);
            } else {
                upper.replacements.push(*c);
            }
        }

        (lower, upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{contact, id, test_routing};

    #[test]
    fn fill_and_overflow() {
        let config = test_routing(2, 5);
        // [0, 2k)
        let mut bucket = KBucket::new(IdRange {
            start: id(0),
            end: id(3),
        });

        assert_eq!(bucket.add(contact(0), &config), Insertion::Accepted);
        assert_eq!(bucket.add(contact(1), &config), Insertion::Accepted);
        assert_eq!(bucket.add(contact(2), &config), Insertion::Full);

        assert_eq!(bucket.live(), &[contact(0), contact(1)]);
        assert_eq!(bucket.replacements(), &[contact(2)]);
    }

    #[test]
    fn re_add_touches() {
        let config = test_routing(2, 5);
        let mut bucket = KBucket::new(IdRange {
            start: id(0),
            end: id(9),
        });

        bucket.add(contact(0), &config);
        bucket.add(contact(1), &config);
        assert_eq!(bucket.add(contact(0), &config), Insertion::Accepted);
        // No growth, oldest is now 1
        assert_eq!(bucket.live(), &[contact(1), contact(0)]);
        assert!(bucket.replacements().is_empty());
    }

    #[test]
    fn replacement_cache_is_bounded() {
        let config = test_routing(2, 2);
        let mut bucket = KBucket::new(IdRange {
            start: id(0),
            end: id(99),
        });

        for n in 0..8 {
            bucket.add(contact(n), &config);
        }
        assert_eq!(bucket.live(), &[contact(0), contact(1)]);
        // cache capacity is 4: the oldest overflow entries were dropped
        assert_eq!(
            bucket.replacements(),
            &[contact(4), contact(5), contact(6), contact(7)]
        );

        // Re-offering a cached contact moves it to the cache tail
        bucket.add(contact(4), &config);
        assert_eq!(
            bucket.replacements(),
            &[contact(5), contact(6), contact(7), contact(4)]
        );
    }

    #[test]
    fn remove_promotes_newest_replacement() {
        let config = test_routing(2, 5);
        let mut bucket = KBucket::new(IdRange {
            start: id(0),
            end: id(9),
        });

        // live = [a, b], replacements = [c, d, e]
        for n in 0..5 {
            bucket.add(contact(n), &config);
        }

        assert!(bucket.remove(&id(0)));
        assert_eq!(bucket.live(), &[contact(1), contact(4)]);
        assert_eq!(bucket.replacements(), &[contact(2), contact(3)]);

        // Removing a cache-only contact touches nothing else
        assert!(bucket.remove(&id(2)));
        assert_eq!(bucket.live(), &[contact(1), contact(4)]);
        assert_eq!(bucket.replacements(), &[contact(3)]);

        assert!(!bucket.remove(&id(77)));
    }

    #[test]
    fn split_distributes_contacts() {
        let config = test_routing(4, 5);
        let mut bucket = KBucket::new(IdRange {
            start: id(0),
            end: id(3),
        });
        bucket.add(contact(2), &config);
        bucket.add(contact(3), &config);

        let (lower, upper) = bucket.split();
        assert_eq!(lower.range(), IdRange { start: id(0), end: id(1) });
        assert_eq!(upper.range(), IdRange { start: id(2), end: id(3) });
        assert!(lower.is_empty());
        assert_eq!(upper.live(), &[contact(2), contact(3)]);
    }

    #[test]
    fn split_distributes_replacements() {
        let config = test_routing(1, 5);
        let mut bucket = KBucket::new(IdRange {
            start: id(0),
            end: id(3),
        });
        bucket.add(contact(0), &config);
        bucket.add(contact(1), &config);
        bucket.add(contact(2), &config);
        assert_eq!(bucket.replacements(), &[contact(1), contact(2)]);

        let (lower, upper) = bucket.split();
        assert_eq!(lower.live(), &[contact(0)]);
        assert_eq!(lower.replacements(), &[contact(1)]);
        assert!(upper.is_empty());
        assert_eq!(upper.replacements(), &[contact(2)]);
    }

    #[test]
    fn depth_is_the_common_prefix() {
        let config = test_routing(4, 5);
        let mut bucket = KBucket::new(IdRange::FULL);
        assert_eq!(bucket.depth(), 0);

        bucket.add(contact(0b1000), &config);
        assert_eq!(bucket.depth(), crate::consts::ID_LEN_BITS);

        // 0b1000 and 0b1011 share all bits except the lowest two
        bucket.add(contact(0b1011), &config);
        assert_eq!(bucket.depth(), crate::consts::ID_LEN_BITS - 2);
    }
}
