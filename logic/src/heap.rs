use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use crate::contact::Contact;
use crate::id::Id;

#[derive(Clone, Debug, PartialEq, Eq)]
struct Entry {
    distance: Id,
    contact: Contact,
}

// Max-heap order by distance. Distinct contacts can never tie (dedup
// is by id and the metric is XOR), but the order is kept total anyway.
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .cmp(&other.distance)
            .then_with(|| self.contact.id.cmp(&other.contact.id))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Keeps the `capacity` contacts closest to `target` among everything
/// pushed, with contacted bookkeeping for the lookup loop.
///
/// The root of the heap is the farthest kept contact, so "is this
/// candidate better than the current worst" is one peek.
pub struct BoundedHeap {
    target: Id,
    capacity: usize,
    items: BinaryHeap<Entry>,
    seen: HashSet<Id>,
    contacted: HashSet<Id>,
}

impl BoundedHeap {
    pub fn new(target: Id, capacity: usize) -> Self {
        BoundedHeap {
            target,
            capacity,
            items: BinaryHeap::with_capacity(capacity + 1),
            seen: HashSet::new(),
            contacted: HashSet::new(),
        }
    }

    /// Offers a contact; true iff it was admitted as a new entry.
    ///
    /// Ids seen once are never admitted again, so re-announcements of a
    /// known (or evicted) contact don't count as lookup progress.
    pub fn push(&mut self, contact: Contact) -> bool {
        if !self.seen.insert(contact.id) {
            return false;
        }
        let distance = contact.id ^ self.target;
        if self.items.len() < self.capacity {
            self.items.push(Entry { distance, contact });
            return true;
        }
        match self.items.peek() {
            Some(worst) if distance < worst.distance => {
                self.items.pop();
                self.items.push(Entry { distance, contact });
                true
            }
            _ => false,
        }
    }

    pub fn mark_contacted(&mut self, id: &Id) {
        self.contacted.insert(*id);
    }

    /// All kept contacts, closest first.
    pub fn closest(&self) -> Vec<Contact> {
        self.sorted().into_iter().map(|e| e.contact).collect()
    }

    /// Kept contacts not yet marked contacted, closest first.
    pub fn uncontacted(&self) -> Vec<Contact> {
        self.sorted()
            .into_iter()
            .map(|e| e.contact)
            .filter(|c| !self.contacted.contains(&c.id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_saturated(&self) -> bool {
        self.items.len() == self.capacity
    }

    fn sorted(&self) -> Vec<Entry> {
        let mut entries: Vec<Entry> = self.items.iter().cloned().collect();
        entries.sort_unstable();
        entries
    }
}
