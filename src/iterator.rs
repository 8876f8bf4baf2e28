use crate::{Cache, SEGMENT_COUNT};

/// A key/value pair produced by cache iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Iterates the live entries of a cache in no particular order.
///
/// Walks segments 0..255, each slot in turn, each record in the slot. The
/// segment lock is held only while a `next` call scans that segment, so
/// the view is consistent per segment, never across the whole cache.
/// Expired entries are skipped.
pub struct CacheIterator<'a> {
    cache: &'a Cache,
    segment_idx: usize,
    slot_idx: usize,
    entry_idx: usize,
}

impl<'a> CacheIterator<'a> {
    pub(crate) fn new(cache: &'a Cache) -> Self {
        Self {
            cache,
            segment_idx: 0,
            slot_idx: 0,
            entry_idx: 0,
        }
    }
}

impl Iterator for CacheIterator<'_> {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        while self.segment_idx < SEGMENT_COUNT {
            let segment = self.cache.segment(self.segment_idx).lock();
            if let Some(entry) = segment.next_entry(&mut self.slot_idx, &mut self.entry_idx) {
                return Some(entry);
            }
            drop(segment);
            self.segment_idx += 1;
            self.slot_idx = 0;
            self.entry_idx = 0;
        }
        None
    }
}
