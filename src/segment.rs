use std::sync::Arc;

use crate::entry::EntryHeader;
use crate::iterator::Entry;
use crate::metrics::SegmentStats;
use crate::ringbuf::RingBuf;
use crate::timer::Timer;
use crate::Error;

/// Slots per segment; the low byte of the key hash selects one.
pub(crate) const SLOT_COUNT: usize = 256;

/// Floor on the eviction visit budget of a single set.
const MIN_EVICTION_VISITS: u64 = 16;

/// After this many back-to-back relocations the next head entry is
/// dropped even if warm, so rotation cannot starve an insert.
const MAX_CONSECUTIVE_EVACUATIONS: u32 = 5;

/// In-memory pointer record indexing one entry on the arena.
///
/// `hash16` and `key_len` are duplicated from the header so a slot scan
/// can reject non-matches without touching the arena.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct EntryPtr {
    offset: u64,
    hash16: u16,
    key_len: u16,
}

/// One shard of the cache: a ring-buffered arena plus a slot index.
///
/// The arena is the allocator. Entries are appended in FIFO order; when
/// the arena is full, the oldest entries are vacuumed (dropped or
/// relocated to the tail) to make room. `vacuum_len` counts the bytes at
/// the head of the stream known to hold no live entries; only those bytes
/// are ever overwritten by new appends.
pub(crate) struct Segment {
    rb: RingBuf,
    /// Uniform per-slot record capacity, doubled on demand
    slot_cap: u32,
    slot_lens: [u32; SLOT_COUNT],
    /// Slot-major record array: slot `i` owns `[i*slot_cap, i*slot_cap+slot_lens[i])`
    slots_data: Vec<EntryPtr>,
    /// Head-of-stream bytes free of live entries
    vacuum_len: u64,
    /// An entry above a quarter of the arena is refused
    max_entry_len: u64,
    stats: Arc<SegmentStats>,
    timer: Arc<dyn Timer>,
}

impl Segment {
    pub fn new(buf_size: usize, timer: Arc<dyn Timer>) -> Self {
        Self {
            rb: RingBuf::new(buf_size),
            slot_cap: 1,
            slot_lens: [0; SLOT_COUNT],
            slots_data: vec![EntryPtr::default(); SLOT_COUNT],
            vacuum_len: buf_size as u64,
            max_entry_len: buf_size as u64 / 4,
            stats: Arc::new(SegmentStats::new()),
            timer,
        }
    }

    pub fn stats(&self) -> &Arc<SegmentStats> {
        &self.stats
    }

    fn slot(&self, slot_id: u8) -> &[EntryPtr] {
        let base = slot_id as usize * self.slot_cap as usize;
        &self.slots_data[base..base + self.slot_lens[slot_id as usize] as usize]
    }

    /// First record index whose `hash16` is not below the probe value.
    fn lower_bound(slot: &[EntryPtr], hash16: u16) -> usize {
        slot.partition_point(|p| p.hash16 < hash16)
    }

    /// Find `key` within its slot. Returns the record index and whether
    /// the key bytes matched on the arena.
    fn lookup(&self, slot_id: u8, hash16: u16, key: &[u8]) -> (usize, bool) {
        let slot = self.slot(slot_id);
        let mut idx = Self::lower_bound(slot, hash16);
        while idx < slot.len() {
            let ptr = &slot[idx];
            if ptr.hash16 != hash16 {
                break;
            }
            if ptr.key_len as usize == key.len()
                && self.rb.equal_at(key, ptr.offset + EntryHeader::SIZE as u64)
            {
                return (idx, true);
            }
            idx += 1;
        }
        (idx, false)
    }

    /// Find the record for a known arena offset, used when the header's
    /// `slot_id` back-reference led us here during eviction.
    fn lookup_by_offset(&self, slot_id: u8, hash16: u16, offset: u64) -> Option<usize> {
        let slot = self.slot(slot_id);
        let mut idx = Self::lower_bound(slot, hash16);
        while idx < slot.len() {
            let ptr = &slot[idx];
            if ptr.hash16 != hash16 {
                break;
            }
            if ptr.offset == offset {
                return Some(idx);
            }
            idx += 1;
        }
        None
    }

    // Offsets handed out by the slot index always sit inside [begin, end),
    // so arena accesses through them cannot fail; results are discarded.

    fn read_header(&self, offset: u64) -> EntryHeader {
        let mut buf = [0u8; EntryHeader::SIZE];
        let _ = self.rb.read_at(&mut buf, offset);
        EntryHeader::from_bytes(&buf)
    }

    fn write_header(&mut self, offset: u64, hdr: &EntryHeader) {
        let mut buf = [0u8; EntryHeader::SIZE];
        hdr.to_bytes(&mut buf);
        let _ = self.rb.write_at(&buf, offset);
    }

    fn update_expire_at(&mut self, offset: u64, expire_at: u32) {
        let _ = self
            .rb
            .write_at(&expire_at.to_le_bytes(), offset + EntryHeader::EXPIRE_AT_OFFSET);
    }

    fn absolute_expiry(&self, now: u32, expire_seconds: u32) -> u32 {
        if expire_seconds == 0 {
            0
        } else {
            now.saturating_add(expire_seconds)
        }
    }

    /// Insert or replace `key`.
    ///
    /// A match with enough value capacity is overwritten in place; a match
    /// without capacity is tombstoned and the entry re-appended. New
    /// entries evict from the ring head until room is available.
    pub fn set(
        &mut self,
        key: &[u8],
        value: &[u8],
        hash: u64,
        expire_seconds: u32,
    ) -> Result<(), Error> {
        if key.len() > EntryHeader::MAX_KEY_LEN {
            return Err(Error::LargeEntry);
        }
        if (EntryHeader::SIZE + key.len() + value.len()) as u64 > self.max_entry_len {
            return Err(Error::LargeEntry);
        }
        let slot_id = (hash & 0xff) as u8;
        let hash16 = (hash >> 16) as u16;
        let now = self.timer.now();
        let expire_at = self.absolute_expiry(now, expire_seconds);

        let (idx, found) = self.lookup(slot_id, hash16, key);
        if found {
            let ptr = self.slot(slot_id)[idx];
            let mut hdr = self.read_header(ptr.offset);
            let original_access_time = hdr.access_time;
            hdr.access_time = now;
            hdr.expire_at = expire_at;
            hdr.val_len = value.len() as u32;
            if hdr.val_cap >= hdr.val_len {
                self.stats
                    .total_time
                    .add(i64::from(now) - i64::from(original_access_time));
                self.write_header(ptr.offset, &hdr);
                let _ = self.rb.write_at(value, hdr.val_off(ptr.offset));
                self.stats.overwrites.increment();
                return Ok(());
            }
            // Capacity exhausted; tombstone and fall through to a fresh append.
            self.del_entry_ptr(slot_id, idx);
        }
        self.insert(key, value, hash16, slot_id, now, expire_at)
    }

    /// Append a fresh entry, evicting from the head until it fits.
    fn insert(
        &mut self,
        key: &[u8],
        value: &[u8],
        hash16: u16,
        slot_id: u8,
        now: u32,
        expire_at: u32,
    ) -> Result<(), Error> {
        let hdr = EntryHeader {
            access_time: now,
            expire_at,
            key_len: key.len() as u16,
            hash16,
            val_len: value.len() as u32,
            // every entry owns at least one value byte of arena
            val_cap: (value.len() as u32).max(1),
            deleted: false,
            slot_id,
        };
        let entry_len = hdr.entry_len();

        self.make_room(entry_len, now)?;

        let new_off = self.rb.end();
        let mut hdr_buf = [0u8; EntryHeader::SIZE];
        hdr.to_bytes(&mut hdr_buf);
        // Room was vacuumed above, so these appends only overwrite dead bytes.
        let _ = self.rb.write(&hdr_buf);
        let _ = self.rb.write(key);
        let _ = self.rb.write(value);
        self.rb.skip(u64::from(hdr.val_cap) - value.len() as u64);
        self.vacuum_len -= entry_len;

        self.insert_entry_ptr(slot_id, hash16, new_off, key.len() as u16);
        self.stats.entry_count.increment();
        self.stats.total_count.increment();
        self.stats.total_time.add(i64::from(now));
        Ok(())
    }

    /// Vacuum head entries until `need` bytes are free.
    ///
    /// Tombstoned and expired heads are reclaimed outright. A cold head
    /// (access time at or below the segment's running average) is dropped;
    /// a warm head is relocated to the tail for a second chance. At most
    /// `max(16, entry_count / 128)` live heads are examined before giving
    /// up with `NoSpace`.
    fn make_room(&mut self, need: u64, now: u32) -> Result<(), Error> {
        let mut consecutive_evacuations = 0u32;
        let mut visits = 0u64;
        let budget = MIN_EVICTION_VISITS.max(self.stats.entry_count.value().max(0) as u64 / 128);
        while self.vacuum_len < need {
            // oldest entry not yet vacuumed
            let old_off = self.rb.end() + self.vacuum_len - self.rb.size();
            let old_hdr = self.read_header(old_off);
            let old_entry_len = old_hdr.entry_len();

            if old_hdr.deleted {
                consecutive_evacuations = 0;
                self.stats.total_time.sub(i64::from(old_hdr.access_time));
                self.stats.total_count.decrement();
                self.vacuum_len += old_entry_len;
                continue;
            }

            if visits >= budget {
                return Err(Error::NoSpace);
            }
            visits += 1;

            let expired = old_hdr.expire_at != 0 && old_hdr.expire_at <= now;
            let cold = i64::from(old_hdr.access_time) * self.stats.total_count.value()
                <= self.stats.total_time.value();
            if expired || cold || consecutive_evacuations > MAX_CONSECUTIVE_EVACUATIONS {
                self.del_entry_ptr_by_offset(old_hdr.slot_id, old_hdr.hash16, old_off);
                consecutive_evacuations = 0;
                self.stats.total_time.sub(i64::from(old_hdr.access_time));
                self.stats.total_count.decrement();
                self.vacuum_len += old_entry_len;
                if expired {
                    self.stats.total_expired.increment();
                }
                self.stats.total_evacuate.increment();
            } else {
                let Some(new_off) = self.rb.evacuate(old_off, old_entry_len as usize) else {
                    return Err(Error::NoSpace);
                };
                self.update_entry_ptr(old_hdr.slot_id, old_hdr.hash16, old_off, new_off);
                consecutive_evacuations += 1;
                self.stats.total_evacuate.increment();
            }
        }
        Ok(())
    }

    /// Probe for `key` and, unless peeking, apply expiry and bump the
    /// entry's access time.
    fn locate(&mut self, key: &[u8], hash: u64, peek: bool) -> Result<(EntryHeader, u64), Error> {
        let slot_id = (hash & 0xff) as u8;
        let hash16 = (hash >> 16) as u16;
        let (idx, found) = self.lookup(slot_id, hash16, key);
        if !found {
            if !peek {
                self.stats.miss_count.increment();
            }
            return Err(Error::NotFound);
        }
        let ptr = self.slot(slot_id)[idx];
        let mut hdr = self.read_header(ptr.offset);
        if !peek {
            let now = self.timer.now();
            if hdr.expire_at != 0 && hdr.expire_at <= now {
                self.del_entry_ptr(slot_id, idx);
                self.stats.total_expired.increment();
                self.stats.miss_count.increment();
                return Err(Error::NotFound);
            }
            self.stats
                .total_time
                .add(i64::from(now) - i64::from(hdr.access_time));
            hdr.access_time = now;
            let _ = self
                .rb
                .write_at(&now.to_le_bytes(), ptr.offset + EntryHeader::ACCESS_TIME_OFFSET);
        }
        Ok((hdr, ptr.offset))
    }

    /// Copy out the value for `key`. `peek` skips expiry handling, the
    /// access-time bump, and hit/miss accounting.
    pub fn get(&mut self, key: &[u8], hash: u64, peek: bool) -> Result<(Vec<u8>, u32), Error> {
        let (hdr, offset) = self.locate(key, hash, peek)?;
        let mut value = vec![0u8; hdr.val_len as usize];
        let _ = self.rb.read_at(&mut value, hdr.val_off(offset));
        if !peek {
            self.stats.hit_count.increment();
        }
        Ok((value, hdr.expire_at))
    }

    /// Apply `f` to the value bytes in place, borrowing straight from the
    /// arena when the value does not straddle the wrap.
    pub fn get_with<T>(
        &mut self,
        key: &[u8],
        hash: u64,
        f: impl FnOnce(&[u8]) -> T,
    ) -> Result<T, Error> {
        let (hdr, offset) = self.locate(key, hash, false)?;
        let value = self
            .rb
            .slice(hdr.val_off(offset), u64::from(hdr.val_len))
            .map_err(|_| Error::NotFound)?;
        self.stats.hit_count.increment();
        Ok(f(&value))
    }

    /// Remove `key`. Returns whether it existed.
    pub fn del(&mut self, key: &[u8], hash: u64) -> bool {
        let slot_id = (hash & 0xff) as u8;
        let hash16 = (hash >> 16) as u16;
        let (idx, found) = self.lookup(slot_id, hash16, key);
        if found {
            self.del_entry_ptr(slot_id, idx);
        }
        found
    }

    /// Reset the expiration of `key`; 0 clears it. Also bumps the access
    /// time, so a touched entry counts as warm.
    pub fn touch(&mut self, key: &[u8], hash: u64, expire_seconds: u32) -> Result<(), Error> {
        if key.len() > EntryHeader::MAX_KEY_LEN {
            return Err(Error::LargeEntry);
        }
        let (_, offset) = self.locate(key, hash, false)?;
        let now = self.timer.now();
        let expire_at = self.absolute_expiry(now, expire_seconds);
        self.update_expire_at(offset, expire_at);
        self.stats.touched.increment();
        Ok(())
    }

    /// Replace the value of `key`, keeping its expiration.
    pub fn update_value(&mut self, key: &[u8], hash: u64, value: &[u8]) -> Result<(), Error> {
        if (EntryHeader::SIZE + key.len() + value.len()) as u64 > self.max_entry_len {
            return Err(Error::LargeEntry);
        }
        let slot_id = (hash & 0xff) as u8;
        let hash16 = (hash >> 16) as u16;
        let (idx, found) = self.lookup(slot_id, hash16, key);
        if !found {
            self.stats.miss_count.increment();
            return Err(Error::NotFound);
        }
        let ptr = self.slot(slot_id)[idx];
        let mut hdr = self.read_header(ptr.offset);
        let now = self.timer.now();
        if hdr.expire_at != 0 && hdr.expire_at <= now {
            self.del_entry_ptr(slot_id, idx);
            self.stats.total_expired.increment();
            self.stats.miss_count.increment();
            return Err(Error::NotFound);
        }

        if value.len() as u32 <= hdr.val_cap {
            self.stats
                .total_time
                .add(i64::from(now) - i64::from(hdr.access_time));
            hdr.access_time = now;
            hdr.val_len = value.len() as u32;
            self.write_header(ptr.offset, &hdr);
            let _ = self.rb.write_at(value, hdr.val_off(ptr.offset));
            self.stats.overwrites.increment();
            return Ok(());
        }
        self.expand_value(slot_id, idx, key, value, hdr, now)
    }

    /// Grow an entry's value beyond its capacity.
    ///
    /// Only an entry sitting at the arena tail can be extended in place;
    /// anything else is tombstoned and re-appended.
    fn expand_value(
        &mut self,
        slot_id: u8,
        idx: usize,
        key: &[u8],
        value: &[u8],
        mut hdr: EntryHeader,
        now: u32,
    ) -> Result<(), Error> {
        let offset = self.slot(slot_id)[idx].offset;
        let entry_len = hdr.entry_len();
        let delta = value.len() as u64 - u64::from(hdr.val_cap);
        if offset + entry_len == self.rb.end() && self.vacuum_len >= delta {
            self.stats
                .total_time
                .add(i64::from(now) - i64::from(hdr.access_time));
            let old_cap = hdr.val_cap as usize;
            hdr.access_time = now;
            hdr.val_len = value.len() as u32;
            hdr.val_cap = value.len() as u32;
            self.write_header(offset, &hdr);
            let _ = self.rb.write_at(&value[..old_cap], hdr.val_off(offset));
            let _ = self.rb.write(&value[old_cap..]);
            self.vacuum_len -= delta;
            self.stats.overwrites.increment();
            return Ok(());
        }
        // The tombstone keeps its access time in the running sum until it
        // is vacuumed; only the fresh entry's is added here.
        self.del_entry_ptr(slot_id, idx);
        self.insert(key, value, hdr.hash16, slot_id, now, hdr.expire_at)
    }

    /// Remaining seconds before `key` expires; 0 means it never does.
    pub fn ttl(&self, key: &[u8], hash: u64) -> Result<u32, Error> {
        let slot_id = (hash & 0xff) as u8;
        let hash16 = (hash >> 16) as u16;
        let (idx, found) = self.lookup(slot_id, hash16, key);
        if !found {
            return Err(Error::NotFound);
        }
        let hdr = self.read_header(self.slot(slot_id)[idx].offset);
        if hdr.expire_at == 0 {
            return Ok(0);
        }
        let now = self.timer.now();
        if hdr.expire_at > now {
            Ok(hdr.expire_at - now)
        } else {
            Err(Error::NotFound)
        }
    }

    /// Insert a pointer record at its sorted position, growing the slot
    /// array when the slot is full.
    fn insert_entry_ptr(&mut self, slot_id: u8, hash16: u16, offset: u64, key_len: u16) {
        if self.slot_lens[slot_id as usize] == self.slot_cap {
            self.expand_slots();
        }
        let base = slot_id as usize * self.slot_cap as usize;
        let len = self.slot_lens[slot_id as usize] as usize;
        let idx = Self::lower_bound(&self.slots_data[base..base + len], hash16);
        self.slots_data.copy_within(base + idx..base + len, base + idx + 1);
        self.slots_data[base + idx] = EntryPtr {
            offset,
            hash16,
            key_len,
        };
        self.slot_lens[slot_id as usize] += 1;
    }

    /// Double `slot_cap`, reshaping the record array so every slot keeps
    /// its records at the new slot-major positions.
    fn expand_slots(&mut self) {
        let new_cap = self.slot_cap * 2;
        let mut new_data = vec![EntryPtr::default(); SLOT_COUNT * new_cap as usize];
        for i in 0..SLOT_COUNT {
            let old_base = i * self.slot_cap as usize;
            let new_base = i * new_cap as usize;
            let len = self.slot_lens[i] as usize;
            new_data[new_base..new_base + len]
                .copy_from_slice(&self.slots_data[old_base..old_base + len]);
        }
        self.slots_data = new_data;
        self.slot_cap = new_cap;
    }

    /// Drop the record at `idx` and tombstone its entry on the arena.
    fn del_entry_ptr(&mut self, slot_id: u8, idx: usize) {
        let base = slot_id as usize * self.slot_cap as usize;
        let offset = self.slots_data[base + idx].offset;
        let _ = self
            .rb
            .write_at(&[1], offset + EntryHeader::DELETED_OFFSET);
        let len = self.slot_lens[slot_id as usize] as usize;
        self.slots_data.copy_within(base + idx + 1..base + len, base + idx);
        self.slot_lens[slot_id as usize] -= 1;
        self.stats.entry_count.decrement();
    }

    /// Drop the record for the entry being vacuumed at `offset`. No arena
    /// tombstone: the bytes are already past the point of reuse.
    fn del_entry_ptr_by_offset(&mut self, slot_id: u8, hash16: u16, offset: u64) {
        if let Some(idx) = self.lookup_by_offset(slot_id, hash16, offset) {
            let base = slot_id as usize * self.slot_cap as usize;
            let len = self.slot_lens[slot_id as usize] as usize;
            self.slots_data.copy_within(base + idx + 1..base + len, base + idx);
            self.slot_lens[slot_id as usize] -= 1;
            self.stats.entry_count.decrement();
        }
    }

    /// Retarget the record of an evacuated entry to its new offset.
    fn update_entry_ptr(&mut self, slot_id: u8, hash16: u16, old_off: u64, new_off: u64) {
        if let Some(idx) = self.lookup_by_offset(slot_id, hash16, old_off) {
            let base = slot_id as usize * self.slot_cap as usize;
            self.slots_data[base + idx].offset = new_off;
        }
    }

    /// Cursor-style iteration: produce the next live entry at or after
    /// `(slot_idx, entry_idx)`, advancing the cursor. Expired entries are
    /// skipped without being mutated.
    pub fn next_entry(&self, slot_idx: &mut usize, entry_idx: &mut usize) -> Option<Entry> {
        while *slot_idx < SLOT_COUNT {
            let slot = self.slot(*slot_idx as u8);
            while *entry_idx < slot.len() {
                let ptr = slot[*entry_idx];
                *entry_idx += 1;
                let hdr = self.read_header(ptr.offset);
                let now = self.timer.now();
                if hdr.expire_at == 0 || hdr.expire_at > now {
                    let mut key = vec![0u8; hdr.key_len as usize];
                    let _ = self.rb.read_at(&mut key, hdr.key_off(ptr.offset));
                    let mut value = vec![0u8; hdr.val_len as usize];
                    let _ = self.rb.read_at(&mut value, hdr.val_off(ptr.offset));
                    return Some(Entry { key, value });
                }
            }
            *slot_idx += 1;
            *entry_idx = 0;
        }
        None
    }

    /// Drop every entry and reset the arena. Monotonic statistics survive;
    /// `reset_statistics` clears those.
    pub fn clear(&mut self) {
        self.rb.reset(0);
        self.vacuum_len = self.rb.size();
        self.slot_cap = 1;
        self.slots_data = vec![EntryPtr::default(); SLOT_COUNT];
        self.slot_lens = [0; SLOT_COUNT];
        self.stats.entry_count.set(0);
        self.stats.total_count.set(0);
        self.stats.total_time.set(0);
    }

    /// Zero the process-lifetime counters.
    pub fn reset_statistics(&self) {
        self.stats.hit_count.reset();
        self.stats.miss_count.reset();
        self.stats.total_evacuate.reset();
        self.stats.total_expired.reset();
        self.stats.overwrites.reset();
        self.stats.touched.reset();
    }
}
