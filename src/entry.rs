/// On-arena entry header, fixed 24 bytes, little-endian, packed as:
///
/// ```text
/// [accessTime u32][expireAt u32][keyLen u16][hash16 u16]
/// [valLen u32][valCap u32][deleted u8][slotId u8][reserved u16]
/// ```
///
/// An entry occupies `SIZE + keyLen + valCap` contiguous stream bytes:
/// header, then key, then value capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EntryHeader {
    pub access_time: u32,
    pub expire_at: u32,
    pub key_len: u16,
    pub hash16: u16,
    pub val_len: u32,
    pub val_cap: u32,
    pub deleted: bool,
    pub slot_id: u8,
}

impl EntryHeader {
    /// The packed length of the entry header
    pub const SIZE: usize = 24;

    /// Maximum key length (16 bits)
    pub const MAX_KEY_LEN: usize = u16::MAX as usize;

    // Byte offsets of the fields that get patched in place.
    pub const ACCESS_TIME_OFFSET: u64 = 0;
    pub const EXPIRE_AT_OFFSET: u64 = 4;
    pub const DELETED_OFFSET: u64 = 20;

    pub fn from_bytes(data: &[u8; Self::SIZE]) -> Self {
        Self {
            access_time: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            expire_at: u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
            key_len: u16::from_le_bytes([data[8], data[9]]),
            hash16: u16::from_le_bytes([data[10], data[11]]),
            val_len: u32::from_le_bytes([data[12], data[13], data[14], data[15]]),
            val_cap: u32::from_le_bytes([data[16], data[17], data[18], data[19]]),
            deleted: data[20] != 0,
            slot_id: data[21],
        }
    }

    pub fn to_bytes(&self, data: &mut [u8; Self::SIZE]) {
        data[0..4].copy_from_slice(&self.access_time.to_le_bytes());
        data[4..8].copy_from_slice(&self.expire_at.to_le_bytes());
        data[8..10].copy_from_slice(&self.key_len.to_le_bytes());
        data[10..12].copy_from_slice(&self.hash16.to_le_bytes());
        data[12..16].copy_from_slice(&self.val_len.to_le_bytes());
        data[16..20].copy_from_slice(&self.val_cap.to_le_bytes());
        data[20] = self.deleted as u8;
        data[21] = self.slot_id;
        data[22..24].copy_from_slice(&[0, 0]);
    }

    /// Total stream bytes the entry occupies.
    pub fn entry_len(&self) -> u64 {
        Self::SIZE as u64 + u64::from(self.key_len) + u64::from(self.val_cap)
    }

    /// Stream offset of the key, given the header's offset.
    pub fn key_off(&self, offset: u64) -> u64 {
        offset + Self::SIZE as u64
    }

    /// Stream offset of the value, given the header's offset.
    pub fn val_off(&self, offset: u64) -> u64 {
        offset + Self::SIZE as u64 + u64::from(self.key_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let hdr = EntryHeader {
            access_time: 1_700_000_000,
            expire_at: 1_700_000_060,
            key_len: 12,
            hash16: 0xBEEF,
            val_len: 300,
            val_cap: 512,
            deleted: false,
            slot_id: 77,
        };
        let mut buf = [0u8; EntryHeader::SIZE];
        hdr.to_bytes(&mut buf);
        assert_eq!(EntryHeader::from_bytes(&buf), hdr);
    }

    #[test]
    fn layout_is_little_endian() {
        let hdr = EntryHeader {
            access_time: 0x0403_0201,
            expire_at: 0x0807_0605,
            key_len: 0x0A09,
            hash16: 0x0C0B,
            val_len: 0x100F_0E0D,
            val_cap: 0x1413_1211,
            deleted: true,
            slot_id: 0x15,
        };
        let mut buf = [0u8; EntryHeader::SIZE];
        hdr.to_bytes(&mut buf);
        assert_eq!(
            buf,
            [
                0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D,
                0x0E, 0x0F, 0x10, 0x11, 0x12, 0x13, 0x14, 0x01, 0x15, 0x00, 0x00,
            ]
        );
    }

    #[test]
    fn patched_field_offsets_match_layout() {
        let hdr = EntryHeader {
            access_time: 11,
            expire_at: 22,
            key_len: 3,
            hash16: 4,
            val_len: 5,
            val_cap: 5,
            deleted: false,
            slot_id: 6,
        };
        let mut buf = [0u8; EntryHeader::SIZE];
        hdr.to_bytes(&mut buf);

        let at = EntryHeader::ACCESS_TIME_OFFSET as usize;
        buf[at..at + 4].copy_from_slice(&99u32.to_le_bytes());
        let ea = EntryHeader::EXPIRE_AT_OFFSET as usize;
        buf[ea..ea + 4].copy_from_slice(&88u32.to_le_bytes());
        buf[EntryHeader::DELETED_OFFSET as usize] = 1;

        let patched = EntryHeader::from_bytes(&buf);
        assert_eq!(patched.access_time, 99);
        assert_eq!(patched.expire_at, 88);
        assert!(patched.deleted);
    }

    #[test]
    fn entry_len_counts_capacity_not_length() {
        let hdr = EntryHeader {
            access_time: 0,
            expire_at: 0,
            key_len: 10,
            hash16: 0,
            val_len: 4,
            val_cap: 16,
            deleted: false,
            slot_id: 0,
        };
        assert_eq!(hdr.entry_len(), 24 + 10 + 16);
        assert_eq!(hdr.key_off(100), 124);
        assert_eq!(hdr.val_off(100), 134);
    }
}
