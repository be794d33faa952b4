//! Binary layout of the ZIP records the encoder emits.
//!
//! Field order and sizes follow the ZIP specification, APPNOTE.TXT
//! (4.3.7 local file header, 4.3.9 data descriptor, 4.3.12 central
//! directory header, 4.3.14/4.3.15 ZIP64 end records, 4.3.16 end of
//! central directory). All integers are little-endian.

use crate::error::ZipStreamError;

/// ZIP compression methods supported by the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionMethod {
    Stored,
    #[default]
    Deflate,
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(CompressionMethod::Stored),
            8 => Some(CompressionMethod::Deflate),
            _ => None,
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
        }
    }
}

/// General-purpose bit 3: sizes and CRC follow the payload in a data
/// descriptor.
pub const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;
/// General-purpose bit 11: the file name is UTF-8.
pub const FLAG_UTF8: u16 = 1 << 11;

/// Version needed when a record may require ZIP64 fields (4.5 of APPNOTE).
pub const VERSION_ZIP64: u16 = 45;
/// Version needed for plain deflate/stored entries.
pub const VERSION_DEFAULT: u16 = 20;
/// Version made by: UNIX host, spec 4.5.
pub const VERSION_MADE_BY: u16 = (3 << 8) | 45;

/// Largest value a 32-bit size/offset field may carry before the record
/// switches to ZIP64 (`0xFFFFFFFF` is the sentinel).
pub const ZIP32_VALUE_LIMIT: u64 = 0xFFFF_FFFE;
/// Largest entry count the classic end record may carry.
pub const ZIP32_ENTRY_LIMIT: u64 = 0xFFFE;
/// Sentinel stored in a 32-bit field whose value lives in a ZIP64 record.
pub const ZIP32_SENTINEL: u32 = 0xFFFF_FFFF;
const ZIP16_SENTINEL: u16 = 0xFFFF;

/// Fixed DOS timestamp stamped on every entry: 1980-01-01 00:00:00.
///
/// The encoder has no wall-clock dependency; extractors accept the epoch.
pub const DOS_TIME: u16 = 0;
pub const DOS_DATE: u16 = (1 << 5) | 1;

fn put_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_u64(buf: &mut Vec<u8>, value: u64) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Journal record for one entry already written to the archive.
///
/// Appended by the encoder after the entry's payload so the central
/// directory can be emitted once all entries are done.
#[derive(Debug, Clone)]
pub struct EntryRecord {
    /// Canonical (deduplicated) name, UTF-8 bytes
    pub name: Vec<u8>,
    /// CRC-32 of the uncompressed payload
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub method: CompressionMethod,
    /// General-purpose bit flags, as written in the local header
    pub flags: u16,
    /// Archive offset of the entry's local file header
    pub offset: u64,
}

impl EntryRecord {
    /// Whether the central-directory record needs a ZIP64 extra field.
    pub fn needs_zip64(&self) -> bool {
        self.uncompressed_size > ZIP32_VALUE_LIMIT
            || self.compressed_size > ZIP32_VALUE_LIMIT
            || self.offset > ZIP32_VALUE_LIMIT
    }
}

/// Local File Header (LFH) - 30 bytes plus the name
pub struct LocalFileHeader<'a> {
    pub method: CompressionMethod,
    pub flags: u16,
    pub name: &'a [u8],
}

impl<'a> LocalFileHeader<'a> {
    pub const SIGNATURE: &'static [u8] = b"PK\x03\x04";
    pub const SIZE: usize = 30;

    /// Serialize the header with the name appended.
    ///
    /// CRC and both sizes are zero here; the real values follow the payload
    /// in the data descriptor. Fails only if the name does not fit the
    /// 16-bit length field.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ZipStreamError> {
        let name_length = u16::try_from(self.name.len())
            .map_err(|_| ZipStreamError::NameTooLong(self.name.len()))?;

        let mut buf = Vec::with_capacity(Self::SIZE + self.name.len());
        buf.extend_from_slice(Self::SIGNATURE);
        // Sizes are unknown until the payload has streamed, so the header
        // must already admit a ZIP64 data descriptor.
        put_u16(&mut buf, VERSION_ZIP64);
        put_u16(&mut buf, self.flags);
        put_u16(&mut buf, self.method.as_u16());
        put_u16(&mut buf, DOS_TIME);
        put_u16(&mut buf, DOS_DATE);
        put_u32(&mut buf, 0); // crc32
        put_u32(&mut buf, 0); // compressed size
        put_u32(&mut buf, 0); // uncompressed size
        put_u16(&mut buf, name_length);
        put_u16(&mut buf, 0); // extra field length
        buf.extend_from_slice(self.name);
        Ok(buf)
    }
}

/// Data descriptor - 16 bytes, or 24 when either size overflows 32 bits
pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
}

impl DataDescriptor {
    pub const SIGNATURE: &'static [u8] = b"PK\x07\x08";
    pub const SIZE: usize = 16;
    pub const SIZE_ZIP64: usize = 24;

    pub fn is_zip64(&self) -> bool {
        self.compressed_size > ZIP32_VALUE_LIMIT || self.uncompressed_size > ZIP32_VALUE_LIMIT
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let zip64 = self.is_zip64();
        let mut buf = Vec::with_capacity(if zip64 { Self::SIZE_ZIP64 } else { Self::SIZE });
        buf.extend_from_slice(Self::SIGNATURE);
        put_u32(&mut buf, self.crc32);
        if zip64 {
            put_u64(&mut buf, self.compressed_size);
            put_u64(&mut buf, self.uncompressed_size);
        } else {
            put_u32(&mut buf, self.compressed_size as u32);
            put_u32(&mut buf, self.uncompressed_size as u32);
        }
        buf
    }
}

/// Central Directory File Header (CDFH) - 46 bytes plus name and extra field
pub struct CentralDirectoryFileHeader<'a> {
    pub record: &'a EntryRecord,
}

impl<'a> CentralDirectoryFileHeader<'a> {
    pub const SIGNATURE: &'static [u8] = b"PK\x01\x02";
    pub const SIZE: usize = 46;

    /// Serialize the record with name and, when needed, a ZIP64 extra field.
    ///
    /// The extra field carries exactly the overflowed values (uncompressed
    /// size, compressed size, offset, in that order per 4.5.3); each
    /// corresponding 32-bit slot holds the sentinel.
    pub fn to_bytes(&self) -> Vec<u8> {
        let record = self.record;
        let extra = Zip64ExtraField::for_record(record);
        let version_needed = if record.needs_zip64() {
            VERSION_ZIP64
        } else {
            VERSION_DEFAULT
        };

        let mut buf = Vec::with_capacity(Self::SIZE + record.name.len() + extra.size());
        buf.extend_from_slice(Self::SIGNATURE);
        put_u16(&mut buf, VERSION_MADE_BY);
        put_u16(&mut buf, version_needed);
        put_u16(&mut buf, record.flags);
        put_u16(&mut buf, record.method.as_u16());
        put_u16(&mut buf, DOS_TIME);
        put_u16(&mut buf, DOS_DATE);
        put_u32(&mut buf, record.crc32);
        put_u32(&mut buf, field_or_sentinel(record.compressed_size));
        put_u32(&mut buf, field_or_sentinel(record.uncompressed_size));
        // Name length is validated when the local header is built.
        put_u16(&mut buf, record.name.len() as u16);
        put_u16(&mut buf, extra.size() as u16);
        put_u16(&mut buf, 0); // file comment length
        put_u16(&mut buf, 0); // disk number start
        put_u16(&mut buf, 0); // internal file attributes
        put_u32(&mut buf, 0); // external file attributes
        put_u32(&mut buf, field_or_sentinel(record.offset));
        buf.extend_from_slice(&record.name);
        extra.write_to(&mut buf);
        buf
    }
}

fn field_or_sentinel(value: u64) -> u32 {
    if value > ZIP32_VALUE_LIMIT {
        ZIP32_SENTINEL
    } else {
        value as u32
    }
}

/// ZIP64 extended information extra field (header ID 0x0001)
///
/// Holds only the fields whose 32-bit slots overflowed; absent fields stay
/// in the fixed header.
pub struct Zip64ExtraField {
    pub uncompressed_size: Option<u64>,
    pub compressed_size: Option<u64>,
    pub offset: Option<u64>,
}

impl Zip64ExtraField {
    pub const HEADER_ID: u16 = 0x0001;

    pub fn for_record(record: &EntryRecord) -> Self {
        let keep = |value: u64| (value > ZIP32_VALUE_LIMIT).then_some(value);
        Self {
            uncompressed_size: keep(record.uncompressed_size),
            compressed_size: keep(record.compressed_size),
            offset: keep(record.offset),
        }
    }

    /// Total serialized size, zero when no field overflowed.
    pub fn size(&self) -> usize {
        let fields = [self.uncompressed_size, self.compressed_size, self.offset]
            .iter()
            .flatten()
            .count();
        if fields == 0 {
            0
        } else {
            4 + fields * 8
        }
    }

    pub fn write_to(&self, buf: &mut Vec<u8>) {
        let size = self.size();
        if size == 0 {
            return;
        }
        put_u16(buf, Self::HEADER_ID);
        put_u16(buf, (size - 4) as u16);
        for value in [self.uncompressed_size, self.compressed_size, self.offset]
            .iter()
            .flatten()
        {
            put_u64(buf, *value);
        }
    }
}

/// ZIP64 End of Central Directory record - 56 bytes
pub struct Zip64EndOfCentralDirectory {
    pub entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x06";
    pub const SIZE: usize = 56;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(Self::SIGNATURE);
        // Size of the remainder of this record (4.3.14.1).
        put_u64(&mut buf, (Self::SIZE - 12) as u64);
        put_u16(&mut buf, VERSION_MADE_BY);
        put_u16(&mut buf, VERSION_ZIP64);
        put_u32(&mut buf, 0); // number of this disk
        put_u32(&mut buf, 0); // disk with the central directory
        put_u64(&mut buf, self.entries);
        put_u64(&mut buf, self.entries);
        put_u64(&mut buf, self.cd_size);
        put_u64(&mut buf, self.cd_offset);
        buf
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
pub struct Zip64EocdLocator {
    /// Archive offset of the ZIP64 end of central directory record
    pub eocd64_offset: u64,
}

impl Zip64EocdLocator {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x07";
    pub const SIZE: usize = 20;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(Self::SIGNATURE);
        put_u32(&mut buf, 0); // disk with the ZIP64 end record
        put_u64(&mut buf, self.eocd64_offset);
        put_u32(&mut buf, 1); // total disks
        buf
    }
}

/// End of Central Directory (EOCD) - 22 bytes
pub struct EndOfCentralDirectory {
    pub entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
    /// When set, the counts and offsets live in the ZIP64 end record and
    /// this record carries sentinels.
    pub zip64: bool,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(Self::SIGNATURE);
        put_u16(&mut buf, 0); // number of this disk
        put_u16(&mut buf, 0); // disk with the central directory
        if self.zip64 {
            put_u16(&mut buf, ZIP16_SENTINEL);
            put_u16(&mut buf, ZIP16_SENTINEL);
            put_u32(&mut buf, ZIP32_SENTINEL);
            put_u32(&mut buf, ZIP32_SENTINEL);
        } else {
            put_u16(&mut buf, self.entries as u16);
            put_u16(&mut buf, self.entries as u16);
            put_u32(&mut buf, self.cd_size as u32);
            put_u32(&mut buf, self.cd_offset as u32);
        }
        put_u16(&mut buf, 0); // comment length
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> EntryRecord {
        EntryRecord {
            name: name.as_bytes().to_vec(),
            crc32: 0x1234_5678,
            compressed_size: 5,
            uncompressed_size: 9,
            method: CompressionMethod::Deflate,
            flags: FLAG_DATA_DESCRIPTOR | FLAG_UTF8,
            offset: 0,
        }
    }

    #[test]
    fn local_header_layout() {
        let header = LocalFileHeader {
            method: CompressionMethod::Stored,
            flags: FLAG_DATA_DESCRIPTOR | FLAG_UTF8,
            name: b"a.txt",
        };
        let bytes = header.to_bytes().unwrap();
        assert_eq!(bytes.len(), LocalFileHeader::SIZE + 5);
        assert_eq!(&bytes[0..4], LocalFileHeader::SIGNATURE);
        // flags at offset 6, method at 8
        assert_eq!(
            &bytes[6..8],
            &(FLAG_DATA_DESCRIPTOR | FLAG_UTF8).to_le_bytes()
        );
        assert_eq!(&bytes[8..10], &0u16.to_le_bytes());
        // crc and sizes all zero
        assert_eq!(&bytes[14..26], &[0u8; 12]);
        // name length then the name itself
        assert_eq!(&bytes[26..28], &5u16.to_le_bytes());
        assert_eq!(&bytes[30..], b"a.txt");
    }

    #[test]
    fn local_header_rejects_oversized_name() {
        let name = vec![b'a'; u16::MAX as usize + 1];
        let header = LocalFileHeader {
            method: CompressionMethod::Stored,
            flags: 0,
            name: &name,
        };
        assert!(matches!(
            header.to_bytes(),
            Err(ZipStreamError::NameTooLong(_))
        ));
    }

    #[test]
    fn data_descriptor_is_16_bytes_for_small_sizes() {
        let descriptor = DataDescriptor {
            crc32: 1,
            compressed_size: 10,
            uncompressed_size: 20,
        };
        let bytes = descriptor.to_bytes();
        assert_eq!(bytes.len(), DataDescriptor::SIZE);
        assert_eq!(&bytes[0..4], DataDescriptor::SIGNATURE);
        assert_eq!(&bytes[8..12], &10u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &20u32.to_le_bytes());
    }

    #[test]
    fn data_descriptor_extends_for_large_sizes() {
        let descriptor = DataDescriptor {
            crc32: 1,
            compressed_size: ZIP32_VALUE_LIMIT + 1,
            uncompressed_size: ZIP32_VALUE_LIMIT + 2,
        };
        let bytes = descriptor.to_bytes();
        assert_eq!(bytes.len(), DataDescriptor::SIZE_ZIP64);
        assert_eq!(&bytes[8..16], &(ZIP32_VALUE_LIMIT + 1).to_le_bytes());
    }

    #[test]
    fn central_header_has_no_extra_field_for_small_entries() {
        let record = record("a.txt");
        let bytes = CentralDirectoryFileHeader { record: &record }.to_bytes();
        assert_eq!(bytes.len(), CentralDirectoryFileHeader::SIZE + 5);
        assert_eq!(&bytes[0..4], CentralDirectoryFileHeader::SIGNATURE);
        // version needed stays at 20 when nothing overflows
        assert_eq!(&bytes[6..8], &VERSION_DEFAULT.to_le_bytes());
        // true sizes in the 32-bit fields
        assert_eq!(&bytes[20..24], &5u32.to_le_bytes());
        assert_eq!(&bytes[24..28], &9u32.to_le_bytes());
        // extra field length is zero
        assert_eq!(&bytes[30..32], &0u16.to_le_bytes());
    }

    #[test]
    fn central_header_carries_zip64_offset_field() {
        let mut record = record("big.bin");
        record.offset = ZIP32_VALUE_LIMIT + 7;
        let bytes = CentralDirectoryFileHeader { record: &record }.to_bytes();
        // 46 + name + (4-byte field header + one 8-byte value)
        assert_eq!(bytes.len(), CentralDirectoryFileHeader::SIZE + 7 + 12);
        assert_eq!(&bytes[6..8], &VERSION_ZIP64.to_le_bytes());
        // 32-bit offset slot holds the sentinel
        assert_eq!(&bytes[42..46], &ZIP32_SENTINEL.to_le_bytes());
        // extra field: id, size 8, then the offset
        let extra = &bytes[CentralDirectoryFileHeader::SIZE + 7..];
        assert_eq!(&extra[0..2], &Zip64ExtraField::HEADER_ID.to_le_bytes());
        assert_eq!(&extra[2..4], &8u16.to_le_bytes());
        assert_eq!(&extra[4..12], &(ZIP32_VALUE_LIMIT + 7).to_le_bytes());
    }

    #[test]
    fn classic_end_record_layout() {
        let eocd = EndOfCentralDirectory {
            entries: 3,
            cd_size: 150,
            cd_offset: 420,
            zip64: false,
        };
        let bytes = eocd.to_bytes();
        assert_eq!(bytes.len(), EndOfCentralDirectory::SIZE);
        assert_eq!(&bytes[0..4], EndOfCentralDirectory::SIGNATURE);
        assert_eq!(&bytes[8..10], &3u16.to_le_bytes());
        assert_eq!(&bytes[10..12], &3u16.to_le_bytes());
        assert_eq!(&bytes[12..16], &150u32.to_le_bytes());
        assert_eq!(&bytes[16..20], &420u32.to_le_bytes());
    }

    #[test]
    fn sentinel_end_record_when_zip64() {
        let eocd = EndOfCentralDirectory {
            entries: 70_000,
            cd_size: 1,
            cd_offset: 1,
            zip64: true,
        };
        let bytes = eocd.to_bytes();
        assert_eq!(&bytes[8..10], &0xFFFFu16.to_le_bytes());
        assert_eq!(&bytes[12..16], &ZIP32_SENTINEL.to_le_bytes());
    }

    #[test]
    fn zip64_end_record_layout() {
        let record = Zip64EndOfCentralDirectory {
            entries: 70_000,
            cd_size: 0x1_0000_0000,
            cd_offset: 0x2_0000_0000,
        };
        let bytes = record.to_bytes();
        assert_eq!(bytes.len(), Zip64EndOfCentralDirectory::SIZE);
        assert_eq!(&bytes[0..4], Zip64EndOfCentralDirectory::SIGNATURE);
        assert_eq!(&bytes[4..12], &44u64.to_le_bytes());
        assert_eq!(&bytes[24..32], &70_000u64.to_le_bytes());
        assert_eq!(&bytes[40..48], &0x1_0000_0000u64.to_le_bytes());
        assert_eq!(&bytes[48..56], &0x2_0000_0000u64.to_le_bytes());
    }

    #[test]
    fn locator_layout() {
        let locator = Zip64EocdLocator {
            eocd64_offset: 0x12345,
        };
        let bytes = locator.to_bytes();
        assert_eq!(bytes.len(), Zip64EocdLocator::SIZE);
        assert_eq!(&bytes[0..4], Zip64EocdLocator::SIGNATURE);
        assert_eq!(&bytes[8..16], &0x12345u64.to_le_bytes());
        assert_eq!(&bytes[16..20], &1u32.to_le_bytes());
    }
}
