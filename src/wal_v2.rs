//! Intake WAL framing
//!
//! Append-only binary frames, one per published request:
//!
//! ```text
//! offset  size  field
//!      0     2  payload_len   (LE, max 64KB)
//!      2     1  entry_type    Join = 1, Requeue = 2
//!      3     1  version       payload format
//!      4     4  epoch         process generation that wrote the frame
//!      8     8  seq_id        log offset, +1 per frame
//!     16     4  crc32         over the payload only
//!     20     n  payload       bincode MatchRequest
//! ```
//!
//! A frame cut short by a crash reads as end of file. A complete frame whose
//! checksum does not match is `InvalidData`.

use std::io::{self, Read, Write};

pub const WAL_HEADER_SIZE: usize = 20;

/// Current payload format version
pub const PAYLOAD_VERSION: u8 = 1;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalEntryType {
    /// First publish of an admitted request
    Join = 1,
    /// Republish of an unmatched request by the batch pass
    Requeue = 2,
}

impl TryFrom<u8> for WalEntryType {
    type Error = io::Error;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            1 => Ok(Self::Join),
            2 => Ok(Self::Requeue),
            other => Err(invalid(format!("unknown intake entry type {}", other))),
        }
    }
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

#[inline]
pub fn crc32_checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalHeader {
    pub entry_type: WalEntryType,
    pub version: u8,
    pub payload_len: u16,
    pub epoch: u32,
    pub seq_id: u64,
    pub checksum: u32,
}

impl WalHeader {
    fn for_payload(
        entry_type: WalEntryType,
        epoch: u32,
        seq_id: u64,
        payload: &[u8],
    ) -> io::Result<Self> {
        let payload_len = u16::try_from(payload.len()).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("intake payload of {} bytes exceeds frame limit", payload.len()),
            )
        })?;
        Ok(Self {
            entry_type,
            version: PAYLOAD_VERSION,
            payload_len,
            epoch,
            seq_id,
            checksum: crc32_checksum(payload),
        })
    }

    pub fn encode(&self) -> [u8; WAL_HEADER_SIZE] {
        let mut out = [0u8; WAL_HEADER_SIZE];
        out[..2].copy_from_slice(&self.payload_len.to_le_bytes());
        out[2] = self.entry_type as u8;
        out[3] = self.version;
        out[4..8].copy_from_slice(&self.epoch.to_le_bytes());
        out[8..16].copy_from_slice(&self.seq_id.to_le_bytes());
        out[16..].copy_from_slice(&self.checksum.to_le_bytes());
        out
    }

    /// Parse a header, rejecting unknown entry types and versions
    pub fn decode(raw: &[u8; WAL_HEADER_SIZE]) -> io::Result<Self> {
        let (len, rest) = raw.split_at(2);
        let (tags, rest) = rest.split_at(2);
        let (epoch, rest) = rest.split_at(4);
        let (seq, crc) = rest.split_at(8);

        let version = tags[1];
        if version != PAYLOAD_VERSION {
            return Err(invalid(format!("unsupported intake payload version {}", version)));
        }

        let le = |b: &[u8]| {
            let mut wide = [0u8; 8];
            wide[..b.len()].copy_from_slice(b);
            u64::from_le_bytes(wide)
        };
        Ok(Self {
            entry_type: WalEntryType::try_from(tags[0])?,
            version,
            payload_len: le(len) as u16,
            epoch: le(epoch) as u32,
            seq_id: le(seq),
            checksum: le(crc) as u32,
        })
    }

    /// Bytes this frame occupies on disk
    pub fn frame_len(&self) -> u64 {
        (WAL_HEADER_SIZE + self.payload_len as usize) as u64
    }
}

// ============================================================
// WRITER
// ============================================================

pub struct WalWriterV2<W: Write> {
    out: W,
    epoch: u32,
    next_seq: u64,
    frame: Vec<u8>,
}

impl<W: Write> WalWriterV2<W> {
    pub fn new(out: W, epoch: u32, start_seq: u64) -> Self {
        Self {
            out,
            epoch,
            next_seq: start_seq,
            frame: Vec::with_capacity(256),
        }
    }

    /// Append one frame; returns its seq_id
    ///
    /// Header and payload are handed to the underlying writer in a single
    /// `write_all`, so a buffered writer never splits them across flushes.
    pub fn write_entry(&mut self, entry_type: WalEntryType, payload: &[u8]) -> io::Result<u64> {
        let seq_id = self.next_seq;
        let header = WalHeader::for_payload(entry_type, self.epoch, seq_id, payload)?;

        self.frame.clear();
        self.frame.extend_from_slice(&header.encode());
        self.frame.extend_from_slice(payload);
        self.out.write_all(&self.frame)?;

        self.next_seq += 1;
        Ok(seq_id)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }
}

// ============================================================
// READER
// ============================================================

#[derive(Debug)]
pub struct WalFrame {
    pub header: WalHeader,
    pub payload: Vec<u8>,
}

pub struct WalReaderV2<R: Read> {
    input: R,
}

impl<R: Read> WalReaderV2<R> {
    pub fn new(input: R) -> Self {
        Self { input }
    }

    /// Fill `buf` completely; `Ok(false)` if the input ends first
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<bool> {
        match self.input.read_exact(buf) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Next complete frame, or `None` at end of file or at a torn tail
    pub fn read_frame(&mut self) -> io::Result<Option<WalFrame>> {
        let mut raw = [0u8; WAL_HEADER_SIZE];
        if !self.fill(&mut raw)? {
            return Ok(None);
        }
        let header = WalHeader::decode(&raw)?;

        let mut payload = vec![0u8; header.payload_len as usize];
        if !self.fill(&mut payload)? {
            return Ok(None);
        }

        let actual = crc32_checksum(&payload);
        if actual != header.checksum {
            return Err(invalid(format!(
                "intake frame seq_id={} failed crc32 check (stored {:#010x}, computed {:#010x})",
                header.seq_id, header.checksum, actual
            )));
        }
        Ok(Some(WalFrame { header, payload }))
    }
}

impl<R: Read> Iterator for WalReaderV2<R> {
    type Item = io::Result<WalFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_frame().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn written(frames: &[(WalEntryType, &[u8])]) -> Vec<u8> {
        let mut writer = WalWriterV2::new(Vec::new(), 1, 1);
        for (t, p) in frames {
            writer.write_entry(*t, p).unwrap();
        }
        writer.get_ref().clone()
    }

    #[test]
    fn test_header_field_offsets() {
        let header = WalHeader::for_payload(WalEntryType::Requeue, 3, 42, b"payload").unwrap();
        let raw = header.encode();

        assert_eq!(&raw[..2], &7u16.to_le_bytes());
        assert_eq!(raw[2], 2);
        assert_eq!(raw[3], PAYLOAD_VERSION);
        assert_eq!(&raw[4..8], &3u32.to_le_bytes());
        assert_eq!(&raw[8..16], &42u64.to_le_bytes());
        assert_eq!(WalHeader::decode(&raw).unwrap(), header);
        assert_eq!(header.frame_len(), 27);
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let big = vec![0u8; u16::MAX as usize + 1];
        let mut writer = WalWriterV2::new(Vec::new(), 1, 1);
        let err = writer.write_entry(WalEntryType::Join, &big).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        // Nothing written, sequence not consumed
        assert!(writer.get_ref().is_empty());
        assert_eq!(writer.next_seq(), 1);
    }

    #[test]
    fn test_frames_read_back_in_order() {
        let mut writer = WalWriterV2::new(Vec::new(), 4, 10);
        assert_eq!(writer.write_entry(WalEntryType::Join, b"a").unwrap(), 10);
        assert_eq!(writer.write_entry(WalEntryType::Requeue, b"bb").unwrap(), 11);

        let frames: Vec<_> = WalReaderV2::new(Cursor::new(writer.get_ref().clone()))
            .collect::<io::Result<_>>()
            .unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].header.seq_id, 11);
        assert_eq!(frames[1].header.epoch, 4);
        assert_eq!(frames[1].header.entry_type, WalEntryType::Requeue);
        assert_eq!(frames[1].payload, b"bb");
    }

    #[test]
    fn test_torn_tail_reads_as_eof() {
        let mut buffer = written(&[
            (WalEntryType::Join, &b"complete"[..]),
            (WalEntryType::Join, &b"torn entry"[..]),
        ]);
        buffer.truncate(buffer.len() - 3);

        let mut reader = WalReaderV2::new(Cursor::new(buffer));
        assert!(reader.read_frame().unwrap().is_some());
        assert!(reader.read_frame().unwrap().is_none());
    }

    #[test]
    fn test_payload_bit_flip_fails_crc() {
        let mut buffer = written(&[(WalEntryType::Join, &b"test data"[..])]);
        buffer[WAL_HEADER_SIZE] ^= 0xFF;

        let err = WalReaderV2::new(Cursor::new(buffer)).read_frame().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("crc32"));
    }

    #[test]
    fn test_unknown_type_or_version_rejected() {
        let mut buffer = written(&[(WalEntryType::Join, &b"x"[..])]);
        buffer[2] = 9;
        assert!(WalReaderV2::new(Cursor::new(buffer.clone())).read_frame().is_err());

        buffer[2] = WalEntryType::Join as u8;
        buffer[3] = PAYLOAD_VERSION + 1;
        assert!(WalReaderV2::new(Cursor::new(buffer)).read_frame().is_err());
    }
}
