//! Log frame encoding.

use crate::error::{XdbError, XdbResult};
use crate::types::{RowId, StoredRecord};

/// What a frame does to its row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// The full image of a row. A later image of the same row supersedes it.
    Image,
    /// The row was hard-deleted.
    Erase,
}

impl FrameKind {
    /// Returns the on-disk tag.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Image => 1,
            Self::Erase => 2,
        }
    }

    /// Parses an on-disk tag.
    ///
    /// # Errors
    ///
    /// Returns a corruption error for an unknown tag.
    pub fn from_byte(b: u8) -> XdbResult<Self> {
        match b {
            1 => Ok(Self::Image),
            2 => Ok(Self::Erase),
            other => Err(XdbError::corruption(format!("unknown frame kind {other}"))),
        }
    }
}

/// One entry of the record log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// What the frame does.
    pub kind: FrameKind,
    /// The row it applies to.
    pub row: RowId,
    /// CBOR row image for `Image`, empty for `Erase`.
    pub body: Vec<u8>,
}

impl Frame {
    /// Header size: length (4) + kind (1) + row (8) = 13
    pub const HEADER_SIZE: usize = 13;
    /// CRC size.
    pub const CRC_SIZE: usize = 4;
    /// Smallest possible frame.
    pub const MIN_SIZE: usize = Self::HEADER_SIZE + Self::CRC_SIZE;

    /// Builds the image frame of `stored`.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the row does not serialize.
    pub fn image(stored: &StoredRecord) -> XdbResult<Self> {
        let mut body = Vec::new();
        ciborium::ser::into_writer(stored, &mut body)
            .map_err(|e| XdbError::codec(format!("encode row {}: {e}", stored.row)))?;
        Ok(Self {
            kind: FrameKind::Image,
            row: stored.row,
            body,
        })
    }

    /// Builds the erase frame of `row`.
    #[must_use]
    pub fn erase(row: RowId) -> Self {
        Self {
            kind: FrameKind::Erase,
            row,
            body: Vec::new(),
        }
    }

    /// Decodes the row image carried by an `Image` frame.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the body is not a row image, or a corruption
    /// error if the image names a different row than the frame.
    pub fn stored_record(&self) -> XdbResult<StoredRecord> {
        let stored: StoredRecord = ciborium::de::from_reader(self.body.as_slice())
            .map_err(|e| XdbError::codec(format!("decode row {}: {e}", self.row)))?;
        if stored.row != self.row {
            return Err(XdbError::corruption(format!(
                "frame for {} carries image of {}",
                self.row, stored.row
            )));
        }
        Ok(stored)
    }

    /// Returns the encoded size of this frame.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        Self::MIN_SIZE + self.body.len()
    }

    /// Encodes the frame.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let frame_len = self.encoded_len();
        let mut buf = Vec::with_capacity(frame_len);

        // Frame length (total including this field)
        buf.extend_from_slice(&(frame_len as u32).to_le_bytes());
        buf.push(self.kind.as_byte());
        buf.extend_from_slice(&self.row.as_u64().to_le_bytes());
        buf.extend_from_slice(&self.body);

        let crc = compute_crc32(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Reads the length prefix of a frame.
    #[must_use]
    pub fn peek_len(prefix: [u8; 4]) -> usize {
        u32::from_le_bytes(prefix) as usize
    }

    /// Decodes one complete frame.
    ///
    /// # Errors
    ///
    /// Returns `ChecksumMismatch` if the CRC does not match, or a corruption
    /// error if the frame is malformed.
    pub fn decode(data: &[u8]) -> XdbResult<Self> {
        if data.len() < Self::MIN_SIZE {
            return Err(XdbError::corruption("frame too short"));
        }
        let frame_len = Self::peek_len([data[0], data[1], data[2], data[3]]);
        if frame_len < Self::MIN_SIZE || data.len() < frame_len {
            return Err(XdbError::corruption(format!(
                "frame length {frame_len} does not fit {} bytes",
                data.len()
            )));
        }

        let crc_at = frame_len - Self::CRC_SIZE;
        let stored_crc = u32::from_le_bytes([
            data[crc_at],
            data[crc_at + 1],
            data[crc_at + 2],
            data[crc_at + 3],
        ]);
        let computed_crc = compute_crc32(&data[..crc_at]);
        if stored_crc != computed_crc {
            return Err(XdbError::ChecksumMismatch {
                expected: stored_crc,
                actual: computed_crc,
            });
        }

        let kind = FrameKind::from_byte(data[4])?;
        let mut row = [0u8; 8];
        row.copy_from_slice(&data[5..Self::HEADER_SIZE]);
        let body = data[Self::HEADER_SIZE..crc_at].to_vec();

        Ok(Self {
            kind,
            row: RowId::new(u64::from_le_bytes(row)),
            body,
        })
    }
}

/// Computes the CRC32 (IEEE) checksum of `data`.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}
