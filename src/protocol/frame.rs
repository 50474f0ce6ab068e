use crate::error::Error;
use crate::protocol::constants::{
    BLOCK_HEADER_SIZE, BLOCK_PAYLOAD_SIZE, BLOCK_PREAMBLE, BLOCK_WIRE_SIZE,
};
use tracing::error;

/// One fixed-size block of a binary file transfer.
///
/// `length` and `checksum` describe the true payload; `payload` is always
/// `BLOCK_PAYLOAD_SIZE` bytes with zero padding after `length`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFrame {
    pub index: u32,
    pub length: u32,
    pub checksum: u32,
    pub payload: Box<[u8; BLOCK_PAYLOAD_SIZE]>,
}

impl ChunkFrame {
    pub fn new(index: u32, data: &[u8]) -> Self {
        debug_assert!(data.len() <= BLOCK_PAYLOAD_SIZE);
        let mut payload = Box::new([0u8; BLOCK_PAYLOAD_SIZE]);
        payload[..data.len()].copy_from_slice(data);
        Self {
            index,
            length: data.len() as u32,
            checksum: crc32fast::hash(data),
            payload,
        }
    }

    /// The unpadded payload bytes
    pub fn data(&self) -> &[u8] {
        &self.payload[..self.length as usize]
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(BLOCK_WIRE_SIZE);
        buf.extend_from_slice(&BLOCK_PREAMBLE);
        buf.extend_from_slice(&self.index.to_be_bytes());
        buf.extend_from_slice(&self.length.to_be_bytes());
        buf.extend_from_slice(&self.checksum.to_be_bytes());
        buf.extend_from_slice(&self.payload[..]);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < BLOCK_WIRE_SIZE {
            error!("Block too short: {} bytes", buf.len());
            return Err(Error::Protocol(format!("block too short: {} bytes", buf.len())));
        }
        if buf[0..4] != BLOCK_PREAMBLE {
            error!("Invalid block preamble: {:02x?}", &buf[0..4]);
            return Err(Error::Protocol("invalid block preamble".into()));
        }

        let index = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let length = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);
        let checksum = u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]);

        if length as usize > BLOCK_PAYLOAD_SIZE {
            return Err(Error::Protocol(format!("block {} claims {} payload bytes", index, length)));
        }

        let mut payload = Box::new([0u8; BLOCK_PAYLOAD_SIZE]);
        payload.copy_from_slice(&buf[BLOCK_HEADER_SIZE..BLOCK_WIRE_SIZE]);

        if crc32fast::hash(&payload[..length as usize]) != checksum {
            error!("Checksum mismatch on block {}: expected={:x}", index, checksum);
            return Err(Error::Protocol(format!("checksum mismatch on block {}", index)));
        }

        Ok(Self { index, length, checksum, payload })
    }
}

/// Blocks of a buffer in ascending index order. Cloning restarts the sequence.
#[derive(Debug, Clone)]
pub struct Frames<'a> {
    chunks: std::iter::Enumerate<std::slice::Chunks<'a, u8>>,
}

pub fn frames(buf: &[u8]) -> Frames<'_> {
    Frames {
        chunks: buf.chunks(BLOCK_PAYLOAD_SIZE).enumerate(),
    }
}

impl Iterator for Frames<'_> {
    type Item = ChunkFrame;

    fn next(&mut self) -> Option<ChunkFrame> {
        self.chunks
            .next()
            .map(|(i, chunk)| ChunkFrame::new(i as u32, chunk))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl ExactSizeIterator for Frames<'_> {}
