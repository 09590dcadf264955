//! Transfer records as produced by an upstream log reader

/// Kind of a transfer record
///
/// Only `Read` and `Write` describe bus traffic. The remaining kinds are
/// error records the capture hardware emitted in place of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferType {
    Read,
    Write,
    /// Capture buffer overflowed; traffic was lost
    Overflow,
    /// Reader lost and regained framing
    Sync,
    /// Record failed its checksum
    Checksum,
    /// Record did not follow the bus protocol
    Protocol,
}

impl TransferType {
    /// True for the error kinds (anything but a read or a write)
    pub fn is_error(&self) -> bool {
        !matches!(self, TransferType::Read | TransferType::Write)
    }
}

impl std::fmt::Display for TransferType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferType::Read => write!(f, "read"),
            TransferType::Write => write!(f, "write"),
            TransferType::Overflow => write!(f, "overflow"),
            TransferType::Sync => write!(f, "sync"),
            TransferType::Checksum => write!(f, "checksum"),
            TransferType::Protocol => write!(f, "protocol"),
        }
    }
}

/// One memory-bus transfer decoded from the trace log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    /// Target address of the first byte
    pub address: u64,
    /// Number of bytes moved on the bus
    pub byte_count: u32,
    /// Clock ticks the transfer occupied
    pub duration: u64,
    pub kind: TransferType,
    /// Payload; present for writes, may be empty otherwise
    pub data: Vec<u8>,
    /// Byte offset of this record in the log
    pub offset: u64,
    /// Number of log bytes the record occupies
    pub record_len: u32,
}

impl Transfer {
    /// A read of `byte_count` bytes at `address`
    pub fn read(address: u64, byte_count: u32, duration: u64) -> Self {
        Self {
            address,
            byte_count,
            duration,
            kind: TransferType::Read,
            data: Vec::new(),
            offset: 0,
            record_len: 0,
        }
    }

    /// A write of `data` at `address`
    pub fn write(address: u64, data: impl Into<Vec<u8>>, duration: u64) -> Self {
        let data = data.into();
        Self {
            address,
            byte_count: data.len() as u32,
            duration,
            kind: TransferType::Write,
            data,
            offset: 0,
            record_len: 0,
        }
    }

    /// An error record of the given kind
    pub fn error(kind: TransferType, duration: u64) -> Self {
        Self {
            address: 0,
            byte_count: 0,
            duration,
            kind,
            data: Vec::new(),
            offset: 0,
            record_len: 0,
        }
    }

    /// Builder method: place the record in the log
    pub fn at(mut self, offset: u64, record_len: u32) -> Self {
        self.offset = offset;
        self.record_len = record_len;
        self
    }

    /// Offset of the record following this one
    pub fn end_offset(&self) -> u64 {
        self.offset + self.record_len as u64
    }

    /// Last address touched (exclusive)
    pub fn end_address(&self) -> u64 {
        self.address.saturating_add(self.byte_count as u64)
    }

    /// Number of zero bytes among the payload bytes in `[start, end)`
    ///
    /// Addresses without a payload byte are not counted as zero.
    pub fn zero_bytes_in(&self, start: u64, end: u64) -> u64 {
        let from = start.saturating_sub(self.address) as usize;
        let to = end.saturating_sub(self.address) as usize;
        self.data
            .get(from.min(self.data.len())..to.min(self.data.len()))
            .map(|bytes| bytes.iter().filter(|&&b| b == 0).count() as u64)
            .unwrap_or(0)
    }
}
