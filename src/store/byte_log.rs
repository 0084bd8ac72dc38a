use std::io;

/// ByteLog is a byte-addressable log. The store decides where bytes go; the log only has to
/// remember them. Writing past the current end zero-fills the gap.
pub trait ByteLog: Send {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<(), io::Error>;

    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>, io::Error>;

    /// Bytes currently held, including zero-filled gaps.
    fn len(&self) -> u64;

    fn truncate(&mut self, len: u64) -> Result<(), io::Error>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Not durable. Good enough for tests and for nodes that resync from the leader on restart.
#[derive(Default)]
pub struct InMemoryByteLog {
    bytes: Vec<u8>,
}

impl InMemoryByteLog {
    pub fn new() -> Self {
        InMemoryByteLog { bytes: Vec::new() }
    }
}

impl ByteLog for InMemoryByteLog {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<(), io::Error> {
        let start = offset as usize;
        let end = start + data.len();
        if self.bytes.len() < end {
            self.bytes.resize(end, 0);
        }
        self.bytes[start..end].copy_from_slice(data);
        Ok(())
    }

    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>, io::Error> {
        let start = offset as usize;
        let end = start.saturating_add(len);
        if end > self.bytes.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("read [{}, {}) past log end {}", start, end, self.bytes.len()),
            ));
        }
        Ok(self.bytes[start..end].to_vec())
    }

    fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn truncate(&mut self, len: u64) -> Result<(), io::Error> {
        self.bytes.truncate(len as usize);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_writes_zero_fill() {
        let mut log = InMemoryByteLog::new();
        assert!(log.is_empty());

        log.write_at(4, &[1, 2]).unwrap();
        assert_eq!(6, log.len());
        assert_eq!(vec![0, 0, 0, 0, 1, 2], log.read_at(0, 6).unwrap());

        log.write_at(0, &[9]).unwrap();
        assert_eq!(vec![9, 0], log.read_at(0, 2).unwrap());
    }

    #[test]
    fn read_past_end_fails() {
        let mut log = InMemoryByteLog::new();
        log.write_at(0, &[1, 2, 3]).unwrap();

        let err = log.read_at(2, 2).unwrap_err();
        assert_eq!(io::ErrorKind::UnexpectedEof, err.kind());

        log.truncate(1).unwrap();
        assert_eq!(1, log.len());
    }
}
