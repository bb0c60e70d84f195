//! Frame payloads of the proxy handshake.
//!
//! A deliberately minimal serialiser: strings are a u32 big-endian
//! length plus UTF-8 bytes, u64s are 8 bytes big-endian, bools one
//! byte. Both ends of the proxy speak exactly this; there is no
//! versioning and no schema beyond the two structs below.

use std::time::Duration;

use crate::ProxyError;

/// First frame, client → proxy: where to connect and how long the
/// proxy may spend trying. Zero means no limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dial {
    pub address: String,
    pub timeout_ns: u64,
}

impl Dial {
    pub fn new(address: &str, timeout: Duration) -> Self {
        Self {
            address: address.to_string(),
            timeout_ns: timeout.as_nanos() as u64,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ns > 0).then(|| Duration::from_nanos(self.timeout_ns))
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.address.len() + 12);
        put_string(&mut out, &self.address);
        out.extend_from_slice(&self.timeout_ns.to_be_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProxyError> {
        let mut cursor = Cursor::new(bytes);
        let address = cursor.string()?;
        let timeout_ns = cursor.u64()?;
        cursor.finish()?;
        Ok(Self {
            address,
            timeout_ns,
        })
    }
}

/// First frame, proxy → client: the verdict on the TCP dial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub success: bool,
    pub error: String,
}

impl Status {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: String::new(),
        }
    }

    pub fn failed(error: &str) -> Self {
        Self {
            success: false,
            error: error.to_string(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.error.len() + 5);
        out.push(self.success as u8);
        put_string(&mut out, &self.error);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProxyError> {
        let mut cursor = Cursor::new(bytes);
        let success = cursor.u8()? != 0;
        let error = cursor.string()?;
        cursor.finish()?;
        Ok(Self { success, error })
    }
}

fn put_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u32).to_be_bytes());
    out.extend_from_slice(s.as_bytes());
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProxyError> {
        if self.bytes.len() - self.pos < n {
            return Err(ProxyError::Wire("frame truncated"));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, ProxyError> {
        Ok(self.take(1)?[0])
    }

    fn u64(&mut self) -> Result<u64, ProxyError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(u64::from_be_bytes(raw))
    }

    fn string(&mut self) -> Result<String, ProxyError> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        let len = u32::from_be_bytes(raw) as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ProxyError::Wire("string not UTF-8"))
    }

    fn finish(&self) -> Result<(), ProxyError> {
        if self.pos != self.bytes.len() {
            return Err(ProxyError::Wire("trailing bytes in frame"));
        }
        Ok(())
    }
}
