use serde::{Deserialize, Serialize};

use crate::endian::ByteOrder;

/// How to read an existing snapshot file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenOptions {
    /// Byte order the file was written in. Known out of band; the file does
    /// not record it.
    pub byte_order: ByteOrder,
    /// Hash every frame body and compare with the header checksum.
    pub verify_checksum: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            byte_order: ByteOrder::Native,
            verify_checksum: true,
        }
    }
}

impl OpenOptions {
    pub fn byte_order(mut self, order: ByteOrder) -> Self {
        self.byte_order = order;
        self
    }

    pub fn verify_checksum(mut self, on: bool) -> Self {
        self.verify_checksum = on;
        self
    }
}

/// How to write a new snapshot file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateOptions {
    /// Byte order of every multi-byte word on disk.
    pub byte_order: ByteOrder,
}

impl CreateOptions {
    pub fn byte_order(mut self, order: ByteOrder) -> Self {
        self.byte_order = order;
        self
    }
}
