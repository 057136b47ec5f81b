//! Per-node info wire frame (§6): a fixed 16-bit magic plus a 16-bit
//! `alloc_cpus`, the one piece of on-wire format this crate owns -- the
//! surrounding RPC layer is responsible for everything else (§1
//! "RPC pack/unpack" is out of scope).

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::{Error, Result};

/// Magic value stamped on every frame this crate packs.
pub const NODEINFO_MAGIC: u16 = 0xDEAD;

/// Version tag for the wire frame layout; bump on breaking changes.
pub const WIRE_VERSION: u16 = 1;

/// Per-node `alloc_cpus` snapshot (§6 `nodeinfo_set_all`), as published
/// over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfoFrame {
    magic: u16,
    version: u16,
    pub alloc_cpus: u16,
}

impl NodeInfoFrame {
    pub fn pack(alloc_cpus: u16) -> Self {
        Self { magic: NODEINFO_MAGIC, version: WIRE_VERSION, alloc_cpus }
    }

    /// Validate the magic before trusting `alloc_cpus`. A mismatch is a
    /// logged error, not a panic (§6 "Magic mismatch on free is a logged
    /// error").
    pub fn unpack(self) -> Result<u16> {
        if self.magic != NODEINFO_MAGIC {
            error!(magic = self.magic, expected = NODEINFO_MAGIC, "nodeinfo frame magic mismatch");
            return Err(Error::Invariant(format!("nodeinfo magic mismatch: got {:#06x}, want {:#06x}", self.magic, NODEINFO_MAGIC)));
        }
        Ok(self.alloc_cpus)
    }
}
