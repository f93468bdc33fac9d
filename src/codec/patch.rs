use tracing::warn;

use super::{PARTY_BLOCK_LEN, PATCH_LIST_LEN, PREAMBLE_BYTE};
use crate::error::{CodecError, ProtocolError};

const LEADER_LEN: usize = 3;
const SECTION_TERMINATOR: u8 = 0xFF;
/// Highest 1-based block offset encodable in section 1. Section 2 entries
/// carry `offset - 0xFB` for offsets 0xFC..=0x1FB.
const SECTION_ONE_SPAN: usize = 0xFB;

/// The 196-byte companion structure that re-inserts literal 0xFD bytes the
/// wire encoding replaced with 0xFE: a 3-byte zero leader, section-1 entries,
/// 0xFF, section-2 entries, 0xFF, zero padding.
#[derive(Clone, PartialEq, Eq)]
pub struct PatchList {
    bytes: [u8; PATCH_LIST_LEN],
}

impl PatchList {
    /// Scan a party block for literal 0xFD bytes and record their offsets.
    pub fn generate(block: &[u8; PARTY_BLOCK_LEN]) -> Result<Self, CodecError> {
        let mut section_one = Vec::new();
        let mut section_two = Vec::new();
        for (idx, &b) in block.iter().enumerate() {
            if b != PREAMBLE_BYTE {
                continue;
            }
            let offset = idx + 1; // entries are 1-based
            if offset <= SECTION_ONE_SPAN {
                section_one.push(offset as u8);
            } else {
                section_two.push((offset - SECTION_ONE_SPAN) as u8);
            }
        }

        let needed = LEADER_LEN + section_one.len() + 1 + section_two.len() + 1;
        if needed > PATCH_LIST_LEN {
            return Err(CodecError::PatchOverflow(section_one.len() + section_two.len()));
        }

        let mut bytes = [0u8; PATCH_LIST_LEN];
        let mut cursor = LEADER_LEN;
        for entry in &section_one {
            bytes[cursor] = *entry;
            cursor += 1;
        }
        bytes[cursor] = SECTION_TERMINATOR;
        cursor += 1;
        for entry in &section_two {
            bytes[cursor] = *entry;
            cursor += 1;
        }
        bytes[cursor] = SECTION_TERMINATOR;
        Ok(Self { bytes })
    }

    /// Wrap the raw 196 bytes received from the peer.
    pub fn from_wire(bytes: [u8; PATCH_LIST_LEN]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; PATCH_LIST_LEN] {
        &self.bytes
    }

    /// Restore 0xFD at every offset this list names.
    ///
    /// 0x00 entries are skipped so trailing padding can never patch anything;
    /// an entry mapping outside the block is fatal, as is a list whose first
    /// section never terminates.
    pub fn apply(&self, block: &mut [u8; PARTY_BLOCK_LEN]) -> Result<(), ProtocolError> {
        let mut section = 1u8;
        for &entry in &self.bytes[LEADER_LEN..] {
            match entry {
                SECTION_TERMINATOR => {
                    section += 1;
                    if section > 2 {
                        return Ok(());
                    }
                }
                0x00 => {}
                n => {
                    let offset = if section == 1 {
                        n as usize - 1
                    } else {
                        SECTION_ONE_SPAN + n as usize - 1
                    };
                    if offset >= PARTY_BLOCK_LEN {
                        return Err(ProtocolError::PatchOffsetOutOfRange(offset));
                    }
                    block[offset] = PREAMBLE_BYTE;
                }
            }
        }
        if section == 1 {
            return Err(ProtocolError::UnterminatedPatchList);
        }
        // Section 2 ran into the padding without its terminator; every real
        // ROM sends it, but the entries we did get are complete.
        warn!("patch list section 2 not terminated");
        Ok(())
    }

    /// 1-based offsets named by the list, in wire order. Test hook.
    #[cfg(test)]
    fn offsets(&self) -> Vec<usize> {
        let mut out = Vec::new();
        let mut section = 1u8;
        for &entry in &self.bytes[LEADER_LEN..] {
            match entry {
                SECTION_TERMINATOR => {
                    section += 1;
                    if section > 2 {
                        break;
                    }
                }
                0x00 => {}
                n => out.push(if section == 1 {
                    n as usize
                } else {
                    SECTION_ONE_SPAN + n as usize
                }),
            }
        }
        out
    }
}

impl std::fmt::Debug for PatchList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PatchList({} entries)", self.offsets_len())
    }
}

impl PatchList {
    fn offsets_len(&self) -> usize {
        self.bytes[LEADER_LEN..]
            .iter()
            .take_while(|&&b| b != SECTION_TERMINATOR)
            .filter(|&&b| b != 0x00)
            .count()
    }
}
