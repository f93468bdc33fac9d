use tracing::warn;

use super::patch::PatchList;
use super::record::PokemonRecord;
use super::{
    MAX_PARTY, NAME_LEN, NAME_TERMINATOR, PARTY_BLOCK_LEN, PARTY_RECORD_LEN, PREAMBLE_BYTE,
    SENTINEL_SUBSTITUTE,
};
use crate::error::CodecError;

// Regions within the 404-byte wire structure.
const OFF_COUNT: usize = 0;
const OFF_SPECIES_LIST: usize = 1;
const OFF_RECORDS: usize = 8;
const OFF_OT_NAMES: usize = 272;
const OFF_NICKNAMES: usize = 338;

/// Highest species index a Gen I cartridge defines. Values above it show up
/// in glitch trades and are carried through untouched.
const MAX_KNOWN_SPECIES: u8 = 0xBE;

/// The 404-byte party structure both sides exchange in the trade-data phase:
/// count, 0xFF-terminated species list, six 44-byte records, six OT names,
/// six nicknames.
#[derive(Clone, PartialEq, Eq)]
pub struct PartyBlock {
    bytes: [u8; PARTY_BLOCK_LEN],
}

impl PartyBlock {
    /// Validate a raw block received from the peer.
    ///
    /// Only structural faults reject: a count outside 1..=6 or a species list
    /// without its 0xFF terminator. Out-of-range species bytes are logged and
    /// kept, because a real cartridge accepts them too.
    pub fn from_bytes(bytes: [u8; PARTY_BLOCK_LEN]) -> Result<Self, CodecError> {
        let count = bytes[OFF_COUNT];
        if count == 0 || count as usize > MAX_PARTY {
            return Err(CodecError::CountOutOfRange(count));
        }
        if bytes[OFF_SPECIES_LIST + count as usize] != 0xFF {
            return Err(CodecError::UnterminatedSpeciesList);
        }
        for slot in 0..count as usize {
            let species = bytes[OFF_SPECIES_LIST + slot];
            if species == 0 || species > MAX_KNOWN_SPECIES {
                warn!(slot, species, "species outside the known set, keeping as-is");
            }
        }
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; PARTY_BLOCK_LEN] {
        &self.bytes
    }

    pub fn count(&self) -> u8 {
        self.bytes[OFF_COUNT]
    }

    pub fn species(&self, slot: u8) -> Option<u8> {
        if slot >= self.count() {
            return None;
        }
        Some(self.bytes[OFF_SPECIES_LIST + slot as usize])
    }

    /// The bytes actually put on the wire: every literal 0xFD replaced by
    /// 0xFE. The patch list records where the substitutions happened.
    pub fn wire_bytes(&self) -> [u8; PARTY_BLOCK_LEN] {
        let mut out = self.bytes;
        for b in out.iter_mut() {
            if *b == PREAMBLE_BYTE {
                *b = SENTINEL_SUBSTITUTE;
            }
        }
        out
    }
}

impl std::fmt::Debug for PartyBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartyBlock")
            .field("count", &self.count())
            .field("species", &self.species(0))
            .finish()
    }
}

/// Build the outgoing wire structures for a single-Pokémon party.
pub fn build_party(rec: &PokemonRecord) -> Result<(PartyBlock, PatchList), CodecError> {
    let mut bytes = [0u8; PARTY_BLOCK_LEN];
    bytes[OFF_COUNT] = 1;
    bytes[OFF_SPECIES_LIST] = rec.species();
    bytes[OFF_SPECIES_LIST + 1] = 0xFF;
    // species list positions 2..7 stay 0x00

    bytes[OFF_RECORDS..OFF_RECORDS + PARTY_RECORD_LEN].copy_from_slice(rec.party_core());
    bytes[OFF_OT_NAMES..OFF_OT_NAMES + NAME_LEN].copy_from_slice(rec.ot_name_raw());
    bytes[OFF_NICKNAMES..OFF_NICKNAMES + NAME_LEN].copy_from_slice(rec.nickname_raw());

    // Unoccupied name slots are terminator fill, not zeroes.
    for slot in 1..MAX_PARTY {
        let ot = OFF_OT_NAMES + slot * NAME_LEN;
        bytes[ot..ot + NAME_LEN].fill(NAME_TERMINATOR);
        let nick = OFF_NICKNAMES + slot * NAME_LEN;
        bytes[nick..nick + NAME_LEN].fill(NAME_TERMINATOR);
    }

    let patch = PatchList::generate(&bytes)?;
    Ok((PartyBlock { bytes }, patch))
}

/// Pull one slot's record back out of a party block.
pub fn extract_record(block: &PartyBlock, slot: u8) -> Result<PokemonRecord, CodecError> {
    if slot >= block.count() {
        return Err(CodecError::SlotOutOfRange {
            slot,
            count: block.count(),
        });
    }
    if block.bytes[OFF_SPECIES_LIST + slot as usize] == 0xFF {
        return Err(CodecError::EmptyPartySlot(slot));
    }
    let s = slot as usize;
    let core = &block.bytes[OFF_RECORDS + s * PARTY_RECORD_LEN..OFF_RECORDS + (s + 1) * PARTY_RECORD_LEN];
    let ot = &block.bytes[OFF_OT_NAMES + s * NAME_LEN..OFF_OT_NAMES + (s + 1) * NAME_LEN];
    let nick = &block.bytes[OFF_NICKNAMES + s * NAME_LEN..OFF_NICKNAMES + (s + 1) * NAME_LEN];
    Ok(PokemonRecord::from_party_parts(core, ot, nick))
}
