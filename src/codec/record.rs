use serde::Serialize;

use super::charmap::{decode_string, encode_name};
use super::{NAME_LEN, PARTY_RECORD_LEN, RECORD_LEN};
use crate::error::CodecError;

// Offsets within the 44-byte party-format core.
const OFF_SPECIES: usize = 0x00;
const OFF_CURRENT_HP: usize = 0x01; // u16, big-endian
const OFF_BOX_LEVEL: usize = 0x03;
const OFF_STATUS: usize = 0x04;
const OFF_TYPE1: usize = 0x05;
const OFF_TYPE2: usize = 0x06;
const OFF_CATCH_RATE: usize = 0x07;
const OFF_MOVES: usize = 0x08; // 4 bytes
const OFF_OT_ID: usize = 0x0C; // u16, big-endian
const OFF_EXP: usize = 0x0E; // 3 bytes, big-endian
const OFF_IVS: usize = 0x1B; // u16
const OFF_PP: usize = 0x1D; // 4 bytes
const OFF_LEVEL: usize = 0x21;
const OFF_MAX_HP: usize = 0x22; // u16, little-endian, as are the four below
const OFF_ATTACK: usize = 0x24;
const OFF_DEFENSE: usize = 0x26;
const OFF_SPEED: usize = 0x28;
const OFF_SPECIAL: usize = 0x2A;

// Name fields trail the core inside the 415-byte record.
const OFF_NICKNAME: usize = PARTY_RECORD_LEN;
const OFF_OT_NAME: usize = PARTY_RECORD_LEN + NAME_LEN;

/// Type IDs the Gen I games actually use. Anything else is carried through
/// unchanged, since a real cartridge will happily trade glitch data.
const KNOWN_TYPES: &[u8] = &[
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x07, 0x08, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1A,
];

/// One Pokémon as the gadget stores and displays it: the 44-byte party-format
/// core, nickname, OT name, and zero padding out to 415 bytes.
#[derive(Clone)]
pub struct PokemonRecord {
    bytes: [u8; RECORD_LEN],
}

/// Display-friendly digest of a record, for the JSON surface.
#[derive(Debug, Clone, Serialize)]
pub struct RecordSummary {
    pub species: u8,
    pub level: u8,
    pub nickname: String,
    pub ot_name: String,
    pub max_hp: u16,
    pub moves: [u8; 4],
}

impl PokemonRecord {
    pub fn from_bytes(bytes: [u8; RECORD_LEN]) -> Self {
        Self { bytes }
    }

    /// Assemble a record from the three party-block regions for one slot.
    pub fn from_party_parts(core: &[u8], ot_name: &[u8], nickname: &[u8]) -> Self {
        debug_assert_eq!(core.len(), PARTY_RECORD_LEN);
        debug_assert_eq!(ot_name.len(), NAME_LEN);
        debug_assert_eq!(nickname.len(), NAME_LEN);
        let mut bytes = [0u8; RECORD_LEN];
        bytes[..PARTY_RECORD_LEN].copy_from_slice(core);
        bytes[OFF_NICKNAME..OFF_NICKNAME + NAME_LEN].copy_from_slice(nickname);
        bytes[OFF_OT_NAME..OFF_OT_NAME + NAME_LEN].copy_from_slice(ot_name);
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; RECORD_LEN] {
        &self.bytes
    }

    pub fn party_core(&self) -> &[u8] {
        &self.bytes[..PARTY_RECORD_LEN]
    }

    pub fn nickname_raw(&self) -> &[u8] {
        &self.bytes[OFF_NICKNAME..OFF_NICKNAME + NAME_LEN]
    }

    pub fn ot_name_raw(&self) -> &[u8] {
        &self.bytes[OFF_OT_NAME..OFF_OT_NAME + NAME_LEN]
    }

    pub fn species(&self) -> u8 {
        self.bytes[OFF_SPECIES]
    }

    pub fn level(&self) -> u8 {
        self.bytes[OFF_LEVEL]
    }

    pub fn current_hp(&self) -> u16 {
        u16::from_be_bytes([self.bytes[OFF_CURRENT_HP], self.bytes[OFF_CURRENT_HP + 1]])
    }

    pub fn max_hp(&self) -> u16 {
        u16::from_le_bytes([self.bytes[OFF_MAX_HP], self.bytes[OFF_MAX_HP + 1]])
    }

    pub fn ot_id(&self) -> u16 {
        u16::from_be_bytes([self.bytes[OFF_OT_ID], self.bytes[OFF_OT_ID + 1]])
    }

    pub fn moves(&self) -> [u8; 4] {
        [
            self.bytes[OFF_MOVES],
            self.bytes[OFF_MOVES + 1],
            self.bytes[OFF_MOVES + 2],
            self.bytes[OFF_MOVES + 3],
        ]
    }

    pub fn nickname(&self) -> String {
        decode_string(self.nickname_raw())
    }

    pub fn ot_name(&self) -> String {
        decode_string(self.ot_name_raw())
    }

    pub fn summary(&self) -> RecordSummary {
        RecordSummary {
            species: self.species(),
            level: self.level(),
            nickname: self.nickname(),
            ot_name: self.ot_name(),
            max_hp: self.max_hp(),
            moves: self.moves(),
        }
    }

    /// Structural sanity check applied at the storage boundary.
    /// Unknown type IDs are logged and kept (passthrough policy).
    pub fn validate(&self) -> Result<(), CodecError> {
        if self.species() == 0 {
            return Err(CodecError::SpeciesZero);
        }
        let level = self.level();
        if !(1..=100).contains(&level) {
            return Err(CodecError::LevelOutOfRange(level));
        }
        for ty in [self.bytes[OFF_TYPE1], self.bytes[OFF_TYPE2]] {
            if !KNOWN_TYPES.contains(&ty) {
                tracing::warn!(type_id = ty, "unknown type id, keeping as-is");
            }
        }
        Ok(())
    }

    /// The built-in record the gadget offers before anything has been traded
    /// in: a level 10 Bulbasaur.
    pub fn starter() -> Self {
        let mut bytes = [0u8; RECORD_LEN];
        bytes[OFF_SPECIES] = 0x99; // Bulbasaur internal index
        bytes[OFF_CURRENT_HP] = 0x00;
        bytes[OFF_CURRENT_HP + 1] = 28;
        bytes[OFF_BOX_LEVEL] = 10;
        bytes[OFF_STATUS] = 0x00;
        bytes[OFF_TYPE1] = 0x16; // Grass
        bytes[OFF_TYPE2] = 0x03; // Poison
        bytes[OFF_CATCH_RATE] = 45;
        // Tackle, Growl, Leech Seed, Vine Whip
        bytes[OFF_MOVES..OFF_MOVES + 4].copy_from_slice(&[0x21, 0x2D, 0x49, 0x16]);
        bytes[OFF_OT_ID] = 0x12;
        bytes[OFF_OT_ID + 1] = 0x34;
        bytes[OFF_EXP..OFF_EXP + 3].copy_from_slice(&[0x00, 0x03, 0xE8]); // 1000
        bytes[OFF_IVS] = 0xAA;
        bytes[OFF_IVS + 1] = 0xAA;
        bytes[OFF_PP..OFF_PP + 4].copy_from_slice(&[35, 40, 10, 10]);
        bytes[OFF_LEVEL] = 10;
        for (off, stat) in [
            (OFF_MAX_HP, 28u16),
            (OFF_ATTACK, 19),
            (OFF_DEFENSE, 19),
            (OFF_SPEED, 17),
            (OFF_SPECIAL, 21),
        ] {
            bytes[off..off + 2].copy_from_slice(&stat.to_le_bytes());
        }
        let nick = encode_name("BULBASAUR", NAME_LEN);
        bytes[OFF_NICKNAME..OFF_NICKNAME + NAME_LEN].copy_from_slice(&nick);
        let ot = encode_name("TRADER", NAME_LEN);
        bytes[OFF_OT_NAME..OFF_OT_NAME + NAME_LEN].copy_from_slice(&ot);
        Self { bytes }
    }
}

impl std::fmt::Debug for PokemonRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PokemonRecord")
            .field("species", &self.species())
            .field("level", &self.level())
            .field("nickname", &self.nickname())
            .finish()
    }
}

impl PartialEq for PokemonRecord {
    fn eq(&self, other: &Self) -> bool {
        self.bytes[..] == other.bytes[..]
    }
}
