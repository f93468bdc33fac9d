pub mod charmap;
pub mod party;
pub mod patch;
pub mod record;

pub use party::{build_party, extract_record, PartyBlock};
pub use patch::PatchList;
pub use record::{PokemonRecord, RecordSummary};

/// Internal record size: 44-byte party core + two 11-byte names + padding.
pub const RECORD_LEN: usize = 415;
/// One Pokémon's slice of the wire party structure.
pub const PARTY_RECORD_LEN: usize = 44;
/// The wire party structure itself.
pub const PARTY_BLOCK_LEN: usize = 404;
/// The companion patch list.
pub const PATCH_LIST_LEN: usize = 196;

pub const MAX_PARTY: usize = 6;
pub const NAME_LEN: usize = 11;
pub const NAME_TERMINATOR: u8 = 0x50;

/// 0xFD frames data blocks on the wire, so a payload byte of the same value
/// is sent as 0xFE and restored via the patch list.
pub const PREAMBLE_BYTE: u8 = 0xFD;
pub const SENTINEL_SUBSTITUTE: u8 = 0xFE;
