//! Persistent Pokémon slots.
//!
//! Each slot is one fixed-format file: a 16-byte little-endian header
//! `{ magic, data_size, checksum, timestamp }` followed by the 415-byte
//! record. Magic and checksum gate every load, so a torn write surfaces as
//! `Corrupt` rather than a garbled Pokémon.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::codec::{PokemonRecord, RecordSummary, RECORD_LEN};
use crate::error::StorageError;

pub const STORAGE_MAGIC: u32 = 0x504B_4D4E; // "PKMN"
const HEADER_LEN: usize = 16;
const SLOT_FILE_LEN: usize = HEADER_LEN + RECORD_LEN;

pub struct SlotStore {
    dir: PathBuf,
    slot_count: u8,
}

/// One row of the slot listing: empty slots stay listed so the display
/// surface can show all of them.
#[derive(Debug, Clone, Serialize)]
pub struct SlotEntry {
    pub slot: u8,
    pub occupied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<RecordSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_at: Option<i64>,
}

impl SlotStore {
    pub fn open(dir: impl AsRef<Path>, slot_count: u8) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, slot_count })
    }

    pub fn slot_count(&self) -> u8 {
        self.slot_count
    }

    fn slot_path(&self, slot: u8) -> PathBuf {
        self.dir.join(format!("slot_{slot}.pkm"))
    }

    fn check_slot(&self, slot: u8) -> Result<(), StorageError> {
        if slot >= self.slot_count {
            return Err(StorageError::InvalidSlot(slot));
        }
        Ok(())
    }

    pub fn save(&self, slot: u8, record: &PokemonRecord) -> Result<(), StorageError> {
        self.check_slot(slot)?;
        let data = record.as_bytes();
        let mut file = Vec::with_capacity(SLOT_FILE_LEN);
        file.extend_from_slice(&STORAGE_MAGIC.to_le_bytes());
        file.extend_from_slice(&(RECORD_LEN as u32).to_le_bytes());
        file.extend_from_slice(&checksum(data).to_le_bytes());
        let stamp = chrono::Utc::now().timestamp() as u32;
        file.extend_from_slice(&stamp.to_le_bytes());
        file.extend_from_slice(data);
        std::fs::write(self.slot_path(slot), file)?;
        info!(
            slot,
            species = record.species(),
            level = record.level(),
            "saved record"
        );
        Ok(())
    }

    pub fn load(&self, slot: u8) -> Result<PokemonRecord, StorageError> {
        Ok(self.read_slot(slot)?.0)
    }

    fn read_slot(&self, slot: u8) -> Result<(PokemonRecord, u32), StorageError> {
        self.check_slot(slot)?;
        let path = self.slot_path(slot);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::EmptySlot(slot))
            }
            Err(e) => return Err(e.into()),
        };
        if raw.len() != SLOT_FILE_LEN {
            return Err(StorageError::Corrupt {
                slot,
                detail: format!("file is {} bytes, expected {SLOT_FILE_LEN}", raw.len()),
            });
        }
        let magic = u32::from_le_bytes(raw[0..4].try_into().unwrap());
        if magic != STORAGE_MAGIC {
            return Err(StorageError::Corrupt {
                slot,
                detail: format!("bad magic {magic:#010x}"),
            });
        }
        let data_size = u32::from_le_bytes(raw[4..8].try_into().unwrap()) as usize;
        if data_size > RECORD_LEN {
            return Err(StorageError::Corrupt {
                slot,
                detail: format!("data_size {data_size} exceeds record size"),
            });
        }
        let stored_checksum = u32::from_le_bytes(raw[8..12].try_into().unwrap());
        let stamp = u32::from_le_bytes(raw[12..16].try_into().unwrap());
        let data = &raw[HEADER_LEN..HEADER_LEN + data_size];
        let computed = checksum(data);
        if computed != stored_checksum {
            return Err(StorageError::Corrupt {
                slot,
                detail: format!("checksum {computed:#010x} != stored {stored_checksum:#010x}"),
            });
        }
        let mut bytes = [0u8; RECORD_LEN];
        bytes[..data_size].copy_from_slice(data);
        Ok((PokemonRecord::from_bytes(bytes), stamp))
    }

    pub fn delete(&self, slot: u8) -> Result<(), StorageError> {
        self.check_slot(slot)?;
        let path = self.slot_path(slot);
        if path.exists() {
            std::fs::remove_file(path)?;
            info!(slot, "deleted record");
        }
        Ok(())
    }

    /// Wipe every slot.
    pub fn format(&self) -> Result<(), StorageError> {
        for slot in 0..self.slot_count {
            self.delete(slot)?;
        }
        info!("formatted all slots");
        Ok(())
    }

    /// Summary for one slot; `None` when empty. Corrupt slots are logged and
    /// reported as empty so the listing never fails wholesale.
    pub fn slot_info(&self, slot: u8) -> Result<Option<(RecordSummary, i64)>, StorageError> {
        self.check_slot(slot)?;
        match self.read_slot(slot) {
            Ok((record, stamp)) => Ok(Some((record.summary(), stamp as i64))),
            Err(StorageError::EmptySlot(_)) => Ok(None),
            Err(StorageError::Corrupt { slot, detail }) => {
                warn!(slot, %detail, "corrupt slot treated as empty in listing");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub fn list(&self) -> Result<Vec<SlotEntry>, StorageError> {
        (0..self.slot_count)
            .map(|slot| {
                let info = self.slot_info(slot)?;
                Ok(match info {
                    Some((summary, stored_at)) => SlotEntry {
                        slot,
                        occupied: true,
                        summary: Some(summary),
                        stored_at: Some(stored_at),
                    },
                    None => SlotEntry {
                        slot,
                        occupied: false,
                        summary: None,
                        stored_at: None,
                    },
                })
            })
            .collect()
    }
}

fn checksum(data: &[u8]) -> u32 {
    data.iter().fold(0u32, |acc, &b| acc.wrapping_add(b as u32))
}
