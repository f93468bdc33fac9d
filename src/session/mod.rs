//! The session controller: wires storage, codec, link, and engine together
//! for one trade, then reports how it went.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::codec::{build_party, extract_record, PartyBlock};
use crate::config::{LinkConfig, TradeConfig};
use crate::error::{ExchangeError, SessionError};
use crate::link::{CancelHandle, LinkPort};
use crate::protocol::{Phase, TradeEngine, TradeEvent};
use crate::storage::SlotStore;
use crate::types::{StatusSnapshot, TradeOutcome};

/// Frame deadline while draining the post-trade phase; short so peer-idle
/// detection stays responsive.
const CLEANUP_POLL: Duration = Duration::from_secs(1);

pub struct TradeSession {
    port: LinkPort,
    cancel: CancelHandle,
    store: Arc<Mutex<SlotStore>>,
    status: Arc<RwLock<StatusSnapshot>>,
    link_cfg: LinkConfig,
    trade_cfg: TradeConfig,
}

impl TradeSession {
    pub fn new(
        port: LinkPort,
        cancel: CancelHandle,
        store: Arc<Mutex<SlotStore>>,
        status: Arc<RwLock<StatusSnapshot>>,
        link_cfg: LinkConfig,
        trade_cfg: TradeConfig,
    ) -> Self {
        Self {
            port,
            cancel,
            store,
            status,
            link_cfg,
            trade_cfg,
        }
    }

    /// Run one session to its terminal outcome. Re-entrant: a fresh engine is
    /// built per call, so the next session can start after a short idle.
    pub async fn run(&mut self) -> Result<TradeOutcome, SessionError> {
        self.cancel.reset();

        let record = self.store.lock().load(self.trade_cfg.send_slot)?;
        record.validate()?;
        let (block, patch) = build_party(&record)?;
        let mut engine = TradeEngine::new(&block, &patch, 0);

        info!(
            species = record.species(),
            level = record.level(),
            send_slot = self.trade_cfg.send_slot,
            "session armed, waiting for the master"
        );
        self.port.set_frame_timeout(self.link_cfg.handshake_timeout());

        let mut next_out = engine.initial_reply();
        let mut retries = 0u32;
        let mut cleanup_idle = Duration::ZERO;
        let mut in_stall_mode = false;
        let mut received: Option<PartyBlock> = None;
        let mut received_species: Option<u8> = None;
        let mut last_error: Option<String> = None;

        let outcome = loop {
            match self.port.exchange(next_out).await {
                Ok(inbound) => {
                    retries = 0;
                    cleanup_idle = Duration::ZERO;
                    let step = engine.step(inbound);

                    if engine.phase().in_session_data() && !in_stall_mode {
                        self.port.set_frame_timeout(self.link_cfg.stall_timeout());
                        in_stall_mode = true;
                    }
                    if engine.phase() == Phase::Cleanup {
                        self.port
                            .set_frame_timeout(self.link_cfg.cleanup_idle().min(CLEANUP_POLL));
                    }

                    match step.event {
                        Some(TradeEvent::TradeComplete(b)) => {
                            received_species = b.species(0);
                            received = Some(b);
                        }
                        Some(TradeEvent::TradeCancelled) => {
                            self.port.publish(step.reply);
                            break TradeOutcome::Cancelled;
                        }
                        Some(TradeEvent::TradeFailed(e)) => {
                            self.port.publish(step.reply);
                            last_error = Some(e.to_string());
                            break TradeOutcome::Failed {
                                reason: e.to_string(),
                            };
                        }
                        None => {}
                    }

                    next_out = step.reply;
                    self.publish(&engine, received_species, last_error.clone(), None);
                }

                Err(ExchangeError::Timeout(elapsed)) => {
                    if engine.phase() == Phase::Cleanup {
                        cleanup_idle += elapsed;
                        if cleanup_idle >= self.link_cfg.cleanup_idle() {
                            engine.finish_cleanup();
                            info!("peer clock fell silent, session over");
                            break TradeOutcome::Success;
                        }
                    } else if engine.phase().in_session_data() {
                        error!("clock stalled past the mid-trade budget");
                        last_error = Some("mid-trade clock stall".into());
                        break TradeOutcome::Failed {
                            reason: "mid-trade clock stall".into(),
                        };
                    } else {
                        retries += 1;
                        if retries > self.link_cfg.retry_budget {
                            last_error = Some("no link activity".into());
                            break TradeOutcome::Failed {
                                reason: "no link activity".into(),
                            };
                        }
                    }
                }

                Err(ExchangeError::Desync) => {
                    if engine.phase().in_session_data() {
                        error!("frame desync mid-trade");
                        last_error = Some("frame desync".into());
                        break TradeOutcome::Failed {
                            reason: "frame desync".into(),
                        };
                    }
                    warn!("frame desync before trade data, retrying");
                    retries += 1;
                    if retries > self.link_cfg.retry_budget {
                        last_error = Some("persistent frame desync".into());
                        break TradeOutcome::Failed {
                            reason: "persistent frame desync".into(),
                        };
                    }
                }

                Err(ExchangeError::Cancelled) => {
                    info!("session cancelled");
                    break TradeOutcome::Cancelled;
                }

                Err(ExchangeError::Closed) => {
                    last_error = Some("wire endpoint closed".into());
                    break TradeOutcome::Failed {
                        reason: "wire endpoint closed".into(),
                    };
                }
            }
        };

        // Flash only after the link is idle, and never on a partial session.
        if matches!(outcome, TradeOutcome::Success) {
            if let Some(block) = &received {
                match extract_record(block, 0) {
                    Ok(rec) => {
                        if let Err(e) = rec.validate() {
                            warn!("received record fails validation ({e}), keeping it anyway");
                        }
                        if let Err(e) = self.store.lock().save(self.trade_cfg.receive_slot, &rec) {
                            // the peer already has our Pokémon; nothing to unwind
                            error!("trade finished but save failed: {e}");
                            last_error = Some(e.to_string());
                        } else {
                            info!(
                                receive_slot = self.trade_cfg.receive_slot,
                                species = rec.species(),
                                "received record banked"
                            );
                        }
                    }
                    Err(e) => {
                        error!("could not extract received record: {e}");
                        last_error = Some(e.to_string());
                    }
                }
            }
        }

        self.publish(&engine, received_species, last_error, Some(outcome.clone()));
        Ok(outcome)
    }

    fn publish(
        &self,
        engine: &TradeEngine,
        received_species: Option<u8>,
        last_error: Option<String>,
        outcome: Option<TradeOutcome>,
    ) {
        *self.status.write() = StatusSnapshot {
            phase: engine.phase().name(),
            bytes_exchanged_in_phase: engine.bytes_in_phase(),
            received_species,
            last_error,
            outcome,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{PatchList, PokemonRecord};
    use crate::link::link_pair;
    use crate::protocol::{
        BLANK, CONNECTED, LEAVE_TABLE, MASTER, PATCH_HEADER_LEN, PREAMBLE_BYTE, PREAMBLE_LEN,
        RANDOM_LEN, SEL_NUM_MASK, TRADE_ACCEPT, TRADE_CENTER,
    };
    use tempfile::TempDir;

    fn test_link_cfg() -> LinkConfig {
        LinkConfig {
            bridge_addr: String::new(),
            handshake_timeout_ms: 200,
            stall_timeout_secs: 2,
            cleanup_idle_secs: 0,
            retry_budget: 2,
        }
    }

    fn test_session(
        port: LinkPort,
        cancel: CancelHandle,
    ) -> (TempDir, Arc<Mutex<SlotStore>>, Arc<RwLock<StatusSnapshot>>, TradeSession) {
        let dir = TempDir::new().unwrap();
        let store = SlotStore::open(dir.path(), 6).unwrap();
        store.save(0, &PokemonRecord::starter()).unwrap();
        let store = Arc::new(Mutex::new(store));
        let status = Arc::new(RwLock::new(StatusSnapshot::idle()));
        let session = TradeSession::new(
            port,
            cancel,
            Arc::clone(&store),
            Arc::clone(&status),
            test_link_cfg(),
            TradeConfig {
                send_slot: 0,
                receive_slot: 1,
            },
        );
        (dir, store, status, session)
    }

    fn peer_party() -> (PartyBlock, PatchList) {
        let mut bytes = *crate::codec::build_party(&PokemonRecord::starter())
            .unwrap()
            .0
            .as_bytes();
        bytes[1] = 0xB0;
        bytes[8] = 0xB0;
        let block = PartyBlock::from_bytes(bytes).unwrap();
        let patch = PatchList::generate(block.as_bytes()).unwrap();
        (block, patch)
    }

    fn master_script(peer: &PartyBlock, patch: &PatchList) -> Vec<u8> {
        let mut bytes = vec![
            MASTER,
            CONNECTED,
            TRADE_CENTER,
            TRADE_CENTER,
            TRADE_CENTER,
            BLANK,
        ];
        bytes.extend(std::iter::repeat(PREAMBLE_BYTE).take(PREAMBLE_LEN));
        bytes.extend(std::iter::repeat(0x33u8).take(RANDOM_LEN));
        bytes.extend_from_slice(&peer.wire_bytes());
        bytes.extend(std::iter::repeat(PREAMBLE_BYTE).take(PATCH_HEADER_LEN as usize));
        bytes.extend_from_slice(patch.as_bytes());
        bytes.extend_from_slice(&[BLANK, SEL_NUM_MASK, BLANK, TRADE_ACCEPT, BLANK]);
        bytes
    }

    #[tokio::test]
    async fn test_full_session_banks_received_record() {
        let (port, mut wire, cancel) = link_pair(Duration::from_millis(200));
        let (_dir, store, status, mut session) = test_session(port, cancel);

        let (peer, patch) = peer_party();
        let script = master_script(&peer, &patch);
        let master = tokio::spawn(async move {
            let mut replies = Vec::new();
            for b in script {
                match wire.clock_frame(b).await {
                    Some(r) => replies.push(r),
                    None => break,
                }
            }
            replies
        });

        let outcome = session.run().await.unwrap();
        assert_eq!(outcome, TradeOutcome::Success);

        let banked = store.lock().load(1).unwrap();
        assert_eq!(banked.species(), 0xB0);

        let snapshot = status.read().clone();
        assert_eq!(snapshot.outcome, Some(TradeOutcome::Success));
        assert_eq!(snapshot.received_species, Some(0xB0));

        // the master saw our slave announcement first
        let replies = master.await.unwrap();
        assert_eq!(replies[0], 0x02);
    }

    #[tokio::test]
    async fn test_peer_leaving_table_cancels_without_saving() {
        let (port, mut wire, cancel) = link_pair(Duration::from_millis(200));
        let (_dir, store, _status, mut session) = test_session(port, cancel);

        let (peer, patch) = peer_party();
        let mut script = master_script(&peer, &patch);
        script.truncate(script.len() - 4); // stop while the session is pending
        script.push(LEAVE_TABLE);
        script.push(BLANK); // one more frame to clock out the 0x6F answer
        let master = tokio::spawn(async move {
            let mut last = None;
            for b in script {
                last = wire.clock_frame(b).await;
            }
            last
        });

        let outcome = session.run().await.unwrap();
        assert_eq!(outcome, TradeOutcome::Cancelled);
        assert!(store.lock().load(1).is_err());
        // the leave was answered in the engine's very next outbound byte
        assert_eq!(master.await.unwrap(), Some(LEAVE_TABLE));
    }

    #[tokio::test]
    async fn test_mid_block_clock_stall_tolerated() {
        let (port, mut wire, cancel) = link_pair(Duration::from_millis(200));
        let (_dir, store, _status, mut session) = test_session(port, cancel);

        let (peer, patch) = peer_party();
        let script = master_script(&peer, &patch);
        let master = tokio::spawn(async move {
            for (i, b) in script.into_iter().enumerate() {
                // 200 bytes into the party block, the peer's clock goes quiet
                // for longer than the handshake deadline
                if i == 226 {
                    tokio::time::sleep(Duration::from_millis(400)).await;
                }
                if wire.clock_frame(b).await.is_none() {
                    break;
                }
            }
        });

        let outcome = session.run().await.unwrap();
        assert_eq!(outcome, TradeOutcome::Success);
        master.await.unwrap();
        assert_eq!(store.lock().load(1).unwrap().species(), 0xB0);
    }

    #[tokio::test]
    async fn test_external_cancel_observed_at_suspension() {
        let (port, _wire, cancel) = link_pair(Duration::from_secs(5));
        let (_dir, _store, _status, mut session) = test_session(port, cancel.clone());

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.request();
        });

        let outcome = session.run().await.unwrap();
        assert_eq!(outcome, TradeOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_silent_link_exhausts_retry_budget() {
        let (port, _wire, cancel) = link_pair(Duration::from_millis(10));
        let (_dir, _store, status, mut session) = test_session(port, cancel);

        let outcome = session.run().await.unwrap();
        assert!(matches!(outcome, TradeOutcome::Failed { .. }));
        assert!(status.read().last_error.is_some());
    }

    #[tokio::test]
    async fn test_empty_send_slot_is_a_storage_error() {
        let (port, _wire, cancel) = link_pair(Duration::from_millis(10));
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Mutex::new(SlotStore::open(dir.path(), 6).unwrap()));
        let status = Arc::new(RwLock::new(StatusSnapshot::idle()));
        let mut session = TradeSession::new(
            port,
            cancel,
            store,
            status,
            test_link_cfg(),
            TradeConfig {
                send_slot: 0,
                receive_slot: 1,
            },
        );
        assert!(matches!(
            session.run().await,
            Err(SessionError::Storage(_))
        ));
    }
}
