use std::time::Instant;

use tracing::{debug, error, info};

use super::{
    Phase, BLANK, BREAK_LINK, COLOSSEUM, CONNECTED, LEAVE_TABLE, MASTER, NEGOTIATION_FILL,
    PATCH_HEADER_LEN, PREAMBLE_BYTE, PREAMBLE_LEN, PREAMBLE_MIN, RANDOM_LEN, RANDOM_SEED,
    SEL_NUM_MASK, SLAVE, TRADE_ACCEPT, TRADE_CENTER, TRADE_CENTER_DEADLINE, TRADE_CENTER_ECHOES,
    TRADE_CENTER_MAX_ROUNDS, TRADE_REJECT,
};
use crate::codec::{PartyBlock, PatchList, PARTY_BLOCK_LEN, PATCH_LIST_LEN};
use crate::error::ProtocolError;

/// Emitted when a session reaches one of its terminal outcomes.
#[derive(Debug)]
pub enum TradeEvent {
    TradeComplete(PartyBlock),
    TradeCancelled,
    TradeFailed(ProtocolError),
}

/// Result of stepping the engine once: the byte to put on the wire for the
/// next frame, plus any terminal event this byte triggered.
#[derive(Debug)]
pub struct Step {
    pub reply: u8,
    pub event: Option<TradeEvent>,
}

/// The trade state machine. Strictly non-suspending: one inbound byte in,
/// one outbound byte out, finite work per tick. All waiting happens in the
/// exchange layer above it.
pub struct TradeEngine {
    phase: Phase,
    phase_entered: Instant,
    bytes_in_phase: u32,
    outgoing_wire: [u8; PARTY_BLOCK_LEN],
    patch_out: [u8; PATCH_LIST_LEN],
    received_raw: [u8; PARTY_BLOCK_LEN],
    patch_in: [u8; PATCH_LIST_LEN],
    offer_slot: u8,
    peer_choice: Option<u8>,
}

impl TradeEngine {
    /// `offer_slot` is the party position (always 0 for our one-Pokémon
    /// party) announced back when the peer makes its pick.
    pub fn new(block: &PartyBlock, patch: &PatchList, offer_slot: u8) -> Self {
        Self {
            phase: Phase::NotConnected,
            phase_entered: Instant::now(),
            bytes_in_phase: 0,
            outgoing_wire: block.wire_bytes(),
            patch_out: *patch.as_bytes(),
            received_raw: [0; PARTY_BLOCK_LEN],
            patch_in: [0; PATCH_LIST_LEN],
            offer_slot: offer_slot & 0x07,
            peer_choice: None,
        }
    }

    /// The byte to send before anything has been received.
    pub fn initial_reply(&self) -> u8 {
        SLAVE
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn bytes_in_phase(&self) -> u32 {
        self.bytes_in_phase
    }

    pub fn peer_choice(&self) -> Option<u8> {
        self.peer_choice
    }

    /// Called by the session once the peer has been idle long enough after a
    /// completed trade.
    pub fn finish_cleanup(&mut self) {
        if self.phase == Phase::Cleanup {
            self.phase = Phase::Complete;
        }
    }

    pub fn step(&mut self, inbound: u8) -> Step {
        let prev = self.phase;
        let (next, reply, event) = self.transition(inbound);
        if std::mem::discriminant(&next) != std::mem::discriminant(&prev) {
            debug!(from = prev.name(), to = next.name(), "phase transition");
            self.bytes_in_phase = 0;
            self.phase_entered = Instant::now();
        } else {
            self.bytes_in_phase += 1;
        }
        self.phase = next;
        Step { reply, event }
    }

    fn transition(&mut self, inbound: u8) -> (Phase, u8, Option<TradeEvent>) {
        use Phase::*;
        match self.phase {
            NotConnected => match inbound {
                MASTER => (NotConnected, SLAVE, None),
                CONNECTED => {
                    info!("link established, we are the slave");
                    (Connected, CONNECTED, None)
                }
                other => (NotConnected, other, None),
            },

            Connected => match inbound {
                TRADE_CENTER => (TradeCenter { echoes: 1, rounds: 0 }, TRADE_CENTER, None),
                COLOSSEUM => {
                    info!("peer picked the colosseum, no trade this session");
                    (Colosseum, COLOSSEUM, Some(TradeEvent::TradeCancelled))
                }
                BREAK_LINK | MASTER => (NotConnected, BREAK_LINK, None),
                BLANK | CONNECTED => (Connected, inbound, None),
                other => {
                    debug!("unexpected menu byte {other:#04x}");
                    (Connected, other, None)
                }
            },

            TradeCenter { echoes, rounds } => {
                if inbound == BREAK_LINK || inbound == MASTER {
                    return (NotConnected, BREAK_LINK, None);
                }
                if self.phase_entered.elapsed() >= TRADE_CENTER_DEADLINE {
                    info!("trade-center confirmation deadline reached, proceeding");
                    return (Ready, TRADE_CENTER, None);
                }
                match inbound {
                    TRADE_CENTER => {
                        let echoes = echoes + 1;
                        if echoes >= TRADE_CENTER_ECHOES {
                            (Ready, TRADE_CENTER, None)
                        } else {
                            (TradeCenter { echoes, rounds }, TRADE_CENTER, None)
                        }
                    }
                    // the 0x00/0xD0 volley; real carts run a few rounds of it
                    BLANK | NEGOTIATION_FILL => {
                        let reply = if inbound == BLANK { NEGOTIATION_FILL } else { BLANK };
                        let rounds = rounds + 1;
                        if rounds > TRADE_CENTER_MAX_ROUNDS {
                            info!("negotiation settled after {rounds} filler rounds");
                            (Ready, reply, None)
                        } else {
                            (TradeCenter { echoes, rounds }, reply, None)
                        }
                    }
                    PREAMBLE_BYTE => (Preamble { matched: 1 }, PREAMBLE_BYTE, None),
                    other => (TradeCenter { echoes, rounds }, other, None),
                }
            }

            Ready => match inbound {
                PREAMBLE_BYTE => (Preamble { matched: 1 }, PREAMBLE_BYTE, None),
                BREAK_LINK => (NotConnected, BREAK_LINK, None),
                _ => (Ready, PREAMBLE_BYTE, None),
            },

            Reset => match inbound {
                PREAMBLE_BYTE => (Preamble { matched: 1 }, PREAMBLE_BYTE, None),
                BREAK_LINK => (NotConnected, BREAK_LINK, None),
                _ => (Reset, PREAMBLE_BYTE, None),
            },

            Preamble { matched } => {
                if inbound == PREAMBLE_BYTE {
                    let matched = matched + 1;
                    if matched as usize >= PREAMBLE_LEN {
                        (RandomSeed { received: 0 }, RANDOM_SEED[0], None)
                    } else {
                        (Preamble { matched }, PREAMBLE_BYTE, None)
                    }
                } else if matched >= PREAMBLE_MIN {
                    debug!(matched, "partial preamble, peer already started the seed");
                    (RandomSeed { received: 1 }, RANDOM_SEED[1], None)
                } else {
                    // stray byte before frame alignment settled
                    (Preamble { matched }, PREAMBLE_BYTE, None)
                }
            }

            RandomSeed { received } => {
                let received = received + 1;
                if received as usize >= RANDOM_LEN {
                    info!("seed exchange done, party data next");
                    (TradeData { received: 0 }, self.outgoing_wire[0], None)
                } else {
                    (RandomSeed { received }, RANDOM_SEED[received as usize], None)
                }
            }

            TradeData { received } => {
                self.received_raw[received as usize] = inbound;
                let received = received + 1;
                if received as usize >= PARTY_BLOCK_LEN {
                    info!("party block exchanged");
                    (PatchHeader { received: 0 }, PREAMBLE_BYTE, None)
                } else {
                    (TradeData { received }, self.outgoing_wire[received as usize], None)
                }
            }

            PatchHeader { received } => {
                let received = received + 1;
                if received >= PATCH_HEADER_LEN {
                    (PatchData { received: 0 }, self.patch_out[0], None)
                } else {
                    (PatchHeader { received }, PREAMBLE_BYTE, None)
                }
            }

            PatchData { received } => {
                self.patch_in[received as usize] = inbound;
                let received = received + 1;
                if received as usize >= PATCH_LIST_LEN {
                    match PatchList::from_wire(self.patch_in).apply(&mut self.received_raw) {
                        Ok(()) => (Selection, BLANK, None),
                        Err(e) => {
                            error!(error = %e, "aborting session");
                            (NotConnected, BLANK, Some(TradeEvent::TradeFailed(e)))
                        }
                    }
                } else {
                    (PatchData { received }, self.patch_out[received as usize], None)
                }
            }

            Selection => match inbound {
                BLANK => (Pending, BLANK, None),
                LEAVE_TABLE => {
                    info!("peer left the table");
                    (Reset, LEAVE_TABLE, Some(TradeEvent::TradeCancelled))
                }
                other => {
                    debug!("waiting for selection, got {other:#04x}");
                    (Selection, BLANK, None)
                }
            },

            Pending => match inbound {
                LEAVE_TABLE => {
                    info!("peer left the table");
                    (Reset, LEAVE_TABLE, Some(TradeEvent::TradeCancelled))
                }
                b if b & 0xF0 == SEL_NUM_MASK && b & 0x0F < 6 => {
                    let pick = b - SEL_NUM_MASK;
                    info!(pick, "peer offered a party slot");
                    self.peer_choice = Some(pick);
                    (Pending, SEL_NUM_MASK | self.offer_slot, None)
                }
                BLANK if self.peer_choice.is_some() => (Confirmation, BLANK, None),
                _ => (Pending, BLANK, None),
            },

            Confirmation => match inbound {
                TRADE_REJECT => {
                    info!("peer rejected the proposed trade");
                    self.peer_choice = None;
                    (Selection, TRADE_REJECT, None)
                }
                TRADE_ACCEPT => (Done, TRADE_ACCEPT, None),
                LEAVE_TABLE => {
                    info!("peer left the table");
                    (Reset, LEAVE_TABLE, Some(TradeEvent::TradeCancelled))
                }
                _ => (Confirmation, BLANK, None),
            },

            Done => match inbound {
                BLANK => match PartyBlock::from_bytes(self.received_raw) {
                    Ok(block) => {
                        info!(species = block.species(0), "trade complete");
                        (Cleanup, BLANK, Some(TradeEvent::TradeComplete(block)))
                    }
                    Err(e) => {
                        error!(error = %e, "peer block failed validation after accept");
                        (
                            NotConnected,
                            BLANK,
                            Some(TradeEvent::TradeFailed(ProtocolError::MalformedBlock(e))),
                        )
                    }
                },
                _ => (Done, TRADE_ACCEPT, None),
            },

            Cleanup => (Cleanup, TRADE_ACCEPT, None),

            Colosseum => (Colosseum, inbound, None),

            Complete => (Complete, BLANK, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{build_party, PokemonRecord};

    fn engine() -> TradeEngine {
        let rec = PokemonRecord::starter();
        let (block, patch) = build_party(&rec).unwrap();
        TradeEngine::new(&block, &patch, 0)
    }

    /// Feed a byte sequence, collecting replies and any events.
    fn drive(engine: &mut TradeEngine, bytes: &[u8]) -> (Vec<u8>, Vec<TradeEvent>) {
        let mut replies = Vec::new();
        let mut events = Vec::new();
        for &b in bytes {
            let step = engine.step(b);
            replies.push(step.reply);
            if let Some(ev) = step.event {
                events.push(ev);
            }
        }
        (replies, events)
    }

    /// Bytes that move a fresh engine to the start of the preamble.
    fn connect_bytes() -> Vec<u8> {
        vec![MASTER, CONNECTED, TRADE_CENTER, TRADE_CENTER, TRADE_CENTER, BLANK]
    }

    /// A second party to trade against ours.
    fn peer_party() -> (PartyBlock, PatchList) {
        let mut bytes = *build_party(&PokemonRecord::starter()).unwrap().0.as_bytes();
        bytes[1] = 0xB0; // different species in the list
        bytes[8] = 0xB0; // and in the record core
        let block = PartyBlock::from_bytes(bytes).unwrap();
        let patch = PatchList::generate(block.as_bytes()).unwrap();
        (block, patch)
    }

    fn happy_path_bytes(peer: &PartyBlock, peer_patch: &PatchList) -> Vec<u8> {
        let mut bytes = connect_bytes();
        bytes.extend(std::iter::repeat(PREAMBLE_BYTE).take(PREAMBLE_LEN));
        bytes.extend((0x11..0x1B).collect::<Vec<u8>>()); // peer's seed, ignored
        bytes.extend_from_slice(&peer.wire_bytes());
        bytes.extend(std::iter::repeat(PREAMBLE_BYTE).take(PATCH_HEADER_LEN as usize));
        bytes.extend_from_slice(peer_patch.as_bytes());
        bytes.extend_from_slice(&[BLANK, SEL_NUM_MASK, BLANK, TRADE_ACCEPT, BLANK]);
        bytes
    }

    #[test]
    fn test_slave_announcement_and_connection() {
        let mut e = engine();
        assert_eq!(e.initial_reply(), SLAVE);
        let step = e.step(MASTER);
        assert_eq!(step.reply, SLAVE);
        assert_eq!(e.phase(), Phase::NotConnected);
        let step = e.step(CONNECTED);
        assert_eq!(step.reply, CONNECTED);
        assert_eq!(e.phase(), Phase::Connected);
    }

    #[test]
    fn test_unknown_bytes_echoed_before_connection() {
        let mut e = engine();
        assert_eq!(e.step(0x42).reply, 0x42);
        assert_eq!(e.phase(), Phase::NotConnected);
    }

    #[test]
    fn test_trade_center_confirmed_after_three_echoes() {
        let mut e = engine();
        drive(&mut e, &[MASTER, CONNECTED]);
        assert_eq!(e.step(TRADE_CENTER).reply, TRADE_CENTER);
        assert!(matches!(e.phase(), Phase::TradeCenter { echoes: 1, .. }));
        e.step(TRADE_CENTER);
        e.step(TRADE_CENTER);
        assert_eq!(e.phase(), Phase::Ready);
    }

    #[test]
    fn test_colosseum_pick_cancels() {
        let mut e = engine();
        drive(&mut e, &[MASTER, CONNECTED]);
        let step = e.step(COLOSSEUM);
        assert_eq!(step.reply, COLOSSEUM);
        assert_eq!(e.phase(), Phase::Colosseum);
        assert!(matches!(step.event, Some(TradeEvent::TradeCancelled)));
    }

    #[test]
    fn test_break_link_returns_to_not_connected() {
        let mut e = engine();
        drive(&mut e, &[MASTER, CONNECTED]);
        let step = e.step(BREAK_LINK);
        assert_eq!(step.reply, BREAK_LINK);
        assert_eq!(e.phase(), Phase::NotConnected);
    }

    #[test]
    fn test_stuck_negotiation_still_reaches_ready() {
        // trade-center pick followed by endless 0x00/0xD0 volleying
        let mut e = engine();
        drive(&mut e, &[MASTER, CONNECTED, TRADE_CENTER]);
        let (replies, _) = drive(&mut e, &[BLANK, NEGOTIATION_FILL, BLANK, NEGOTIATION_FILL, BLANK]);
        assert_eq!(replies[0], NEGOTIATION_FILL);
        assert_eq!(replies[1], BLANK);
        assert_eq!(e.phase(), Phase::Ready);
    }

    #[test]
    fn test_full_preamble_enters_seed_exchange() {
        let mut e = engine();
        drive(&mut e, &connect_bytes());
        let (replies, _) = drive(&mut e, &[PREAMBLE_BYTE; PREAMBLE_LEN]);
        assert!(replies[..PREAMBLE_LEN - 1].iter().all(|&r| r == PREAMBLE_BYTE));
        assert_eq!(*replies.last().unwrap(), RANDOM_SEED[0]);
        assert_eq!(e.phase(), Phase::RandomSeed { received: 0 });
    }

    #[test]
    fn test_partial_preamble_tolerated() {
        let mut e = engine();
        drive(&mut e, &connect_bytes());
        drive(&mut e, &[PREAMBLE_BYTE; 5]);
        let step = e.step(0x37); // peer already sending seed bytes
        assert_eq!(step.reply, RANDOM_SEED[1]);
        assert_eq!(e.phase(), Phase::RandomSeed { received: 1 });
    }

    #[test]
    fn test_short_preamble_not_mistaken_for_data() {
        let mut e = engine();
        drive(&mut e, &connect_bytes());
        drive(&mut e, &[PREAMBLE_BYTE, PREAMBLE_BYTE]);
        let step = e.step(CONNECTED); // still connection chatter
        assert_eq!(step.reply, PREAMBLE_BYTE);
        assert!(matches!(e.phase(), Phase::Preamble { matched: 2 }));
    }

    #[test]
    fn test_happy_path_trace() {
        let (peer, peer_patch) = peer_party();
        let mut e = engine();
        let bytes = happy_path_bytes(&peer, &peer_patch);
        let (replies, events) = drive(&mut e, &bytes);

        assert_eq!(e.phase(), Phase::Cleanup);
        // the final 0x00 is answered with 0x00
        assert_eq!(*replies.last().unwrap(), BLANK);
        assert_eq!(events.len(), 1);
        let TradeEvent::TradeComplete(received) = &events[0] else {
            panic!("expected TradeComplete, got {:?}", events[0]);
        };
        // wire sentinel decode restores the peer's exact block
        assert_eq!(received.as_bytes()[..], peer.as_bytes()[..]);
        assert_eq!(received.species(0), Some(0xB0));
    }

    #[test]
    fn test_fixed_byte_count_between_preamble_and_selection() {
        let (peer, peer_patch) = peer_party();
        let mut e = engine();
        drive(&mut e, &connect_bytes());

        let mut exchanged = 0u32;
        let mut bytes = Vec::new();
        bytes.extend(std::iter::repeat(PREAMBLE_BYTE).take(PREAMBLE_LEN));
        bytes.extend(std::iter::repeat(0x22u8).take(RANDOM_LEN));
        bytes.extend_from_slice(&peer.wire_bytes());
        bytes.extend(std::iter::repeat(PREAMBLE_BYTE).take(PATCH_HEADER_LEN as usize));
        bytes.extend_from_slice(peer_patch.as_bytes());
        for &b in &bytes {
            e.step(b);
            exchanged += 1;
            if e.phase() == Phase::Selection {
                break;
            }
        }
        assert_eq!(e.phase(), Phase::Selection);
        assert_eq!(exchanged, 10 + 10 + 404 + 6 + 196);
    }

    #[test]
    fn test_selection_exchange_and_accept() {
        let (peer, peer_patch) = peer_party();
        let mut e = engine();
        let mut bytes = connect_bytes();
        bytes.extend(std::iter::repeat(PREAMBLE_BYTE).take(PREAMBLE_LEN));
        bytes.extend(std::iter::repeat(0x22u8).take(RANDOM_LEN));
        bytes.extend_from_slice(&peer.wire_bytes());
        bytes.extend(std::iter::repeat(PREAMBLE_BYTE).take(PATCH_HEADER_LEN as usize));
        bytes.extend_from_slice(peer_patch.as_bytes());
        drive(&mut e, &bytes);

        assert_eq!(e.step(BLANK).reply, BLANK);
        assert_eq!(e.phase(), Phase::Pending);
        // peer offers its slot 2; we answer with our slot 0
        assert_eq!(e.step(SEL_NUM_MASK | 2).reply, SEL_NUM_MASK);
        assert_eq!(e.peer_choice(), Some(2));
        assert_eq!(e.step(BLANK).reply, BLANK);
        assert_eq!(e.phase(), Phase::Confirmation);
        let step = e.step(TRADE_ACCEPT);
        assert_eq!(step.reply, TRADE_ACCEPT);
        assert_eq!(e.phase(), Phase::Done);
    }

    #[test]
    fn test_reject_returns_to_selection() {
        let (peer, peer_patch) = peer_party();
        let mut e = engine();
        let mut bytes = happy_path_bytes(&peer, &peer_patch);
        bytes.truncate(bytes.len() - 2); // stop just before the accept
        drive(&mut e, &bytes);
        assert_eq!(e.phase(), Phase::Confirmation);

        let step = e.step(TRADE_REJECT);
        assert_eq!(step.reply, TRADE_REJECT);
        assert_eq!(e.phase(), Phase::Selection);
        assert_eq!(e.peer_choice(), None);

        // a second round of selection still works
        drive(&mut e, &[BLANK, SEL_NUM_MASK | 1, BLANK]);
        assert_eq!(e.phase(), Phase::Confirmation);
        let step = e.step(TRADE_ACCEPT);
        assert!(step.event.is_none());
        assert_eq!(e.phase(), Phase::Done);
    }

    #[test]
    fn test_leave_table_during_pending_resets_in_one_tick() {
        let (peer, peer_patch) = peer_party();
        let mut e = engine();
        let mut bytes = happy_path_bytes(&peer, &peer_patch);
        bytes.truncate(bytes.len() - 4); // positioned in Pending
        drive(&mut e, &bytes);
        assert_eq!(e.phase(), Phase::Pending);

        let step = e.step(LEAVE_TABLE);
        assert_eq!(step.reply, LEAVE_TABLE);
        assert_eq!(e.phase(), Phase::Reset);
        assert!(matches!(step.event, Some(TradeEvent::TradeCancelled)));
    }

    #[test]
    fn test_leave_table_during_confirmation() {
        let (peer, peer_patch) = peer_party();
        let mut e = engine();
        let mut bytes = happy_path_bytes(&peer, &peer_patch);
        bytes.truncate(bytes.len() - 2);
        drive(&mut e, &bytes);
        assert_eq!(e.phase(), Phase::Confirmation);

        let step = e.step(LEAVE_TABLE);
        assert_eq!(step.reply, LEAVE_TABLE);
        assert_eq!(e.phase(), Phase::Reset);
        assert!(matches!(step.event, Some(TradeEvent::TradeCancelled)));
    }

    #[test]
    fn test_reset_accepts_a_new_round() {
        let (peer, peer_patch) = peer_party();
        let mut e = engine();
        let mut bytes = happy_path_bytes(&peer, &peer_patch);
        bytes.truncate(bytes.len() - 4);
        drive(&mut e, &bytes);
        e.step(LEAVE_TABLE);
        assert_eq!(e.phase(), Phase::Reset);

        e.step(PREAMBLE_BYTE);
        assert!(matches!(e.phase(), Phase::Preamble { matched: 1 }));
    }

    #[test]
    fn test_patch_restoration_of_received_block() {
        // peer block carries 0xFD at wire offsets 4 and 260
        let (peer, _) = peer_party();
        let mut peer_bytes = *peer.as_bytes();
        peer_bytes[4] = PREAMBLE_BYTE;
        peer_bytes[260] = PREAMBLE_BYTE;
        let peer = PartyBlock::from_bytes(peer_bytes).unwrap();
        let peer_patch = PatchList::generate(peer.as_bytes()).unwrap();
        assert_eq!(peer.wire_bytes()[4], 0xFE);
        assert_eq!(peer.wire_bytes()[260], 0xFE);

        let mut e = engine();
        let (_, events) = drive(&mut e, &happy_path_bytes(&peer, &peer_patch));
        let TradeEvent::TradeComplete(received) = &events[0] else {
            panic!("expected completion");
        };
        assert_eq!(received.as_bytes()[4], PREAMBLE_BYTE);
        assert_eq!(received.as_bytes()[260], PREAMBLE_BYTE);
        assert_eq!(received.as_bytes()[..], peer.as_bytes()[..]);
    }

    #[test]
    fn test_malformed_patch_list_is_fatal() {
        let (peer, _) = peer_party();
        let mut e = engine();
        let mut bytes = connect_bytes();
        bytes.extend(std::iter::repeat(PREAMBLE_BYTE).take(PREAMBLE_LEN));
        bytes.extend(std::iter::repeat(0x22u8).take(RANDOM_LEN));
        bytes.extend_from_slice(&peer.wire_bytes());
        bytes.extend(std::iter::repeat(PREAMBLE_BYTE).take(PATCH_HEADER_LEN as usize));
        bytes.extend_from_slice(&[0u8; PATCH_LIST_LEN]); // no terminators at all
        let (_, events) = drive(&mut e, &bytes);

        assert_eq!(e.phase(), Phase::NotConnected);
        assert!(matches!(
            events.last(),
            Some(TradeEvent::TradeFailed(ProtocolError::UnterminatedPatchList))
        ));
    }

    #[test]
    fn test_cleanup_keeps_acking() {
        let (peer, peer_patch) = peer_party();
        let mut e = engine();
        drive(&mut e, &happy_path_bytes(&peer, &peer_patch));
        assert_eq!(e.phase(), Phase::Cleanup);
        assert_eq!(e.step(TRADE_ACCEPT).reply, TRADE_ACCEPT);
        assert_eq!(e.step(BLANK).reply, TRADE_ACCEPT);
        assert_eq!(e.phase(), Phase::Cleanup);
        e.finish_cleanup();
        assert_eq!(e.phase(), Phase::Complete);
    }
}
