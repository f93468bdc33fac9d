//! Slave-side byte exchange over the externally clocked serial link.
//!
//! The platform bit shifter (PIO block, GPIO interrupt handler, or the TCP
//! bridge in this crate) owns the clock edges and whole frames; this layer
//! only sees complete bytes. For every frame the shifter consumes the byte
//! the session published and delivers the byte the master clocked in
//! alongside it.

pub mod bridge;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::trace;

use crate::error::ExchangeError;

/// What the shifter reports per frame: a completed byte, or a partial frame
/// it had to abandon (bit counter reset, alignment lost).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireEvent {
    Byte(u8),
    Fault,
}

/// Session-side endpoint. Exactly one suspension point: [`LinkPort::exchange`].
pub struct LinkPort {
    out_tx: mpsc::Sender<u8>,
    in_rx: mpsc::Receiver<WireEvent>,
    cancel_rx: watch::Receiver<bool>,
    frame_timeout: Duration,
}

/// Shifter-side endpoint, held by whatever implements the physical layer.
pub struct WireHandle {
    out_rx: mpsc::Receiver<u8>,
    in_tx: mpsc::Sender<WireEvent>,
}

/// Raises the session cancel flag; observed at the next exchange boundary.
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

pub fn link_pair(frame_timeout: Duration) -> (LinkPort, WireHandle, CancelHandle) {
    // Capacity 1 on both: the published byte models the SB register, the
    // inbound slot holds at most the frame in flight.
    let (out_tx, out_rx) = mpsc::channel(1);
    let (in_tx, in_rx) = mpsc::channel(1);
    let (cancel_tx, cancel_rx) = watch::channel(false);
    (
        LinkPort {
            out_tx,
            in_rx,
            cancel_rx,
            frame_timeout,
        },
        WireHandle { out_rx, in_tx },
        CancelHandle {
            tx: Arc::new(cancel_tx),
        },
    )
}

impl LinkPort {
    /// Publish `out` for the next frame, then wait for that frame's inbound
    /// byte. Strict lockstep: the byte returned here is the one the master
    /// clocked against `out` (or against the previously published byte, if a
    /// timed-out publication was still latched).
    pub async fn exchange(&mut self, out: u8) -> Result<u8, ExchangeError> {
        if *self.cancel_rx.borrow() {
            return Err(ExchangeError::Cancelled);
        }
        match self.out_tx.try_send(out) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                // A timed-out publication is still latched; the shifter will
                // put that byte on the wire, which mirrors hardware.
                trace!("outbound byte still latched from a previous frame");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => return Err(ExchangeError::Closed),
        }

        let deadline = tokio::time::sleep(self.frame_timeout);
        tokio::pin!(deadline);
        tokio::select! {
            event = self.in_rx.recv() => match event {
                Some(WireEvent::Byte(b)) => Ok(b),
                Some(WireEvent::Fault) => Err(ExchangeError::Desync),
                None => Err(ExchangeError::Closed),
            },
            res = self.cancel_rx.wait_for(|&c| c) => match res {
                Ok(_) => Err(ExchangeError::Cancelled),
                Err(_) => Err(ExchangeError::Closed),
            },
            _ = &mut deadline => Err(ExchangeError::Timeout(self.frame_timeout)),
        }
    }

    /// Latch `out` for the next frame without waiting for it. Used on
    /// terminal paths so the closing reply (0x6F, 0xD6) still reaches a
    /// master that clocks one more frame.
    pub fn publish(&mut self, out: u8) {
        let _ = self.out_tx.try_send(out);
    }

    /// Adjust the per-frame deadline; the session loosens it once party data
    /// is in flight (mid-trade clock stalls are tolerated for minutes).
    pub fn set_frame_timeout(&mut self, timeout: Duration) {
        self.frame_timeout = timeout;
    }

    pub fn frame_timeout(&self) -> Duration {
        self.frame_timeout
    }
}

impl WireHandle {
    /// Clock one full frame: take the byte the slave published, deliver the
    /// byte the master shifted in. Returns `None` when the session side is
    /// gone.
    pub async fn clock_frame(&mut self, inbound: u8) -> Option<u8> {
        let out = self.out_rx.recv().await?;
        self.in_tx.send(WireEvent::Byte(inbound)).await.ok()?;
        Some(out)
    }

    /// Report a partial frame (bit alignment lost at the physical layer).
    pub async fn fault(&mut self) -> bool {
        self.in_tx.send(WireEvent::Fault).await.is_ok()
    }
}

impl CancelHandle {
    pub fn request(&self) {
        let _ = self.tx.send(true);
    }

    /// Re-arm for the next session.
    pub fn reset(&self) {
        let _ = self.tx.send(false);
    }

    pub fn is_requested(&self) -> bool {
        *self.tx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAST: Duration = Duration::from_millis(20);

    #[tokio::test]
    async fn test_exchange_pairs_bytes_in_lockstep() {
        let (mut port, mut wire, _cancel) = link_pair(FAST);
        let driver = tokio::spawn(async move {
            let mut seen = Vec::new();
            for inbound in [0x01u8, 0x60, 0xD4] {
                seen.push(wire.clock_frame(inbound).await.unwrap());
            }
            seen
        });

        assert_eq!(port.exchange(0x02).await.unwrap(), 0x01);
        assert_eq!(port.exchange(0x60).await.unwrap(), 0x60);
        assert_eq!(port.exchange(0xD4).await.unwrap(), 0xD4);

        let sent = driver.await.unwrap();
        assert_eq!(sent, vec![0x02, 0x60, 0xD4]);
    }

    #[tokio::test]
    async fn test_exchange_times_out_without_clock() {
        let (mut port, _wire, _cancel) = link_pair(FAST);
        match port.exchange(0x02).await {
            Err(ExchangeError::Timeout(t)) => assert_eq!(t, FAST),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_retry_after_timeout_does_not_double_publish() {
        let (mut port, mut wire, _cancel) = link_pair(FAST);
        assert!(matches!(
            port.exchange(0x02).await,
            Err(ExchangeError::Timeout(_))
        ));
        // master shows up late; the latched byte from the first call is used
        let driver = tokio::spawn(async move { wire.clock_frame(0x01).await });
        assert_eq!(port.exchange(0x02).await.unwrap(), 0x01);
        assert_eq!(driver.await.unwrap(), Some(0x02));
    }

    #[tokio::test]
    async fn test_fault_surfaces_as_desync() {
        let (mut port, mut wire, _cancel) = link_pair(FAST);
        let driver = tokio::spawn(async move {
            wire.out_rx.recv().await;
            wire.fault().await;
        });
        assert!(matches!(
            port.exchange(0x02).await,
            Err(ExchangeError::Desync)
        ));
        driver.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_observed_at_exchange_boundary() {
        let (mut port, _wire, cancel) = link_pair(Duration::from_secs(5));
        let c = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            c.request();
        });
        assert!(matches!(
            port.exchange(0x02).await,
            Err(ExchangeError::Cancelled)
        ));
        cancel.reset();
        assert!(!cancel.is_requested());
    }

    #[tokio::test]
    async fn test_closed_wire_reported() {
        let (mut port, wire, _cancel) = link_pair(FAST);
        drop(wire);
        assert!(matches!(
            port.exchange(0x02).await,
            Err(ExchangeError::Closed)
        ));
    }
}
