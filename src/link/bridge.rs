//! TCP adapter for the wire side of the link.
//!
//! The physical shifter lives off-board (a PIO dongle, an emulator, a test
//! jig). It dials in and forwards one byte per clocked frame; we answer each
//! byte with the byte the session had published for that frame. One
//! connection at a time, matching the single physical cable.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::WireHandle;

pub async fn serve_wire(listener: TcpListener, mut wire: WireHandle) {
    loop {
        let (mut socket, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("wire bridge accept failed: {e}");
                continue;
            }
        };
        info!("wire shifter connected from {peer}");

        let mut buf = [0u8; 1];
        loop {
            match socket.read_exact(&mut buf).await {
                Ok(_) => {}
                Err(e) => {
                    info!("wire shifter disconnected: {e}");
                    break;
                }
            }
            let Some(reply) = wire.clock_frame(buf[0]).await else {
                info!("session side closed, stopping wire bridge");
                return;
            };
            if let Err(e) = socket.write_all(&[reply]).await {
                warn!("wire bridge write failed: {e}");
                break;
            }
        }
    }
}
