//! Chunked transfers
//!
//! Data sets too large for one frame are staged on the device with
//! CMD_PREPARE_BUFFER and pulled back with CMD_READ_BUFFER, one chunk per
//! request. Uploads go the other way through CMD_PREPARE_DATA and a run of
//! CMD_DATA frames.

use byteorder::{ByteOrder, LittleEndian};
use bytes::{Bytes, BytesMut};
use tracing::{debug, trace, warn};
use zkwire_core::{
    constants::DATA_FRAME_SIZE, Accepted, ChunkPlan, Command, PendingTransfer, TransportKind,
};

use crate::connection::{rejected, Connection};
use crate::error::{Error, Result};

/// Parameters of a buffered read
#[derive(Debug, Clone, Copy)]
pub struct BufferRead {
    /// Command whose data set is staged
    pub command: Command,
    /// Data set selector
    pub fct: u8,
    /// Extra selector argument
    pub ext: u32,
    /// Bytes requested per READ_BUFFER
    pub chunk_size: u32,
    /// Re-requests allowed per chunk, and gap-filling rounds
    pub max_retries: usize,
}

impl BufferRead {
    pub fn new(command: Command, fct: u8, chunk_size: u32) -> Self {
        Self {
            command,
            fct,
            ext: 0,
            chunk_size,
            max_retries: zkwire_core::constants::MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn prepare_payload(&self) -> Vec<u8> {
        // flag, then signed command/fct/ext as the firmware reads them
        let mut payload = [0u8; 11];
        payload[0] = 1;
        LittleEndian::write_i16(&mut payload[1..3], u16::from(self.command) as i16);
        LittleEndian::write_i32(&mut payload[3..7], i32::from(self.fct));
        LittleEndian::write_i32(&mut payload[7..11], self.ext as i32);
        payload.to_vec()
    }
}

/// Fetch a whole data set
///
/// # Errors
///
/// [`Error::Transfer`] when the data set cannot be reassembled, including
/// when the session drops mid-transfer; partial data is never returned.
pub async fn read_with_buffer(conn: &mut Connection, read: BufferRead) -> Result<Bytes> {
    debug!(command = %read.command, fct = read.fct, "Preparing buffered read");

    let reply = conn
        .execute(Command::PrepareBuffer, read.prepare_payload())
        .await?;

    let total = match reply.kind() {
        Some(Command::Data) => {
            debug!(size = reply.payload.len(), "Data set returned inline");
            return Ok(reply.payload);
        }
        Some(Command::AckOk) => {
            if reply.payload.len() < 5 {
                return Err(Error::InvalidResponse(format!(
                    "PREPARE_BUFFER reply too short: {} bytes",
                    reply.payload.len()
                )));
            }
            LittleEndian::read_u32(&reply.payload[1..5])
        }
        _ => return Err(rejected(Command::PrepareBuffer, &reply)),
    };

    let result = pull_chunks(conn, &read, total).await.map_err(abort);
    free_data(conn).await;
    result
}

/// Any failure while pulling chunks aborts the whole transfer
fn abort(err: Error) -> Error {
    match err {
        Error::Transfer(_) => err,
        other => {
            warn!("Buffered read aborted: {}", other);
            Error::transfer(zkwire_core::Error::TransferAborted(other.to_string()))
        }
    }
}

async fn pull_chunks(conn: &mut Connection, read: &BufferRead, total: u32) -> Result<Bytes> {
    let plan = ChunkPlan::new(total, read.chunk_size);
    debug!(total, chunks = plan.len(), "Reading buffered data set");

    let mut pending = PendingTransfer::new(total);

    for chunk in plan {
        let data = read_chunk_retrying(conn, chunk.start, chunk.size, read.max_retries).await?;
        trace!(index = chunk.index, start = chunk.start, len = data.len(), "Chunk read");
        if data.is_empty() {
            continue;
        }
        pending.accept_at(chunk.start, data).map_err(Error::transfer)?;
    }

    let mut rounds = 0;
    while let Some((start, len)) = pending.first_gap() {
        if rounds >= read.max_retries {
            break;
        }
        rounds += 1;
        warn!(start, len, "Gap in data set, re-requesting range");

        let data = read_chunk_retrying(conn, start, len, read.max_retries).await?;
        if data.is_empty() {
            continue;
        }
        if pending.accept_at(start, data).map_err(Error::transfer)? == Accepted::Duplicate {
            break;
        }
    }

    pending.finish().map_err(Error::transfer)
}

async fn read_chunk_retrying(
    conn: &mut Connection,
    start: u32,
    size: u32,
    max_retries: usize,
) -> Result<Bytes> {
    let mut attempt = 0;
    loop {
        match read_chunk(conn, start, size).await {
            Err(Error::Timeout)
                if conn.kind() == TransportKind::Udp
                    && conn.is_connected()
                    && attempt < max_retries =>
            {
                attempt += 1;
                warn!(start, size, attempt, "Chunk stream interrupted, re-requesting");
            }
            other => return other,
        }
    }
}

/// One READ_BUFFER exchange
///
/// The device answers a small chunk with a single DATA frame. A larger one
/// is streamed as PREPARE_DATA(size), DATA frames and a closing ACK_OK, all
/// under the same reply id.
async fn read_chunk(conn: &mut Connection, start: u32, size: u32) -> Result<Bytes> {
    let mut payload = [0u8; 8];
    LittleEndian::write_u32(&mut payload[..4], start);
    LittleEndian::write_u32(&mut payload[4..], size);

    let reply = conn
        .execute(Command::ReadBuffer, Bytes::copy_from_slice(&payload))
        .await?;

    match reply.kind() {
        Some(Command::Data) => Ok(reply.payload),
        Some(Command::PrepareData) => {
            if reply.payload.len() < 4 {
                return Err(Error::InvalidResponse("PREPARE_DATA without size".into()));
            }
            let announced = LittleEndian::read_u32(&reply.payload[..4]) as usize;
            let mut data = BytesMut::with_capacity(announced);

            loop {
                let frame = conn.receive_followup().await?;
                match frame.kind() {
                    Some(Command::Data) => {
                        if data.len() + frame.payload.len() > announced {
                            return Err(Error::Transfer(format!(
                                "chunk at {start} overflows announced {announced} bytes"
                            )));
                        }
                        data.extend_from_slice(&frame.payload);
                    }
                    Some(Command::AckOk) => break,
                    _ => {
                        return Err(Error::Transfer(format!(
                            "chunk at {start} interrupted by {}",
                            frame
                        )));
                    }
                }
            }

            if data.len() != announced {
                return Err(Error::Transfer(format!(
                    "chunk at {start}: received {} of {announced} bytes",
                    data.len()
                )));
            }
            Ok(data.freeze())
        }
        _ => Err(rejected(Command::ReadBuffer, &reply)),
    }
}

/// Release the device-side buffer
pub async fn free_data(conn: &mut Connection) {
    if !conn.is_connected() {
        return;
    }
    match conn.execute(Command::FreeData, Bytes::new()).await {
        Ok(reply) if !reply.is_success() => warn!("FREE_DATA answered with {}", reply),
        Ok(_) => {}
        Err(e) => warn!("Failed to free device buffer: {}", e),
    }
}

/// Upload a payload for a following write command
pub async fn send_with_buffer(conn: &mut Connection, data: &[u8]) -> Result<()> {
    let size = u32::try_from(data.len())
        .map_err(|_| Error::Transfer(format!("upload of {} bytes is too large", data.len())))?;

    debug!(size, frames = data.len().div_ceil(DATA_FRAME_SIZE), "Uploading buffer");

    conn.execute_ok(Command::PrepareData, size.to_le_bytes().to_vec())
        .await?;

    for frame in data.chunks(DATA_FRAME_SIZE) {
        conn.execute_ok(Command::Data, Bytes::copy_from_slice(frame))
            .await?;
    }

    Ok(())
}
