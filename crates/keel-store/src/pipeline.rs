//! Write-behind pipeline: a bounded FIFO queue drained by a single task.

use bytes::Bytes;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{ErrorKind, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use keel_common::{BlockId, KeelError, Result};

/// Operations accepted by the drainer.
pub(crate) enum WriteOp {
    /// Persist one block payload.
    Write { block_id: BlockId, payload: Bytes },
    /// Sync the file and acknowledge once every prior write has drained.
    Flush { ack: oneshot::Sender<()> },
}

/// Counters shared between the store and its drainer.
#[derive(Debug, Default)]
pub(crate) struct PipelineStats {
    /// Writes successfully drained to the file.
    pub drained: AtomicU64,
    /// Writes dropped after an I/O error.
    pub dropped: AtomicU64,
}

/// Spawns the single drainer task owning write access to the file.
///
/// Operations are applied in submission order. An I/O error during drain is
/// logged and the offending write is discarded; the pipeline continues. The
/// task ends when every sender is dropped, syncing the file on the way out.
pub(crate) fn spawn_drainer(
    file: Arc<Mutex<File>>,
    block_size: usize,
    fsync_enabled: bool,
    mut rx: mpsc::Receiver<WriteOp>,
    stats: Arc<PipelineStats>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(op) = rx.recv().await {
            match op {
                WriteOp::Write { block_id, payload } => {
                    match drain_one(&file, block_size, fsync_enabled, block_id, &payload) {
                        Ok(()) => {
                            stats.drained.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            stats.dropped.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(
                                block = block_id.0,
                                error = %e,
                                "dropping failed block write"
                            );
                        }
                    }
                }
                WriteOp::Flush { ack } => {
                    if let Err(e) = file.lock().sync_all() {
                        tracing::warn!(error = %e, "flush sync failed");
                    }
                    let _ = ack.send(());
                }
            }
        }

        // Queue closed: final sync before the store releases the file.
        if let Err(e) = file.lock().sync_all() {
            tracing::warn!(error = %e, "final sync failed during teardown");
        }
    })
}

/// Writes one block at its offset and flushes it.
fn drain_one(
    file: &Mutex<File>,
    block_size: usize,
    fsync_enabled: bool,
    block_id: BlockId,
    payload: &[u8],
) -> Result<()> {
    let mut file = file.lock();
    file.seek(SeekFrom::Start(block_id.0 as u64 * block_size as u64))?;
    write_full(&mut file, block_id, payload)?;
    if fsync_enabled {
        file.sync_data()?;
    }
    Ok(())
}

/// Writes the whole payload at the current position.
///
/// A write that makes no progress is surfaced as `ShortWrite` with the byte
/// count that did land, mirroring how reads report `ShortRead`.
pub(crate) fn write_full(file: &mut File, block_id: BlockId, payload: &[u8]) -> Result<()> {
    let mut written = 0;
    while written < payload.len() {
        match file.write(&payload[written..]) {
            Ok(0) => {
                return Err(KeelError::ShortWrite {
                    block_id: block_id.0,
                    expected: payload.len(),
                    actual: written,
                });
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
