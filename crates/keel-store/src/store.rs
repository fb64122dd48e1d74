//! Fixed-size block storage over a single file.

use bytes::Bytes;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::header::StoreHeader;
use crate::pipeline::{spawn_drainer, write_full, PipelineStats, WriteOp};
use keel_common::{BlockId, CancelToken, KeelError, Result, StoreConfig};

/// Snapshot of store activity counters.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StoreStats {
    /// Blocks handed out by `allocate`.
    pub allocated: u64,
    /// Blocks returned through `free`.
    pub freed: u64,
    /// Writes accepted into the pipeline.
    pub submitted: u64,
    /// Writes drained to the file.
    pub drained: u64,
    /// Writes dropped after a drain error.
    pub dropped: u64,
}

/// Block storage backed by one file.
///
/// Blocks are numbered from 0; block 0 is the header. Writes are submitted
/// to a bounded FIFO and drained in order by a single background task, so a
/// read issued after a write submission is not guaranteed to observe it
/// until the drainer catches up. Callers that need read-your-write on a
/// block route reads through a cache updated before submission (the node
/// manager does exactly that).
pub struct BlockStore {
    /// Block size in bytes, fixed at creation.
    block_size: usize,
    /// Sync drained writes to disk.
    fsync_enabled: bool,
    /// The backing file. The drainer shares this handle for writes;
    /// reads serialize the seek+read pair through the same lock.
    file: Arc<Mutex<File>>,
    /// In-memory copy of the header block.
    header: Mutex<StoreHeader>,
    /// Reusable blocks, top of the free-list chain last.
    free_blocks: Mutex<Vec<BlockId>>,
    /// Submission side of the write pipeline. Dropped on close.
    tx: Mutex<Option<mpsc::Sender<WriteOp>>>,
    /// Drainer task handle, awaited on close.
    drainer: Mutex<Option<JoinHandle<()>>>,
    /// Set once `close` begins; all operations fail afterwards.
    disposed: AtomicBool,
    /// Ambient cancellation signal.
    cancel: CancelToken,
    allocated: AtomicU64,
    freed: AtomicU64,
    submitted: AtomicU64,
    pipeline_stats: Arc<PipelineStats>,
}

impl BlockStore {
    /// Creates a new store file. Fails if the file already exists.
    pub async fn create(config: StoreConfig) -> Result<Self> {
        config.validate()?;

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&config.path)?;

        let header = StoreHeader::new(config.block_size as u32);
        file.seek(SeekFrom::Start(0))?;
        write_full(&mut file, BlockId(0), &header.to_block(config.block_size))?;
        file.sync_all()?;

        tracing::debug!(path = %config.path.display(), block_size = config.block_size, "created store");
        Ok(Self::launch(&config, file, header, Vec::new()))
    }

    /// Opens an existing store file and validates its header.
    ///
    /// The block size recorded in the header wins over the configured one.
    pub async fn open(config: StoreConfig) -> Result<Self> {
        config.validate()?;

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&config.path)?;

        let mut prefix = [0u8; StoreHeader::SIZE];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut prefix)
            .map_err(|_| KeelError::InvalidHeader("file too small for a header".to_string()))?;
        let header = StoreHeader::from_bytes(&prefix)?;

        let block_size = header.block_size as usize;
        if block_size != config.block_size {
            tracing::debug!(
                configured = config.block_size,
                on_disk = block_size,
                "block size taken from store header"
            );
        }

        let file_len = file.metadata()?.len();
        if file_len % block_size as u64 != 0 {
            return Err(KeelError::InvalidHeader(format!(
                "file length {file_len} is not a multiple of block size {block_size}"
            )));
        }

        let free_blocks = Self::walk_free_chain(&mut file, &header, file_len)?;

        tracing::debug!(path = %config.path.display(), block_size, "opened store");
        let mut config = config;
        config.block_size = block_size;
        Ok(Self::launch(&config, file, header, free_blocks))
    }

    /// Opens the store at the configured path, creating it if absent.
    pub async fn open_or_create(config: StoreConfig) -> Result<Self> {
        if config.path.exists() {
            Self::open(config).await
        } else {
            Self::create(config).await
        }
    }

    /// Rebuilds the in-memory free list by walking the on-disk chain.
    ///
    /// Each chain entry stores the id of the next free block in its first
    /// four bytes. The returned vector keeps the chain head last so `pop`
    /// hands blocks back in chain order.
    fn walk_free_chain(
        file: &mut File,
        header: &StoreHeader,
        file_len: u64,
    ) -> Result<Vec<BlockId>> {
        let block_size = header.block_size as usize;
        let total_blocks = (file_len / block_size as u64) as usize;

        let mut chain = Vec::new();
        let mut cursor = header.free_head;
        while cursor.is_valid() {
            if chain.len() > total_blocks {
                return Err(KeelError::Corrupted(
                    "free-list chain longer than the file".to_string(),
                ));
            }
            let offset = cursor.0 as u64 * block_size as u64;
            if offset + 4 > file_len {
                return Err(KeelError::Corrupted(format!(
                    "free-list chain points past the file at block {cursor}"
                )));
            }
            file.seek(SeekFrom::Start(offset))?;
            let mut next = [0u8; 4];
            file.read_exact(&mut next)?;
            chain.push(cursor);
            cursor = BlockId(u32::from_le_bytes(next));
        }

        chain.reverse();
        Ok(chain)
    }

    /// Finishes construction and spawns the drainer task.
    fn launch(
        config: &StoreConfig,
        file: File,
        header: StoreHeader,
        free_blocks: Vec<BlockId>,
    ) -> Self {
        let file = Arc::new(Mutex::new(file));
        let pipeline_stats = Arc::new(PipelineStats::default());
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let drainer = spawn_drainer(
            Arc::clone(&file),
            config.block_size,
            config.fsync_enabled,
            rx,
            Arc::clone(&pipeline_stats),
        );

        Self {
            block_size: config.block_size,
            fsync_enabled: config.fsync_enabled,
            file,
            header: Mutex::new(header),
            free_blocks: Mutex::new(free_blocks),
            tx: Mutex::new(Some(tx)),
            drainer: Mutex::new(Some(drainer)),
            disposed: AtomicBool::new(false),
            cancel: CancelToken::new(),
            allocated: AtomicU64::new(0),
            freed: AtomicU64::new(0),
            submitted: AtomicU64::new(0),
            pipeline_stats,
        }
    }

    /// Returns the block size in bytes.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Returns the ambient cancellation token for this store.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Returns a snapshot of the activity counters.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            allocated: self.allocated.load(Ordering::Relaxed),
            freed: self.freed.load(Ordering::Relaxed),
            submitted: self.submitted.load(Ordering::Relaxed),
            drained: self.pipeline_stats.drained.load(Ordering::Relaxed),
            dropped: self.pipeline_stats.dropped.load(Ordering::Relaxed),
        }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            Err(KeelError::StoreDisposed)
        } else {
            Ok(())
        }
    }

    /// Reads one block directly from the file.
    pub async fn read(&self, block_id: BlockId) -> Result<Bytes> {
        self.cancel.check()?;
        self.ensure_live()?;

        let offset = block_id.0 as u64 * self.block_size as u64;
        let mut buf = vec![0u8; self.block_size];
        {
            let mut file = self.file.lock();
            let file_len = file.metadata()?.len();
            if offset + self.block_size as u64 > file_len {
                return Err(KeelError::ShortRead {
                    block_id: block_id.0,
                    expected: self.block_size,
                    actual: file_len.saturating_sub(offset).min(self.block_size as u64) as usize,
                });
            }
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut buf)?;
        }
        Ok(Bytes::from(buf))
    }

    /// Submits one block write to the pipeline.
    ///
    /// Blocks when the queue is full (backpressure). Returns once the write
    /// is accepted, not once it is drained.
    pub async fn write(&self, block_id: BlockId, payload: Bytes) -> Result<()> {
        self.cancel.check()?;
        self.ensure_live()?;

        if payload.len() != self.block_size {
            return Err(KeelError::BadBlockSize {
                expected: self.block_size,
                actual: payload.len(),
            });
        }

        self.submit(WriteOp::Write { block_id, payload }).await?;
        self.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn submit(&self, op: WriteOp) -> Result<()> {
        let tx = self
            .tx
            .lock()
            .clone()
            .ok_or(KeelError::StoreDisposed)?;
        tx.send(op).await.map_err(|_| KeelError::StoreDisposed)
    }

    /// Allocates a block, reusing the free list before extending the file.
    pub fn allocate(&self) -> Result<BlockId> {
        self.ensure_live()?;

        {
            let mut header = self.header.lock();
            let mut free = self.free_blocks.lock();
            if let Some(id) = free.pop() {
                header.free_head = free.last().copied().unwrap_or(BlockId::INVALID);
                self.persist_header(&header)?;
                self.allocated.fetch_add(1, Ordering::Relaxed);
                return Ok(id);
            }
        }

        let id = {
            let file = self.file.lock();
            let len = file.metadata()?.len();
            file.set_len(len + self.block_size as u64)?;
            BlockId((len / self.block_size as u64) as u32)
        };
        self.allocated.fetch_add(1, Ordering::Relaxed);
        Ok(id)
    }

    /// Returns a block to the free list.
    ///
    /// The freed block becomes the new chain head: its first four bytes are
    /// rewritten (through the pipeline, so the write orders after any still
    /// queued saves of that block) to point at the previous head.
    pub async fn free(&self, block_id: BlockId) -> Result<()> {
        self.cancel.check()?;
        self.ensure_live()?;

        let next = self.header.lock().free_head;
        let mut payload = vec![0u8; self.block_size];
        payload[0..4].copy_from_slice(&next.0.to_le_bytes());
        self.submit(WriteOp::Write {
            block_id,
            payload: Bytes::from(payload),
        })
        .await?;

        {
            let mut header = self.header.lock();
            header.free_head = block_id;
            self.persist_header(&header)?;
            self.free_blocks.lock().push(block_id);
        }
        self.freed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Returns the root block id recorded in the header.
    pub fn root(&self) -> Result<BlockId> {
        self.ensure_live()?;
        Ok(self.header.lock().root)
    }

    /// Updates the root block id and persists the header synchronously.
    pub fn set_root(&self, root: BlockId) -> Result<()> {
        self.ensure_live()?;
        let mut header = self.header.lock();
        header.root = root;
        self.persist_header(&header)?;
        tracing::debug!(root = %root, "updated root pointer");
        Ok(())
    }

    /// Writes the header block directly, bypassing the pipeline.
    ///
    /// Called with the header lock held so allocate/free/set_root cannot
    /// interleave their read-modify-write cycles.
    fn persist_header(&self, header: &StoreHeader) -> Result<()> {
        let block = header.to_block(self.block_size);
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(0))?;
        write_full(&mut file, BlockId(0), &block)?;
        if self.fsync_enabled {
            file.sync_data()?;
        }
        Ok(())
    }

    /// Waits until every previously submitted write has drained.
    pub async fn flush(&self) -> Result<()> {
        self.ensure_live()?;
        let (ack_tx, ack_rx) = oneshot::channel();
        self.submit(WriteOp::Flush { ack: ack_tx }).await?;
        ack_rx.await.map_err(|_| KeelError::StoreDisposed)
    }

    /// Tears the store down: drains the queue, syncs, and rejects all
    /// further operations with `StoreDisposed`. Idempotent.
    pub async fn close(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.tx.lock().take();
        let drainer = self.drainer.lock().take();
        if let Some(handle) = drainer {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "drainer task panicked during close");
            }
        }
        self.file.lock().sync_all()?;
        tracing::debug!("block store closed");
        Ok(())
    }
}

impl Drop for BlockStore {
    fn drop(&mut self) {
        if !self.disposed.load(Ordering::SeqCst) {
            // Dropping the sender lets the detached drainer finish draining
            // whatever was already queued.
            self.tx.lock().take();
            tracing::debug!("block store dropped without close; drainer finishing in background");
        }
    }
}
