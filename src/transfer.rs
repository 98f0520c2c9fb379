//! Chunked bulk-transfer engine
//!
//! Splits an arbitrary byte buffer into fixed-size blocks and publishes them
//! in strictly increasing order on the transfer topic at QoS 0, with an
//! inter-block backpressure pause bounding resource use on the device. After
//! the final block the engine publishes the `"end"` sentinel and a completion
//! summary on the transfer topic; progress for non-terminal blocks goes to
//! the companion status topic so consumers of the transfer topic only ever
//! see blocks, the sentinel, and the completion message.
//!
//! Failure policy is single-attempt, all-or-nothing: the first error aborts
//! the whole job, logged with the failing block index. No per-block retry,
//! no resumption.

use crate::transport::{QosLevel, Transport, TransportError};
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

/// Sentinel payload marking the end of the block sequence
pub const SENTINEL: &[u8] = b"end";

/// Transfer failures abort the current job only
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("block {index} failed")]
    Block {
        index: usize,
        #[source]
        source: TransportError,
    },
    #[error("finalization failed")]
    Finalize(#[source] TransportError),
}

/// Tunable parameters for one transfer
#[derive(Debug, Clone)]
pub struct TransferOptions {
    pub block_size: usize,
    /// Backpressure pause applied before each block
    pub inter_block_pause: Duration,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            block_size: 1024,
            inter_block_pause: Duration::from_millis(100),
        }
    }
}

/// Lifecycle of a transfer job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    InProgress,
    Completed,
    Aborted,
}

/// Summary of a finished job
#[derive(Debug, Clone)]
pub struct TransferReport {
    pub job_id: Uuid,
    pub blocks_sent: usize,
    pub bytes_sent: usize,
}

/// Number of blocks needed for a buffer of `len` bytes
pub fn num_blocks(len: usize, block_size: usize) -> usize {
    debug_assert!(block_size > 0);
    len.div_ceil(block_size)
}

/// Byte range `[begin, end)` of block `index`
pub fn block_range(index: usize, block_size: usize, len: usize) -> (usize, usize) {
    let begin = index * block_size;
    let end = usize::min(begin + block_size, len);
    (begin, end)
}

/// One bulk send: owns the buffer and cursor for its duration.
///
/// No two jobs run concurrently on the same topic; the node's sequential
/// call order enforces this, not a lock.
pub struct TransferJob {
    id: Uuid,
    topic: String,
    buffer: Bytes,
    options: TransferOptions,
    cursor: usize,
    state: TransferState,
}

impl TransferJob {
    pub fn new(topic: impl Into<String>, buffer: Bytes, options: TransferOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
            buffer,
            options,
            cursor: 0,
            state: TransferState::Idle,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Bytes already sent
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Companion topic carrying human-readable progress
    pub fn status_topic(&self) -> String {
        format!("{}/status", self.topic)
    }

    /// Publish every block, then the sentinel and the completion summary.
    ///
    /// A zero-length buffer publishes no blocks but still emits the sentinel
    /// and the completion summary, so consumers always observe a complete
    /// frame.
    pub async fn run<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
    ) -> Result<TransferReport, TransferError> {
        let len = self.buffer.len();
        let total = num_blocks(len, self.options.block_size);
        self.state = TransferState::InProgress;
        info!(
            job_id = %self.id,
            topic = %self.topic,
            bytes = len,
            block_size = self.options.block_size,
            blocks = total,
            "transfer started"
        );

        for index in 0..total {
            if let Err(e) = self.send_block(transport, index, total).await {
                self.state = TransferState::Aborted;
                error!(job_id = %self.id, block = index, "transfer aborted: {e}");
                return Err(TransferError::Block { index, source: e });
            }
        }

        if let Err(e) = self.finalize(transport).await {
            self.state = TransferState::Aborted;
            error!(job_id = %self.id, "transfer aborted during finalization: {e}");
            return Err(TransferError::Finalize(e));
        }

        self.state = TransferState::Completed;
        info!(job_id = %self.id, blocks = total, bytes = len, "transfer completed");
        Ok(TransferReport {
            job_id: self.id,
            blocks_sent: total,
            bytes_sent: len,
        })
    }

    async fn send_block<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        index: usize,
        total: usize,
    ) -> Result<(), TransportError> {
        tokio::time::sleep(self.options.inter_block_pause).await;

        let (begin, end) = block_range(index, self.options.block_size, self.buffer.len());
        transport
            .publish(
                &self.topic,
                self.buffer[begin..end].to_vec(),
                QosLevel::AtMostOnce,
                false,
            )
            .await?;
        self.cursor = end;

        if end < self.buffer.len() {
            let progress = format!(
                "Time: {}: Block {} of {} sent.",
                chrono::Utc::now().timestamp(),
                index + 1,
                total
            );
            transport
                .publish(
                    &self.status_topic(),
                    progress.into_bytes(),
                    QosLevel::AtMostOnce,
                    false,
                )
                .await?;
        }
        Ok(())
    }

    async fn finalize<T: Transport + ?Sized>(&self, transport: &T) -> Result<(), TransportError> {
        transport
            .publish(&self.topic, SENTINEL.to_vec(), QosLevel::AtMostOnce, false)
            .await?;

        let summary = format!("Time: {}: All bytes sent.", chrono::Utc::now().timestamp());
        transport
            .publish(
                &self.topic,
                summary.into_bytes(),
                QosLevel::AtMostOnce,
                false,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn num_blocks_is_ceiling_division() {
        assert_eq!(num_blocks(0, 1024), 0);
        assert_eq!(num_blocks(1, 1024), 1);
        assert_eq!(num_blocks(1024, 1024), 1);
        assert_eq!(num_blocks(1025, 1024), 2);
        assert_eq!(num_blocks(2500, 1024), 3);
    }

    #[test]
    fn spec_case_2500_over_1024() {
        let len = 2500;
        let bs = 1024;
        assert_eq!(num_blocks(len, bs), 3);
        assert_eq!(block_range(0, bs, len), (0, 1024));
        assert_eq!(block_range(1, bs, len), (1024, 2048));
        assert_eq!(block_range(2, bs, len), (2048, 2500));
    }

    proptest! {
        /// Block ranges tile the buffer exactly: in order, no overlap, no gap.
        #[test]
        fn block_ranges_reconstruct_the_buffer(len in 0usize..10_000, bs in 1usize..2_048) {
            let total = num_blocks(len, bs);
            let mut expected_begin = 0usize;
            for i in 0..total {
                let (begin, end) = block_range(i, bs, len);
                prop_assert_eq!(begin, expected_begin);
                prop_assert!(end > begin);
                prop_assert!(end - begin <= bs);
                expected_begin = end;
            }
            prop_assert_eq!(expected_begin, len);
        }

        #[test]
        fn every_block_but_the_last_is_full(len in 1usize..10_000, bs in 1usize..2_048) {
            let total = num_blocks(len, bs);
            for i in 0..total.saturating_sub(1) {
                let (begin, end) = block_range(i, bs, len);
                prop_assert_eq!(end - begin, bs);
            }
        }
    }
}
