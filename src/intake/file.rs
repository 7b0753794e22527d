//! WAL-backed intake log
//!
//! Every publish is framed, appended and flushed before it is fanned out to
//! subscribers, so anything a subscriber has seen is also on disk.
//!
//! Checkpoints move the replay start forward at once. The file itself is
//! compacted once the released prefix reaches `compact_after` frames and
//! outweighs the live tail, so at most that many consumed frames survive a
//! restart (they replay as stale and are dropped by the first pass).

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use super::wal::{IntakeWalReader, IntakeWalWriter};
use super::{Delivery, DeliveryReceiver, IntakeKind, IntakeLog, ReplayFrom, Subscribers};
use crate::error::IntakeError;
use crate::models::MatchRequest;

/// File name of the active intake WAL inside the data directory
pub const INTAKE_WAL_FILE: &str = "intake.wal";

/// Released frames tolerated on disk before a compaction
pub const DEFAULT_COMPACT_AFTER: u64 = 4096;

struct Inner {
    writer: IntakeWalWriter,
    subscribers: Subscribers,
    /// `ReplayFrom::Start` begins here
    replay_from: u64,
}

pub struct WalIntakeLog {
    path: PathBuf,
    compact_after: u64,
    inner: Mutex<Inner>,
}

impl WalIntakeLog {
    /// Open (or create) the log file at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IntakeError> {
        let path = path.as_ref().to_path_buf();
        let writer = IntakeWalWriter::open(&path)?;
        let replay_from = writer.first_seq();
        Ok(Self {
            path,
            compact_after: DEFAULT_COMPACT_AFTER,
            inner: Mutex::new(Inner {
                writer,
                subscribers: Subscribers::default(),
                replay_from,
            }),
        })
    }

    pub fn with_compact_after(mut self, frames: u64) -> Self {
        self.compact_after = frames.max(1);
        self
    }

    /// Open `<data_dir>/intake.wal`
    pub fn open_in_dir(data_dir: impl AsRef<Path>) -> Result<Self, IntakeError> {
        Self::open(data_dir.as_ref().join(INTAKE_WAL_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IntakeLog for WalIntakeLog {
    fn publish(&self, kind: IntakeKind, request: &MatchRequest) -> Result<u64, IntakeError> {
        let mut inner = self.inner.lock()?;
        let offset = inner.writer.append(kind, request)?;
        inner.writer.flush()?;

        inner.subscribers.deliver(&Delivery {
            offset,
            kind,
            request: request.clone(),
        });
        Ok(offset)
    }

    fn subscribe(&self, from: ReplayFrom) -> Result<DeliveryReceiver, IntakeError> {
        let (tx, rx) = mpsc::unbounded_channel();

        // Holding the lock across the replay keeps history and live entries
        // contiguous: nothing can be appended in between.
        let mut inner = self.inner.lock()?;
        if from == ReplayFrom::Start {
            inner.writer.flush()?;
            let mut replayed = 0u64;
            IntakeWalReader::open(&self.path)?.replay(inner.replay_from, |offset, kind, request| {
                replayed += 1;
                tx.send(Delivery {
                    offset,
                    kind,
                    request,
                })
                .map_err(|_| IntakeError::Closed)?;
                Ok(true)
            })?;
            debug!(path = %self.path.display(), replayed, "Intake WAL replayed to subscriber");
        }
        inner.subscribers.add(tx);
        Ok(rx)
    }

    fn checkpoint(&self, upto: u64) -> Result<usize, IntakeError> {
        let mut inner = self.inner.lock()?;
        let upto = upto.min(inner.writer.next_seq());
        if upto <= inner.replay_from {
            return Ok(0);
        }
        let released = upto - inner.replay_from.max(inner.writer.first_seq());
        inner.replay_from = upto;

        // The newest frame always stays so a reopened log resumes the sequence
        let keep_from = upto.min(inner.writer.next_seq() - 1);
        let dead = keep_from.saturating_sub(inner.writer.first_seq());
        let live = inner.writer.next_seq() - keep_from;
        if dead >= self.compact_after && dead >= live {
            inner.writer.compact(&self.path, keep_from)?;
        }
        Ok(released as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        PathBuf::from(format!("target/test_intake_log_{}_{}", tag, std::process::id()))
    }

    fn req(id: u64, user: &str) -> MatchRequest {
        MatchRequest::new(id, user, user, vec!["t".into()], 0)
    }

    #[tokio::test]
    async fn test_publish_is_durable_and_delivered() {
        let dir = temp_dir("durable");
        let _ = std::fs::remove_dir_all(&dir);

        {
            let log = WalIntakeLog::open_in_dir(&dir).unwrap();
            let mut rx = log.subscribe(ReplayFrom::Latest).unwrap();
            assert_eq!(log.publish(IntakeKind::Join, &req(1, "a")).unwrap(), 1);

            let delivered = rx.recv().await.unwrap();
            assert_eq!(delivered.offset, 1);
            assert_eq!(delivered.request, req(1, "a"));
        }

        // A new process replays what the old one wrote, then continues
        let log = WalIntakeLog::open_in_dir(&dir).unwrap();
        let mut rx = log.subscribe(ReplayFrom::Start).unwrap();
        log.publish(IntakeKind::Requeue, &req(1, "a")).unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!((first.offset, first.kind), (1, IntakeKind::Join));
        assert_eq!((second.offset, second.kind), (2, IntakeKind::Requeue));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_latest_skips_history() {
        let dir = temp_dir("latest");
        let _ = std::fs::remove_dir_all(&dir);

        let log = WalIntakeLog::open_in_dir(&dir).unwrap();
        log.publish(IntakeKind::Join, &req(1, "old")).unwrap();
        let mut rx = log.subscribe(ReplayFrom::Latest).unwrap();
        log.publish(IntakeKind::Join, &req(2, "new")).unwrap();

        assert_eq!(rx.recv().await.unwrap().request.user_id, "new");
        assert!(rx.try_recv().is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_checkpoint_bounds_file_across_requeues() {
        let dir = temp_dir("checkpoint");
        let _ = std::fs::remove_dir_all(&dir);

        let log = WalIntakeLog::open_in_dir(&dir).unwrap().with_compact_after(8);
        let mut last = 0;
        for round in 1..=40 {
            last = log.publish(IntakeKind::Requeue, &req(1, "a")).unwrap();
            let released = log.checkpoint(last).unwrap();
            assert_eq!(released, if round == 1 { 0 } else { 1 });

            let on_disk = IntakeWalReader::open(log.path()).unwrap().scan().unwrap();
            assert!(on_disk.entries <= 9, "round {}: {} frames", round, on_disk.entries);
            assert_eq!(on_disk.next_seq, last + 1);
        }

        // Replay starts at the checkpoint, not at the oldest frame on disk
        let mut rx = log.subscribe(ReplayFrom::Start).unwrap();
        assert_eq!(rx.recv().await.unwrap().offset, last);
        assert!(rx.try_recv().is_err());
        // Checkpointing backwards is a no-op
        assert_eq!(log.checkpoint(1).unwrap(), 0);
        drop(log);

        // After a restart, replay covers at most the uncompacted prefix
        let log = WalIntakeLog::open_in_dir(&dir).unwrap();
        let mut rx = log.subscribe(ReplayFrom::Start).unwrap();
        let first = rx.recv().await.unwrap().offset;
        assert!(first + 8 >= last && first <= last);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
