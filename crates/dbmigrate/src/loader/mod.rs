//! Batched insertion of transcoded records into the destination.

use tracing::debug;

use crate::config::DEFAULT_BATCH_SIZE;
use crate::core::TargetWriter;
use crate::error::{MigrateError, Result};
use crate::transcode::RecordMap;

/// Writes records in consecutive chunks of at most `batch_size`.
///
/// Each chunk is one insert statement. Chunks already written stay written
/// when a later chunk fails.
#[derive(Debug, Clone, Copy)]
pub struct BatchLoader {
    batch_size: usize,
}

impl BatchLoader {
    /// Create a loader; a batch size of zero is a configuration error.
    pub fn new(batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(MigrateError::Config(
                "batch_size must be at least 1".to_string(),
            ));
        }
        Ok(Self { batch_size })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Insert `records` into `table`, returning the number of rows written.
    ///
    /// On failure the error carries the 0-based index of the failing chunk and
    /// the number of rows committed before it.
    pub async fn load(
        &self,
        writer: &dyn TargetWriter,
        table: &str,
        records: &[RecordMap],
    ) -> Result<u64> {
        let mut committed: u64 = 0;

        for (chunk_index, chunk) in records.chunks(self.batch_size).enumerate() {
            match writer.insert_chunk(table, chunk).await {
                Ok(written) => {
                    committed += written;
                    debug!(
                        "{}: chunk {} wrote {} rows ({} total)",
                        table, chunk_index, written, committed
                    );
                }
                Err(e) => {
                    return Err(MigrateError::Load {
                        table: table.to_string(),
                        chunk_index,
                        rows_committed: committed,
                        message: e.to_string(),
                    });
                }
            }
        }

        Ok(committed)
    }
}

impl Default for BatchLoader {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SqlValue;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::sync::Mutex;

    /// Records chunk sizes and fails on a chosen chunk.
    struct RecordingWriter {
        chunks: Mutex<Vec<usize>>,
        fail_on: Option<usize>,
    }

    impl RecordingWriter {
        fn new(fail_on: Option<usize>) -> Self {
            Self {
                chunks: Mutex::new(Vec::new()),
                fail_on,
            }
        }
    }

    #[async_trait]
    impl TargetWriter for RecordingWriter {
        async fn set_foreign_key_checks(&self, _enabled: bool) -> Result<()> {
            Ok(())
        }

        async fn clear_table(&self, _table: &str) -> Result<()> {
            Ok(())
        }

        async fn insert_chunk(&self, _table: &str, records: &[RecordMap]) -> Result<u64> {
            let mut chunks = self.chunks.lock().unwrap();
            if self.fail_on == Some(chunks.len()) {
                return Err(MigrateError::Config("duplicate key".into()));
            }
            chunks.push(records.len());
            Ok(records.len() as u64)
        }

        async fn row_count(&self, _table: &str) -> Result<i64> {
            Ok(0)
        }

        async fn ping(&self) -> Result<()> {
            Ok(())
        }

        fn db_type(&self) -> &str {
            "recording"
        }

        async fn close(&self) {}
    }

    fn records(n: usize) -> Vec<RecordMap> {
        (0..n)
            .map(|i| {
                let mut r = RecordMap::new();
                r.insert("id".to_string(), SqlValue::I64(i as i64));
                r
            })
            .collect()
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        assert!(BatchLoader::new(0).is_err());
        assert_eq!(BatchLoader::default().batch_size(), 100);
    }

    #[tokio::test]
    async fn test_chunks_cover_all_records() {
        let writer = RecordingWriter::new(None);
        let loader = BatchLoader::new(100).unwrap();

        let written = loader.load(&writer, "t", &records(250)).await.unwrap();

        assert_eq!(written, 250);
        assert_eq!(*writer.chunks.lock().unwrap(), vec![100, 100, 50]);
    }

    #[tokio::test]
    async fn test_empty_input_issues_no_statement() {
        let writer = RecordingWriter::new(Some(0));
        let loader = BatchLoader::new(10).unwrap();

        let written = loader.load(&writer, "t", &[]).await.unwrap();

        assert_eq!(written, 0);
        assert!(writer.chunks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_reports_chunk_and_committed_rows() {
        let writer = RecordingWriter::new(Some(1));
        let loader = BatchLoader::new(100).unwrap();

        let err = loader.load(&writer, "child", &records(250)).await.unwrap_err();

        match err {
            MigrateError::Load {
                table,
                chunk_index,
                rows_committed,
                message,
            } => {
                assert_eq!(table, "child");
                assert_eq!(chunk_index, 1);
                assert_eq!(rows_committed, 100);
                assert!(message.contains("duplicate key"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(*writer.chunks.lock().unwrap(), vec![100]);
    }

    proptest! {
        #[test]
        fn prop_chunks_partition_records(count in 0usize..500, batch_size in 1usize..120) {
            let writer = RecordingWriter::new(None);
            let loader = BatchLoader::new(batch_size).unwrap();
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();

            let written = runtime
                .block_on(loader.load(&writer, "t", &records(count)))
                .unwrap();

            let chunks = writer.chunks.lock().unwrap();
            prop_assert_eq!(written, count as u64);
            prop_assert_eq!(chunks.len(), count.div_ceil(batch_size));
            prop_assert_eq!(chunks.iter().sum::<usize>(), count);
            prop_assert!(chunks.iter().all(|&c| c >= 1 && c <= batch_size));
        }
    }
}
