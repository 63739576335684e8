//! Streaming `(row id, bounding box)` pairs out of a dataset.

use std::collections::VecDeque;

use log::{debug, info};

use crate::bounding_box::BoundingBox;
use crate::dataset::{GeoDataset, GeometryBatches, RowId};
use crate::errors::SindexResult;
use crate::geometry::extract_bounds;

/// Observer for index build progress.
///
/// Called once before each batch is decoded with the number of rows already
/// streamed and the dataset's total row count. Any `Fn(u64, u64)` closure is a
/// listener.
pub trait ProgressListener: Send + Sync {
    fn on_progress(&self, rows_done: u64, total_rows: u64);
}

impl<F> ProgressListener for F
where
    F: Fn(u64, u64) + Send + Sync,
{
    fn on_progress(&self, rows_done: u64, total_rows: u64) {
        self(rows_done, total_rows)
    }
}

/// Listener that reports progress through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressListener for LogProgress {
    fn on_progress(&self, rows_done: u64, total_rows: u64) {
        if total_rows == 0 {
            return;
        }
        info!(
            "Indexing {}/{} rows ({:.1}%)",
            rows_done,
            total_rows,
            rows_done as f64 * 100.0 / total_rows as f64
        );
    }
}

/// Lazily yields the bounding box of every row, in row order.
///
/// Row ids are assigned from a running offset over the batches actually
/// produced, so they stay correct when the final batch (or any other) is
/// shorter than the requested batch size. The first error ends the stream.
pub struct BoundsStream<'a> {
    batches: GeometryBatches<'a>,
    pending: VecDeque<BoundingBox>,
    next_row: RowId,
    total_rows: u64,
    progress: Option<&'a dyn ProgressListener>,
    done: bool,
}

impl<'a> BoundsStream<'a> {
    /// Starts a scan of `dataset`'s geometry column.
    ///
    /// # Errors
    ///
    /// `DatasetUnavailable` if the dataset or its geometry column cannot be
    /// read. Failures after the scan starts surface through the iterator.
    pub fn open(
        dataset: &'a dyn GeoDataset,
        batch_size: usize,
        progress: Option<&'a dyn ProgressListener>,
    ) -> SindexResult<BoundsStream<'a>> {
        let total_rows = dataset.total_rows()?;
        let batches = dataset.geometry_batches(batch_size)?;
        debug!(
            "Streaming bounds from {} ({} rows, batch size {})",
            dataset.path().display(),
            total_rows,
            batch_size
        );

        Ok(BoundsStream {
            batches,
            pending: VecDeque::new(),
            next_row: 0,
            total_rows,
            progress,
            done: false,
        })
    }

    /// Total rows the dataset reports.
    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    fn fill(&mut self) -> Option<SindexResult<()>> {
        while self.pending.is_empty() {
            if let Some(listener) = self.progress {
                listener.on_progress(self.next_row, self.total_rows);
            }
            let batch = match self.batches.next()? {
                Ok(batch) => batch,
                Err(e) => return Some(Err(e)),
            };
            let first_row = self.next_row;
            match extract_bounds(&batch, first_row) {
                Ok(boxes) => {
                    self.next_row += boxes.len() as u64;
                    self.pending.extend(boxes);
                }
                Err(e) => return Some(Err(e)),
            }
        }
        Some(Ok(()))
    }
}

impl Iterator for BoundsStream<'_> {
    type Item = SindexResult<(RowId, BoundingBox)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.fill() {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                self.done = true;
                return Some(Err(e));
            }
            None => {
                self.done = true;
                return None;
            }
        }

        let row_id = self.next_row - self.pending.len() as u64;
        self.pending.pop_front().map(|bbox| Ok((row_id, bbox)))
    }
}
