//! Query engine: plan selection and lazy record streaming.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::predicate::{CompareOp, Predicate};
use crate::record::{Record, RecordStore};
use keel_common::{CancelToken, KeelError, Result};
use keel_index::IndexCatalog;

/// Executes predicates against record storage, using a field index when one
/// applies and falling back to a full scan otherwise.
pub struct QueryEngine {
    records: Arc<dyn RecordStore>,
    catalog: Arc<IndexCatalog>,
    cancel: CancelToken,
}

impl QueryEngine {
    /// Creates an engine over the given storage and index catalog.
    pub fn new(records: Arc<dyn RecordStore>, catalog: Arc<IndexCatalog>) -> Self {
        Self {
            records,
            catalog,
            cancel: CancelToken::new(),
        }
    }

    /// Returns the engine's ambient cancellation token.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Plans and starts executing a predicate.
    ///
    /// Index paths resolve their candidate record ids up front; records are
    /// materialized lazily as the stream is pulled. Scan paths evaluate the
    /// predicate per record while pulling.
    pub async fn execute(&self, predicate: &Predicate) -> Result<RecordStream> {
        self.cancel.check()?;

        if let Some(index) = self.catalog.get(predicate.field()) {
            let ids = match predicate {
                Predicate::Binary { op, value, .. } => match op {
                    CompareOp::Eq => Some(index.find_equal(value).await?),
                    CompareOp::Lt => Some(index.find_range(None, Some(value), true, false).await?),
                    CompareOp::Le => Some(index.find_range(None, Some(value), true, true).await?),
                    CompareOp::Gt => Some(index.find_range(Some(value), None, false, true).await?),
                    CompareOp::Ge => Some(index.find_range(Some(value), None, true, true).await?),
                },
                Predicate::Between { min, max, .. } => {
                    Some(index.find_range(Some(min), Some(max), true, true).await?)
                }
            };
            if let Some(ids) = ids {
                tracing::debug!(predicate = %predicate, candidates = ids.len(), "index path");
                return Ok(RecordStream {
                    cancel: self.cancel.clone(),
                    source: StreamSource::Index {
                        ids: ids.into(),
                        records: Arc::clone(&self.records),
                    },
                });
            }
        }

        tracing::debug!(predicate = %predicate, "full scan path");
        let rows = self.records.scan()?;
        Ok(RecordStream {
            cancel: self.cancel.clone(),
            source: StreamSource::Scan {
                rows: rows.into_iter(),
                predicate: predicate.clone(),
            },
        })
    }
}

enum StreamSource {
    /// Index-driven: resolve each candidate id through record storage.
    Index {
        ids: VecDeque<keel_common::RecordId>,
        records: Arc<dyn RecordStore>,
    },
    /// Full scan: evaluate the predicate per record.
    Scan {
        rows: std::vec::IntoIter<(keel_common::RecordId, Record)>,
        predicate: Predicate,
    },
}

/// Lazy sequence of query results.
///
/// Pull with [`next`](RecordStream::next) until it returns `Ok(None)`.
pub struct RecordStream {
    cancel: CancelToken,
    source: StreamSource,
}

impl RecordStream {
    /// Produces the next matching record.
    ///
    /// On the index path, an id that record storage cannot resolve is an
    /// `IndexInconsistency` error.
    pub async fn next(&mut self) -> Result<Option<Record>> {
        self.cancel.check()?;
        match &mut self.source {
            StreamSource::Index { ids, records } => match ids.pop_front() {
                None => Ok(None),
                Some(id) => match records.get(id)? {
                    Some(record) => Ok(Some(record)),
                    None => Err(KeelError::IndexInconsistency {
                        record_id: id.raw(),
                    }),
                },
            },
            StreamSource::Scan { rows, predicate } => {
                for (_, record) in rows.by_ref() {
                    if predicate.evaluate(&record)? {
                        return Ok(Some(record));
                    }
                }
                Ok(None)
            }
        }
    }

    /// Drains the stream into a vector.
    pub async fn collect(mut self) -> Result<Vec<Record>> {
        let mut out = Vec::new();
        while let Some(record) = self.next().await? {
            out.push(record);
        }
        Ok(out)
    }
}
