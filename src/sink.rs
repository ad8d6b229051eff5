//! 结果接收端：流水线终态结果的持久化协作方接口。
//!
//! Result sinks.
//!
//! The pipeline never persists anything itself. It hands every terminal
//! [`PipelineResult`] to a [`ResultSink`]; applications plug their storage in here.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`ResultSink`] | Trait for result destinations |
//! | [`NoopResultSink`] | Default sink, discards results |
//! | [`InMemoryResultSink`] | Bounded in-memory sink for tests and tools |

use crate::pipeline::PipelineResult;
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn record(&self, result: &PipelineResult) -> Result<()>;
}

/// Discards every result.
pub struct NoopResultSink;

#[async_trait]
impl ResultSink for NoopResultSink {
    async fn record(&self, _: &PipelineResult) -> Result<()> {
        Ok(())
    }
}

pub fn noop_sink() -> Arc<dyn ResultSink> {
    Arc::new(NoopResultSink)
}

/// Keeps the most recent `max_results` results.
pub struct InMemoryResultSink {
    results: RwLock<VecDeque<PipelineResult>>,
    max_results: usize,
}

impl InMemoryResultSink {
    pub fn new(max: usize) -> Self {
        Self {
            results: RwLock::new(VecDeque::new()),
            max_results: max.max(1),
        }
    }

    pub fn results(&self) -> Vec<PipelineResult> {
        match self.results.read() {
            Ok(r) => r.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    pub fn get(&self, request_id: Uuid) -> Option<PipelineResult> {
        self.results()
            .into_iter()
            .find(|r| r.request_id() == request_id)
    }

    pub fn len(&self) -> usize {
        self.results().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ResultSink for InMemoryResultSink {
    async fn record(&self, result: &PipelineResult) -> Result<()> {
        let mut results = match self.results.write() {
            Ok(r) => r,
            Err(poisoned) => poisoned.into_inner(),
        };
        results.push_back(result.clone());
        while results.len() > self.max_results {
            results.pop_front();
        }
        Ok(())
    }
}
