//! Scripted in-process remote client shared by the integration tests

#![allow(dead_code)]

use ai_edit_pipeline::client::RemoteAiClient;
use ai_edit_pipeline::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

type Reply<T> = Box<dyn Fn(usize) -> Result<T> + Send + Sync>;

/// Remote client whose replies are scripted per call number (1-based).
pub struct ScriptedClient {
    analyze: Reply<String>,
    generate: Reply<Bytes>,
    analyze_delay: Duration,
    generate_delay: Duration,
    pub analyze_calls: AtomicUsize,
    pub generate_calls: AtomicUsize,
    pub analyze_gauge: Gauge,
    pub generate_gauge: Gauge,
    pub prompts: Mutex<Vec<String>>,
}

/// Current and peak number of calls in flight.
#[derive(Default)]
pub struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    fn enter(&self) -> InFlight<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        InFlight(&self.current)
    }
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self {
            analyze: Box::new(|_| Ok("a red car on a street".to_string())),
            generate: Box::new(|_| Ok(Bytes::from_static(b"edited-image-bytes"))),
            analyze_delay: Duration::ZERO,
            generate_delay: Duration::ZERO,
            analyze_calls: AtomicUsize::new(0),
            generate_calls: AtomicUsize::new(0),
            analyze_gauge: Gauge::default(),
            generate_gauge: Gauge::default(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn analyze_with<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) -> Result<String> + Send + Sync + 'static,
    {
        self.analyze = Box::new(f);
        self
    }

    pub fn generate_with<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) -> Result<Bytes> + Send + Sync + 'static,
    {
        self.generate = Box::new(f);
        self
    }

    pub fn analyze_delay(mut self, d: Duration) -> Self {
        self.analyze_delay = d;
        self
    }

    pub fn generate_delay(mut self, d: Duration) -> Self {
        self.generate_delay = d;
        self
    }

    pub fn analyze_count(&self) -> usize {
        self.analyze_calls.load(Ordering::SeqCst)
    }

    pub fn generate_count(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    async fn tracked<T>(gauge: &Gauge, delay: Duration, reply: Result<T>) -> Result<T> {
        // decremented even when the caller drops this future mid-sleep
        let _guard = gauge.enter();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        reply
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteAiClient for ScriptedClient {
    async fn analyze(&self, _image: &Bytes, _timeout: Duration) -> Result<String> {
        let n = self.analyze_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Self::tracked(&self.analyze_gauge, self.analyze_delay, (self.analyze)(n)).await
    }

    async fn generate(
        &self,
        _image: &Bytes,
        _mask: Option<&Bytes>,
        prompt: &str,
        _timeout: Duration,
    ) -> Result<Bytes> {
        let n = self.generate_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.prompts.lock().unwrap().push(prompt.to_string());
        Self::tracked(&self.generate_gauge, self.generate_delay, (self.generate)(n)).await
    }
}

pub fn transient() -> Error {
    Error::transient("connection reset by peer")
}

/// A JPEG-looking payload of `len` bytes.
pub fn jpeg(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    if len >= 3 {
        data[..3].copy_from_slice(&[0xFF, 0xD8, 0xFF]);
    }
    data
}
