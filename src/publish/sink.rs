use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::logger::Logger;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    Unavailable(String),
    Io(String),
}

/// External market-data outlet. Delivery is best effort: nothing here
/// survives a process restart.
pub trait Sink: Send {
    fn init(&mut self) -> Result<(), SinkError>;
    fn emit(&mut self, topic: &str, payload: &[u8]) -> Result<(), SinkError>;
}

/// Writes one JSON line per record to stdout.
pub struct StdoutSink;

impl Sink for StdoutSink {
    fn init(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    fn emit(&mut self, topic: &str, payload: &[u8]) -> Result<(), SinkError> {
        let data = String::from_utf8_lossy(payload);
        println!("{{\"topic\":\"{}\",\"data\":{}}}", topic, data);
        Ok(())
    }
}

/// Wraps an unreliable sink with a bounded retry buffer. When the inner sink
/// is unavailable, records queue up; once the buffer is full the oldest
/// record is dropped and logged. `emit` never blocks and never fails.
pub struct BufferedSink<S: Sink> {
    inner: S,
    buffer: VecDeque<(String, Vec<u8>)>,
    capacity: usize,
    logger: Arc<dyn Logger>,
}

impl<S: Sink> BufferedSink<S> {
    pub fn new(inner: S, capacity: usize, logger: Arc<dyn Logger>) -> Self {
        Self {
            inner,
            buffer: VecDeque::new(),
            capacity,
            logger,
        }
    }

    fn flush(&mut self) {
        while let Some((topic, payload)) = self.buffer.front() {
            match self.inner.emit(topic, payload) {
                Ok(()) => {
                    self.buffer.pop_front();
                }
                Err(_) => break,
            }
        }
    }
}

impl<S: Sink> Sink for BufferedSink<S> {
    fn init(&mut self) -> Result<(), SinkError> {
        self.inner.init()
    }

    fn emit(&mut self, topic: &str, payload: &[u8]) -> Result<(), SinkError> {
        self.buffer.push_back((topic.to_owned(), payload.to_vec()));
        if self.buffer.len() > self.capacity {
            self.buffer.pop_front();
            self.logger
                .log("warn", "sink buffer full, dropping oldest record");
        }
        self.flush();
        Ok(())
    }
}

/// Collects every emitted record in memory; used by tests and local tooling.
/// `gate` lets a test hold the worker inside `emit` to exercise
/// backpressure.
pub struct MemorySink {
    pub fail_init: bool,
    pub records: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    pub gate: Option<Arc<Mutex<()>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            fail_init: false,
            records: Arc::new(Mutex::new(vec![])),
            gate: None,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_init: true,
            ..Self::new()
        }
    }

    pub fn records(&self) -> Arc<Mutex<Vec<(String, Vec<u8>)>>> {
        Arc::clone(&self.records)
    }
}

impl Sink for MemorySink {
    fn init(&mut self) -> Result<(), SinkError> {
        if self.fail_init {
            return Err(SinkError::Unavailable("sink refused connection".to_owned()));
        }
        Ok(())
    }

    fn emit(&mut self, topic: &str, payload: &[u8]) -> Result<(), SinkError> {
        if let Some(gate) = &self.gate {
            let _held = gate.lock().unwrap();
        }
        self.records
            .lock()
            .unwrap()
            .push((topic.to_owned(), payload.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::StubLogger;

    /// Fails every emit until `available` flips.
    struct FlakySink {
        available: bool,
        delivered: Vec<String>,
    }

    impl Sink for FlakySink {
        fn init(&mut self) -> Result<(), SinkError> {
            Ok(())
        }

        fn emit(&mut self, topic: &str, _payload: &[u8]) -> Result<(), SinkError> {
            if !self.available {
                return Err(SinkError::Unavailable("down".to_owned()));
            }
            self.delivered.push(topic.to_owned());
            Ok(())
        }
    }

    #[test]
    fn test_buffered_sink_drops_oldest_when_full() {
        let logger = StubLogger::new();
        let entries = logger.entries();
        let mut sink = BufferedSink::new(
            FlakySink {
                available: false,
                delivered: vec![],
            },
            2,
            Arc::new(logger),
        );

        sink.emit("a", b"1").unwrap();
        sink.emit("b", b"2").unwrap();
        sink.emit("c", b"3").unwrap();

        // "a" was dropped and the drop was logged
        assert_eq!(sink.buffer.len(), 2);
        assert_eq!(sink.buffer.front().unwrap().0, "b");
        assert_eq!(entries.lock().unwrap().len(), 1);
        assert_eq!(entries.lock().unwrap()[0].0, "warn");
    }

    #[test]
    fn test_buffered_sink_flushes_once_available() {
        let logger = StubLogger::new();
        let mut sink = BufferedSink::new(
            FlakySink {
                available: false,
                delivered: vec![],
            },
            10,
            Arc::new(logger),
        );

        sink.emit("a", b"1").unwrap();
        sink.emit("b", b"2").unwrap();
        assert!(sink.inner.delivered.is_empty());

        sink.inner.available = true;
        sink.emit("c", b"3").unwrap();

        assert_eq!(sink.inner.delivered, vec!["a", "b", "c"]);
        assert!(sink.buffer.is_empty());
    }
}
