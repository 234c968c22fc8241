//! Event processors: the pluggable unit of work.
//!
//! The pipeline is processor-agnostic. Consumers and the DLQ reprocessor are
//! handed an `Arc<dyn EventProcessor>` and only ever look at the outcome.
//!
//! Processors must tolerate redelivery (at-least-once). A processor that
//! performs partial side effects before failing will see the same event again.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

use thiserror::Error;

use eventline_core::Event;

/// Failure reported by a processor.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ProcessingError(String);

impl ProcessingError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

pub type ProcessResult = Result<(), ProcessingError>;

pub trait EventProcessor: Send + Sync {
    fn process(&self, event: &Event) -> ProcessResult;
}

impl<F> EventProcessor for F
where
    F: Fn(&Event) -> ProcessResult + Send + Sync,
{
    fn process(&self, event: &Event) -> ProcessResult {
        self(event)
    }
}

/// Run `processor` on `event`, turning a panic into a [`ProcessingError`].
///
/// A misbehaving processor must not take its worker down with it.
pub fn invoke(processor: &dyn EventProcessor, event: &Event) -> ProcessResult {
    catch_unwind(AssertUnwindSafe(|| processor.process(event))).unwrap_or_else(|panic| {
        Err(ProcessingError::new(format!(
            "processor panicked: {}",
            panic_message(panic.as_ref())
        )))
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Demo behavior used by the bundled binaries.
///
/// - `fail`: always fails
/// - `retry`: fails on first delivery, succeeds once reprocessed
/// - anything else: succeeds
#[derive(Debug, Default, Clone, Copy)]
pub struct DemoEventProcessor;

impl EventProcessor for DemoEventProcessor {
    fn process(&self, event: &Event) -> ProcessResult {
        match event.event_type.as_str() {
            "fail" => Err(ProcessingError::new("simulated processing error")),
            "retry" if event.retry_count == 0 => Err(ProcessingError::new(
                "simulated transient error (succeeds on retry)",
            )),
            _ => {
                tracing::debug!(event_id = event.id, event_type = %event.event_type, "processed event");
                Ok(())
            }
        }
    }
}

/// Accepts every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProcessor;

impl EventProcessor for NoopProcessor {
    fn process(&self, _event: &Event) -> ProcessResult {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventline_core::Payload;

    fn event(event_type: &str, retry_count: u32) -> Event {
        Event::new(1, event_type, Payload::new()).with_retry_count(retry_count)
    }

    #[test]
    fn demo_processor_routes_by_type() {
        let p = DemoEventProcessor;

        assert!(p.process(&event("test", 0)).is_ok());
        assert!(p.process(&event("fail", 0)).is_err());
        assert!(p.process(&event("fail", 5)).is_err());
        assert!(p.process(&event("retry", 0)).is_err());
        assert!(p.process(&event("retry", 1)).is_ok());
    }

    #[test]
    fn closures_are_processors() {
        let only_even = |e: &Event| {
            if e.id % 2 == 0 {
                Ok(())
            } else {
                Err(ProcessingError::new("odd"))
            }
        };

        assert!(invoke(&only_even, &Event::new(2, "x", Payload::new())).is_ok());
        assert_eq!(
            invoke(&only_even, &Event::new(3, "x", Payload::new())),
            Err(ProcessingError::new("odd"))
        );
    }

    #[test]
    fn invoke_converts_panics_into_failures() {
        let explodes = |_: &Event| -> ProcessResult { panic!("boom") };

        let err = invoke(&explodes, &event("test", 0)).unwrap_err();

        assert!(err.message().contains("boom"));
    }
}
