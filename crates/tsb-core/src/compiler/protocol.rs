//! Messages exchanged between the pool and its unit threads.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::Receiver;

use tokio::sync::mpsc::UnboundedSender;

use super::{CompileRequest, CompilerFactory, DependencyReport};

/// Pool to unit.
pub(crate) struct UnitRequest {
    pub reference: u64,
    pub request: CompileRequest,
}

/// Unit to pool.
#[derive(Debug)]
pub(crate) enum UnitMessage {
    Ready,
    InitFailed {
        message: String,
    },
    Deps {
        reference: u64,
        report: DependencyReport,
    },
    Code {
        reference: u64,
        code: String,
    },
    Error {
        reference: u64,
        message: String,
        stack: Option<String>,
        /// The unit stopped after sending this message.
        fatal: bool,
    },
}

impl UnitMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            UnitMessage::Ready => "ready",
            UnitMessage::InitFailed { .. } => "init-failed",
            UnitMessage::Deps { .. } => "deps",
            UnitMessage::Code { .. } => "code",
            UnitMessage::Error { .. } => "error",
        }
    }
}

pub(crate) type EventSender = UnboundedSender<(usize, UnitMessage)>;

/// Body of a unit thread: build the compiler, then serve requests until the
/// pool drops the request channel.
pub(crate) fn run_unit(
    unit: usize,
    factory: Arc<dyn CompilerFactory>,
    requests: Receiver<UnitRequest>,
    events: EventSender,
) {
    let created = panic::catch_unwind(AssertUnwindSafe(|| factory.create(unit)));
    let mut compiler = match created {
        Ok(Ok(compiler)) => compiler,
        Ok(Err(err)) => {
            let _ = events.send((unit, UnitMessage::InitFailed { message: err.message }));
            return;
        }
        Err(payload) => {
            let _ = events.send((
                unit,
                UnitMessage::InitFailed {
                    message: panic_message(payload.as_ref()),
                },
            ));
            return;
        }
    };

    if events.send((unit, UnitMessage::Ready)).is_err() {
        return;
    }

    while let Ok(UnitRequest { reference, request }) = requests.recv() {
        let deps_events = events.clone();
        let mut report = move |report: DependencyReport| {
            let _ = deps_events.send((unit, UnitMessage::Deps { reference, report }));
        };

        let outcome =
            panic::catch_unwind(AssertUnwindSafe(|| compiler.compile(&request, &mut report)));

        let (message, stop) = match outcome {
            Ok(Ok(code)) => (UnitMessage::Code { reference, code }, false),
            Ok(Err(err)) => (
                UnitMessage::Error {
                    reference,
                    message: err.message,
                    stack: err.stack,
                    fatal: false,
                },
                false,
            ),
            Err(payload) => (
                UnitMessage::Error {
                    reference,
                    message: format!("compiler panicked: {}", panic_message(payload.as_ref())),
                    stack: None,
                    fatal: true,
                },
                true,
            ),
        };

        if events.send((unit, message)).is_err() || stop {
            return;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
