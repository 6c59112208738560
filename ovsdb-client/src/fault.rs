//! Fatal connection faults and where they are reported.

use ovsdb_protocol::ProtocolError;
use std::fmt;
use tokio::sync::mpsc;

/// A condition after which the connection cannot continue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// The stream is not UTF-8.
    InvalidEncoding(&'static str),
    /// A document exceeded the frame length limit.
    FrameTooLong { length: usize, max: usize },
    /// The byte source ended.
    TransportClosed,
}

impl Fault {
    /// Maps a fatal protocol error to a fault. Non-fatal errors map to `None`.
    pub fn from_protocol(err: &ProtocolError) -> Option<Self> {
        match err {
            ProtocolError::InvalidEncoding(encoding) => Some(Fault::InvalidEncoding(encoding)),
            ProtocolError::FrameTooLong { length, max } => Some(Fault::FrameTooLong {
                length: *length,
                max: *max,
            }),
            _ => None,
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::InvalidEncoding(encoding) => {
                write!(f, "invalid stream encoding: detected {}", encoding)
            }
            Fault::FrameTooLong { length, max } => {
                write!(f, "frame too long: {} bytes (max {})", length, max)
            }
            Fault::TransportClosed => f.write_str("transport closed"),
        }
    }
}

/// Receives fatal faults so the owner of the transport can tear it down.
///
/// Called from the connection's read task; implementations must not block.
pub trait FaultSink: Send + Sync + 'static {
    fn report(&self, fault: &Fault);
}

/// Logs faults and does nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingFaultSink;

impl FaultSink for LoggingFaultSink {
    fn report(&self, fault: &Fault) {
        tracing::error!("connection fault: {}", fault);
    }
}

/// Forwards faults over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelFaultSink {
    tx: mpsc::UnboundedSender<Fault>,
}

impl ChannelFaultSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Fault>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl FaultSink for ChannelFaultSink {
    fn report(&self, fault: &Fault) {
        if self.tx.send(fault.clone()).is_err() {
            tracing::debug!("fault receiver dropped, fault was: {}", fault);
        }
    }
}
