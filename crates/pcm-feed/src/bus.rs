//! Out-of-band notifications from the consumer to whoever runs the loop.

use crossbeam_channel::{Receiver, Sender, unbounded};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BusMessage {
    /// A component failed; the run should end.
    Error { source: String, message: String },
    Warning { source: String, message: String },
    /// Everything up to end of stream has been played.
    Eos,
}

/// Posting side of the bus. Cheap to clone; usable from any thread.
#[derive(Clone, Debug)]
pub struct BusSender {
    tx: Sender<BusMessage>,
}

/// Create a bus, returning the posting side and the receiving side.
pub fn bus() -> (BusSender, Receiver<BusMessage>) {
    let (tx, rx) = unbounded();
    (BusSender { tx }, rx)
}

impl BusSender {
    pub fn post(&self, msg: BusMessage) {
        // Receiver gone means nobody is running the loop anymore.
        let _ = self.tx.send(msg);
    }

    pub fn error(&self, source: impl Into<String>, message: impl Into<String>) {
        self.post(BusMessage::Error {
            source: source.into(),
            message: message.into(),
        });
    }

    pub fn warning(&self, source: impl Into<String>, message: impl Into<String>) {
        self.post(BusMessage::Warning {
            source: source.into(),
            message: message.into(),
        });
    }

    pub fn eos(&self) {
        self.post(BusMessage::Eos);
    }
}
