//! Single-threaded cooperative loop that owns the feeding core.
//!
//! The loop thread owns the controller, the producer, the sink and the work-item
//! registry, so none of them need locking. Other threads reach the loop only
//! through channels:
//! - backpressure signals and quit requests arrive as [`LoopEvent`]s
//! - consumer notifications arrive as [`BusMessage`]s
//!
//! Every iteration dispatches all pending events before running the producer once,
//! so an `enough-data` that was emitted during a push takes effect before the next
//! chunk is read. With nothing scheduled the loop blocks on the channels instead of
//! spinning.

use std::io::Read;
use std::ops::ControlFlow;

use crossbeam_channel::{Receiver, Sender, select, unbounded};

use crate::bus::{self, BusMessage, BusSender};
use crate::controller::FeedController;
use crate::producer::{ChunkProducer, StopReason};
use crate::scheduler::{IdleQueue, Scheduler, WorkHandle};
use crate::sink::{ChunkSink, FeedSignals};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopEvent {
    NeedData(u32),
    EnoughData,
    Quit,
}

/// Why [`MainLoop::run`] returned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExitReason {
    /// Consumer played everything up to end of stream.
    Eos,
    /// Stop was requested through a [`QuitHandle`].
    Quit,
    /// A component posted an error on the bus.
    Error { source: String, message: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunOutcome {
    pub exit: ExitReason,
    /// Frames handed to the consumer.
    pub frames: u64,
    pub chunks: u64,
}

impl RunOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self.exit, ExitReason::Error { .. })
    }
}

/// Delivers backpressure signals to the loop thread.
#[derive(Clone, Debug)]
pub struct LoopSignals {
    tx: Sender<LoopEvent>,
}

impl FeedSignals for LoopSignals {
    fn need_data(&self, hint: u32) {
        let _ = self.tx.send(LoopEvent::NeedData(hint));
    }

    fn enough_data(&self) {
        let _ = self.tx.send(LoopEvent::EnoughData);
    }
}

/// Requests loop shutdown from any thread.
#[derive(Clone, Debug)]
pub struct QuitHandle {
    tx: Sender<LoopEvent>,
}

impl QuitHandle {
    pub fn quit(&self) {
        let _ = self.tx.send(LoopEvent::Quit);
    }
}

/// Channels a loop listens on. Created first so the consumer can be wired to them
/// before the loop itself exists.
pub struct LoopChannels {
    events_tx: Sender<LoopEvent>,
    events_rx: Receiver<LoopEvent>,
    bus_tx: BusSender,
    bus_rx: Receiver<BusMessage>,
}

impl Default for LoopChannels {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopChannels {
    pub fn new() -> Self {
        let (events_tx, events_rx) = unbounded();
        let (bus_tx, bus_rx) = bus::bus();
        Self {
            events_tx,
            events_rx,
            bus_tx,
            bus_rx,
        }
    }

    pub fn signals(&self) -> LoopSignals {
        LoopSignals {
            tx: self.events_tx.clone(),
        }
    }

    pub fn bus(&self) -> BusSender {
        self.bus_tx.clone()
    }

    pub fn quit_handle(&self) -> QuitHandle {
        QuitHandle {
            tx: self.events_tx.clone(),
        }
    }

    /// Block until the bus reports end of stream or an error, or quit is requested.
    ///
    /// For runs where feeding happens elsewhere; backpressure events are ignored.
    pub fn wait_for_exit(&self) -> ExitReason {
        loop {
            select! {
                recv(self.bus_rx) -> msg => match msg {
                    Ok(BusMessage::Eos) => {
                        tracing::info!("end of stream reached");
                        return ExitReason::Eos;
                    }
                    Ok(BusMessage::Error { source, message }) => {
                        tracing::error!(source = %source, "error received: {message}");
                        return ExitReason::Error { source, message };
                    }
                    Ok(BusMessage::Warning { source, message }) => {
                        tracing::warn!(source = %source, "{message}");
                    }
                    Err(_) => return ExitReason::Quit,
                },
                recv(self.events_rx) -> ev => match ev {
                    Ok(LoopEvent::Quit) | Err(_) => {
                        tracing::info!("quit requested");
                        return ExitReason::Quit;
                    }
                    Ok(_) => {}
                },
            }
        }
    }
}

pub struct MainLoop<R, S> {
    channels: LoopChannels,
    controller: FeedController,
    producer: ChunkProducer<R>,
    sink: S,
    idle: IdleQueue,
    /// Set once the producer can never run again (end of stream or read failure).
    finished: Option<StopReason>,
    exit: Option<ExitReason>,
}

impl<R: Read, S: ChunkSink> MainLoop<R, S> {
    pub fn new(channels: LoopChannels, producer: ChunkProducer<R>, sink: S) -> Self {
        Self {
            channels,
            controller: FeedController::new(),
            producer,
            sink,
            idle: IdleQueue::new(),
            finished: None,
            exit: None,
        }
    }

    pub fn quit_handle(&self) -> QuitHandle {
        self.channels.quit_handle()
    }

    pub fn controller(&self) -> &FeedController {
        &self.controller
    }

    pub fn producer(&self) -> &ChunkProducer<R> {
        &self.producer
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn exit_reason(&self) -> Option<&ExitReason> {
        self.exit.as_ref()
    }

    /// Run until end of stream, an error on the bus, or a quit request.
    pub fn run(&mut self) -> RunOutcome {
        tracing::debug!("main loop running");
        while self.exit.is_none() {
            self.iteration(true);
        }
        let exit = self.exit.clone().unwrap_or(ExitReason::Quit);
        let outcome = RunOutcome {
            exit,
            frames: self.controller.session().sample_count(),
            chunks: self.producer.chunks_pushed(),
        };
        tracing::debug!(?outcome, "main loop finished");
        outcome
    }

    /// One pass: dispatch pending events, then at most one work item.
    ///
    /// When `may_block` is set and nothing is pending or scheduled, waits for the next
    /// event. Returns whether anything was dispatched.
    pub fn iteration(&mut self, may_block: bool) -> bool {
        let mut dispatched = self.dispatch_pending();
        if self.exit.is_some() {
            return dispatched;
        }

        if let Some(handle) = self.idle.next_due() {
            self.dispatch_work(handle);
            return true;
        }

        if may_block {
            self.block_for_event();
            dispatched = true;
        }
        dispatched
    }

    fn dispatch_pending(&mut self) -> bool {
        let mut any = false;
        loop {
            if let Ok(msg) = self.channels.bus_rx.try_recv() {
                self.handle_bus(msg);
                any = true;
                continue;
            }
            if let Ok(ev) = self.channels.events_rx.try_recv() {
                self.handle_event(ev);
                any = true;
                continue;
            }
            return any;
        }
    }

    fn block_for_event(&mut self) {
        let bus_rx = self.channels.bus_rx.clone();
        let events_rx = self.channels.events_rx.clone();
        select! {
            recv(bus_rx) -> msg => match msg {
                Ok(msg) => self.handle_bus(msg),
                Err(_) => self.exit = Some(ExitReason::Quit),
            },
            recv(events_rx) -> ev => match ev {
                Ok(ev) => self.handle_event(ev),
                Err(_) => self.exit = Some(ExitReason::Quit),
            },
        }
    }

    fn handle_event(&mut self, ev: LoopEvent) {
        match ev {
            LoopEvent::NeedData(hint) => {
                if let Some(reason) = &self.finished {
                    tracing::debug!(hint, ?reason, "need-data after producer finished");
                    return;
                }
                self.controller.on_need_data(hint, &mut self.idle);
            }
            LoopEvent::EnoughData => self.controller.on_enough_data(&mut self.idle),
            LoopEvent::Quit => {
                tracing::info!("quit requested");
                self.exit = Some(ExitReason::Quit);
            }
        }
    }

    fn handle_bus(&mut self, msg: BusMessage) {
        match msg {
            BusMessage::Error { source, message } => {
                tracing::error!(source = %source, "error received: {message}");
                self.exit = Some(ExitReason::Error { source, message });
            }
            BusMessage::Warning { source, message } => {
                tracing::warn!(source = %source, "{message}");
            }
            BusMessage::Eos => {
                tracing::info!("end of stream reached");
                self.exit = Some(ExitReason::Eos);
            }
        }
    }

    fn dispatch_work(&mut self, handle: WorkHandle) {
        let flow = self
            .producer
            .produce(self.controller.session_mut(), &mut self.sink);
        let ControlFlow::Break(reason) = flow else {
            return;
        };

        self.idle.cancel(handle);
        self.controller.on_work_stopped(handle, &reason);
        match &reason {
            StopReason::SourceError(message) => self
                .channels
                .bus_tx
                .error(self.producer.source().label().to_string(), message.clone()),
            StopReason::Rejected(status) => self
                .channels
                .bus_tx
                .warning("feeder", format!("push refused: {status}")),
            StopReason::EndOfStream => {}
        }
        // A refusing consumer may ask again later; an exhausted or broken source cannot.
        if !matches!(reason, StopReason::Rejected(_)) {
            self.finished = Some(reason);
        }
    }
}
