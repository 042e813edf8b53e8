// ============================================================================
// Serialized Access
// One writer at a time: an exclusive lock, or a single-consumer queue
// ============================================================================

use super::{MatchingEngine, OrderOutcome};
use crate::domain::{Price, Quantity, TraderId};
use crate::error::{ExchangeError, ExchangeResult};
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

// ============================================================================
// Shared Exchange (lock)
// ============================================================================

/// Cloneable handle; every call holds the engine lock for its whole run
#[derive(Clone)]
pub struct SharedExchange {
    inner: Arc<Mutex<MatchingEngine>>,
}

impl SharedExchange {
    pub fn new(engine: MatchingEngine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    /// Run `f` with exclusive access to the engine
    pub fn with<R>(&self, f: impl FnOnce(&mut MatchingEngine) -> R) -> R {
        let mut engine = self.inner.lock();
        f(&mut engine)
    }

    pub fn buy(
        &self,
        trader: &TraderId,
        symbol: &str,
        amount: Quantity,
        price: Price,
    ) -> ExchangeResult<OrderOutcome> {
        self.with(|engine| engine.buy(trader, symbol, amount, price))
    }

    pub fn sell(
        &self,
        trader: &TraderId,
        symbol: &str,
        amount: Quantity,
        price: Price,
    ) -> ExchangeResult<OrderOutcome> {
        self.with(|engine| engine.sell(trader, symbol, amount, price))
    }

    /// Take the engine back once no other handle is alive
    pub fn into_inner(self) -> Result<MatchingEngine, Self> {
        Arc::try_unwrap(self.inner)
            .map(Mutex::into_inner)
            .map_err(|inner| Self { inner })
    }
}

// ============================================================================
// Sequencer (command queue)
// ============================================================================

type Command = Box<dyn FnOnce(&mut MatchingEngine) + Send>;

/// Owns the engine on a dedicated thread and applies queued commands in
/// arrival order, one at a time.
pub struct Sequencer {
    handle: SequencerHandle,
    worker: JoinHandle<MatchingEngine>,
}

impl Sequencer {
    /// Start the consumer thread with an unbounded queue
    pub fn spawn(engine: MatchingEngine) -> std::io::Result<Self> {
        let (sender, receiver) = channel::unbounded();
        Self::start(engine, sender, receiver)
    }

    /// Start the consumer thread; producers block while `capacity`
    /// commands are waiting
    pub fn with_capacity(engine: MatchingEngine, capacity: usize) -> std::io::Result<Self> {
        let (sender, receiver) = channel::bounded(capacity);
        Self::start(engine, sender, receiver)
    }

    fn start(
        mut engine: MatchingEngine,
        sender: Sender<Command>,
        receiver: Receiver<Command>,
    ) -> std::io::Result<Self> {
        let worker = thread::Builder::new()
            .name("exchange-sequencer".to_string())
            .spawn(move || {
                tracing::debug!("Sequencer started");
                for command in receiver.iter() {
                    command(&mut engine);
                }
                tracing::debug!("Sequencer stopped");
                engine
            })?;

        Ok(Self {
            handle: SequencerHandle { sender },
            worker,
        })
    }

    pub fn handle(&self) -> SequencerHandle {
        self.handle.clone()
    }

    /// Close the queue and wait for the consumer to drain it.
    ///
    /// Blocks until every outstanding `SequencerHandle` has been dropped.
    /// Returns `None` if the consumer thread panicked.
    pub fn shutdown(self) -> Option<MatchingEngine> {
        drop(self.handle);
        self.worker.join().ok()
    }
}

/// Producer side of a `Sequencer`
#[derive(Clone)]
pub struct SequencerHandle {
    sender: Sender<Command>,
}

impl SequencerHandle {
    /// Queue `f` and wait for its result
    pub fn execute<R, F>(&self, f: F) -> ExchangeResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut MatchingEngine) -> R + Send + 'static,
    {
        let (reply, result) = channel::bounded(1);
        let command: Command = Box::new(move |engine| {
            // The caller may have gone away; the command still ran.
            let _ = reply.send(f(engine));
        });

        self.sender
            .send(command)
            .map_err(|_| ExchangeError::EngineStopped)?;
        result.recv().map_err(|_| ExchangeError::EngineStopped)
    }

    pub fn deposit_currency(&self, trader: TraderId, amount: u64) -> ExchangeResult<()> {
        self.execute(move |engine| engine.deposit_currency(&trader, amount))?
    }

    pub fn buy(
        &self,
        trader: TraderId,
        symbol: impl Into<String>,
        amount: Quantity,
        price: Price,
    ) -> ExchangeResult<OrderOutcome> {
        let symbol = symbol.into();
        self.execute(move |engine| engine.buy(&trader, &symbol, amount, price))?
    }

    pub fn sell(
        &self,
        trader: TraderId,
        symbol: impl Into<String>,
        amount: Quantity,
        price: Price,
    ) -> ExchangeResult<OrderOutcome> {
        let symbol = symbol.into();
        self.execute(move |engine| engine.sell(&trader, &symbol, amount, price))?
    }
}
