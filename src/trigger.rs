//! Turn triggers
//!
//! The orchestrator suspends on [`TurnTrigger::next_signal`] between turns.

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::sync::mpsc;

/// What the user asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSignal {
    /// Start a new turn
    Begin,
    /// Leave the loop
    Quit,
}

/// Source of turn start and exit signals
#[async_trait]
pub trait TurnTrigger: Send {
    /// Wait for the next signal
    async fn next_signal(&mut self) -> TriggerSignal;
}

/// Line-based terminal trigger
///
/// An empty line begins a turn, `q` (or `quit`) quits. End of input and
/// Ctrl-C also quit.
pub struct StdinTrigger<R = BufReader<tokio::io::Stdin>> {
    lines: Lines<R>,
    interrupt: Option<mpsc::Receiver<()>>,
    prompt: bool,
}

impl StdinTrigger {
    /// Read signals from the process stdin
    ///
    /// Spawns one Ctrl-C listener for the trigger's lifetime, so an
    /// interrupt during a turn quits once the turn ends. Must be called
    /// within a tokio runtime.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    let _ = tx.send(()).await;
                }
                Err(e) => tracing::warn!(error = %e, "failed to listen for Ctrl-C"),
            }
        });

        Self::from_reader(BufReader::new(tokio::io::stdin())).with_interrupt(rx)
    }
}

impl Default for StdinTrigger {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: AsyncBufRead + Unpin + Send> StdinTrigger<R> {
    /// Read signals from any buffered reader
    #[must_use]
    pub fn from_reader(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            interrupt: None,
            prompt: true,
        }
    }

    /// Quit when `interrupt` receives a message
    #[must_use]
    pub fn with_interrupt(mut self, interrupt: mpsc::Receiver<()>) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    /// Disable the console prompt
    #[must_use]
    pub const fn quiet(mut self) -> Self {
        self.prompt = false;
        self
    }
}

async fn next_line_signal<R: AsyncBufRead + Unpin>(lines: &mut Lines<R>) -> TriggerSignal {
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match parse_line(&line) {
                Some(signal) => return signal,
                None => {
                    tracing::debug!(input = %line.trim(), "ignoring unrecognized input");
                }
            },
            Ok(None) => {
                tracing::debug!("input closed");
                return TriggerSignal::Quit;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to read input");
                return TriggerSignal::Quit;
            }
        }
    }
}

/// Resolve once an interrupt is received; never resolves without one
async fn interrupted(interrupt: Option<&mut mpsc::Receiver<()>>) {
    if let Some(rx) = interrupt
        && rx.recv().await.is_some()
    {
        return;
    }
    std::future::pending::<()>().await;
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> TurnTrigger for StdinTrigger<R> {
    async fn next_signal(&mut self) -> TriggerSignal {
        if self.prompt {
            println!("\nPress ENTER to record (or 'q' then ENTER to quit)...");
        }

        tokio::select! {
            biased;
            () = interrupted(self.interrupt.as_mut()) => {
                tracing::info!("interrupted");
                TriggerSignal::Quit
            }
            signal = next_line_signal(&mut self.lines) => signal,
        }
    }
}

/// Map one input line to a signal
fn parse_line(line: &str) -> Option<TriggerSignal> {
    match line.trim().to_ascii_lowercase().as_str() {
        "" => Some(TriggerSignal::Begin),
        "q" | "quit" | "exit" => Some(TriggerSignal::Quit),
        _ => None,
    }
}

/// Trigger fed from a channel; a closed channel quits
#[derive(Debug)]
pub struct ChannelTrigger {
    rx: mpsc::Receiver<TriggerSignal>,
}

impl ChannelTrigger {
    /// Create a trigger and the sender that drives it
    #[must_use]
    pub fn new(capacity: usize) -> (mpsc::Sender<TriggerSignal>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx })
    }
}

#[async_trait]
impl TurnTrigger for ChannelTrigger {
    async fn next_signal(&mut self) -> TriggerSignal {
        self.rx.recv().await.unwrap_or(TriggerSignal::Quit)
    }
}
