//! Drives one remote run and relays its terminal I/O.
//!
//! The relay walks a fixed, linear lifecycle:
//! `NotConnected -> Uploading -> Running -> Terminated`.
//! Files are uploaded in order, the run command follows, and from then on
//! every inbound message is either printed, answered with a line of local
//! input, or ends the loop.
//!
//! Local input is read concurrently with the socket, one line ahead of the
//! remote program's requests, so typed-ahead lines are picked up early and
//! the connection is serviced while the user is typing.

use std::{future::Future, sync::Arc, time::Duration};

use online_python_core::{
    Inbound, Outbound, RemoteSession, RunRequest, TrafficSink, TransportError,
};
use tokio::{
    io::{
        AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines, Stderr, Stdin,
        Stdout,
    },
    time::Instant,
};

use crate::{RelayConfig, TrafficLog};

/// Exit code for every local or transport failure.
pub const FAILURE_EXIT_CODE: i32 = 1;
/// Exit code after a local interrupt.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Relay error.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Relay lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    NotConnected,
    Uploading,
    Running,
    Terminated,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The remote program exited. `code` is absent if the remote side did not report one.
    Exited { code: Option<i32> },
    /// The remote side killed the session.
    Killed,
    /// The connection dropped before the program exited.
    Disconnected,
    /// No message arrived within the read timeout.
    TimedOut,
    /// Stopped by a local interrupt.
    Interrupted,
}

impl Termination {
    /// Process exit code for this outcome.
    ///
    /// Remote codes outside `0..=255` cannot be passed through and map to
    /// [`FAILURE_EXIT_CODE`].
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Exited {
                code: Some(code @ 0..=255),
            } => code,
            Self::Interrupted => INTERRUPTED_EXIT_CODE,
            Self::Exited { .. } | Self::Killed | Self::Disconnected | Self::TimedOut => {
                FAILURE_EXIT_CODE
            }
        }
    }
}

/// Local terminal: where input comes from and output goes to.
pub struct Console<I, O, E> {
    input: Lines<I>,
    output: O,
    error: E,
}

impl Console<BufReader<Stdin>, Stdout, Stderr> {
    /// Console over the process's standard streams.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
            tokio::io::stderr(),
        )
    }
}

impl<I, O, E> Console<I, O, E>
where
    I: AsyncBufRead + Unpin + Send,
    O: AsyncWrite + Unpin + Send,
    E: AsyncWrite + Unpin + Send,
{
    /// Create a console from its three streams.
    pub fn new(input: I, output: O, error: E) -> Self {
        Self {
            input: input.lines(),
            output,
            error,
        }
    }

    /// Split back into the three streams.
    pub fn into_parts(self) -> (I, O, E) {
        (self.input.into_inner(), self.output, self.error)
    }

    /// Read one line without its `\n` or `\r\n` terminator. `None` at end
    /// of input. Cancel safe.
    async fn read_line(&mut self) -> Result<Option<String>, std::io::Error> {
        self.input.next_line().await
    }

    async fn write_output(&mut self, text: &str) -> Result<(), std::io::Error> {
        write_chunk(&mut self.output, text).await
    }

    async fn write_error(&mut self, text: &str) -> Result<(), std::io::Error> {
        write_chunk(&mut self.error, text).await
    }
}

async fn write_chunk<W: AsyncWrite + Unpin>(writer: &mut W, text: &str) -> Result<(), std::io::Error> {
    writer.write_all(text.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

enum Next {
    Message(Inbound),
    Closed,
    Failed(TransportError),
}

/// Local input waiting to be matched with the remote program's requests.
#[derive(Debug, Default)]
struct PendingInput {
    line: Option<String>,
    requests: usize,
    closed: bool,
}

impl PendingInput {
    /// One line is read ahead; more stay in the local stream.
    const fn wants_line(&self) -> bool {
        !self.closed && self.line.is_none()
    }

    fn push(&mut self, line: Option<String>) {
        match line {
            Some(line) => self.line = Some(line),
            None => {
                tracing::debug!("Local input closed");
                self.closed = true;
            }
        }
    }

    /// Next line to send, if a request is outstanding and an answer is known.
    fn answer(&mut self) -> Option<String> {
        if self.requests == 0 {
            return None;
        }
        let line = match self.line.take() {
            Some(line) => line,
            None if self.closed => {
                tracing::warn!("Local input closed, sending an empty line");
                String::new()
            }
            None => return None,
        };
        self.requests -= 1;
        Some(line)
    }
}

/// Relay over one connected session.
pub struct SessionRelay<S> {
    session: S,
    state: RelayState,
    read_timeout: Option<Duration>,
}

impl<S: RemoteSession> SessionRelay<S> {
    /// Wrap a connected session.
    pub const fn new(session: S, read_timeout: Option<Duration>) -> Self {
        Self {
            session,
            state: RelayState::NotConnected,
            read_timeout,
        }
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> RelayState {
        self.state
    }

    /// Give back the session.
    pub fn into_inner(self) -> S {
        self.session
    }

    fn set_state(&mut self, state: RelayState) {
        tracing::info!(state = ?state, "State");
        self.state = state;
    }

    /// Upload the request, run it, and relay until the remote side is done.
    ///
    /// Resolving `interrupt` kills the remote program and ends the run.
    ///
    /// # Errors
    /// Returns error if the upload or run command cannot be sent, or if
    /// local output cannot be written.
    pub async fn run<I, O, E, F>(
        &mut self,
        request: &RunRequest,
        console: &mut Console<I, O, E>,
        interrupt: F,
    ) -> Result<Termination, RelayError>
    where
        I: AsyncBufRead + Unpin + Send,
        O: AsyncWrite + Unpin + Send,
        E: AsyncWrite + Unpin + Send,
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(interrupt);

        self.set_state(RelayState::Uploading);
        for file in request.files() {
            self.session.send(Outbound::Upload(file.clone())).await?;
        }
        self.session
            .send(Outbound::Run {
                args: request.args().to_vec(),
            })
            .await?;
        self.set_state(RelayState::Running);

        let limit = self.read_timeout;
        let idle = tokio::time::sleep(limit.unwrap_or_default());
        tokio::pin!(idle);
        let mut input = PendingInput::default();

        let termination = 'relay: loop {
            tokio::select! {
                biased;
                () = &mut interrupt => break self.interrupt().await,
                line = console.read_line(), if input.wants_line() => input.push(line?),
                next = self.next_inbound() => {
                    if let Some(limit) = limit {
                        idle.as_mut().reset(Instant::now() + limit);
                    }
                    let inbound = match next {
                        Next::Message(inbound) => inbound,
                        Next::Closed => {
                            tracing::error!("Connection closed before the remote program exited");
                            break Termination::Disconnected;
                        }
                        Next::Failed(e) => {
                            tracing::error!("{e}");
                            break Termination::Disconnected;
                        }
                    };
                    if let Some(termination) = dispatch(inbound, console, &mut input).await? {
                        break termination;
                    }
                }
                () = &mut idle, if limit.is_some() => {
                    tracing::error!("No message from the remote side within {limit:?}");
                    break Termination::TimedOut;
                }
            }

            while let Some(line) = input.answer() {
                if let Err(e) = self.session.send(Outbound::StdinLine(line)).await {
                    tracing::error!("{e}");
                    break 'relay Termination::Disconnected;
                }
            }
        };

        self.set_state(RelayState::Terminated);
        if let Err(e) = self.session.close().await {
            tracing::debug!("Failed to close connection: {e}");
        }
        Ok(termination)
    }

    async fn next_inbound(&mut self) -> Next {
        match self.session.recv().await {
            Ok(Some(inbound)) => Next::Message(inbound),
            Ok(None) => Next::Closed,
            Err(e) => Next::Failed(e),
        }
    }

    async fn interrupt(&mut self) -> Termination {
        tracing::warn!("Interrupted, killing the remote program");
        if let Err(e) = self.session.send(Outbound::Kill).await {
            tracing::debug!("Failed to send kill: {e}");
        }
        Termination::Interrupted
    }
}

/// Print or queue one inbound message. Returns the outcome if it ends the run.
async fn dispatch<I, O, E>(
    inbound: Inbound,
    console: &mut Console<I, O, E>,
    input: &mut PendingInput,
) -> Result<Option<Termination>, RelayError>
where
    I: AsyncBufRead + Unpin + Send,
    O: AsyncWrite + Unpin + Send,
    E: AsyncWrite + Unpin + Send,
{
    match inbound {
        Inbound::Output(text) => {
            tracing::info!("output: {text:?}");
            console.write_output(&text).await?;
        }
        Inbound::Error(text) => {
            tracing::info!("error: {text:?}");
            console.write_error(&text).await?;
        }
        Inbound::InputRequest(prompt) => {
            tracing::debug!(?prompt, "Remote program is waiting for input");
            input.requests += 1;
        }
        Inbound::Exit { message, code } => {
            if message.contains("Process exited") {
                tracing::info!(?code, "Exiting: {message:?}");
            } else {
                tracing::error!(?code, "Exiting: {message:?}");
            }
            return Ok(Some(Termination::Exited { code }));
        }
        Inbound::Killed => {
            tracing::error!("Remote session was killed");
            return Ok(Some(Termination::Killed));
        }
        Inbound::Unrecognized(raw) => {
            tracing::warn!("Ignoring unrecognized message: {raw:?}");
        }
    }
    Ok(None)
}

/// Connect to the configured endpoint and run `request` to completion.
///
/// # Errors
/// Returns error if the log file cannot be opened, the endpoint cannot be
/// reached, or the run cannot be started.
pub async fn start<I, O, E, F>(
    request: &RunRequest,
    config: &RelayConfig,
    console: &mut Console<I, O, E>,
    interrupt: F,
) -> Result<Termination, RelayError>
where
    I: AsyncBufRead + Unpin + Send,
    O: AsyncWrite + Unpin + Send,
    E: AsyncWrite + Unpin + Send,
    F: Future<Output = ()> + Send,
{
    tokio::pin!(interrupt);

    let traffic: Option<Arc<dyn TrafficSink>> = match &config.log_path {
        Some(path) => {
            let log: Arc<dyn TrafficSink> = Arc::new(TrafficLog::open(path).await?);
            Some(log)
        }
        None => None,
    };

    tracing::info!(state = ?RelayState::NotConnected, "State");
    let session = tokio::select! {
        biased;
        () = &mut interrupt => return Ok(Termination::Interrupted),
        session = online_python_transport::connect(&config.url, traffic) => session?,
    };

    let mut relay = SessionRelay::new(session, config.read_timeout);
    relay.run(request, console, interrupt).await
}
