//! TCP front end.
//!
//! One task per connection decodes commands and forwards them to a single
//! dispatch thread, which applies each command to the shared
//! [`AudioHandler`] and publishes the unit it changed before taking the next
//! one. A tick task sweeps fades at the configured period. Every change
//! either produces is published on the [`ObserverHub`].

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use auralis_audio::{AudioHandler, RodioEngine, SimulatedEngine, UnitSnapshot};
use auralis_common::EngineError;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::command::{Command, Reply};
use crate::config::{EngineKind, ServerConfig};
use crate::error::{CommandError, ServerError, ServerResult};
use crate::hub::ObserverHub;

/// Build a handler on the engine named by `config`.
pub fn build_handler(config: &ServerConfig) -> ServerResult<AudioHandler> {
    let handler = match config.engine {
        EngineKind::Rodio => match RodioEngine::open(config.audio_device.as_deref()) {
            Ok(engine) => AudioHandler::new(engine),
            Err(EngineError::DeviceNotFound(name)) => {
                match RodioEngine::device_names() {
                    Ok(names) => warn!("Audio device \"{name}\" not found; available: {names:?}"),
                    Err(e) => warn!("Audio device \"{name}\" not found; listing failed: {e}"),
                }
                return Err(EngineError::DeviceNotFound(name).into());
            },
            Err(e) => return Err(e.into()),
        },
        EngineKind::Simulated => AudioHandler::new(SimulatedEngine::new()),
    };
    Ok(handler.with_search_path(config.cache_directory.clone()))
}

/// Commands waiting for the dispatch thread.
const DISPATCH_QUEUE: usize = 256;

/// State shared by every connection task.
struct Shared {
    handler: Arc<AudioHandler>,
    hub: ObserverHub,
    cache_directory: PathBuf,
    max_message_size: usize,
    max_upload_size: u64,
}

impl Shared {
    fn publish_recent(&self) {
        self.hub.publish_all(self.handler.recently_modified_unit());
    }
}

/// A command handed to the dispatch thread.
struct Request {
    command: Command,
    reply: oneshot::Sender<Option<Reply>>,
}

/// Sending side of the dispatch queue, one clone per connection.
#[derive(Clone)]
struct Dispatcher {
    tx: mpsc::Sender<Request>,
}

impl Dispatcher {
    async fn execute(&self, command: Command) -> io::Result<Option<Reply>> {
        let (reply, outcome) = oneshot::channel();
        self.tx
            .send(Request { command, reply })
            .await
            .map_err(|_| dispatch_stopped())?;
        outcome.await.map_err(|_| dispatch_stopped())
    }
}

fn dispatch_stopped() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "command dispatch stopped")
}

/// A bound, not yet running, command server.
pub struct Server {
    listener: TcpListener,
    shared: Arc<Shared>,
    tick_interval: Duration,
}

impl Server {
    /// Bind the configured address.
    pub async fn bind(config: ServerConfig, handler: Arc<AudioHandler>) -> ServerResult<Self> {
        let address = config.socket_address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| ServerError::Bind {
                address: address.clone(),
                source,
            })?;
        info!("Listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            shared: Arc::new(Shared {
                handler,
                hub: ObserverHub::new(config.observer_capacity),
                cache_directory: config.cache_directory.clone(),
                max_message_size: config.max_message_size,
                max_upload_size: config.max_upload_size,
            }),
            tick_interval: config.tick_interval(),
        })
    }

    /// Address actually bound.
    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Register an observer of changed units.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<UnitSnapshot> {
        self.shared.hub.subscribe()
    }

    /// The observer hub.
    #[must_use]
    pub fn hub(&self) -> ObserverHub {
        self.shared.hub.clone()
    }

    /// Serve until `shutdown` resolves, then stop every task and release
    /// the handler.
    pub async fn run_until<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()>,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (request_tx, request_rx) = mpsc::channel(DISPATCH_QUEUE);
        let dispatcher = Dispatcher { tx: request_tx };
        let mut tasks = JoinSet::new();
        let shared = Arc::clone(&self.shared);
        tasks.spawn_blocking(move || dispatch_loop(request_rx, &shared));
        tasks.spawn(tick_loop(
            Arc::clone(&self.shared),
            self.tick_interval,
            stop_rx.clone(),
        ));

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "Client connected");
                        tasks.spawn(serve_connection(
                            stream,
                            peer,
                            Arc::clone(&self.shared),
                            dispatcher.clone(),
                            stop_rx.clone(),
                        ));
                    },
                    Err(e) => warn!("Accept failed: {e}"),
                },
                Some(joined) = tasks.join_next() => {
                    if let Err(e) = joined {
                        warn!("Server task failed: {e}");
                    }
                },
            }
        }

        info!("Shutting down");
        let _ = stop_tx.send(true);
        // The dispatch thread exits once every connection has dropped its
        // sender.
        drop(dispatcher);
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!("Server task failed: {e}");
            }
        }

        self.shared.handler.release();
        self.shared.publish_recent();
        Ok(())
    }
}

// ============================================
// Tasks
// ============================================

/// Apply queued commands one at a time. Each command and the publication
/// of the unit it changed complete before the next command starts.
fn dispatch_loop(mut requests: mpsc::Receiver<Request>, shared: &Shared) {
    while let Some(Request { command, reply }) = requests.blocking_recv() {
        let outcome = command.apply(&shared.handler);
        shared.publish_recent();
        let _ = reply.send(outcome);
    }
    debug!("Command dispatch stopped");
}

async fn tick_loop(shared: Arc<Shared>, period: Duration, mut stop: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut changed = Vec::new();

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if shared.handler.populate_updated_sources(&mut changed) > 0 {
                    trace!("Sweep updated {} sources", changed.len());
                    shared.hub.publish_all(changed.drain(..));
                }
            },
            _ = stop.changed() => break,
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    shared: Arc<Shared>,
    dispatcher: Dispatcher,
    mut stop: watch::Receiver<bool>,
) {
    tokio::select! {
        result = handle_client(stream, &shared, &dispatcher) => match result {
            Ok(()) => debug!(%peer, "Client disconnected"),
            Err(e) => warn!(%peer, "Connection closed: {e}"),
        },
        _ = stop.changed() => debug!(%peer, "Closing connection for shutdown"),
    }
}

async fn handle_client(
    stream: TcpStream,
    shared: &Shared,
    dispatcher: &Dispatcher,
) -> io::Result<()> {
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    while let Some(message) = read_frame(&mut reader, shared.max_message_size).await? {
        let command = match Command::parse(&message) {
            Ok(command) => command,
            Err(CommandError::Empty) => continue,
            Err(e) => {
                warn!("Rejected message: {e}");
                if let Some(reply) = Command::fallback_reply(&message) {
                    writer.write_all(&reply.encode()).await?;
                }
                continue;
            },
        };
        trace!(?command, "Received");

        let reply = match command {
            Command::Quit => return Ok(()),
            Command::PutFile { ref name, size } => {
                receive_file(
                    &mut reader,
                    &shared.cache_directory,
                    name,
                    size,
                    shared.max_upload_size,
                )
                .await?;
                None
            },
            command => dispatcher.execute(command).await?,
        };

        if let Some(reply) = reply {
            writer.write_all(&reply.encode()).await?;
        }
    }
    Ok(())
}

/// Read one message terminated by NUL or newline. Returns `None` at end of
/// stream with nothing buffered.
async fn read_frame<R>(reader: &mut R, max_len: usize) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut frame = Vec::new();
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            if frame.is_empty() {
                return Ok(None);
            }
            return Ok(Some(String::from_utf8_lossy(&frame).into_owned()));
        }

        let terminator = available.iter().position(|&b| b == 0 || b == b'\n');
        let take = terminator.unwrap_or(available.len());
        frame.extend_from_slice(&available[..take]);
        reader.consume(terminator.map_or(take, |end| end + 1));

        if frame.len() > max_len {
            return Err(oversized(max_len));
        }
        if terminator.is_some() {
            return Ok(Some(String::from_utf8_lossy(&frame).into_owned()));
        }
    }
}

fn oversized(max_len: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("message exceeds {max_len} bytes"),
    )
}

/// Store `size` bytes from `reader` as `name` inside `directory`.
///
/// Oversized uploads and names that are not a plain file name are consumed
/// and discarded so the stream stays in step.
async fn receive_file<R>(
    reader: &mut R,
    directory: &Path,
    name: &str,
    size: u64,
    max_size: u64,
) -> io::Result<Option<PathBuf>>
where
    R: AsyncRead + Unpin,
{
    let file_name = Path::new(name)
        .file_name()
        .filter(|file_name| Path::new(file_name) == Path::new(name));
    let mut payload = reader.take(size);

    let Some(file_name) = file_name.filter(|_| size <= max_size) else {
        warn!("Discarding upload \"{name}\" ({size} bytes)");
        tokio::io::copy(&mut payload, &mut tokio::io::sink()).await?;
        return Ok(None);
    };

    tokio::fs::create_dir_all(directory).await?;
    let path = directory.join(file_name);
    let mut file = tokio::fs::File::create(&path).await?;
    let written = tokio::io::copy(&mut payload, &mut file).await?;
    file.flush().await?;

    if written < size {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("upload \"{name}\" ended after {written} of {size} bytes"),
        ));
    }
    info!("Stored {} ({} bytes)", path.display(), written);
    Ok(Some(path))
}
