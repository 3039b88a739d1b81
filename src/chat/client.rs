use super::{ChatError, FrameDecoder};
use crate::provider::{ChatRequest, ChatSettings, ProviderKind};
use futures_core::Stream;
use reqwest::header::HeaderMap;
use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::Instrument;

pub type SessionId = u64;

const MAX_ERROR_BODY: usize = 4096;

thread_local! {
    static IN_FRAGMENT: Cell<bool> = const { Cell::new(false) };
}

/// How a session ended. Handed to `on_done` exactly once per `send_message`.
#[derive(Debug)]
pub enum Completion {
    /// The response body ended.
    Finished,
    /// Superseded by a newer message or stopped with `cancel`.
    Cancelled,
    /// The request could not be built or the transport broke down.
    Failed(ChatError),
}

type FragmentFn = Box<dyn FnMut(&str) + Send>;
type DoneFn = Box<dyn FnOnce(Completion) + Send>;

pub(crate) struct Sink {
    on_fragment: FragmentFn,
    on_done: DoneFn,
}

/// Callbacks of one session. Whoever takes them out owns the right to call
/// `on_done`; once taken nothing else is delivered.
pub(crate) type SharedSink = Arc<Mutex<Option<Sink>>>;

struct ActiveSession {
    id: SessionId,
    sink: SharedSink,
    task: JoinHandle<()>,
}

/// Streaming chat client holding at most one in-flight request.
///
/// `send_message` returns immediately; fragments and the completion are
/// delivered from a runtime worker, in arrival order. Callbacks must not
/// call back into the client from inside `on_fragment`.
pub struct ChatClient {
    http: reqwest::Client,
    runtime: Handle,
    current: Mutex<Option<ActiveSession>>,
    next_id: AtomicU64,
}

struct Prepared {
    request: ChatRequest,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl ChatClient {
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_runtime(http, Handle::current())
    }

    pub fn with_runtime(http: reqwest::Client, runtime: Handle) -> Self {
        Self {
            http,
            runtime,
            current: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Start streaming a reply to `user_input`, cancelling whatever was in
    /// flight before.
    ///
    /// `on_fragment` runs with the session locked. Calling back into the
    /// client from there would deadlock (debug builds panic instead), so
    /// forward fragments to wherever the client lives:
    ///
    /// ```ignore
    /// let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    /// let done_tx = tx.clone();
    /// client.send_message(
    ///     &settings,
    ///     "你好",
    ///     move |text| {
    ///         let _ = tx.send(Some(text.to_string()));
    ///     },
    ///     move |_completion| {
    ///         let _ = done_tx.send(None);
    ///     },
    /// );
    /// while let Some(Some(text)) = rx.recv().await {
    ///     // free to call `client.cancel()` here
    /// }
    /// ```
    pub fn send_message<F, D>(&self, settings: &ChatSettings, user_input: &str, on_fragment: F, on_done: D) -> SessionId
    where
        F: FnMut(&str) + Send + 'static,
        D: FnOnce(Completion) + Send + 'static,
    {
        assert_outside_fragment();
        self.cancel();

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let sink = Sink {
            on_fragment: Box::new(on_fragment),
            on_done: Box::new(on_done),
        };

        let prepared = match prepare(settings, user_input) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(session = id, provider = %settings.provider, error = %e, "request not sent");
                (sink.on_done)(Completion::Failed(e));
                return id;
            }
        };

        let sink: SharedSink = Arc::new(Mutex::new(Some(sink)));
        let span = tracing::info_span!("session", id, provider = %prepared.request.provider);
        let task = self.runtime.spawn(
            run_session(self.http.clone(), prepared, settings.idle_timeout, Arc::clone(&sink)).instrument(span),
        );

        *lock(&self.current) = Some(ActiveSession { id, sink, task });
        id
    }

    /// Abort the in-flight session, if any. Its `on_done` receives
    /// `Completion::Cancelled` before this returns.
    pub fn cancel(&self) -> bool {
        assert_outside_fragment();
        let Some(session) = lock(&self.current).take() else {
            return false;
        };

        session.task.abort();
        let taken = lock(&session.sink).take();
        match taken {
            Some(sink) => {
                tracing::info!(session = session.id, "cancelled");
                (sink.on_done)(Completion::Cancelled);
                true
            }
            // Already completed on its own.
            None => false,
        }
    }

    /// Whether a session is still waiting for its completion.
    pub fn is_active(&self) -> bool {
        assert_outside_fragment();
        lock(&self.current)
            .as_ref()
            .is_some_and(|s| lock(&s.sink).is_some())
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking consumer callback must not wedge the client.
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn prepare(settings: &ChatSettings, user_input: &str) -> Result<Prepared, ChatError> {
    let request = ChatRequest::from_settings(settings, user_input)?;
    let body = request.provider.build_body(&request)?;
    let headers = request.provider.headers(&request.credential)?;
    Ok(Prepared { request, headers, body })
}

async fn run_session(http: reqwest::Client, prepared: Prepared, idle: Duration, sink: SharedSink) {
    let provider = prepared.request.provider;
    tracing::debug!(
        url = %prepared.request.endpoint,
        model = %prepared.request.model,
        bytes = prepared.body.len(),
        "sending request"
    );

    let outcome = match open(&http, prepared, idle).await {
        Ok(resp) => drive(resp.bytes_stream(), provider, idle, &sink).await,
        Err(e) => Err(e),
    };
    complete(&sink, outcome);
}

async fn open(http: &reqwest::Client, prepared: Prepared, idle: Duration) -> Result<reqwest::Response, ChatError> {
    let send = http
        .post(prepared.request.endpoint)
        .headers(prepared.headers)
        .body(prepared.body)
        .send();

    let resp = tokio::time::timeout(idle, send)
        .await
        .map_err(|_| ChatError::IdleTimeout(idle))??;

    let status = resp.status();
    if !status.is_success() {
        let body = error_body(resp, idle).await;
        return Err(ChatError::Status { status, body });
    }
    Ok(resp)
}

/// Read at most `MAX_ERROR_BODY` bytes of a failed response, giving up on
/// the rest once the idle timeout passes without data.
async fn error_body(resp: reqwest::Response, idle: Duration) -> String {
    let mut stream = std::pin::pin!(resp.bytes_stream());
    let mut buf = Vec::new();

    while buf.len() < MAX_ERROR_BODY {
        match tokio::time::timeout(idle, stream.next()).await {
            Ok(Some(Ok(chunk))) => buf.extend_from_slice(&chunk),
            Ok(Some(Err(e))) => {
                tracing::debug!(error = %e, "error body cut short");
                break;
            }
            Ok(None) => break,
            Err(_) => {
                tracing::debug!(read = buf.len(), "error body stalled");
                break;
            }
        }
    }

    buf.truncate(MAX_ERROR_BODY);
    String::from_utf8_lossy(&buf).into_owned()
}

/// Decode a response body and deliver its fragments.
///
/// Returns early without error once the session has been cancelled.
pub(crate) async fn drive<S, B, E>(body: S, provider: ProviderKind, idle: Duration, sink: &SharedSink) -> Result<(), ChatError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<ChatError>,
{
    let mut body = std::pin::pin!(body);
    let mut decoder = FrameDecoder::new(provider);

    loop {
        let item = tokio::time::timeout(idle, body.next())
            .await
            .map_err(|_| ChatError::IdleTimeout(idle))?;

        let (frames, ended) = match item {
            Some(chunk) => {
                let chunk = chunk.map_err(Into::<ChatError>::into)?;
                tracing::trace!(raw = %String::from_utf8_lossy(chunk.as_ref()), "chunk");
                (decoder.push(chunk.as_ref()), false)
            }
            None => {
                if !decoder.pending().is_empty() {
                    tracing::debug!(bytes = decoder.pending().len(), "flushing unterminated line");
                }
                (decoder.finish(), true)
            }
        };

        for frame in frames {
            match frame {
                Ok(text) => {
                    if !deliver(sink, &text) {
                        return Ok(());
                    }
                }
                Err(e) => {
                    debug_assert!(e.is_frame());
                    tracing::warn!(error = %e, "skipping frame");
                }
            }
        }

        if ended {
            break;
        }
    }

    Ok(())
}

fn deliver(sink: &SharedSink, text: &str) -> bool {
    match lock(sink).as_mut() {
        Some(s) => {
            let _scope = FragmentScope::enter();
            (s.on_fragment)(text);
            true
        }
        None => false,
    }
}

/// Marks the current thread as running `on_fragment`.
struct FragmentScope;

impl FragmentScope {
    fn enter() -> Self {
        IN_FRAGMENT.with(|f| f.set(true));
        FragmentScope
    }
}

impl Drop for FragmentScope {
    fn drop(&mut self) {
        IN_FRAGMENT.with(|f| f.set(false));
    }
}

fn assert_outside_fragment() {
    debug_assert!(
        !IN_FRAGMENT.with(Cell::get),
        "ChatClient called from inside on_fragment; forward fragments through a channel instead"
    );
}

fn complete(sink: &SharedSink, outcome: Result<(), ChatError>) {
    let Some(sink) = lock(sink).take() else {
        return;
    };

    let completion = match outcome {
        Ok(()) => {
            tracing::info!("finished");
            Completion::Finished
        }
        Err(e) => {
            tracing::warn!(error = %e, "session failed");
            Completion::Failed(e)
        }
    };
    (sink.on_done)(completion);
}
