use axum::body::Body;
use bytes::Bytes;
use http_body::{Body as HttpBody, Frame, SizeHint};
use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

type Hook = Box<dyn FnOnce() + Send + 'static>;

/// Response body that runs a hook exactly once, when the body has been
/// sent in full, fails, or is dropped unfinished (client went away).
pub struct CompletionBody {
    inner: Body,
    on_complete: Option<Hook>,
}

impl CompletionBody {
    pub fn new(inner: Body, on_complete: impl FnOnce() + Send + 'static) -> Self {
        Self {
            inner,
            on_complete: Some(Box::new(on_complete)),
        }
    }

    fn complete(&mut self) {
        if let Some(hook) = self.on_complete.take() {
            hook();
        }
    }
}

impl HttpBody for CompletionBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_frame(cx);
        if matches!(poll, Poll::Ready(None) | Poll::Ready(Some(Err(_)))) {
            this.complete();
        }
        poll
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for CompletionBody {
    fn drop(&mut self) {
        self.complete();
    }
}

impl fmt::Debug for CompletionBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionBody")
            .field("completed", &self.on_complete.is_none())
            .finish()
    }
}

/// Bytes seen by a [`RecordingBody`], shared with whoever logs them.
#[derive(Clone, Debug)]
pub(crate) struct BodyRecording(Arc<Mutex<Recorded>>);

#[derive(Debug)]
struct Recorded {
    bytes: Vec<u8>,
    limit: usize,
    state: RecordState,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RecordState {
    Reading,
    Complete,
    Discarded,
}

impl BodyRecording {
    pub(crate) fn new(limit: usize) -> Self {
        Self(Arc::new(Mutex::new(Recorded {
            bytes: Vec::new(),
            limit,
            state: RecordState::Reading,
        })))
    }

    /// The whole body, if it was read to the end without error and
    /// within the limit.
    pub(crate) fn finished(&self) -> Option<Vec<u8>> {
        let recorded = self.0.lock().ok()?;
        (recorded.state == RecordState::Complete).then(|| recorded.bytes.clone())
    }

    fn update(&self, f: impl FnOnce(&mut Recorded)) {
        if let Ok(mut recorded) = self.0.lock() {
            f(&mut recorded);
        }
    }
}

/// Request body that copies data frames into a [`BodyRecording`] as the
/// handler reads them. Frames, errors and size hints pass through
/// unchanged.
pub(crate) struct RecordingBody {
    inner: Body,
    recording: BodyRecording,
}

impl RecordingBody {
    pub(crate) fn new(inner: Body, recording: BodyRecording) -> Self {
        Self { inner, recording }
    }
}

impl HttpBody for RecordingBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_frame(cx);
        match &poll {
            Poll::Ready(Some(Ok(frame))) => {
                let end = this.inner.is_end_stream();
                this.recording.update(|recorded| {
                    if recorded.state != RecordState::Reading {
                        return;
                    }
                    if let Some(data) = frame.data_ref() {
                        if recorded.bytes.len() + data.len() > recorded.limit {
                            recorded.state = RecordState::Discarded;
                            recorded.bytes = Vec::new();
                            return;
                        }
                        recorded.bytes.extend_from_slice(data);
                    }
                    if end {
                        recorded.state = RecordState::Complete;
                    }
                });
            }
            Poll::Ready(Some(Err(_))) => this.recording.update(|recorded| {
                recorded.state = RecordState::Discarded;
                recorded.bytes = Vec::new();
            }),
            Poll::Ready(None) => this.recording.update(|recorded| {
                if recorded.state == RecordState::Reading {
                    recorded.state = RecordState::Complete;
                }
            }),
            Poll::Pending => {}
        }
        poll
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
