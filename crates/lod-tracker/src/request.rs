//! Per-chunk data requests.
//!
//! A [`DataRequest`] is handed to the consumer in a
//! [`ChunkEvent::DataRequested`](crate::ChunkEvent::DataRequested). The
//! consumer either resolves it on the spot, attaches an async producer with
//! [`DataRequest::wait_until`] and spawns the returned future on whatever
//! executor it runs, or drops it. A dropped request resolves with no data.

use std::fmt;
use std::future::Future;

use crate::error::ChunkError;
use crate::node::{LodChunk, NodeKey};
use crate::signal::AbortSignal;

/// Outcome of one request, sent back to the tracker.
pub(crate) struct Completion<T> {
    pub key: NodeKey,
    pub id: u64,
    pub result: Result<Option<T>, ChunkError>,
}

/// A request for the render data of one chunk.
pub struct DataRequest<T> {
    chunk: LodChunk,
    id: u64,
    signal: AbortSignal,
    completions: Option<async_channel::Sender<Completion<T>>>,
}

impl<T> DataRequest<T> {
    pub(crate) fn new(
        chunk: LodChunk,
        id: u64,
        signal: AbortSignal,
        completions: async_channel::Sender<Completion<T>>,
    ) -> Self {
        Self {
            chunk,
            id,
            signal,
            completions: Some(completions),
        }
    }

    #[must_use]
    pub fn chunk(&self) -> &LodChunk {
        &self.chunk
    }

    /// Fires when the chunk leaves the tracked set before data arrives.
    #[must_use]
    pub fn signal(&self) -> AbortSignal {
        self.signal.clone()
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.signal.is_aborted()
    }

    /// Resolve with data that is already at hand.
    pub fn resolve(mut self, result: Result<T, ChunkError>) {
        self.finish(result.map(Some));
    }

    /// Attach an async producer.
    ///
    /// The returned future must be spawned by the caller. It races the
    /// producer against the abort signal; once the signal fires the
    /// producer is dropped and the request settles as
    /// [`ChunkError::Aborted`].
    pub fn wait_until<F>(mut self, producer: F) -> impl Future<Output = ()> + Send + 'static
    where
        T: Send + 'static,
        F: Future<Output = Result<T, ChunkError>> + Send + 'static,
    {
        let (key, id) = (self.chunk.key(), self.id);
        let signal = self.signal.clone();
        let completions = self.completions.take();
        async move {
            let result = tokio::select! {
                biased;
                () = signal.aborted() => Err(ChunkError::Aborted),
                result = producer => result.map(Some),
            };
            if let Some(completions) = completions {
                let _ = completions.send(Completion { key, id, result }).await;
            }
        }
    }

    fn finish(&mut self, result: Result<Option<T>, ChunkError>) {
        if let Some(completions) = self.completions.take() {
            let _ = completions.try_send(Completion {
                key: self.chunk.key(),
                id: self.id,
                result,
            });
        }
    }
}

impl<T> Drop for DataRequest<T> {
    fn drop(&mut self) {
        self.finish(Ok(None));
    }
}

impl<T> fmt::Debug for DataRequest<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataRequest")
            .field("chunk", &self.chunk.key())
            .field("id", &self.id)
            .field("aborted", &self.is_aborted())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use glam::IVec3;

    use super::*;
    use crate::signal::AbortController;

    fn request(
        controller: &AbortController,
    ) -> (DataRequest<u32>, async_channel::Receiver<Completion<u32>>) {
        let (tx, rx) = async_channel::unbounded();
        let chunk = LodChunk {
            min: IVec3::new(5, 0, 5),
            lod: 1,
            lod_array: [1; 8],
        };
        (DataRequest::new(chunk, 7, controller.signal(), tx), rx)
    }

    #[test]
    fn dropping_resolves_empty() {
        let controller = AbortController::new();
        let (req, rx) = request(&controller);
        drop(req);
        let completion = rx.try_recv().unwrap();
        assert_eq!(completion.id, 7);
        assert_eq!(completion.result, Ok(None));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn resolve_sends_once() {
        let controller = AbortController::new();
        let (req, rx) = request(&controller);
        req.resolve(Ok(3));
        assert_eq!(rx.try_recv().unwrap().result, Ok(Some(3)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn abort_interrupts_producer() {
        let controller = AbortController::new();
        let (req, rx) = request(&controller);
        let fetch = tokio::spawn(req.wait_until(std::future::pending()));
        tokio::task::yield_now().await;
        controller.abort();
        fetch.await.unwrap();
        assert_eq!(rx.recv().await.unwrap().result, Err(ChunkError::Aborted));
    }

    #[tokio::test]
    async fn producer_result_is_forwarded() {
        let controller = AbortController::new();
        let (req, rx) = request(&controller);
        req.wait_until(async { Err(ChunkError::producer("disk full")) })
            .await;
        assert_eq!(
            rx.recv().await.unwrap().result,
            Err(ChunkError::Producer("disk full".to_owned()))
        );
    }
}
