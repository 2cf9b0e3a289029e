//! Chunk streaming around a moving observer.
//!
//! [`LodChunkTracker`] is a synchronous state machine: [`LodChunkTracker::update`]
//! diffs the octree for the observer's cell against the last pass and
//! emits events, [`LodChunkTracker::poll`] settles data requests whose
//! producers have finished. It can be driven from a frame loop, or moved
//! into a task with [`LodChunkTracker::into_service`], which serializes
//! passes and coalesces bursts of positions down to the latest one.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use glam::{IVec3, Vec3};
use tokio::sync::watch;

use crate::config::TrackerConfig;
use crate::error::ChunkError;
use crate::node::{LodChunk, NodeKey};
use crate::octree::construct_octree_for_leaf;
use crate::request::{Completion, DataRequest};
use crate::signal::AbortController;
use crate::task::Task;

/// Events emitted by a tracker, in order.
#[derive(Debug)]
pub enum ChunkEvent<T> {
    /// A leaf needs data. Resolve, attach a producer to, or drop the request.
    DataRequested(DataRequest<T>),
    /// A requested chunk resolved and is now rendered.
    Add { chunk: LodChunk, data: Option<T> },
    /// A rendered chunk left the tracked set.
    Remove { chunk: LodChunk },
    /// A pass completed.
    Update { task: Arc<Task> },
    /// The tracker was torn down while this chunk was tracked.
    Destroy { chunk: LodChunk },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestState {
    Pending,
    Loaded,
    Failed,
}

#[derive(Debug)]
struct TrackedRequest {
    chunk: LodChunk,
    id: u64,
    controller: AbortController,
    state: RequestState,
}

/// Streams octree leaves around an observer.
pub struct LodChunkTracker<T> {
    config: TrackerConfig,
    last_coord: Option<IVec3>,
    requests: HashMap<NodeKey, TrackedRequest>,
    rendered: HashMap<NodeKey, LodChunk>,
    display: Arc<[LodChunk]>,
    last_task: Option<Arc<Task>>,
    next_id: u64,
    passes: u64,
    destroyed: bool,
    events: async_channel::Sender<ChunkEvent<T>>,
    completions_tx: async_channel::Sender<Completion<T>>,
    completions_rx: async_channel::Receiver<Completion<T>>,
    pending: watch::Sender<usize>,
}

impl<T> std::fmt::Debug for LodChunkTracker<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LodChunkTracker")
            .field("config", &self.config)
            .field("last_coord", &self.last_coord)
            .field("requests", &self.requests.len())
            .field("rendered", &self.rendered.len())
            .field("destroyed", &self.destroyed)
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> LodChunkTracker<T> {
    /// Create a tracker and the receiver for its events.
    #[must_use]
    pub fn new(config: TrackerConfig) -> (Self, async_channel::Receiver<ChunkEvent<T>>) {
        let (events, events_rx) = async_channel::unbounded();
        let (completions_tx, completions_rx) = async_channel::unbounded();
        let (pending, _) = watch::channel(0);
        let tracker = Self {
            config,
            last_coord: None,
            requests: HashMap::new(),
            rendered: HashMap::new(),
            display: Arc::from([]),
            last_task: None,
            next_id: 0,
            passes: 0,
            destroyed: false,
            events,
            completions_tx,
            completions_rx,
            pending,
        };
        (tracker, events_rx)
    }

    #[must_use]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Cell of the last pass.
    #[must_use]
    pub fn current_coord(&self) -> Option<IVec3> {
        self.last_coord
    }

    /// Leaves of the last pass, for debug drawing.
    #[must_use]
    pub fn display_chunks(&self) -> &[LodChunk] {
        &self.display
    }

    #[must_use]
    pub fn last_task(&self) -> Option<&Arc<Task>> {
        self.last_task.as_ref()
    }

    pub fn rendered_chunks(&self) -> impl Iterator<Item = &LodChunk> {
        self.rendered.values()
    }

    #[must_use]
    pub fn is_rendered(&self, key: NodeKey) -> bool {
        self.rendered.contains_key(&key)
    }

    /// Whether a request for `key` is still waiting on its producer.
    #[must_use]
    pub fn is_pending(&self, key: NodeKey) -> bool {
        self.requests
            .get(&key)
            .is_some_and(|request| request.state == RequestState::Pending)
    }

    /// Number of requests waiting on their producers.
    #[must_use]
    pub fn live_requests(&self) -> usize {
        self.requests
            .values()
            .filter(|request| request.state == RequestState::Pending)
            .count()
    }

    /// Move the observer to a world position. Returns whether a pass ran.
    pub fn update(&mut self, position: Vec3) -> bool {
        self.update_coord(self.config.cell_of(position))
    }

    /// Move the observer to a lattice cell. Returns whether a pass ran.
    pub fn update_coord(&mut self, coord: IVec3) -> bool {
        if self.destroyed || self.last_coord == Some(coord) {
            return false;
        }
        self.last_coord = Some(coord);

        let leaves =
            match construct_octree_for_leaf(coord, self.config.min_lod_range, self.config.max_lod())
            {
                Ok(leaves) => leaves,
                Err(e) => {
                    tracing::error!("LOD: octree construction failed at {}: {}", coord, e);
                    return false;
                }
            };
        let leaves: Arc<[LodChunk]> = leaves.into();
        let current: HashMap<NodeKey, LodChunk> =
            leaves.iter().map(|chunk| (chunk.key(), *chunk)).collect();
        let still_tracked =
            |chunk: &LodChunk| current.get(&chunk.key()).is_some_and(|c| c.lod_equals(chunk));

        self.requests.retain(|key, request| {
            if still_tracked(&request.chunk) {
                return true;
            }
            if request.state == RequestState::Pending {
                tracing::debug!("LOD: cancelling request for {}", key);
            }
            request.controller.abort();
            false
        });

        let removed: Vec<LodChunk> = self
            .rendered
            .values()
            .filter(|chunk| !still_tracked(*chunk))
            .copied()
            .collect();
        for chunk in removed {
            self.rendered.remove(&chunk.key());
            self.emit(ChunkEvent::Remove { chunk });
        }

        let mut fresh: Vec<LodChunk> = leaves
            .iter()
            .filter(|chunk| !self.requests.contains_key(&chunk.key()))
            .copied()
            .collect();
        fresh.sort_by_key(|chunk| distance_to(chunk, coord));
        for chunk in &fresh {
            let key = chunk.key();
            let id = self.next_id;
            self.next_id += 1;
            let controller = AbortController::new();
            let request =
                DataRequest::new(*chunk, id, controller.signal(), self.completions_tx.clone());
            self.requests.insert(
                key,
                TrackedRequest {
                    chunk: *chunk,
                    id,
                    controller,
                    state: RequestState::Pending,
                },
            );
            self.emit(ChunkEvent::DataRequested(request));
        }

        self.passes += 1;
        let task = Arc::new(Task::diff(self.passes, coord, &self.display, leaves.clone()));
        tracing::debug!(
            "LOD: pass at {}: {} leaves, {} entered, {} exited",
            coord,
            task.leaves.len(),
            task.entered.len(),
            task.exited.len()
        );
        self.display = leaves;
        self.last_task = Some(Arc::clone(&task));
        self.publish_pending();
        self.emit(ChunkEvent::Update { task });
        true
    }

    /// Settle every finished request. Returns how many completions were seen.
    pub fn poll(&mut self) -> usize {
        let mut count = 0;
        while let Ok(completion) = self.completions_rx.try_recv() {
            self.complete(completion);
            count += 1;
        }
        count
    }

    fn complete(&mut self, completion: Completion<T>) {
        let Completion { key, id, result } = completion;
        let Some(request) = self.requests.get_mut(&key) else {
            tracing::debug!("LOD: dropping result for untracked {}", key);
            return;
        };
        if request.id != id || request.state != RequestState::Pending {
            tracing::debug!("LOD: dropping stale result for {}", key);
            return;
        }

        match result {
            Ok(data) => {
                request.state = RequestState::Loaded;
                let chunk = request.chunk;
                self.rendered.insert(key, chunk);
                self.emit(ChunkEvent::Add { chunk, data });
            }
            Err(ChunkError::Aborted) => {
                tracing::debug!("LOD: producer for {} aborted", key);
                request.state = RequestState::Failed;
            }
            Err(e) => {
                tracing::warn!("LOD: failed to load {}: {}", key, e);
                request.state = RequestState::Failed;
            }
        }
        self.publish_pending();
    }

    /// Resolves once no request is waiting on its producer.
    ///
    /// Completions are only applied by [`poll`](Self::poll) or the
    /// service loop, so something must keep driving the tracker.
    pub fn wait_for_load(&self) -> impl Future<Output = ()> + Send + 'static {
        wait_idle(self.pending.subscribe())
    }

    /// Cancel every request and release every chunk.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        let mut chunks: HashMap<NodeKey, LodChunk> = self.rendered.drain().collect();
        for (key, request) in self.requests.drain() {
            request.controller.abort();
            chunks.entry(key).or_insert(request.chunk);
        }
        for chunk in chunks.into_values() {
            self.emit(ChunkEvent::Destroy { chunk });
        }
        self.display = Arc::from([]);
        self.publish_pending();
        tracing::info!("LOD: tracker destroyed");
    }

    /// Move the tracker into a task.
    ///
    /// Returns a handle for feeding positions and the future to spawn. The
    /// future applies completions ahead of new positions and finishes
    /// (destroying the tracker) once every handle is dropped.
    pub fn into_service(self) -> (TrackerHandle, impl Future<Output = ()> + Send + 'static) {
        let (positions, positions_rx) = watch::channel(None);
        let handle = TrackerHandle {
            positions: Arc::new(positions),
            pending: self.pending.subscribe(),
        };
        (handle, self.run(positions_rx))
    }

    async fn run(mut self, mut positions: watch::Receiver<Option<Vec3>>) {
        let completions = self.completions_rx.clone();
        loop {
            tokio::select! {
                biased;
                Ok(completion) = completions.recv() => self.complete(completion),
                changed = positions.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let position = *positions.borrow_and_update();
                    if let Some(position) = position {
                        self.update(position);
                    }
                }
            }
        }
        self.destroy();
    }

    fn publish_pending(&self) {
        self.pending.send_replace(self.live_requests());
    }

    fn emit(&self, event: ChunkEvent<T>) {
        // A closed receiver drops the event. Requests inside it settle empty.
        let _ = self.events.try_send(event);
    }
}

/// Cloneable front end to a tracker running under
/// [`LodChunkTracker::into_service`].
#[derive(Debug, Clone)]
pub struct TrackerHandle {
    positions: Arc<watch::Sender<Option<Vec3>>>,
    pending: watch::Receiver<usize>,
}

impl TrackerHandle {
    /// Queue an observer position. Only the latest queued position is kept.
    pub fn update(&self, position: Vec3) {
        self.positions.send_replace(Some(position));
    }

    /// Resolves once no request is waiting on its producer.
    pub fn wait_for_load(&self) -> impl Future<Output = ()> + Send + 'static {
        wait_idle(self.pending.clone())
    }
}

/// Squared distance from the observer cell center to the chunk center, in
/// half-cells.
fn distance_to(chunk: &LodChunk, coord: IVec3) -> i64 {
    let center = chunk.min * 2 + IVec3::splat(chunk.lod as i32);
    let observer = coord * 2 + IVec3::ONE;
    let d = (center - observer).as_i64vec3();
    d.length_squared()
}

async fn wait_idle(mut pending: watch::Receiver<usize>) {
    loop {
        let idle = *pending.borrow_and_update() == 0;
        if idle || pending.changed().await.is_err() {
            return;
        }
    }
}
