//! Chunk streaming around the observer.
//!
//! The tracker runs on the main thread and is updated once per frame. Each
//! data request becomes a background task that produces a heightfield sample
//! after a simulated fetch delay; the tracker drops results for chunks that
//! left range before they arrived.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_channel::Receiver;
use bevy::prelude::*;
use bevy_tokio_tasks::TokioTasksRuntime;
use lod_tracker::{ChunkError, ChunkEvent, LodChunk, LodChunkTracker, NodeKey, Task, TrackerConfig};

use crate::observer::Observer;

/// Plugin for LOD chunk streaming.
pub struct ChunkStreamingPlugin;

impl Plugin for ChunkStreamingPlugin {
    fn build(&self, app: &mut App) {
        let settings = StreamingSettings::default();
        let (tracker, events) = LodChunkTracker::new(settings.tracker);
        app.insert_resource(settings)
            .insert_resource(ChunkStreaming {
                tracker,
                events,
                loaded: HashMap::new(),
                task: None,
            })
            .add_systems(
                Update,
                (track_observer, poll_tracker, handle_chunk_events, draw_chunks).chain(),
            );
    }
}

/// Settings for chunk streaming.
#[derive(Resource)]
pub struct StreamingSettings {
    pub tracker: TrackerConfig,
    /// Simulated fetch latency per LOD step.
    pub fetch_delay: Duration,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            tracker: TrackerConfig {
                lods: 3,
                min_lod_range: 2,
                ..TrackerConfig::default()
            },
            fetch_delay: Duration::from_millis(40),
        }
    }
}

/// Payload produced for a loaded chunk.
#[derive(Debug, Clone, Copy)]
pub struct ChunkData {
    /// Terrain height sampled at the chunk center, in meters.
    pub height: f32,
}

/// Tracker state and the chunks currently shown.
#[derive(Resource)]
pub struct ChunkStreaming {
    tracker: LodChunkTracker<ChunkData>,
    events: Receiver<ChunkEvent<ChunkData>>,
    loaded: HashMap<NodeKey, (LodChunk, ChunkData)>,
    task: Option<Arc<Task>>,
}

#[allow(clippy::needless_pass_by_value)]
fn track_observer(
    mut streaming: ResMut<ChunkStreaming>,
    observer: Single<&Transform, With<Observer>>,
) {
    streaming.tracker.update(observer.translation);
}

fn poll_tracker(mut streaming: ResMut<ChunkStreaming>) {
    let settled = streaming.tracker.poll();
    if settled > 0 {
        tracing::debug!("Settled {} chunk requests", settled);
    }
}

#[allow(clippy::needless_pass_by_value)]
fn handle_chunk_events(
    mut streaming: ResMut<ChunkStreaming>,
    settings: Res<StreamingSettings>,
    runtime: ResMut<TokioTasksRuntime>,
) {
    let streaming = &mut *streaming;
    while let Ok(event) = streaming.events.try_recv() {
        match event {
            ChunkEvent::DataRequested(request) => {
                let chunk = *request.chunk();
                let fetch = request.wait_until(produce_chunk(
                    chunk,
                    settings.tracker.chunk_size,
                    settings.fetch_delay,
                ));
                runtime.spawn_background_task(move |_ctx| fetch);
            }
            ChunkEvent::Add { chunk, data } => {
                let Some(data) = data else {
                    continue;
                };
                streaming.loaded.insert(chunk.key(), (chunk, data));
            }
            ChunkEvent::Remove { chunk } | ChunkEvent::Destroy { chunk } => {
                streaming.loaded.remove(&chunk.key());
            }
            ChunkEvent::Update { task } => {
                tracing::info!(
                    "Chunk task {} at {}: {} entered, {} exited",
                    task.id,
                    task.center,
                    task.entered.len(),
                    task.exited.len()
                );
                streaming.task = Some(task);
            }
        }
    }
}

/// Simulated chunk fetch: coarser chunks take longer.
async fn produce_chunk(
    chunk: LodChunk,
    chunk_size: f32,
    delay: Duration,
) -> Result<ChunkData, ChunkError> {
    tokio::time::sleep(delay * chunk.lod).await;
    let size = chunk.world_size(chunk_size);
    let center = chunk.world_min(chunk_size) + Vec3::splat(size / 2.0);
    let height = 3.0 * (center.x * 0.05).sin() * (center.z * 0.05).cos();
    Ok(ChunkData { height })
}

fn lod_color(lod: u32) -> Color {
    match lod {
        1 => Color::srgb(0.9, 0.25, 0.2),
        2 => Color::srgb(0.3, 0.85, 0.3),
        _ => Color::srgb(0.3, 0.45, 0.95),
    }
}

/// Draw loaded chunks as wireframe cubes and pending ones as faint outlines.
#[allow(clippy::needless_pass_by_value)]
fn draw_chunks(streaming: Res<ChunkStreaming>, settings: Res<StreamingSettings>, mut gizmos: Gizmos) {
    let chunk_size = settings.tracker.chunk_size;
    for (chunk, data) in streaming.loaded.values() {
        let size = chunk.world_size(chunk_size);
        let min = chunk.world_min(chunk_size);
        draw_box(&mut gizmos, min, size, 0.9, lod_color(chunk.lod));
        let center = min + Vec3::new(size / 2.0, 0.0, size / 2.0);
        gizmos.line(center, center + Vec3::Y * data.height, Color::WHITE);
    }
    let Some(task) = &streaming.task else {
        return;
    };
    for chunk in task.leaves.iter() {
        if !streaming.loaded.contains_key(&chunk.key()) {
            let size = chunk.world_size(chunk_size);
            let color = lod_color(chunk.lod).with_alpha(0.15);
            draw_box(&mut gizmos, chunk.world_min(chunk_size), size, 0.8, color);
        }
    }
}

/// Wireframe cube of edge `size * scale`, centered in the cell at `min`.
fn draw_box(gizmos: &mut Gizmos, min: Vec3, size: f32, scale: f32, color: Color) {
    let inset = size * (1.0 - scale) / 2.0;
    let lo = min + Vec3::splat(inset);
    let edge = size * scale;
    let corner = |i: u32| {
        lo + Vec3::new(
            if i & 1 == 0 { 0.0 } else { edge },
            if i & 2 == 0 { 0.0 } else { edge },
            if i & 4 == 0 { 0.0 } else { edge },
        )
    };
    for i in 0..8u32 {
        for bit in [1, 2, 4] {
            if i & bit == 0 {
                gizmos.line(corner(i), corner(i | bit), color);
            }
        }
    }
}
