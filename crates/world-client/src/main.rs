//! Desktop viewer: a procedural avatar walking across a streamed chunk field.
//!
//! WASD moves, mouse looks, Shift runs. Space jumps, C crouches, F flies,
//! V dances, E cycles emotes, H toggles first-person decapitation. Chunk
//! cubes are drawn as gizmos colored by LOD.

mod avatar;
mod observer;
mod rig_demo;
mod streaming;

use bevy::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::avatar::AvatarPlugin;
use crate::observer::ObserverPlugin;
use crate::streaming::ChunkStreamingPlugin;

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,lod_tracker=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    App::new()
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "World Client".to_owned(),
                ..default()
            }),
            ..default()
        }))
        .add_plugins(bevy_tokio_tasks::TokioTasksPlugin::default())
        .add_plugins((ObserverPlugin, ChunkStreamingPlugin, AvatarPlugin))
        .add_systems(Startup, setup_scene)
        .run();
}

fn setup_scene(mut commands: Commands) {
    commands.spawn((
        DirectionalLight {
            illuminance: 10_000.0,
            ..default()
        },
        Transform::from_xyz(4.0, 10.0, 2.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));
    tracing::info!("Scene ready");
}
