//! Mass-Spring Cloth Simulation - Main Entry
//!
//! Runs the CPU integrator (left) and the GPU texture integrator (right) side
//! by side. Keys: `1`/`2`/`3` resolution, `Space` pause, `W` wind.

use bevy::prelude::*;
use clothsim::render::ClothRenderPlugin;
use clothsim::simulation::{ClothSimulation, SimulationPlugin};

fn main() {
    App::new()
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "Mass-Spring Cloth".into(),
                resolution: (1280.0, 720.0).into(),
                ..default()
            }),
            ..default()
        }))
        .add_plugins(SimulationPlugin::default())
        .add_plugins(ClothRenderPlugin)
        .add_systems(Startup, setup_scene)
        .add_systems(Update, log_frame)
        .run();
}

/// Camera and light looking at both cloths
fn setup_scene(mut commands: Commands) {
    commands.spawn((
        Camera3d::default(),
        Transform::from_xyz(0.0, 0.5, 9.0).looking_at(Vec3::new(0.0, -0.5, 0.0), Vec3::Y),
    ));
    commands.spawn((
        DirectionalLight {
            illuminance: 8_000.0,
            shadows_enabled: true,
            ..default()
        },
        Transform::from_xyz(3.0, 6.0, 8.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));
    commands.insert_resource(FrameCounter(0));
}

/// Frame counter for logging
#[derive(Resource)]
struct FrameCounter(u32);

/// Log CPU cloth diagnostics every N frames
fn log_frame(mut counter: ResMut<FrameCounter>, simulation: Option<Res<ClothSimulation>>) {
    counter.0 += 1;
    if counter.0 % 60 != 0 {
        return;
    }
    let Some(simulation) = simulation else {
        return;
    };
    let state = simulation.state();
    info!(
        "Frame {}: {} steps, centroid {:.3}, max speed {:.3}",
        counter.0,
        simulation.steps(),
        state.centroid(),
        state.max_speed()
    );
}
