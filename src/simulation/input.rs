//! Keyboard controls for the cloth.
//!
//! `1`/`2`/`3` switch between the resolution presets, `Space` pauses both
//! integrators and `W` toggles the wind.

use bevy::{prelude::*, render::extract_resource::ExtractResource};

use super::physics_config::{ClothConfig, RESOLUTION_PRESETS};

/// Run state shared by the CPU system and the render graph node.
#[derive(Resource, Clone, Debug, Default, ExtractResource)]
pub struct SimulationControl {
    pub paused: bool,
    /// Wind to restore when it is toggled back on; `Some` while the wind is off.
    pub stored_wind: Option<Vec3>,
}

/// Apply keyboard input to the configuration and run state.
pub fn handle_cloth_input(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut config: ResMut<ClothConfig>,
    mut control: ResMut<SimulationControl>,
) {
    const PRESET_KEYS: [KeyCode; 3] = [KeyCode::Digit1, KeyCode::Digit2, KeyCode::Digit3];

    for (key, n) in PRESET_KEYS.into_iter().zip(RESOLUTION_PRESETS) {
        if keyboard.just_pressed(key) && config.mesh_resolution != n {
            info!("Switching to {n}x{n} cloth");
            config.mesh_resolution = n;
        }
    }

    if keyboard.just_pressed(KeyCode::Space) {
        control.paused = !control.paused;
        info!("{}", if control.paused { "Paused" } else { "Resumed" });
    }

    if keyboard.just_pressed(KeyCode::KeyW) {
        match control.stored_wind.take() {
            Some(wind) => config.wind = wind,
            None => {
                control.stored_wind = Some(config.wind);
                config.wind = Vec3::ZERO;
            }
        }
        info!("Wind set to {}", config.wind);
    }
}
