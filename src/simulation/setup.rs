//! Texture and buffer initialization for the cloth simulation.

use bevy::{
    prelude::*,
    render::{
        extract_resource::ExtractResource,
        render_asset::RenderAssetUsages,
        render_resource::{
            Buffer, BufferDescriptor, BufferUsages, Extent3d, TextureDimension, TextureFormat,
            TextureUsages,
        },
        renderer::RenderDevice,
    },
};

use super::integrator::ClothSimulation;
use super::physics_config::ClothConfig;
use super::scenarios::ActiveScenario;
use super::state::ParticleState;
use super::texture::{TexelTexture, TextureId};
use crate::resources::ClothParams;

/// Handles of the state textures of the GPU integrator, plus the display
/// texture the latest positions are copied into every frame.
#[derive(Resource, Clone, ExtractResource)]
pub struct GpuClothTextures {
    pub state: [Handle<Image>; TextureId::COUNT],
    pub display: Handle<Image>,
    /// Texture side length.
    pub resolution: u32,
    /// Incremented every time the textures are recreated.
    pub generation: u32,
}

impl GpuClothTextures {
    /// Upload `state` into a fresh set of textures.
    pub fn create(images: &mut Assets<Image>, state: &ParticleState, generation: u32) -> Self {
        let velocity = TexelTexture::from_vectors(&state.velocities, 0.0);
        let position = TexelTexture::from_vectors(&state.positions, 1.0);
        let state_usage = TextureUsages::STORAGE_BINDING
            | TextureUsages::TEXTURE_BINDING
            | TextureUsages::COPY_SRC
            | TextureUsages::COPY_DST;

        let handles = TextureId::ALL.map(|id| {
            let source = match id {
                TextureId::VELOCITY_A | TextureId::VELOCITY_B => &velocity,
                _ => &position,
            };
            images.add(state_image(id.label(), source, state_usage))
        });
        let display = images.add(state_image(
            "Cloth Display",
            &position,
            TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
        ));

        Self {
            state: handles,
            display,
            resolution: position.width(),
            generation,
        }
    }

    pub fn handle(&self, id: TextureId) -> &Handle<Image> {
        &self.state[id.0]
    }
}

fn state_image(label: &'static str, texture: &TexelTexture, usage: TextureUsages) -> Image {
    let size = Extent3d {
        width: texture.width(),
        height: texture.width(),
        depth_or_array_layers: 1,
    };
    let mut image = Image::new(
        size,
        TextureDimension::D2,
        texture.as_bytes().to_vec(),
        TextureFormat::Rgba32Float,
        RenderAssetUsages::RENDER_WORLD,
    );
    image.texture_descriptor.label = Some(label);
    image.texture_descriptor.usage = usage;
    image
}

/// Create the CPU simulation and the GPU textures from the active scenario.
pub fn setup_cloth(
    mut commands: Commands,
    config: Res<ClothConfig>,
    scenario: Res<ActiveScenario>,
    mut images: ResMut<Assets<Image>>,
) {
    let state = scenario.0.initial_state(&config);
    info!(
        "Cloth {}x{} ({:?}), {} substeps per frame",
        config.mesh_resolution,
        config.mesh_resolution,
        scenario.0,
        config.substeps_per_frame()
    );
    commands.insert_resource(GpuClothTextures::create(&mut images, &state, 0));
    commands.insert_resource(ClothSimulation::from_state(config.clone(), state));
}

/// Rebuild both integrators when the configuration changes in a way that
/// invalidates the state. Wind changes are applied in place.
pub fn apply_config_changes(
    config: Res<ClothConfig>,
    scenario: Res<ActiveScenario>,
    simulation: Option<ResMut<ClothSimulation>>,
    textures: Option<ResMut<GpuClothTextures>>,
    mut images: ResMut<Assets<Image>>,
) {
    let (Some(mut simulation), Some(mut textures)) = (simulation, textures) else {
        return;
    };
    if !config.is_changed() {
        return;
    }

    let mut unchanged = simulation.config().clone();
    unchanged.wind = config.wind;
    if unchanged == *config {
        if simulation.config().wind != config.wind {
            simulation.set_wind(config.wind);
        }
        return;
    }

    info!(
        "Resetting cloth at {}x{}",
        config.mesh_resolution, config.mesh_resolution
    );
    let state = scenario.0.initial_state(&config);
    *simulation = ClothSimulation::from_state(config.clone(), state.clone());
    *textures = GpuClothTextures::create(&mut images, &state, textures.generation + 1);
}

/// Uniform buffers holding [`ClothParams`] with `is_start` set and cleared.
/// Written every frame by `prepare_params`.
#[derive(Resource)]
pub struct ClothParamsBuffers {
    pub start: Buffer,
    pub running: Buffer,
}

impl FromWorld for ClothParamsBuffers {
    fn from_world(world: &mut World) -> Self {
        let render_device = world.resource::<RenderDevice>();
        let create = |label: &str| {
            render_device.create_buffer(&BufferDescriptor {
                label: Some(label),
                size: std::mem::size_of::<ClothParams>() as u64,
                usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };

        Self {
            start: create("ClothParams Start Buffer"),
            running: create("ClothParams Buffer"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_images_are_labeled_and_sized() {
        let mut images = Assets::<Image>::default();
        let state = ParticleState::lattice(4);
        let textures = GpuClothTextures::create(&mut images, &state, 3);
        assert_eq!(textures.resolution, 4);
        assert_eq!(textures.generation, 3);

        for id in TextureId::ALL {
            let image = images.get(textures.handle(id)).unwrap();
            assert_eq!(image.texture_descriptor.label, Some(id.label()));
            assert_eq!(image.data.len(), 4 * 4 * 16);
        }
        let display = images.get(&textures.display).unwrap();
        assert_eq!(display.texture_descriptor.label, Some("Cloth Display"));
        assert!(!display.texture_descriptor.usage.contains(TextureUsages::STORAGE_BINDING));
    }
}
