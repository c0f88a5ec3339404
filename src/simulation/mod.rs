//! Simulation module - mass-spring cloth on the CPU and in GPU textures.
//!
//! Both integrators run side by side from the same [`ClothConfig`]: the CPU
//! [`ClothSimulation`] in the main world, the texture integrator in the render
//! graph.

pub mod forces;
pub mod gpgpu;
pub mod grid;
pub mod input;
pub mod integrator;
pub mod passes;
pub mod physics_config;
pub mod scenarios;
pub mod setup;
pub mod state;
pub mod systems;
pub mod texture;

use bevy::{
    prelude::*,
    render::{
        extract_resource::ExtractResourcePlugin,
        render_graph::{RenderGraph, RenderLabel},
        Render, RenderApp, RenderSet,
    },
};

pub use forces::{ForceBreakdown, ForceModel};
pub use gpgpu::{
    Gpgpu, GpuCloth, Pass, PassBackend, PassError, PassInvocation, PassRecorder, SoftwareBackend,
};
pub use grid::{Grid2, GridCoord};
pub use input::SimulationControl;
pub use integrator::ClothSimulation;
pub use physics_config::{
    substeps_per_frame, ClothConfig, FlexionRestLength, Pinning, RestLengths, SpringRank, WarmUp,
    GRAVITY, RESOLUTION_PRESETS,
};
pub use scenarios::{ActiveScenario, Scenario};
pub use setup::GpuClothTextures;
pub use state::ParticleState;
pub use texture::{TexelTexture, TextureId};

/// Plugin that runs the CPU cloth and the GPU texture integrator.
#[derive(Default)]
pub struct SimulationPlugin {
    pub scenario: Scenario,
}

impl Plugin for SimulationPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(self.scenario.config())
            .insert_resource(ActiveScenario(self.scenario))
            .init_resource::<SimulationControl>()
            .add_plugins((
                ExtractResourcePlugin::<ClothConfig>::default(),
                ExtractResourcePlugin::<GpuClothTextures>::default(),
                ExtractResourcePlugin::<SimulationControl>::default(),
            ))
            .add_systems(Startup, setup::setup_cloth)
            .add_systems(
                Update,
                (
                    input::handle_cloth_input,
                    setup::apply_config_changes,
                    systems::advance_cpu_cloth,
                )
                    .chain()
                    .in_set(ClothStepSet),
            );

        let render_app = app.sub_app_mut(RenderApp);
        render_app
            .add_systems(
                Render,
                systems::prepare_params.in_set(RenderSet::PrepareResources),
            )
            .add_systems(
                Render,
                systems::prepare_bind_groups.in_set(RenderSet::PrepareBindGroups),
            );

        // Add cloth compute node to render graph
        let mut render_graph = render_app.world_mut().resource_mut::<RenderGraph>();
        render_graph.add_node(ClothPhysicsLabel, systems::ClothGpuNode::default());
        render_graph.add_node_edge(ClothPhysicsLabel, bevy::render::graph::CameraDriverLabel);
    }

    fn finish(&self, app: &mut App) {
        let render_app = app.sub_app_mut(RenderApp);
        render_app.init_resource::<setup::ClothParamsBuffers>();
        render_app.init_resource::<systems::ClothPipelines>();
    }
}

/// Systems that step the CPU cloth; mesh updates run after this set.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClothStepSet;

/// Label for the cloth compute node in the render graph.
#[derive(Debug, Hash, PartialEq, Eq, Clone, RenderLabel)]
pub struct ClothPhysicsLabel;
