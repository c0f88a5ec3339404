//! Cloth stepping systems.
//!
//! The CPU integrator advances in the main world. The texture integrator is
//! driven by [`ClothGpuNode`], which records one frame of passes in `update`
//! and replays them as compute passes in `run`:
//!
//! 1. init (zero both velocity textures, warm-up only)
//! 2. velocity (previous velocity + positions → velocity)
//! 3. position (velocity + positions + origin → next positions)
//!
//! The latest positions are then copied into the display texture.

use bevy::{
    prelude::*,
    render::{
        render_asset::RenderAssets,
        render_graph::{self, RenderGraphContext},
        render_resource::*,
        renderer::{RenderContext, RenderDevice, RenderQueue},
        texture::GpuImage,
    },
    utils::HashMap,
};

use super::gpgpu::{GpuCloth, Pass, PassInvocation, PassRecorder};
use super::input::SimulationControl;
use super::integrator::ClothSimulation;
use super::physics_config::ClothConfig;
use super::setup::{ClothParamsBuffers, GpuClothTextures};
use super::texture::TextureId;
use crate::resources::ClothParams;

/// Side of the square compute workgroup; matches `@workgroup_size` in the shaders.
pub const WORKGROUP_SIZE: u32 = 8;

// ==================== CPU Integrator ====================

/// Advance the CPU cloth by one frame worth of substeps.
pub fn advance_cpu_cloth(
    control: Res<SimulationControl>,
    simulation: Option<ResMut<ClothSimulation>>,
) {
    let Some(mut simulation) = simulation else {
        return;
    };
    if control.paused {
        return;
    }
    simulation.advance_frame();
    if !simulation.state().is_finite() {
        warn!(
            "CPU cloth diverged after {} steps; reduce the step size or stiffness",
            simulation.steps()
        );
    }
}

// ==================== Pipeline Resources ====================

/// Compute pipelines of the texture integrator.
#[derive(Resource)]
pub struct ClothPipelines {
    pub init: CachedComputePipelineId,
    pub velocity: CachedComputePipelineId,
    pub position: CachedComputePipelineId,
    pub init_layout: BindGroupLayout,
    pub velocity_layout: BindGroupLayout,
    pub position_layout: BindGroupLayout,
}

impl FromWorld for ClothPipelines {
    fn from_world(world: &mut World) -> Self {
        let render_device = world.resource::<RenderDevice>();
        let asset_server = world.resource::<AssetServer>();
        let pipeline_cache = world.resource::<PipelineCache>();

        let init_layout = render_device.create_bind_group_layout(
            Some("Cloth Init Layout"),
            &[storage_texture_entry(0)],
        );

        let velocity_layout = render_device.create_bind_group_layout(
            Some("Cloth Velocity Layout"),
            &[
                sampled_texture_entry(0), // previous velocity
                sampled_texture_entry(1), // positions
                storage_texture_entry(2), // new velocity
                uniform_buffer_entry(3),
            ],
        );

        let position_layout = render_device.create_bind_group_layout(
            Some("Cloth Position Layout"),
            &[
                sampled_texture_entry(0), // velocity
                sampled_texture_entry(1), // positions
                sampled_texture_entry(2), // origin
                storage_texture_entry(3), // next positions
                uniform_buffer_entry(4),
            ],
        );

        let queue = |label: &'static str, path: &'static str, layout: &BindGroupLayout| {
            pipeline_cache.queue_compute_pipeline(ComputePipelineDescriptor {
                label: Some(label.into()),
                layout: vec![layout.clone()],
                shader: asset_server.load(path),
                shader_defs: vec![],
                entry_point: "main".into(),
                push_constant_ranges: vec![],
                zero_initialize_workgroup_memory: true,
            })
        };

        let init = queue("Cloth Init Pipeline", "shaders/cloth_init.wgsl", &init_layout);
        let velocity = queue(
            "Cloth Velocity Pipeline",
            "shaders/cloth_velocity.wgsl",
            &velocity_layout,
        );
        let position = queue(
            "Cloth Position Pipeline",
            "shaders/cloth_position.wgsl",
            &position_layout,
        );

        Self {
            init,
            velocity,
            position,
            init_layout,
            velocity_layout,
            position_layout,
        }
    }
}

impl ClothPipelines {
    fn ids(&self) -> [CachedComputePipelineId; 3] {
        [self.init, self.velocity, self.position]
    }

    /// `Ok(true)` once every pipeline compiled, `Err` on a compile failure.
    fn readiness(&self, pipeline_cache: &PipelineCache) -> Result<bool, String> {
        let mut ready = true;
        for id in self.ids() {
            match pipeline_cache.get_compute_pipeline_state(id) {
                CachedPipelineState::Ok(_) => {}
                CachedPipelineState::Err(PipelineCacheError::ShaderNotLoaded(_)) => ready = false,
                CachedPipelineState::Err(err) => return Err(err.to_string()),
                _ => ready = false,
            }
        }
        Ok(ready)
    }
}

fn sampled_texture_entry(binding: u32) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::COMPUTE,
        ty: BindingType::Texture {
            sample_type: TextureSampleType::Float { filterable: false },
            view_dimension: TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn storage_texture_entry(binding: u32) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::COMPUTE,
        ty: BindingType::StorageTexture {
            access: StorageTextureAccess::WriteOnly,
            format: TextureFormat::Rgba32Float,
            view_dimension: TextureViewDimension::D2,
        },
        count: None,
    }
}

fn uniform_buffer_entry(binding: u32) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::COMPUTE,
        ty: BindingType::Buffer {
            ty: BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

// ==================== Uniforms and Bind Groups ====================

/// Upload the extracted configuration into both parameter buffers.
pub fn prepare_params(
    render_queue: Res<RenderQueue>,
    config: Option<Res<ClothConfig>>,
    buffers: Option<Res<ClothParamsBuffers>>,
) {
    let (Some(config), Some(buffers)) = (config, buffers) else {
        return;
    };
    let params = match ClothParams::new(&config, false) {
        Ok(params) => params,
        Err(err) => {
            if config.is_changed() {
                error!("Cannot upload cloth parameters: {err}");
            }
            return;
        }
    };
    render_queue.write_buffer(&buffers.start, 0, bytemuck::bytes_of(&params.with_start(true)));
    render_queue.write_buffer(&buffers.running, 0, bytemuck::bytes_of(&params));
}

/// One bind group per invocation the integrator can issue.
#[derive(Resource)]
pub struct ClothBindGroups {
    pub groups: HashMap<PassInvocation, BindGroup>,
    /// Texture generation these bind groups were built for.
    pub generation: u32,
}

/// Build the bind groups whenever the state textures are recreated.
pub fn prepare_bind_groups(
    mut commands: Commands,
    render_device: Res<RenderDevice>,
    gpu_images: Res<RenderAssets<GpuImage>>,
    pipelines: Option<Res<ClothPipelines>>,
    textures: Option<Res<GpuClothTextures>>,
    buffers: Option<Res<ClothParamsBuffers>>,
    existing: Option<Res<ClothBindGroups>>,
) {
    let (Some(pipelines), Some(textures), Some(buffers)) = (pipelines, textures, buffers) else {
        return;
    };
    if existing.is_some_and(|groups| groups.generation == textures.generation) {
        return;
    }

    let mut views = Vec::with_capacity(TextureId::COUNT);
    for id in TextureId::ALL {
        // Images upload asynchronously; try again next frame.
        let Some(image) = gpu_images.get(textures.handle(id)) else {
            return;
        };
        views.push(&image.texture_view);
    }
    let view = |id: TextureId| BindingResource::TextureView(views[id.0]);

    let mut groups = HashMap::default();
    for invocation in PassInvocation::bindable() {
        let bind_group = match invocation.pass {
            Pass::Init => render_device.create_bind_group(
                Some("Cloth Init BindGroup"),
                &pipelines.init_layout,
                &[BindGroupEntry {
                    binding: 0,
                    resource: view(invocation.target),
                }],
            ),
            Pass::Velocity {
                prev_velocity,
                position,
            } => render_device.create_bind_group(
                Some("Cloth Velocity BindGroup"),
                &pipelines.velocity_layout,
                &[
                    BindGroupEntry {
                        binding: 0,
                        resource: view(prev_velocity),
                    },
                    BindGroupEntry {
                        binding: 1,
                        resource: view(position),
                    },
                    BindGroupEntry {
                        binding: 2,
                        resource: view(invocation.target),
                    },
                    BindGroupEntry {
                        binding: 3,
                        resource: buffers.running.as_entire_binding(),
                    },
                ],
            ),
            Pass::Position {
                velocity,
                position,
                origin,
                is_start,
            } => {
                let params = if is_start {
                    &buffers.start
                } else {
                    &buffers.running
                };
                render_device.create_bind_group(
                    Some("Cloth Position BindGroup"),
                    &pipelines.position_layout,
                    &[
                        BindGroupEntry {
                            binding: 0,
                            resource: view(velocity),
                        },
                        BindGroupEntry {
                            binding: 1,
                            resource: view(position),
                        },
                        BindGroupEntry {
                            binding: 2,
                            resource: view(origin),
                        },
                        BindGroupEntry {
                            binding: 3,
                            resource: view(invocation.target),
                        },
                        BindGroupEntry {
                            binding: 4,
                            resource: params.as_entire_binding(),
                        },
                    ],
                )
            }
        };
        groups.insert(invocation, bind_group);
    }

    info!(
        "Cloth bind groups ready for {}x{} textures",
        textures.resolution, textures.resolution
    );
    commands.insert_resource(ClothBindGroups {
        groups,
        generation: textures.generation,
    });
}

// ==================== Render Graph Node ====================

enum ClothNodeState {
    Loading,
    Running {
        cloth: GpuCloth,
        recorder: PassRecorder,
        generation: u32,
    },
    /// A pass or pipeline failed; stays here until the textures are rebuilt.
    Failed { generation: u32 },
}

impl ClothNodeState {
    fn generation(&self) -> Option<u32> {
        match self {
            ClothNodeState::Loading => None,
            ClothNodeState::Running { generation, .. } | ClothNodeState::Failed { generation } => {
                Some(*generation)
            }
        }
    }
}

/// Steps the texture integrator once per frame.
pub struct ClothGpuNode {
    state: ClothNodeState,
}

impl Default for ClothGpuNode {
    fn default() -> Self {
        Self {
            state: ClothNodeState::Loading,
        }
    }
}

impl render_graph::Node for ClothGpuNode {
    fn update(&mut self, world: &mut World) {
        let (Some(textures), Some(config), Some(pipelines)) = (
            world.get_resource::<GpuClothTextures>(),
            world.get_resource::<ClothConfig>(),
            world.get_resource::<ClothPipelines>(),
        ) else {
            return;
        };
        let generation = textures.generation;
        let paused = world
            .get_resource::<SimulationControl>()
            .is_some_and(|control| control.paused);
        let bind_groups_ready = world
            .get_resource::<ClothBindGroups>()
            .is_some_and(|groups| groups.generation == generation);
        let pipeline_cache = world.resource::<PipelineCache>();

        if !matches!(self.state, ClothNodeState::Loading)
            && self.state.generation() != Some(generation)
        {
            self.state = ClothNodeState::Loading;
        }

        match &mut self.state {
            ClothNodeState::Loading => match pipelines.readiness(pipeline_cache) {
                _ if ClothParams::new(config, false).is_err() => {
                    error!("Cloth configuration cannot run on the texture integrator");
                    self.state = ClothNodeState::Failed { generation };
                }
                Ok(true) if bind_groups_ready => {
                    info!("Cloth compute pipelines ready, starting texture integrator");
                    self.state = ClothNodeState::Running {
                        cloth: GpuCloth::new(config.warm_up),
                        recorder: PassRecorder::default(),
                        generation,
                    };
                }
                Ok(_) => {}
                Err(err) => {
                    error!("Cloth compute pipeline failed: {err}");
                    self.state = ClothNodeState::Failed { generation };
                }
            },
            ClothNodeState::Running {
                cloth, recorder, ..
            } => {
                recorder.clear();
                if paused {
                    return;
                }
                if let Err(err) = cloth.advance_frame(recorder, config.substeps_per_frame()) {
                    error!("Texture integrator stopped: {err}");
                    self.state = ClothNodeState::Failed { generation };
                }
            }
            ClothNodeState::Failed { .. } => {}
        }
    }

    fn run<'w>(
        &self,
        _graph: &mut RenderGraphContext,
        render_context: &mut RenderContext<'w>,
        world: &'w World,
    ) -> Result<(), render_graph::NodeRunError> {
        let ClothNodeState::Running {
            cloth, recorder, ..
        } = &self.state
        else {
            return Ok(());
        };
        let (Some(pipelines), Some(bind_groups), Some(textures)) = (
            world.get_resource::<ClothPipelines>(),
            world.get_resource::<ClothBindGroups>(),
            world.get_resource::<GpuClothTextures>(),
        ) else {
            return Ok(());
        };
        let pipeline_cache = world.resource::<PipelineCache>();
        let gpu_images = world.resource::<RenderAssets<GpuImage>>();

        let (Some(init_pipeline), Some(velocity_pipeline), Some(position_pipeline)) = (
            pipeline_cache.get_compute_pipeline(pipelines.init),
            pipeline_cache.get_compute_pipeline(pipelines.velocity),
            pipeline_cache.get_compute_pipeline(pipelines.position),
        ) else {
            return Ok(());
        };

        let workgroups = textures.resolution.div_ceil(WORKGROUP_SIZE);

        for invocation in &recorder.invocations {
            let Some(bind_group) = bind_groups.groups.get(invocation) else {
                error!("No bind group for {invocation:?}");
                return Ok(());
            };
            let pipeline = match invocation.pass {
                Pass::Init => init_pipeline,
                Pass::Velocity { .. } => velocity_pipeline,
                Pass::Position { .. } => position_pipeline,
            };
            let mut pass = render_context
                .command_encoder()
                .begin_compute_pass(&ComputePassDescriptor {
                    label: Some(invocation.pass.label()),
                    timestamp_writes: None,
                });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(workgroups, workgroups, 1);
        }

        let (Some(latest), Some(display)) = (
            gpu_images.get(textures.handle(cloth.position())),
            gpu_images.get(&textures.display),
        ) else {
            return Ok(());
        };
        render_context.command_encoder().copy_texture_to_texture(
            latest.texture.as_image_copy(),
            display.texture.as_image_copy(),
            Extent3d {
                width: textures.resolution,
                height: textures.resolution,
                depth_or_array_layers: 1,
            },
        );

        Ok(())
    }
}
