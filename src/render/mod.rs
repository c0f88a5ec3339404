//! Cloth rendering.
//!
//! The CPU cloth is an ordinary mesh whose vertex buffer is rewritten every
//! frame. The GPU cloth never leaves the GPU: its mesh is a flat grid whose
//! vertices look up their position in the display texture the compute node
//! fills, through [`ClothDisplayMaterial`].

use bevy::{
    pbr::{MaterialPipeline, MaterialPipelineKey, NotShadowCaster},
    prelude::*,
    render::{
        mesh::{Indices, MeshVertexBufferLayoutRef},
        render_asset::RenderAssetUsages,
        render_resource::{
            AsBindGroup, PrimitiveTopology, RenderPipelineDescriptor, ShaderRef,
            SpecializedMeshPipelineError,
        },
        view::NoFrustumCulling,
    },
};

use crate::simulation::{
    setup::setup_cloth, ClothSimulation, ClothStepSet, GpuClothTextures, ParticleState,
};

pub const DISPLAY_SHADER_PATH: &str = "shaders/cloth_display.wgsl";

/// Horizontal distance of each cloth from the origin.
const CLOTH_OFFSET: f32 = 2.5;

/// Plugin that draws the CPU cloth on the left and the GPU cloth on the right.
pub struct ClothRenderPlugin;

impl Plugin for ClothRenderPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(MaterialPlugin::<ClothDisplayMaterial>::default())
            .add_systems(Startup, spawn_cloth_meshes.after(setup_cloth))
            .add_systems(Update, (sync_cpu_mesh, sync_gpu_mesh).after(ClothStepSet));
    }
}

/// Marker for the mesh that follows [`ClothSimulation`].
#[derive(Component)]
pub struct CpuClothMesh;

/// Marker for the mesh displaced by the GPU display texture.
#[derive(Component)]
pub struct GpuClothMesh;

/// Material that positions each vertex from an RGBA32F position texture.
/// Vertex `(i, j)` reads texel `(j, i)` through its UV.
#[derive(Asset, TypePath, AsBindGroup, Clone, Debug)]
pub struct ClothDisplayMaterial {
    #[uniform(0)]
    pub color: LinearRgba,
    #[texture(1, sample_type = "float", filterable = false)]
    pub positions: Handle<Image>,
}

impl Material for ClothDisplayMaterial {
    fn vertex_shader() -> ShaderRef {
        DISPLAY_SHADER_PATH.into()
    }

    fn fragment_shader() -> ShaderRef {
        DISPLAY_SHADER_PATH.into()
    }

    fn specialize(
        _pipeline: &MaterialPipeline<Self>,
        descriptor: &mut RenderPipelineDescriptor,
        _layout: &MeshVertexBufferLayoutRef,
        _key: MaterialPipelineKey<Self>,
    ) -> Result<(), SpecializedMeshPipelineError> {
        descriptor.primitive.cull_mode = None;
        Ok(())
    }
}

/// Two triangles per grid cell, `(i,j) (i,j+1) (i+1,j+1)` and
/// `(i,j) (i+1,j+1) (i+1,j)`.
pub fn cloth_indices(n: usize) -> Vec<u32> {
    let cells = n.saturating_sub(1);
    let mut indices = Vec::with_capacity(cells * cells * 6);
    for i in 0..cells {
        for j in 0..cells {
            let at = |i: usize, j: usize| (i * n + j) as u32;
            indices.extend_from_slice(&[
                at(i, j),
                at(i, j + 1),
                at(i + 1, j + 1),
                at(i, j),
                at(i + 1, j + 1),
                at(i + 1, j),
            ]);
        }
    }
    indices
}

/// UV of every vertex at the center of its texel.
pub fn cloth_uvs(n: usize) -> Vec<[f32; 2]> {
    let side = n as f32;
    (0..n)
        .flat_map(|i| (0..n).map(move |j| [(j as f32 + 0.5) / side, (i as f32 + 0.5) / side]))
        .collect()
}

/// Triangle mesh of `state`, one vertex per node in row-major order.
pub fn cloth_mesh(state: &ParticleState) -> Mesh {
    let n = state.resolution();
    Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default())
        .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, vertex_data(state.positions.iter()))
        .with_inserted_attribute(Mesh::ATTRIBUTE_NORMAL, vertex_data(state.normals.iter()))
        .with_inserted_attribute(Mesh::ATTRIBUTE_UV_0, cloth_uvs(n))
        .with_inserted_indices(Indices::U32(cloth_indices(n)))
}

fn vertex_data<'a>(values: impl Iterator<Item = &'a Vec3>) -> Vec<[f32; 3]> {
    values.map(|v| v.to_array()).collect()
}

fn spawn_cloth_meshes(
    mut commands: Commands,
    simulation: Res<ClothSimulation>,
    textures: Res<GpuClothTextures>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut standard_materials: ResMut<Assets<StandardMaterial>>,
    mut display_materials: ResMut<Assets<ClothDisplayMaterial>>,
) {
    commands.spawn((
        CpuClothMesh,
        Mesh3d(meshes.add(cloth_mesh(simulation.state()))),
        MeshMaterial3d(standard_materials.add(StandardMaterial {
            base_color: Color::srgb(0.25, 0.45, 0.85),
            double_sided: true,
            cull_mode: None,
            perceptual_roughness: 0.8,
            ..default()
        })),
        Transform::from_xyz(-CLOTH_OFFSET, 0.0, 0.0),
        NoFrustumCulling,
    ));

    let lattice = ParticleState::lattice(textures.resolution as usize);
    commands.spawn((
        GpuClothMesh,
        Mesh3d(meshes.add(cloth_mesh(&lattice))),
        MeshMaterial3d(display_materials.add(ClothDisplayMaterial {
            color: LinearRgba::new(0.85, 0.35, 0.25, 1.0),
            positions: textures.display.clone(),
        })),
        Transform::from_xyz(CLOTH_OFFSET, 0.0, 0.0),
        NoFrustumCulling,
        NotShadowCaster,
    ));
}

/// Copy the CPU state into the mesh, rebuilding it after a resolution change.
fn sync_cpu_mesh(
    simulation: Res<ClothSimulation>,
    query: Query<&Mesh3d, With<CpuClothMesh>>,
    mut meshes: ResMut<Assets<Mesh>>,
) {
    if !simulation.is_changed() {
        return;
    }
    let state = simulation.state();
    let n = state.resolution();
    for mesh3d in &query {
        let Some(mesh) = meshes.get_mut(&mesh3d.0) else {
            continue;
        };
        if mesh.count_vertices() != n * n {
            *mesh = cloth_mesh(state);
            continue;
        }
        mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, vertex_data(state.positions.iter()));
        mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, vertex_data(state.normals.iter()));
    }
}

/// Point the GPU mesh at the current display texture.
fn sync_gpu_mesh(
    textures: Res<GpuClothTextures>,
    query: Query<(&Mesh3d, &MeshMaterial3d<ClothDisplayMaterial>), With<GpuClothMesh>>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<ClothDisplayMaterial>>,
) {
    if !textures.is_changed() {
        return;
    }
    let n = textures.resolution as usize;
    for (mesh3d, material) in &query {
        if let Some(mesh) = meshes.get_mut(&mesh3d.0) {
            if mesh.count_vertices() != n * n {
                *mesh = cloth_mesh(&ParticleState::lattice(n));
            }
        }
        if let Some(material) = materials.get_mut(&material.0) {
            material.positions = textures.display.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_triangles_per_cell() {
        let indices = cloth_indices(3);
        assert_eq!(indices.len(), 2 * 2 * 6);
        assert_eq!(&indices[..6], &[0, 1, 4, 0, 4, 3]);
        assert!(indices.iter().all(|&k| k < 9));
    }

    #[test]
    fn uvs_land_on_texel_centers() {
        let uvs = cloth_uvs(4);
        // vertex (1, 2) is texel x = 2, y = 1
        let [u, v] = uvs[6];
        assert_eq!((u * 4.0).floor(), 2.0);
        assert_eq!((v * 4.0).floor(), 1.0);
    }

    #[test]
    fn mesh_matches_state() {
        let state = ParticleState::lattice(5);
        let mesh = cloth_mesh(&state);
        assert_eq!(mesh.count_vertices(), 25);
        assert_eq!(mesh.indices().map(|i| i.len()), Some(4 * 4 * 6));
    }
}
