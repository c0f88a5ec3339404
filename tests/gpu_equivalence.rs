//! Texture Integrator Equivalence Tests
//!
//! Runs the per-texel pass programs through the software backend and checks
//! them against the CPU integrator, plus the warm-up schedule.
//!
//! # Running tests
//! ```bash
//! cargo test --test gpu_equivalence
//! ```

use bevy::math::Vec3;
use clothsim::simulation::scenarios::jittered_lattice;
use clothsim::simulation::{
    ClothConfig, ClothSimulation, Gpgpu, GpuCloth, GridCoord, ParticleState, PassError,
    Pinning, SoftwareBackend, TexelTexture, TextureId, WarmUp,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Relative tolerance between the two integrators.
const TOLERANCE: f32 = 1e-4;

/// Speed the default drape never reaches; it peaks at a few units per second.
const DRAPE_SPEED_LIMIT: f32 = 50.0;

// ==================== HELPER FUNCTIONS ====================

fn equivalence_config(n: usize) -> ClothConfig {
    ClothConfig {
        mesh_resolution: n,
        stiffness: [400.0, 300.0, 200.0],
        warm_up: WarmUp::disabled(),
        ..ClothConfig::default()
    }
}

fn perturbed_state(n: usize, seed: u64) -> ParticleState {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut state = jittered_lattice(n, 0.05, seed);
    for at in state.velocities.coords() {
        state.velocities[at] = Vec3::new(
            rng.gen_range(-0.2..0.2),
            rng.gen_range(-0.2..0.2),
            rng.gen_range(-0.2..0.2),
        );
    }
    state
}

/// `gpu` must be within `TOLERANCE` of `cpu` relative to its length. The
/// epsilon floor only matters for vectors that are exactly zero on both sides.
fn assert_close(label: &str, at: GridCoord, cpu: Vec3, gpu: Vec3) {
    let error = (cpu - gpu).length();
    assert!(
        error <= TOLERANCE * cpu.length() + f32::EPSILON,
        "{label} of {at:?}: cpu {cpu}, texture {gpu}, error {error}"
    );
}

fn assert_same_state(cpu: &ClothSimulation, backend: &SoftwareBackend, gpu: &GpuCloth) {
    let positions = backend.texture(gpu.position()).unwrap();
    let velocities = backend.texture(gpu.velocity()).unwrap();
    for at in cpu.state().positions.coords() {
        assert_close("position", at, cpu.state().position(at), positions.node(at).unwrap());
        assert_close("velocity", at, cpu.state().velocity(at), velocities.node(at).unwrap());
    }
}

/// Step both integrators `steps` times from `state` and compare.
fn assert_equivalent(config: &ClothConfig, state: ParticleState, steps: usize) {
    let mut cpu = ClothSimulation::from_state(config.clone(), state.clone());
    let mut backend = SoftwareBackend::new(config, &state).unwrap();
    let mut gpu = GpuCloth::new(config.warm_up);

    for _ in 0..steps {
        cpu.step(config.step_size);
        gpu.step(&mut backend).unwrap();
    }

    assert_same_state(&cpu, &backend, &gpu);
}

fn max_texel_speed(texture: &TexelTexture) -> f32 {
    texture.to_vectors().iter().map(|v| v.length()).fold(0.0, f32::max)
}

// ==================== EQUIVALENCE ====================

#[test]
fn test_single_step_matches_cpu() {
    let config = equivalence_config(6);
    assert_equivalent(&config, perturbed_state(6, 1), 1);
}

#[test]
fn test_several_steps_match_cpu() {
    let config = equivalence_config(6);
    assert_equivalent(&config, perturbed_state(6, 2), 10);
}

#[test]
fn test_free_grid_matches_cpu() {
    let config = ClothConfig {
        pinning: Pinning::Free,
        ..equivalence_config(4)
    };
    assert_equivalent(&config, perturbed_state(4, 3), 5);
}

#[test]
fn test_mid_run_upload_matches_cpu() {
    let config = equivalence_config(5);
    let mut cpu = ClothSimulation::from_state(config.clone(), perturbed_state(5, 6));
    for _ in 0..20 {
        cpu.step(config.step_size);
    }

    // textures start from the flat lattice and are overwritten with the
    // CPU state twenty steps in
    let mut backend = SoftwareBackend::new(&config, &ParticleState::lattice(5)).unwrap();
    let mut gpu = GpuCloth::new(config.warm_up);
    let state = cpu.state();
    backend
        .upload(gpu.velocity(), TexelTexture::from_vectors(&state.velocities, 0.0))
        .unwrap();
    for id in [gpu.position(), TextureId::ORIGIN] {
        backend
            .upload(id, TexelTexture::from_vectors(&state.positions, 1.0))
            .unwrap();
    }

    for _ in 0..5 {
        cpu.step(config.step_size);
        gpu.step(&mut backend).unwrap();
    }
    assert_same_state(&cpu, &backend, &gpu);
}

#[test]
fn test_upload_rejects_wrong_size() {
    let config = equivalence_config(4);
    let mut backend = SoftwareBackend::new(&config, &ParticleState::lattice(4)).unwrap();
    assert_eq!(
        backend.upload(TextureId::POSITION_A, TexelTexture::zeroed(3)),
        Err(PassError::SizeMismatch {
            expected: 16,
            actual: 9
        })
    );
}

#[test]
fn test_backend_rejects_state_of_other_resolution() {
    let config = equivalence_config(4);
    assert_eq!(
        SoftwareBackend::new(&config, &ParticleState::lattice(5)).err(),
        Some(PassError::SizeMismatch {
            expected: 16,
            actual: 25
        })
    );
}

#[test]
fn test_pinned_texels_keep_state() {
    let config = equivalence_config(5);
    let state = perturbed_state(5, 4);
    let mut backend = SoftwareBackend::new(&config, &state).unwrap();
    let mut gpu = GpuCloth::new(WarmUp::disabled());
    for _ in 0..7 {
        gpu.step(&mut backend).unwrap();
    }
    let positions = backend.texture(gpu.position()).unwrap();
    for at in config.pinned_nodes() {
        assert_eq!(positions.node(at), Some(state.position(at)));
    }
}

// ==================== WARM-UP ====================

#[test]
fn test_init_zeroes_both_velocity_textures() {
    let config = equivalence_config(4);
    let state = perturbed_state(4, 5);
    let mut backend = SoftwareBackend::new(&config, &state).unwrap();
    assert_ne!(backend.texture(TextureId::VELOCITY_A).unwrap(), &TexelTexture::zeroed(4));

    Gpgpu::default().init(&mut backend).unwrap();

    for id in [TextureId::VELOCITY_A, TextureId::VELOCITY_B] {
        assert_eq!(backend.texture(id).unwrap(), &TexelTexture::zeroed(4));
    }
}

#[test]
fn test_first_step_holds_at_origin() {
    let config = ClothConfig {
        mesh_resolution: 4,
        ..ClothConfig::default()
    };
    let state = ParticleState::lattice(4);
    let mut backend = SoftwareBackend::new(&config, &state).unwrap();
    let mut gpu = GpuCloth::new(WarmUp::default());

    gpu.step(&mut backend).unwrap();

    assert_eq!(
        backend.texture(gpu.position()).unwrap(),
        backend.texture(TextureId::ORIGIN).unwrap()
    );
    assert!(gpu.is_start());

    gpu.step(&mut backend).unwrap();
    assert!(!gpu.is_start());
    assert_ne!(
        backend.texture(gpu.position()).unwrap(),
        backend.texture(TextureId::ORIGIN).unwrap()
    );
}

#[test]
fn test_velocity_accumulates_after_warm_up() {
    // gravity only, so every step adds exactly g * dt while velocity is kept
    let config = ClothConfig {
        mesh_resolution: 3,
        stiffness: [0.0; 3],
        damping: 0.0,
        fluid_drag: 0.0,
        pinning: Pinning::Free,
        ..ClothConfig::default()
    };
    let kick = config.gravity * config.step_size;
    let state = ParticleState::lattice(3);
    let mut backend = SoftwareBackend::new(&config, &state).unwrap();
    let mut gpu = GpuCloth::new(WarmUp::default());
    let at = GridCoord::new(1, 1);

    for step in 0..12u64 {
        gpu.step(&mut backend).unwrap();
        let v = backend.texture(gpu.velocity()).unwrap().node(at).unwrap();
        let expected = if step < 10 { kick } else { kick * (step - 8) as f32 };
        assert!(
            (v.y + expected).abs() < 1e-6,
            "step {step}: velocity {v}, expected -{expected}"
        );
    }

    let moved = backend.texture(gpu.position()).unwrap().node(at).unwrap();
    assert!(moved.y < state.position(at).y);
}

// ==================== STABILITY ====================

#[test]
fn test_default_cloth_texture_integrator_stays_bounded() {
    let config = ClothConfig::default();
    let state = ParticleState::lattice(config.mesh_resolution);
    let mut backend = SoftwareBackend::new(&config, &state).unwrap();
    let mut gpu = GpuCloth::new(config.warm_up);

    for frame in 0..100 {
        gpu.advance_frame(&mut backend, config.substeps_per_frame()).unwrap();
        let speed = max_texel_speed(backend.texture(gpu.velocity()).unwrap());
        assert!(
            speed.is_finite() && speed < DRAPE_SPEED_LIMIT,
            "frame {frame}: max texel speed {speed}"
        );
    }
    assert_eq!(gpu.steps(), 1000);

    let positions = backend.texture(gpu.position()).unwrap().to_vectors();
    assert!(positions.iter().all(|p| p.is_finite()));
}
