//! Ping-pong integration over texture-resident state.
//!
//! One step of the texture integrator is two full-texture passes:
//!
//! 1. velocity pass: previous velocity + positions → the other velocity texture,
//! 2. position pass: that new velocity + positions (+ origin) → the output texture,
//!
//! followed by a swap of the two velocity handles. No pass ever reads the
//! texture it writes; the handles, not the contents, change roles.
//!
//! Passes are issued through [`PassBackend`]. [`SoftwareBackend`] runs them on
//! the CPU texel by texel; [`PassRecorder`] collects them so the render graph
//! node can replay them as compute passes on the GPU.

use super::passes::{init_texel, position_texel, velocity_texel};
use super::physics_config::{ClothConfig, WarmUp};
use super::state::ParticleState;
use super::texture::{TexelTexture, TextureId};
use crate::resources::ClothParams;

/// Error type for texture pass execution.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PassError {
    #[error("texture {0:?} does not exist")]
    MissingTexture(TextureId),

    #[error("pass writes texture {0:?} while also reading it")]
    Aliased(TextureId),

    #[error("texture holds {actual} texels, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("{count} pinned nodes requested but at most {max} fit in the uniform block")]
    TooManyPins { count: usize, max: usize },
}

/// The program a pass runs, with the textures it samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Pass {
    /// Zero-fill the target.
    Init,
    /// Integrate velocity from the previous velocity and positions.
    Velocity {
        prev_velocity: TextureId,
        position: TextureId,
    },
    /// Integrate position from the new velocity, or copy the origin while
    /// `is_start` is set.
    Position {
        velocity: TextureId,
        position: TextureId,
        origin: TextureId,
        is_start: bool,
    },
}

impl Pass {
    /// Textures the pass reads.
    pub fn inputs(&self) -> Vec<TextureId> {
        match *self {
            Pass::Init => Vec::new(),
            Pass::Velocity {
                prev_velocity,
                position,
            } => vec![prev_velocity, position],
            Pass::Position {
                velocity,
                position,
                origin,
                ..
            } => vec![velocity, position, origin],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Pass::Init => "Cloth Init Pass",
            Pass::Velocity { .. } => "Cloth Velocity Pass",
            Pass::Position { .. } => "Cloth Position Pass",
        }
    }
}

/// A pass bound to its output texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PassInvocation {
    pub pass: Pass,
    pub target: TextureId,
}

impl PassInvocation {
    /// Reject invocations that would read the texture they write.
    pub fn validate(&self) -> Result<(), PassError> {
        if self.pass.inputs().contains(&self.target) {
            return Err(PassError::Aliased(self.target));
        }
        Ok(())
    }

    /// Every invocation the integrator can issue over the fixed texture slots.
    pub fn bindable() -> Vec<PassInvocation> {
        let velocities = [TextureId::VELOCITY_A, TextureId::VELOCITY_B];
        let positions = [TextureId::POSITION_A, TextureId::POSITION_B];
        let mut all = Vec::new();
        for target in velocities {
            all.push(PassInvocation {
                pass: Pass::Init,
                target,
            });
        }
        for (k, &target) in velocities.iter().enumerate() {
            let prev_velocity = velocities[1 - k];
            for position in positions {
                all.push(PassInvocation {
                    pass: Pass::Velocity {
                        prev_velocity,
                        position,
                    },
                    target,
                });
            }
        }
        for velocity in velocities {
            for (k, &position) in positions.iter().enumerate() {
                for is_start in [true, false] {
                    all.push(PassInvocation {
                        pass: Pass::Position {
                            velocity,
                            position,
                            origin: TextureId::ORIGIN,
                            is_start,
                        },
                        target: positions[1 - k],
                    });
                }
            }
        }
        all
    }
}

/// Something that can execute full-texture passes.
///
/// Each call must complete before the next one observes its target.
pub trait PassBackend {
    fn run_pass(&mut self, invocation: &PassInvocation) -> Result<(), PassError>;
}

/// Collects invocations for later replay.
#[derive(Clone, Debug, Default)]
pub struct PassRecorder {
    pub invocations: Vec<PassInvocation>,
}

impl PassRecorder {
    pub fn clear(&mut self) {
        self.invocations.clear();
    }
}

impl PassBackend for PassRecorder {
    fn run_pass(&mut self, invocation: &PassInvocation) -> Result<(), PassError> {
        invocation.validate()?;
        self.invocations.push(*invocation);
        Ok(())
    }
}

/// Runs passes on the CPU over in-memory textures.
#[derive(Clone, Debug)]
pub struct SoftwareBackend {
    params: ClothParams,
    textures: Vec<TexelTexture>,
}

impl SoftwareBackend {
    /// Allocate the fixed texture slots for `state`.
    ///
    /// Both velocity textures start from the state's velocities; both position
    /// textures and the origin start from its positions.
    pub fn new(config: &ClothConfig, state: &ParticleState) -> Result<Self, PassError> {
        let n = config.mesh_resolution;
        if state.resolution() != n {
            return Err(PassError::SizeMismatch {
                expected: n * n,
                actual: state.positions.len(),
            });
        }
        let params = ClothParams::new(config, false)?;
        let velocity = TexelTexture::from_vectors(&state.velocities, 0.0);
        let position = TexelTexture::from_vectors(&state.positions, 1.0);
        let textures = TextureId::ALL
            .iter()
            .map(|id| match *id {
                TextureId::VELOCITY_A | TextureId::VELOCITY_B => velocity.clone(),
                _ => position.clone(),
            })
            .collect();
        Ok(Self { params, textures })
    }

    pub fn texture(&self, id: TextureId) -> Result<&TexelTexture, PassError> {
        self.textures.get(id.0).ok_or(PassError::MissingTexture(id))
    }

    /// Replace the contents of texture `id`.
    pub fn upload(&mut self, id: TextureId, texture: TexelTexture) -> Result<(), PassError> {
        let width = self.params.width;
        if texture.width() != width {
            return Err(PassError::SizeMismatch {
                expected: (width * width) as usize,
                actual: texture.texels().len(),
            });
        }
        let slot = self.textures.get_mut(id.0).ok_or(PassError::MissingTexture(id))?;
        *slot = texture;
        Ok(())
    }
}

impl PassBackend for SoftwareBackend {
    fn run_pass(&mut self, invocation: &PassInvocation) -> Result<(), PassError> {
        invocation.validate()?;
        self.texture(invocation.target)?;
        let width = self.params.width;
        let texels = match invocation.pass {
            Pass::Init => vec![init_texel(); (width * width) as usize],
            Pass::Velocity {
                prev_velocity,
                position,
            } => {
                let prev_velocity = self.texture(prev_velocity)?;
                let position = self.texture(position)?;
                map_texels(width, |x, y| {
                    velocity_texel(&self.params, prev_velocity, position, x, y)
                })
            }
            Pass::Position {
                velocity,
                position,
                origin,
                is_start,
            } => {
                let params = self.params.with_start(is_start);
                let velocity = self.texture(velocity)?;
                let position = self.texture(position)?;
                let origin = self.texture(origin)?;
                map_texels(width, |x, y| {
                    position_texel(&params, velocity, position, origin, x, y)
                })
            }
        };
        let output = TexelTexture::from_texels(width, texels)?;
        self.textures[invocation.target.0] = output;
        Ok(())
    }
}

fn map_texels(width: u32, mut f: impl FnMut(i32, i32) -> [f32; 4]) -> Vec<[f32; 4]> {
    let w = width as i32;
    let mut texels = Vec::with_capacity((width * width) as usize);
    for y in 0..w {
        for x in 0..w {
            texels.push(f(x, y));
        }
    }
    texels
}

/// Double-buffered velocity textures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Gpgpu {
    velocity: TextureId,
    prev_velocity: TextureId,
}

impl Default for Gpgpu {
    fn default() -> Self {
        Self {
            velocity: TextureId::VELOCITY_A,
            prev_velocity: TextureId::VELOCITY_B,
        }
    }
}

impl Gpgpu {
    /// Zero-fill both velocity textures.
    pub fn init<B: PassBackend>(&self, backend: &mut B) -> Result<(), PassError> {
        for target in [self.velocity, self.prev_velocity] {
            backend.run_pass(&PassInvocation {
                pass: Pass::Init,
                target,
            })?;
        }
        Ok(())
    }

    /// One integration step from `position` into `target`, then swap the
    /// velocity roles.
    pub fn process<B: PassBackend>(
        &mut self,
        backend: &mut B,
        position: TextureId,
        origin: TextureId,
        target: TextureId,
        is_start: bool,
    ) -> Result<(), PassError> {
        backend.run_pass(&PassInvocation {
            pass: Pass::Velocity {
                prev_velocity: self.prev_velocity,
                position,
            },
            target: self.velocity,
        })?;
        backend.run_pass(&PassInvocation {
            pass: Pass::Position {
                velocity: self.velocity,
                position,
                origin,
                is_start,
            },
            target,
        })?;
        std::mem::swap(&mut self.velocity, &mut self.prev_velocity);
        Ok(())
    }

    /// Texture holding the most recently written velocity.
    pub fn latest_velocity(&self) -> TextureId {
        self.prev_velocity
    }
}

/// Step driver of the texture integrator: velocity ping-pong, position
/// ping-pong and the warm-up schedule.
#[derive(Clone, Debug)]
pub struct GpuCloth {
    gpgpu: Gpgpu,
    position: TextureId,
    next_position: TextureId,
    warm_up: WarmUp,
    is_start: bool,
    count: u64,
}

impl GpuCloth {
    pub fn new(warm_up: WarmUp) -> Self {
        Self {
            gpgpu: Gpgpu::default(),
            position: TextureId::POSITION_A,
            next_position: TextureId::POSITION_B,
            warm_up,
            is_start: warm_up.hold_steps > 0,
            count: 0,
        }
    }

    /// Run one step.
    pub fn step<B: PassBackend>(&mut self, backend: &mut B) -> Result<(), PassError> {
        if self.count < self.warm_up.zero_velocity_steps {
            self.gpgpu.init(backend)?;
        }
        if self.count == self.warm_up.hold_steps {
            self.is_start = false;
        }
        self.gpgpu.process(
            backend,
            self.position,
            TextureId::ORIGIN,
            self.next_position,
            self.is_start,
        )?;
        std::mem::swap(&mut self.position, &mut self.next_position);
        self.count += 1;
        Ok(())
    }

    /// Run `substeps` steps, stopping at the first failure.
    pub fn advance_frame<B: PassBackend>(
        &mut self,
        backend: &mut B,
        substeps: u32,
    ) -> Result<(), PassError> {
        for _ in 0..substeps {
            self.step(backend)?;
        }
        Ok(())
    }

    /// Texture holding the current positions.
    pub fn position(&self) -> TextureId {
        self.position
    }

    /// Texture holding the current velocities.
    pub fn velocity(&self) -> TextureId {
        self.gpgpu.latest_velocity()
    }

    pub fn is_start(&self) -> bool {
        self.is_start
    }

    pub fn steps(&self) -> u64 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_swaps_velocity_handles() {
        let mut gpgpu = Gpgpu::default();
        let mut recorder = PassRecorder::default();
        gpgpu
            .process(
                &mut recorder,
                TextureId::POSITION_A,
                TextureId::ORIGIN,
                TextureId::POSITION_B,
                false,
            )
            .unwrap();
        assert_eq!(recorder.invocations[0].target, TextureId::VELOCITY_A);
        assert_eq!(gpgpu.latest_velocity(), TextureId::VELOCITY_A);

        gpgpu
            .process(
                &mut recorder,
                TextureId::POSITION_B,
                TextureId::ORIGIN,
                TextureId::POSITION_A,
                false,
            )
            .unwrap();
        assert_eq!(
            recorder.invocations[2],
            PassInvocation {
                pass: Pass::Velocity {
                    prev_velocity: TextureId::VELOCITY_A,
                    position: TextureId::POSITION_B,
                },
                target: TextureId::VELOCITY_B,
            }
        );
        assert_eq!(gpgpu.latest_velocity(), TextureId::VELOCITY_B);
    }

    #[test]
    fn aliased_target_is_rejected() {
        let invocation = PassInvocation {
            pass: Pass::Velocity {
                prev_velocity: TextureId::VELOCITY_A,
                position: TextureId::POSITION_A,
            },
            target: TextureId::VELOCITY_A,
        };
        let mut recorder = PassRecorder::default();
        assert_eq!(
            recorder.run_pass(&invocation),
            Err(PassError::Aliased(TextureId::VELOCITY_A))
        );
        assert!(recorder.invocations.is_empty());
    }

    #[test]
    fn driver_only_issues_bindable_invocations() {
        let bindable = PassInvocation::bindable();
        let mut recorder = PassRecorder::default();
        let mut cloth = GpuCloth::new(WarmUp::default());
        cloth.advance_frame(&mut recorder, 25).unwrap();
        for invocation in &recorder.invocations {
            assert!(bindable.contains(invocation), "{invocation:?} has no binding");
        }
        assert_eq!(bindable.len(), 2 + 4 + 8);
    }

    #[test]
    fn warm_up_schedule() {
        let mut recorder = PassRecorder::default();
        let mut cloth = GpuCloth::new(WarmUp::default());
        assert!(cloth.is_start());
        for step in 0..12u64 {
            recorder.clear();
            cloth.step(&mut recorder).unwrap();
            let inits = recorder
                .invocations
                .iter()
                .filter(|i| i.pass == Pass::Init)
                .count();
            assert_eq!(inits, if step < 10 { 2 } else { 0 }, "step {step}");
            let holds = recorder.invocations.iter().any(|i| {
                matches!(i.pass, Pass::Position { is_start: true, .. })
            });
            assert_eq!(holds, step == 0, "step {step}");
        }
    }

    #[test]
    fn position_handles_alternate() {
        let mut recorder = PassRecorder::default();
        let mut cloth = GpuCloth::new(WarmUp::disabled());
        assert!(!cloth.is_start());
        cloth.step(&mut recorder).unwrap();
        assert_eq!(cloth.position(), TextureId::POSITION_B);
        cloth.step(&mut recorder).unwrap();
        assert_eq!(cloth.position(), TextureId::POSITION_A);
        assert!(recorder.invocations.iter().all(|i| i.pass != Pass::Init));
    }
}
