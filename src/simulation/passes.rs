//! Per-texel programs of the texture integrator.
//!
//! These are the fragment-level state transitions executed for every texel of
//! a pass: zero fill, velocity update and position update. The WGSL shaders in
//! `assets/shaders/cloth_*.wgsl` implement the same programs line for line;
//! [`super::gpgpu::SoftwareBackend`] runs these on the CPU.

use bevy::math::Vec3;

use super::texture::TexelTexture;
use crate::resources::{ClothParams, Texel};

/// Spring neighbor offsets `(dx, dy)` in texel space, grouped by rank.
const SPRING_OFFSETS: [[(i32, i32); 4]; 3] = [
    [(0, 1), (0, -1), (1, 0), (-1, 0)],
    [(1, 1), (-1, 1), (1, -1), (-1, -1)],
    [(0, 2), (0, -2), (2, 0), (-2, 0)],
];

/// Hexagonal fan `(dx, dy)` used for the surface normal.
const FAN_DX: [i32; 6] = [1, 1, 0, -1, -1, 0];
const FAN_DY: [i32; 6] = [0, 1, 1, 0, -1, -1];

fn safe_normalize(v: Vec3) -> Vec3 {
    let len = v.length();
    if len > 0.0 {
        v / len
    } else {
        Vec3::ZERO
    }
}

fn normal_at(position: &TexelTexture, x: i32, y: i32, p0: Vec3) -> Vec3 {
    let mut sum = Vec3::ZERO;
    for t in 0..6 {
        let u = (t + 1) % 6;
        let (Some(p1), Some(p2)) = (
            position.load_vec3(x + FAN_DX[t], y + FAN_DY[t]),
            position.load_vec3(x + FAN_DX[u], y + FAN_DY[u]),
        ) else {
            continue;
        };
        sum += safe_normalize((p1 - p0).cross(p2 - p0));
    }
    safe_normalize(sum)
}

/// Init pass: every texel becomes zero.
pub fn init_texel() -> Texel {
    [0.0; 4]
}

/// Velocity pass: new velocity of texel `(x, y)` from the previous velocity
/// and the current positions.
pub fn velocity_texel(
    params: &ClothParams,
    prev_velocity: &TexelTexture,
    position: &TexelTexture,
    x: i32,
    y: i32,
) -> Texel {
    let (Some(v), Some(p)) = (prev_velocity.load_vec3(x, y), position.load_vec3(x, y)) else {
        return init_texel();
    };
    if params.is_pinned(y, x) {
        return [v.x, v.y, v.z, 0.0];
    }

    let mut force = Vec3::ZERO;
    for (rank, offsets) in SPRING_OFFSETS.iter().enumerate() {
        let k = params.stiffness[rank];
        let rest = params.rest_length[rank];
        for &(dx, dy) in offsets {
            let Some(q) = position.load_vec3(x + dx, y + dy) else {
                continue;
            };
            let d = p - q;
            let len = d.length();
            if len > 0.0 {
                force += d * (k * (rest - len) / len);
            }
        }
    }

    force += Vec3::new(0.0, -params.gravity * params.mass, 0.0);
    force += -params.damping * v;

    let wind = Vec3::new(params.wind[0], params.wind[1], params.wind[2]);
    let relative = wind - v;
    let normal = normal_at(position, x, y, p);
    force += params.fluid_drag * normal.dot(relative) * relative;

    let next = v + force / params.mass * params.step_size;
    [next.x, next.y, next.z, 0.0]
}

/// Position pass: new position of texel `(x, y)` from the freshly written
/// velocity. While `is_start` is set the origin texel is returned unchanged.
pub fn position_texel(
    params: &ClothParams,
    velocity: &TexelTexture,
    position: &TexelTexture,
    origin: &TexelTexture,
    x: i32,
    y: i32,
) -> Texel {
    if params.is_start != 0 {
        return origin.load(x, y).unwrap_or_else(init_texel);
    }
    let (Some(v), Some(p)) = (velocity.load_vec3(x, y), position.load_vec3(x, y)) else {
        return init_texel();
    };
    if params.is_pinned(y, x) {
        return [p.x, p.y, p.z, 1.0];
    }
    let next = p + v * params.step_size;
    [next.x, next.y, next.z, 1.0]
}
