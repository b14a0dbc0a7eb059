//! The circular scan gate shown around a freshly placed anchor. Hosting may
//! only begin once the user has looked at the ring from every side, which
//! forces the device to capture enough parallax for a reliable host.

use std::f32::consts::TAU;

use nalgebra::{Point3, Vector3};

use crate::contracts::Pose;
use crate::projection::PoseProjector;

/// Logical angular buckets the user must confirm.
pub const LOGICAL_SEGMENTS: usize = 10;

/// Circle subdivisions of the render mesh; decoupled from the logical count.
pub const RENDER_SEGMENTS: usize = LOGICAL_SEGMENTS * 4;

pub const INNER_RADIUS: f32 = 0.15;
pub const OUTER_RADIUS: f32 = 0.25;

const WHITE: u32 = 0xffff_ffff;
const GREEN: u32 = 0xff00_ff00;

/// Ring mesh plus per-segment confirmation state. A gate is created fresh for
/// every placement attempt and dropped whole; it is never reset in place.
#[derive(Debug, Clone)]
pub struct AnchorCircleGate {
    center: Vector3<f32>,
    confirmed: [bool; LOGICAL_SEGMENTS],
    /// One color per ring vertex: subdivision i owns the outer vertex at
    /// `2 * i` and the inner vertex at `2 * i + 1`.
    colors: Vec<u32>,
    revision: u64,
}

impl AnchorCircleGate {
    pub fn new() -> Self {
        Self {
            center: Vector3::zeros(),
            confirmed: [false; LOGICAL_SEGMENTS],
            colors: vec![WHITE; RENDER_SEGMENTS * 2],
            revision: 0,
        }
    }

    /// Ring vertex positions in gate-local coordinates, outer/inner pairs in
    /// subdivision order, ready for upload by the render surface.
    pub fn ring_vertices() -> Vec<[f32; 3]> {
        let mut vertices = Vec::with_capacity(RENDER_SEGMENTS * 2);
        for i in 1..=RENDER_SEGMENTS {
            let angle = TAU * i as f32 / RENDER_SEGMENTS as f32;
            let x = angle.cos();
            let z = -angle.sin();
            vertices.push([x * OUTER_RADIUS, 0.0, z * OUTER_RADIUS]);
            vertices.push([x * INNER_RADIUS, 0.0, z * INNER_RADIUS]);
        }
        vertices
    }

    /// Anchors the ring at the pose's translation, nudged up to avoid
    /// z-fighting with the surface it lies on.
    pub fn set_position(&mut self, pose: &Pose) {
        self.center = pose.position + Vector3::new(0.0, 0.01, 0.0);
    }

    pub fn position(&self) -> Vector3<f32> {
        self.center
    }

    /// Buckets the camera's azimuth around the ring and confirms the segment
    /// it falls in. Callers gate this on `is_in_frame`; confirming a segment
    /// the user is not actually looking from would defeat the scan.
    pub fn highlight_segment(&mut self, camera_position: &Vector3<f32>) {
        let dx = camera_position.x - self.center.x;
        let dz = camera_position.z - self.center.z;

        let mut angle = -dz.atan2(dx);
        if angle < 0.0 {
            angle += TAU;
        }

        let index = ((angle / TAU * LOGICAL_SEGMENTS as f32).floor() as usize)
            .min(LOGICAL_SEGMENTS - 1);

        if !self.confirmed[index] {
            self.confirmed[index] = true;
            self.recolor_segment(index);
        }
    }

    pub fn all_confirmed(&self) -> bool {
        self.confirmed.iter().all(|c| *c)
    }

    pub fn confirmed_count(&self) -> usize {
        self.confirmed.iter().filter(|c| **c).count()
    }

    /// Success flourish: turn the whole ring green at once.
    pub fn highlight_all(&mut self) {
        for color in &mut self.colors {
            *color = GREEN;
        }
        self.revision += 1;
    }

    pub fn is_in_frame(&self, projector: &PoseProjector) -> bool {
        projector.is_in_frustum(&Point3::from(self.center))
    }

    /// Current vertex colors, parallel to `ring_vertices()`.
    pub fn vertex_colors(&self) -> &[u32] {
        &self.colors
    }

    /// Bumped on every recolor so a surface knows when to re-upload.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn recolor_segment(&mut self, index: usize) {
        let ratio = RENDER_SEGMENTS / LOGICAL_SEGMENTS;

        // Subdivisions are numbered from 1, matching the vertex layout. The
        // last logical segment additionally wraps onto the first subdivision.
        for i in 1..=RENDER_SEGMENTS {
            let in_span = i >= index * ratio && i <= (index + 1) * ratio + 1;
            let wraps = index == LOGICAL_SEGMENTS - 1 && i <= 1;
            if in_span || wraps {
                self.colors[(i - 1) * 2] = GREEN;
                self.colors[(i - 1) * 2 + 1] = GREEN;
            }
        }
        self.revision += 1;
    }
}

impl Default for AnchorCircleGate {
    fn default() -> Self {
        Self::new()
    }
}
