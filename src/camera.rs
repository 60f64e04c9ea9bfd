use bevy::prelude::*;


/// view and projection used to sort and draw splats.
///
/// projections follow wgpu conventions: right handed, looking down -Z, depth
/// mapped to `0..1`.
#[derive(
    Clone,
    Debug,
    PartialEq,
    Resource,
)]
pub struct SplatCamera {
    pub view: Mat4,
    pub proj: Mat4,
    pub position: Vec3,
}

impl SplatCamera {
    pub fn look_at(
        eye: Vec3,
        target: Vec3,
        fov_y: f32,
        aspect: f32,
    ) -> Self {
        Self {
            view: Mat4::look_at_rh(eye, target, Vec3::Y),
            proj: Mat4::perspective_rh(fov_y, aspect, 0.1, 1000.0),
            position: eye,
        }
    }

    /// camera on a horizontal circle around `target`
    pub fn orbit(
        target: Vec3,
        radius: f32,
        angle: f32,
        height: f32,
        aspect: f32,
    ) -> Self {
        let eye = target + Vec3::new(radius * angle.cos(), height, radius * angle.sin());
        Self::look_at(eye, target, std::f32::consts::FRAC_PI_4, aspect)
    }
}

impl Default for SplatCamera {
    fn default() -> Self {
        Self::look_at(
            Vec3::new(0.0, 0.0, 10.0),
            Vec3::ZERO,
            std::f32::consts::FRAC_PI_4,
            1.0,
        )
    }
}
