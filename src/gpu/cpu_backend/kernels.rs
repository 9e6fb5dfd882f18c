//! Host-side versions of the WGSL fragment programs.
//!
//! Each function evaluates one fragment with the same arithmetic as the
//! matching `.wgsl` file, including clamp-to-edge sampling.

use glam::{Vec2, Vec3, Vec4, Vec4Swizzles};

use super::grid::Grid;
use crate::constants::gpu::TEXTURE_SLOTS;
use crate::gpu::backend::PassParams;
use crate::shaders::{ProgramKind, ShaderKeywords};

/// Interpolated vertex outputs of the fullscreen triangle.
#[derive(Debug, Clone, Copy)]
pub(super) struct Fragment {
    pub uv: Vec2,
    pub l: Vec2,
    pub r: Vec2,
    pub t: Vec2,
    pub b: Vec2,
}

impl Fragment {
    pub fn new(uv: Vec2, texel: Vec2) -> Self {
        Self {
            uv,
            l: uv - Vec2::new(texel.x, 0.0),
            r: uv + Vec2::new(texel.x, 0.0),
            t: uv + Vec2::new(0.0, texel.y),
            b: uv - Vec2::new(0.0, texel.y),
        }
    }
}

pub(super) struct Inputs<'a> {
    pub slots: [Option<&'a Grid>; TEXTURE_SLOTS],
}

impl Inputs<'_> {
    /// Unbound slots read as zero, like the placeholder texture on the GPU.
    fn sample(&self, slot: usize, uv: Vec2) -> Vec4 {
        self.slots[slot].map_or(Vec4::ZERO, |grid| grid.sample(uv))
    }

    fn bilerp(&self, slot: usize, uv: Vec2, size: Vec2) -> Vec4 {
        let st = uv / size - Vec2::splat(0.5);
        let iuv = st.floor();
        let fuv = st - iuv;
        let a = self.sample(slot, (iuv + Vec2::new(0.5, 0.5)) * size);
        let b = self.sample(slot, (iuv + Vec2::new(1.5, 0.5)) * size);
        let c = self.sample(slot, (iuv + Vec2::new(0.5, 1.5)) * size);
        let d = self.sample(slot, (iuv + Vec2::new(1.5, 1.5)) * size);
        a.lerp(b, fuv.x).lerp(c.lerp(d, fuv.x), fuv.y)
    }
}

pub(super) fn shade(
    kind: ProgramKind,
    keywords: ShaderKeywords,
    params: &PassParams,
    inputs: &Inputs<'_>,
    frag: &Fragment,
) -> Vec4 {
    match kind {
        ProgramKind::Copy => inputs.sample(0, frag.uv),
        ProgramKind::Clear => params.value * inputs.sample(0, frag.uv),
        ProgramKind::Splat => splat(params, inputs, frag),
        ProgramKind::Advection => advection(keywords, params, inputs, frag),
        ProgramKind::Divergence => divergence(inputs, frag),
        ProgramKind::Curl => curl(inputs, frag),
        ProgramKind::Vorticity => vorticity(params, inputs, frag),
        ProgramKind::Pressure => pressure(inputs, frag),
        ProgramKind::GradientSubtract => gradient_subtract(inputs, frag),
        ProgramKind::Display => display(keywords, params, inputs, frag),
        ProgramKind::DisplayMask => display_mask(params, inputs, frag),
    }
}

fn splat(params: &PassParams, inputs: &Inputs<'_>, frag: &Fragment) -> Vec4 {
    let mut p = frag.uv - params.point();
    p.x *= params.aspect_ratio;
    let amount = (-p.dot(p) / params.radius).exp() * params.color().xyz();
    let base = inputs.sample(0, frag.uv).xyz();
    (base + amount).extend(1.0)
}

fn advection(
    keywords: ShaderKeywords,
    params: &PassParams,
    inputs: &Inputs<'_>,
    frag: &Fragment,
) -> Vec4 {
    let texel = params.texel_size();
    let result = if keywords.contains(ShaderKeywords::MANUAL_FILTERING) {
        let velocity = inputs.bilerp(0, frag.uv, texel).xy();
        let coord = frag.uv - params.dt * velocity * texel;
        inputs.bilerp(1, coord, params.dye_texel_size())
    } else {
        let velocity = inputs.sample(0, frag.uv).xy();
        let coord = frag.uv - params.dt * velocity * texel;
        inputs.sample(1, coord)
    };
    let decay = 1.0 + params.dissipation * params.dt;
    result / decay
}

fn divergence(inputs: &Inputs<'_>, frag: &Fragment) -> Vec4 {
    let mut l = inputs.sample(0, frag.l).x;
    let mut r = inputs.sample(0, frag.r).x;
    let mut t = inputs.sample(0, frag.t).y;
    let mut b = inputs.sample(0, frag.b).y;

    let c = inputs.sample(0, frag.uv).xy();
    if frag.l.x < 0.0 {
        l = -c.x;
    }
    if frag.r.x > 1.0 {
        r = -c.x;
    }
    if frag.t.y > 1.0 {
        t = -c.y;
    }
    if frag.b.y < 0.0 {
        b = -c.y;
    }

    Vec4::new(0.5 * (r - l + t - b), 0.0, 0.0, 1.0)
}

fn curl(inputs: &Inputs<'_>, frag: &Fragment) -> Vec4 {
    let l = inputs.sample(0, frag.l).y;
    let r = inputs.sample(0, frag.r).y;
    let t = inputs.sample(0, frag.t).x;
    let b = inputs.sample(0, frag.b).x;
    Vec4::new(0.5 * (r - l - t + b), 0.0, 0.0, 1.0)
}

fn vorticity(params: &PassParams, inputs: &Inputs<'_>, frag: &Fragment) -> Vec4 {
    let l = inputs.sample(1, frag.l).x;
    let r = inputs.sample(1, frag.r).x;
    let t = inputs.sample(1, frag.t).x;
    let b = inputs.sample(1, frag.b).x;
    let c = inputs.sample(1, frag.uv).x;

    let mut force = 0.5 * Vec2::new(t.abs() - b.abs(), r.abs() - l.abs());
    force /= force.length() + params.curl_epsilon;
    force *= params.curl * c;
    force.y = -force.y;

    let velocity = inputs.sample(0, frag.uv).xy() + force * params.dt;
    velocity
        .clamp(
            Vec2::splat(-params.velocity_limit),
            Vec2::splat(params.velocity_limit),
        )
        .extend(0.0)
        .extend(1.0)
}

fn pressure(inputs: &Inputs<'_>, frag: &Fragment) -> Vec4 {
    let l = inputs.sample(0, frag.l).x;
    let r = inputs.sample(0, frag.r).x;
    let t = inputs.sample(0, frag.t).x;
    let b = inputs.sample(0, frag.b).x;
    let divergence = inputs.sample(1, frag.uv).x;
    Vec4::new((l + r + b + t - divergence) * 0.25, 0.0, 0.0, 1.0)
}

fn gradient_subtract(inputs: &Inputs<'_>, frag: &Fragment) -> Vec4 {
    let l = inputs.sample(0, frag.l).x;
    let r = inputs.sample(0, frag.r).x;
    let t = inputs.sample(0, frag.t).x;
    let b = inputs.sample(0, frag.b).x;
    let velocity = inputs.sample(1, frag.uv).xy() - Vec2::new(r - l, t - b);
    velocity.extend(0.0).extend(1.0)
}

fn display(
    keywords: ShaderKeywords,
    params: &PassParams,
    inputs: &Inputs<'_>,
    frag: &Fragment,
) -> Vec4 {
    let mut c = inputs.sample(0, frag.uv).xyz();

    if keywords.contains(ShaderKeywords::SHADING) {
        let lc = inputs.sample(0, frag.l).xyz();
        let rc = inputs.sample(0, frag.r).xyz();
        let tc = inputs.sample(0, frag.t).xyz();
        let bc = inputs.sample(0, frag.b).xyz();

        let dx = rc.length() - lc.length();
        let dy = tc.length() - bc.length();
        let n = Vec3::new(dx, dy, params.texel_size().length()).normalize_or_zero();
        let diffuse = (n.dot(Vec3::Z) + 0.7).clamp(0.7, 1.0);
        c *= diffuse;
    }

    let a = c.max_element();
    c.extend(a)
}

fn fit_mask_uv(params: &PassParams, uv: Vec2) -> Vec2 {
    let mut img_uv = uv - Vec2::splat(0.5);
    if params.aspect_ratio > params.mask_aspect {
        img_uv.x = img_uv.x * params.aspect_ratio / params.mask_aspect;
    } else {
        img_uv.y = img_uv.y * params.mask_aspect / params.aspect_ratio;
    }
    img_uv + Vec2::splat(0.5)
}

fn display_mask(params: &PassParams, inputs: &Inputs<'_>, frag: &Fragment) -> Vec4 {
    let offset = inputs.sample(0, frag.uv).x;
    let velocity = inputs.sample(1, frag.uv).xy();
    let direction = velocity / (velocity.length() + 1e-6);

    let img_uv = (fit_mask_uv(params, frag.uv) - params.distortion * direction * offset)
        .clamp(Vec2::ZERO, Vec2::ONE);

    let img = inputs.sample(2, img_uv).xyz();
    img.extend(img.length().clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::grid::VELOCITY_LIMIT;
    use crate::targets::FilterMode;

    fn grid(width: u32, height: u32, texels: Vec<[f32; 4]>) -> Grid {
        let mut grid = Grid::new(width, height, 4, FilterMode::Nearest);
        grid.texels = texels;
        grid
    }

    #[test]
    fn test_divergence_reflects_at_edges() {
        // Uniform rightward flow: interior divergence is zero, edges are not.
        let velocity = grid(4, 1, vec![[1.0, 0.0, 0.0, 1.0]; 4]);
        let inputs = Inputs {
            slots: [Some(&velocity), None, None],
        };
        let texel = Vec2::new(0.25, 1.0);

        let interior = Fragment::new(Vec2::new(0.375, 0.5), texel);
        assert_eq!(divergence(&inputs, &interior).x, 0.0);

        let left = Fragment::new(Vec2::new(0.125, 0.5), texel);
        assert_eq!(divergence(&inputs, &left).x, 1.0);

        let right = Fragment::new(Vec2::new(0.875, 0.5), texel);
        assert_eq!(divergence(&inputs, &right).x, -1.0);
    }

    #[test]
    fn test_curl_of_rotation() {
        // v = (-y, x) around the centre of a 3x3 grid.
        let mut texels = Vec::new();
        for y in 0..3 {
            for x in 0..3 {
                let (px, py) = (x as f32 - 1.0, y as f32 - 1.0);
                texels.push([-py, px, 0.0, 1.0]);
            }
        }
        let velocity = grid(3, 3, texels);
        let inputs = Inputs {
            slots: [Some(&velocity), None, None],
        };
        let frag = Fragment::new(Vec2::splat(0.5), Vec2::splat(1.0 / 3.0));
        assert!((curl(&inputs, &frag).x - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_velocity_clamped_after_confinement() {
        let velocity = grid(1, 1, vec![[5000.0, -5000.0, 0.0, 1.0]]);
        let curl = grid(1, 1, vec![[0.0; 4]]);
        let inputs = Inputs {
            slots: [Some(&velocity), Some(&curl), None],
        };
        let params = PassParams {
            dt: 0.016,
            curl: 1.6,
            ..PassParams::with_texel(Vec2::ONE)
        };
        let frag = Fragment::new(Vec2::splat(0.5), Vec2::ONE);
        let out = vorticity(&params, &inputs, &frag);
        assert_eq!(out.x, VELOCITY_LIMIT);
        assert_eq!(out.y, -VELOCITY_LIMIT);
    }

    #[test]
    fn test_advection_decays_every_channel() {
        let velocity = grid(1, 1, vec![[0.0; 4]]);
        let dye = grid(1, 1, vec![[1.0, 0.5, 0.0, 1.0]]);
        let inputs = Inputs {
            slots: [Some(&velocity), Some(&dye), None],
        };
        let params = PassParams {
            dt: 0.25,
            dissipation: 1.0,
            ..PassParams::with_texel(Vec2::ONE)
        };
        let frag = Fragment::new(Vec2::splat(0.5), Vec2::ONE);
        let out = advection(ShaderKeywords::empty(), &params, &inputs, &frag);
        assert_eq!(out, Vec4::new(0.8, 0.4, 0.0, 0.8));
    }

    #[test]
    fn test_display_alpha_is_max_channel() {
        let dye = grid(1, 1, vec![[0.2, 0.6, 0.1, 1.0]]);
        let inputs = Inputs {
            slots: [Some(&dye), None, None],
        };
        let frag = Fragment::new(Vec2::splat(0.5), Vec2::ONE);
        let out = display(
            ShaderKeywords::empty(),
            &PassParams::with_texel(Vec2::ONE),
            &inputs,
            &frag,
        );
        assert_eq!(out, Vec4::new(0.2, 0.6, 0.1, 0.6));
    }

    #[test]
    fn test_mask_fit_is_identity_for_matching_aspect() {
        let params = PassParams {
            aspect_ratio: 1.5,
            mask_aspect: 1.5,
            ..PassParams::default()
        };
        let uv = Vec2::new(0.2, 0.7);
        assert!((fit_mask_uv(&params, uv) - uv).length() < 1e-6);
    }
}
