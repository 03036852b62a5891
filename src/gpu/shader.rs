//! WGSL source generation for the corner-evaluation kernel.
//!
//! The kernel is the GPU rendition of [`crate::eval::CornerEvaluator`]: one
//! thread per corner, a command-stream walk per thread, and the same
//! accumulate/solve/project math. Workgroup size and the fit-shape flag are
//! substituted at generation time, mirroring how the CPU path selects the
//! shape once outside the hot loop.

use crate::types::MlsShape;

const TEMPLATE: &str = r#"
// MLS corner evaluation: one thread per grid corner.

struct Params {
    // xyz = grid vertex dims, w = Morton code shift (3 * subsampling)
    grid_dims: vec4<i32>,
    // xyz = vertex-space offset, w = Z slice
    offset: vec4<i32>,
    // x = radius cutoff, y = hits cutoff
    cutoffs: vec4<f32>,
    // x = image width, y = image height
    image: vec4<u32>,
};

// splats[2i] = position + 1/r², splats[2i+1] = normal + quality
@group(0) @binding(0) var<storage, read> splats: array<vec4<f32>>;
@group(0) @binding(1) var<storage, read> commands: array<i32>;
@group(0) @binding(2) var<storage, read> cell_start: array<i32>;
@group(0) @binding(3) var<storage, read_write> out_image: array<f32>;
@group(0) @binding(4) var<uniform> params: Params;

const FIT_SPHERE: bool = @FIT_SPHERE@;

fn nan_f32() -> f32 {
    return bitcast<f32>(0x7fc00000u);
}

fn spread_bits(v: u32) -> u32 {
    var x = v & 0x3ffu;
    x = (x | (x << 16u)) & 0x030000ffu;
    x = (x | (x << 8u)) & 0x0300f00fu;
    x = (x | (x << 4u)) & 0x030c30c3u;
    x = (x | (x << 2u)) & 0x09249249u;
    return x;
}

fn morton_encode(x: u32, y: u32, z: u32) -> u32 {
    return spread_bits(x) | (spread_bits(y) << 1u) | (spread_bits(z) << 2u);
}

fn max_mag(a: f32, b: f32) -> f32 {
    return select(b, a, abs(a) >= abs(b));
}

fn solve_quadratic(a: f32, b: f32, c: f32) -> f32 {
    var x: f32;
    if (abs(a) < 1e-20) {
        x = -c / b;
    } else {
        let disc = b * b - 4.0 * a * c;
        let s = select(-1.0, 1.0, b >= 0.0);
        let den = b + s * sqrt(disc);
        x = -2.0 * c / den;
    }
    x -= (a * x * x + b * x + c) / max_mag(2.0 * a * x + b, 1e-20);
    return x;
}

@compute @workgroup_size(@WGS_X@, @WGS_Y@, 1)
fn process_corners(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x >= params.image.x || gid.y >= params.image.y) {
        return;
    }
    let idx = gid.y * params.image.x + gid.x;
    let x = i32(gid.x);
    let y = i32(gid.y);
    let z = params.offset.w;
    if (x >= params.grid_dims.x || y >= params.grid_dims.y
        || z < 0 || z >= params.grid_dims.z) {
        out_image[idx] = nan_f32();
        return;
    }

    let code = morton_encode(gid.x, gid.y, u32(z)) >> u32(params.grid_dims.w);
    var pos = cell_start[code];
    let v = vec3<f32>(
        f32(x + params.offset.x),
        f32(y + params.offset.y),
        f32(z + params.offset.z),
    );

    var sum_w = 0.0;
    var sum_wp = vec3<f32>(0.0);
    var sum_wn = vec3<f32>(0.0);
    var sum_wpp = 0.0;
    var sum_wpn = 0.0;
    var hits = 0u;

    // positive = splat index, -1 = end, <= -2 = jump to -2 - cmd
    loop {
        if (pos < 0) {
            break;
        }
        let cmd = commands[pos];
        if (cmd == -1) {
            break;
        }
        if (cmd <= -2) {
            pos = -2 - cmd;
            continue;
        }
        pos = pos + 1;
        let pr = splats[2 * cmd];
        let nq = splats[2 * cmd + 1];
        let diff = pr.xyz - v;
        let dd = dot(diff, diff);
        let d = dd * pr.w;
        if (d >= params.cutoffs.x) {
            continue;
        }
        let t = 1.0 - d;
        let w = (t * t) * (t * t) * nq.w;
        sum_w += w;
        sum_wp += diff * w;
        sum_wn += nq.xyz * w;
        sum_wpp += dd * w;
        sum_wpn += dot(diff, nq.xyz) * w;
        hits = hits + 1u;
    }

    if (hits < u32(params.cutoffs.y)) {
        out_image[idx] = nan_f32();
        return;
    }

    let inv_sum_w = 1.0 / sum_w;
    let m = sum_wp * inv_sum_w;
    var q = 0.0;
    if (FIT_SPHERE) {
        let q_num = sum_wpn - dot(m, sum_wn);
        let q_den = sum_wpp - dot(m, sum_wp);
        q = q_num / q_den;
        let eps = 1.1920929e-7;
        let degenerate = abs(q_den) < 4.0 * eps * f32(hits) * abs(sum_wpp);
        if (degenerate || !(abs(q) < 1e38)) {
            q = 0.0;
        }
    }
    let u_vec = (sum_wn - sum_wp * q) * inv_sum_w;
    let half_q = 0.5 * q;
    let c = (-half_q * sum_wpp - dot(u_vec, sum_wp)) * inv_sum_w;

    let root = solve_quadratic(half_q, length(u_vec), c);
    if (abs(root) < 1e38) {
        out_image[idx] = -root;
    } else {
        out_image[idx] = nan_f32();
    }
}
"#;

/// Generate the corner-evaluation compute shader for a workgroup size and
/// fit shape.
pub fn corner_shader_source(wgs: [u32; 3], shape: MlsShape) -> String {
    TEMPLATE
        .replace("@WGS_X@", &wgs[0].to_string())
        .replace("@WGS_Y@", &wgs[1].to_string())
        .replace(
            "@FIT_SPHERE@",
            match shape {
                MlsShape::Sphere => "true",
                MlsShape::Plane => "false",
            },
        )
}
