// src/preprocessing.rs
//
// Frame → model input tensor. The detector is fed a stretched (not
// letterboxed) square frame, so the decoder maps boxes back with an
// independent scale per axis.

/// Two neighbouring source samples and the blend weight of the second.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Tap {
    lo: usize,
    hi: usize,
    t: f32,
}

/// Stretch an RGB frame to `input_size`² and lay it out as CHW f32 in [0, 1].
///
/// Sampling is bilinear at pixel centres. Returns an empty tensor for an
/// empty frame or a buffer shorter than `width * height * 3`.
pub fn frame_to_tensor(src: &[u8], width: usize, height: usize, input_size: usize) -> Vec<f32> {
    let needed = width.checked_mul(height).and_then(|px| px.checked_mul(3));
    if input_size == 0 || needed.map_or(true, |n| n == 0 || src.len() < n) {
        return Vec::new();
    }

    let xs = axis_taps(width, input_size);
    let ys = axis_taps(height, input_size);
    let plane = input_size * input_size;
    let mut output = vec![0.0f32; 3 * plane];

    let at = |x: usize, y: usize, c: usize| f32::from(src[(y * width + x) * 3 + c]);

    for (oy, ty) in ys.iter().enumerate() {
        for (ox, tx) in xs.iter().enumerate() {
            let offset = oy * input_size + ox;
            for c in 0..3 {
                let top = lerp(at(tx.lo, ty.lo, c), at(tx.hi, ty.lo, c), tx.t);
                let bottom = lerp(at(tx.lo, ty.hi, c), at(tx.hi, ty.hi, c), tx.t);
                output[c * plane + offset] = lerp(top, bottom, ty.t) / 255.0;
            }
        }
    }

    output
}

/// Tensor shape matching `frame_to_tensor` output.
pub fn tensor_shape(input_size: usize) -> [usize; 4] {
    [1, 3, input_size, input_size]
}

/// Source taps for every destination index along one axis.
fn axis_taps(src_len: usize, dst_len: usize) -> Vec<Tap> {
    let scale = src_len as f32 / dst_len as f32;
    let last = src_len - 1;
    (0..dst_len)
        .map(|d| {
            let s = ((d as f32 + 0.5) * scale - 0.5).max(0.0);
            let lo = (s.floor() as usize).min(last);
            Tap {
                lo,
                hi: (lo + 1).min(last),
                t: (s - lo as f32).clamp(0.0, 1.0),
            }
        })
        .collect()
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}
