use crate::config::{Number, EPSILON};
use wide::f32x8;

/// Squared Euclidean distance between two vectors of equal length, using SIMD
/// lanes of eight with a scalar tail.
///
/// Callers validate lengths; only the common prefix is compared otherwise.
pub fn squared_l2_simd(a: &[Number], b: &[Number]) -> Number {
    let len = a.len().min(b.len());
    let simd_len = len - (len % 8);

    let mut acc = f32x8::splat(0.0);
    for i in (0..simd_len).step_by(8) {
        let va = f32x8::new([
            a[i],
            a[i + 1],
            a[i + 2],
            a[i + 3],
            a[i + 4],
            a[i + 5],
            a[i + 6],
            a[i + 7],
        ]);
        let vb = f32x8::new([
            b[i],
            b[i + 1],
            b[i + 2],
            b[i + 3],
            b[i + 4],
            b[i + 5],
            b[i + 6],
            b[i + 7],
        ]);
        let diff = va - vb;
        acc += diff * diff;
    }

    let mut sum = acc.reduce_add();
    for i in simd_len..len {
        let d = a[i] - b[i];
        sum += d * d;
    }
    sum
}

pub fn normalize_vector(vector: &mut [Number]) {
    let magnitude: Number = vector.iter().map(|&x| x * x).sum::<Number>().sqrt();
    if magnitude > EPSILON {
        for x in vector.iter_mut() {
            *x /= magnitude;
        }
    }
}
