//! Shared helpers for attnmerge integration tests.

#![allow(dead_code)]

/// Deterministic pseudo-random values using a sin-based pattern.
pub fn det_values(n: usize, freq: f32, amp: f32, phase: f32) -> Vec<f32> {
    (0..n).map(|i| (i as f32 * freq + phase).sin() * amp).collect()
}

/// Single-head-group attention over keys `[start, end)`.
///
/// Layouts: `q` `[T, H, D]`, `k`/`v` `[N, H, D]`.
/// Returns `(output [T, H, D], lse [H, T])`. An empty range gives a zero
/// output and `-inf` LSE.
#[allow(clippy::too_many_arguments)]
pub fn reference_attention(
    q: &[f32],
    k: &[f32],
    v: &[f32],
    num_tokens: usize,
    num_keys: usize,
    num_heads: usize,
    head_size: usize,
    start: usize,
    end: usize,
) -> (Vec<f32>, Vec<f32>) {
    debug_assert!(end <= num_keys);
    let scale = (head_size as f32).sqrt().recip();
    let mut out = vec![0.0f32; num_tokens * num_heads * head_size];
    let mut lse = vec![f32::NEG_INFINITY; num_heads * num_tokens];

    for t in 0..num_tokens {
        for h in 0..num_heads {
            let q_row = &q[(t * num_heads + h) * head_size..][..head_size];
            let scores: Vec<f32> = (start..end)
                .map(|j| {
                    let k_row = &k[(j * num_heads + h) * head_size..][..head_size];
                    q_row.iter().zip(k_row).map(|(a, b)| a * b).sum::<f32>() * scale
                })
                .collect();
            if scores.is_empty() {
                continue;
            }

            let max = scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
            let weights: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
            let denom: f32 = weights.iter().sum();
            lse[h * num_tokens + t] = denom.ln() + max;

            let o_row = &mut out[(t * num_heads + h) * head_size..][..head_size];
            for (w, j) in weights.iter().zip(start..end) {
                let v_row = &v[(j * num_heads + h) * head_size..][..head_size];
                for (o, &x) in o_row.iter_mut().zip(v_row) {
                    *o += w / denom * x;
                }
            }
        }
    }
    (out, lse)
}

pub fn assert_close(a: &[f32], b: &[f32], op: &str, rtol: f32, atol: f32) {
    assert_eq!(
        a.len(),
        b.len(),
        "close[{}]: length mismatch: {} vs {}",
        op,
        a.len(),
        b.len()
    );
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        if x == y {
            continue;
        }
        let diff = (x - y).abs();
        let tol = atol + rtol * y.abs();
        if !(diff <= tol) {
            panic!(
                "close[{}] at index {}: {} vs {} (diff={}, tol={})",
                op, i, x, y, diff, tol
            );
        }
    }
}
