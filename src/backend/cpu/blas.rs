/// Row-major `c = a * b^T`, where `a` is `m x k` and `b` is stored as `n x k`.
fn sgemm_nt(m: usize, n: usize, k: usize, a: &[f32], b: &[f32], c: &mut [f32]) {
    assert_eq!(a.len(), m * k, "Invalid lhs size!");
    assert_eq!(b.len(), k * n, "Invalid rhs size!");
    assert_eq!(c.len(), m * n, "Invalid output size!");

    for (row, out) in a.chunks_exact(k).zip(c.chunks_exact_mut(n)) {
        for (col, o) in b.chunks_exact(k).zip(out.iter_mut()) {
            *o = row.iter().zip(col).map(|(x, y)| x * y).sum();
        }
    }
}

/// `output[b] = weights * input[b] + bias` for every sample, with `weights`
/// stored as `outputs x inputs`.
pub fn linear_fwd(
    inputs: usize,
    outputs: usize,
    batch_size: usize,
    weights: &[f32],
    bias: Option<&[f32]>,
    input: &[f32],
    output: &mut [f32],
) {
    sgemm_nt(batch_size, outputs, inputs, input, weights, output);

    if let Some(bias) = bias {
        assert_eq!(bias.len(), outputs);
        for row in output.chunks_exact_mut(outputs) {
            for (o, &b) in row.iter_mut().zip(bias.iter()) {
                *o += b;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rustfmt::skip]
    #[test]
    fn gemm_against_transposed_rhs() {
        let a = [
            1.0, 2.0, 3.0,
            4.0, 5.0, 6.0,
        ];
        let bt = [
            1.0, 0.0, 1.0,
            0.0, 1.0, 1.0,
        ];

        let mut c = [1.0; 4];
        sgemm_nt(2, 2, 3, &a, &bt, &mut c);
        assert_eq!(c, [4.0, 5.0, 10.0, 11.0]);
    }

    /// Calculates
    /// [1.0, 1.0, 0.0] [x]   [0.5]
    /// [0.0, 1.0, 1.0] [y] + [-0.5]
    ///                 [z]
    /// for the three unit vectors.
    #[rustfmt::skip]
    #[test]
    fn linear_with_bias() {
        let weights = [
            1.0, 1.0, 0.0,
            0.0, 1.0, 1.0,
        ];
        let bias = [0.5, -0.5];
        let xs = [
            1.0, 0.0, 0.0,
            0.0, 1.0, 0.0,
            0.0, 0.0, 1.0,
        ];

        let mut ys = [0.0; 6];
        linear_fwd(3, 2, 3, &weights, Some(&bias), &xs, &mut ys);

        assert_eq!(ys, [1.5, -0.5, 1.5, 0.5, 0.5, 0.5]);
    }
}
