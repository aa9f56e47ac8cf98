use crate::shape::PoolDescription;

pub fn max_pool_fwd(desc: &PoolDescription, batch_size: usize, input: &[f32], output: &mut [f32]) {
    let PoolDescription { input_shape, output_shape, kernel_size: k, stride } = *desc;
    let (ih, iw) = (input_shape.height(), input_shape.width());
    let (oh, ow) = (output_shape.height(), output_shape.width());

    assert_eq!(input.len(), input_shape.size() * batch_size);
    assert_eq!(output.len(), output_shape.size() * batch_size);

    for (channel, plane) in input.chunks_exact(ih * iw).zip(output.chunks_exact_mut(oh * ow)) {
        for y in 0..oh {
            for x in 0..ow {
                let mut max = f32::NEG_INFINITY;

                for ky in 0..k {
                    let row = &channel[(y * stride + ky) * iw..];
                    for kx in 0..k {
                        max = max.max(row[x * stride + kx]);
                    }
                }

                plane[y * ow + x] = max;
            }
        }
    }
}
