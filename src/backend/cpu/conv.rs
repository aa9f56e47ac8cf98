use crate::shape::ConvolutionDescription;

/// Direct convolution, filters laid out `[out][in][k][k]`.
pub fn conv_fwd(
    desc: &ConvolutionDescription,
    batch_size: usize,
    filters: &[f32],
    bias: Option<&[f32]>,
    input: &[f32],
    output: &mut [f32],
) {
    let ConvolutionDescription { input_shape, output_shape, kernel_size: k, stride, padding, .. } = *desc;
    let (ic, ih, iw) = (input_shape.channels(), input_shape.height(), input_shape.width());
    let (oc, oh, ow) = (output_shape.channels(), output_shape.height(), output_shape.width());

    assert!(!desc.transposed);
    assert_eq!(filters.len(), desc.filter_size());
    assert_eq!(input.len(), input_shape.size() * batch_size);
    assert_eq!(output.len(), output_shape.size() * batch_size);

    for (inp, out) in input.chunks_exact(input_shape.size()).zip(output.chunks_exact_mut(output_shape.size())) {
        for o in 0..oc {
            let base = bias.map_or(0.0, |b| b[o]);
            let plane = &mut out[o * oh * ow..(o + 1) * oh * ow];

            for y in 0..oh {
                for x in 0..ow {
                    let mut sum = base;

                    for i in 0..ic {
                        let filter = &filters[(o * ic + i) * k * k..(o * ic + i + 1) * k * k];
                        let channel = &inp[i * ih * iw..(i + 1) * ih * iw];

                        for ky in 0..k {
                            let Some(sy) = (y * stride + ky).checked_sub(padding).filter(|&sy| sy < ih) else {
                                continue;
                            };

                            for kx in 0..k {
                                let Some(sx) = (x * stride + kx).checked_sub(padding).filter(|&sx| sx < iw) else {
                                    continue;
                                };

                                sum += filter[ky * k + kx] * channel[sy * iw + sx];
                            }
                        }
                    }

                    plane[y * ow + x] = sum;
                }
            }
        }
    }
}

/// Transposed (fractionally strided) convolution, filters laid out `[in][out][k][k]`.
/// Each input pixel scatters a scaled copy of its filter into the output.
pub fn conv_transpose_fwd(
    desc: &ConvolutionDescription,
    batch_size: usize,
    filters: &[f32],
    bias: Option<&[f32]>,
    input: &[f32],
    output: &mut [f32],
) {
    let ConvolutionDescription { input_shape, output_shape, kernel_size: k, stride, padding, .. } = *desc;
    let (ic, ih, iw) = (input_shape.channels(), input_shape.height(), input_shape.width());
    let (oc, oh, ow) = (output_shape.channels(), output_shape.height(), output_shape.width());

    assert!(desc.transposed);
    assert_eq!(filters.len(), desc.filter_size());
    assert_eq!(input.len(), input_shape.size() * batch_size);
    assert_eq!(output.len(), output_shape.size() * batch_size);

    for (inp, out) in input.chunks_exact(input_shape.size()).zip(output.chunks_exact_mut(output_shape.size())) {
        for (o, plane) in out.chunks_exact_mut(oh * ow).enumerate() {
            plane.fill(bias.map_or(0.0, |b| b[o]));
        }

        for i in 0..ic {
            let channel = &inp[i * ih * iw..(i + 1) * ih * iw];

            for o in 0..oc {
                let filter = &filters[(i * oc + o) * k * k..(i * oc + o + 1) * k * k];
                let plane = &mut out[o * oh * ow..(o + 1) * oh * ow];

                for y in 0..ih {
                    for x in 0..iw {
                        let val = channel[y * iw + x];

                        for ky in 0..k {
                            let Some(ty) = (y * stride + ky).checked_sub(padding).filter(|&ty| ty < oh) else {
                                continue;
                            };

                            for kx in 0..k {
                                let Some(tx) = (x * stride + kx).checked_sub(padding).filter(|&tx| tx < ow) else {
                                    continue;
                                };

                                plane[ty * ow + tx] += val * filter[ky * k + kx];
                            }
                        }
                    }
                }
            }
        }
    }
}
