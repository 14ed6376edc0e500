use crate::layer::{LayerBackward, LayerForward};
use crate::Activation;
use skein::{Device, Error, Float, Result, Rng};
use skein_la::DVec;
use skein_tensor::{Shape, Tensor};

/// Convolution over 4-D [batch, channels, rows, cols] batches: a filter
/// bank applied with a stride and valid padding, then an activation.
///
/// Parameter block: biases [filters] then filters [filters, channels, kh,
/// kw] in row-major order.
#[derive(Debug, Clone)]
pub struct ConvolutionalLayer {
    filters: Tensor<Float>,
    biases: DVec<Float>,
    stride: (usize, usize),
    activation: Activation,
    input_shape: (usize, usize, usize),
}

impl ConvolutionalLayer {
    pub fn new(
        input_shape: (usize, usize, usize),
        filters_number: usize,
        kernel: (usize, usize),
        stride: (usize, usize),
        activation: Activation,
        rng: &mut Rng,
    ) -> Result<Self> {
        let (channels, rows, cols) = input_shape;
        let (kh, kw) = kernel;
        if kh == 0 || kw == 0 || kh > rows || kw > cols {
            return Err(Error::shape("ConvolutionalLayer::new", (rows, cols), kernel));
        }
        if stride.0 == 0 || stride.1 == 0 {
            return Err(Error::InvalidConfiguration(
                "convolution stride must be positive".into(),
            ));
        }
        let fan_in = channels * kh * kw;
        let scale = 1.0 / (fan_in.max(1) as f64).sqrt();
        let filters = Tensor::new(
            (0..filters_number * fan_in)
                .map(|_| (rng.normal() * scale) as Float)
                .collect(),
            Shape::new(vec![filters_number, channels, kh, kw]),
        );
        Ok(Self {
            filters,
            biases: DVec::zeros(filters_number),
            stride,
            activation,
            input_shape,
        })
    }

    pub fn input_shape(&self) -> (usize, usize, usize) {
        self.input_shape
    }

    pub fn filters_number(&self) -> usize {
        self.filters.dims()[0]
    }

    pub fn kernel(&self) -> (usize, usize) {
        (self.filters.dims()[2], self.filters.dims()[3])
    }

    pub fn stride(&self) -> (usize, usize) {
        self.stride
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    /// (filters, output rows, output cols) under valid padding.
    pub fn output_shape(&self) -> (usize, usize, usize) {
        let (_, rows, cols) = self.input_shape;
        let (kh, kw) = self.kernel();
        let (sh, sw) = self.stride;
        (
            self.filters_number(),
            (rows - kh) / sh + 1,
            (cols - kw) / sw + 1,
        )
    }

    pub fn inputs_number(&self) -> usize {
        let (c, h, w) = self.input_shape;
        c * h * w
    }

    pub fn outputs_number(&self) -> usize {
        let (f, h, w) = self.output_shape();
        f * h * w
    }

    pub fn parameter_count(&self) -> usize {
        self.biases.len() + self.filters.numel()
    }

    pub fn pack_parameters(&self, out: &mut [Float]) {
        out[..self.biases.len()].copy_from_slice(self.biases.as_slice());
        out[self.biases.len()..].copy_from_slice(self.filters.data());
    }

    pub fn unpack_parameters(&mut self, p: &[Float]) {
        let nb = self.biases.len();
        self.biases.as_mut_slice().copy_from_slice(&p[..nb]);
        self.filters.data_mut().copy_from_slice(&p[nb..]);
    }

    fn check_input(&self, inputs: &Tensor<Float>) -> Result<usize> {
        let (c, h, w) = self.input_shape;
        if inputs.ndim() != 4 || inputs.dims()[1..] != [c, h, w] {
            return Err(Error::shape(
                "ConvolutionalLayer::forward",
                ("batch", c, h, w),
                inputs.dims(),
            ));
        }
        Ok(inputs.dims()[0])
    }

    pub fn forward(&self, inputs: &Tensor<Float>, device: &Device) -> Result<LayerForward> {
        let batch = self.check_input(inputs)?;
        let (c, h, w) = self.input_shape;
        let (f, oh, ow) = self.output_shape();
        let (kh, kw) = self.kernel();
        let (sh, sw) = self.stride;
        let per_sample = f * oh * ow;

        // One chunk of samples per worker.
        let blocks = device.run_chunks(batch, |range| {
            let mut block = vec![0.0 as Float; range.len() * per_sample];
            for (bi, b) in range.enumerate() {
                for fi in 0..f {
                    for oy in 0..oh {
                        for ox in 0..ow {
                            let mut sum = self.biases[fi];
                            for ci in 0..c {
                                for i in 0..kh {
                                    for j in 0..kw {
                                        let x = inputs.data()
                                            [((b * c + ci) * h + oy * sh + i) * w + ox * sw + j];
                                        let wgt = self.filters.data()
                                            [((fi * c + ci) * kh + i) * kw + j];
                                        sum += x * wgt;
                                    }
                                }
                            }
                            block[bi * per_sample + (fi * oh + oy) * ow + ox] = sum;
                        }
                    }
                }
            }
            block
        });

        let mut data = Vec::with_capacity(batch * per_sample);
        for blk in blocks {
            data.extend_from_slice(&blk);
        }
        let combinations = Tensor::new(data, Shape::new(vec![batch, f, oh, ow]));
        let act = self.activation;
        let activations = combinations.map(device, |v| act.apply(v));
        Ok(LayerForward {
            combinations,
            activations,
            aux: Vec::new(),
        })
    }

    pub fn backward(
        &self,
        inputs: &Tensor<Float>,
        forward: &LayerForward,
        delta: &Tensor<Float>,
        device: &Device,
    ) -> Result<LayerBackward> {
        let batch = self.check_input(inputs)?;
        let (c, h, w) = self.input_shape;
        let (f, oh, ow) = self.output_shape();
        let (kh, kw) = self.kernel();
        let (sh, sw) = self.stride;
        if delta.dims() != [batch, f, oh, ow] {
            return Err(Error::shape(
                "ConvolutionalLayer::backward",
                [batch, f, oh, ow],
                delta.dims(),
            ));
        }

        let act = self.activation;
        let derivatives = forward.combinations.map(device, |v| act.derivative(v));
        let combination_delta = delta.mul(device, &derivatives)?;

        let mut bias_gradient = vec![0.0 as Float; f];
        let mut filter_gradient = vec![0.0 as Float; self.filters.numel()];
        let mut input_delta = Tensor::zeros(inputs.shape().clone());

        for b in 0..batch {
            for fi in 0..f {
                for oy in 0..oh {
                    for ox in 0..ow {
                        let d = combination_delta.data()[((b * f + fi) * oh + oy) * ow + ox];
                        if d == 0.0 {
                            continue;
                        }
                        bias_gradient[fi] += d;
                        for ci in 0..c {
                            for i in 0..kh {
                                for j in 0..kw {
                                    let x_idx =
                                        ((b * c + ci) * h + oy * sh + i) * w + ox * sw + j;
                                    let w_idx = ((fi * c + ci) * kh + i) * kw + j;
                                    filter_gradient[w_idx] += inputs.data()[x_idx] * d;
                                    input_delta.data_mut()[x_idx] +=
                                        self.filters.data()[w_idx] * d;
                                }
                            }
                        }
                    }
                }
            }
        }

        let mut gradient = DVec::zeros(self.parameter_count());
        gradient.as_mut_slice()[..f].copy_from_slice(&bias_gradient);
        gradient.as_mut_slice()[f..].copy_from_slice(&filter_gradient);

        Ok(LayerBackward {
            input_delta,
            gradient,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEV: Device = Device::SingleThreaded;

    fn fixed_layer() -> ConvolutionalLayer {
        let mut rng = Rng::new(1);
        let mut layer = ConvolutionalLayer::new(
            (1, 3, 3),
            1,
            (2, 2),
            (1, 1),
            Activation::Linear,
            &mut rng,
        )
        .unwrap();
        // bias 0, kernel = [[1, 0], [0, 1]]
        layer.unpack_parameters(&[0.0, 1.0, 0.0, 0.0, 1.0]);
        layer
    }

    #[test]
    fn forward_known_values() {
        let layer = fixed_layer();
        assert_eq!(layer.output_shape(), (1, 2, 2));
        let x = Tensor::new(
            (1..=9).map(|v| v as Float).collect(),
            Shape::new(vec![1, 1, 3, 3]),
        );
        let out = layer.forward(&x, &DEV).unwrap().activations;
        // Each output = x[y][x] + x[y+1][x+1].
        assert_eq!(out.data(), &[6.0, 8.0, 12.0, 14.0]);
    }

    #[test]
    fn gradient_matches_central_differences() {
        let mut rng = Rng::new(3);
        let mut layer = ConvolutionalLayer::new(
            (2, 3, 3),
            2,
            (2, 2),
            (1, 1),
            Activation::HyperbolicTangent,
            &mut rng,
        )
        .unwrap();
        let x = Tensor::new(
            (0..2 * 2 * 3 * 3).map(|v| ((v % 7) as Float - 3.0) * 0.2).collect(),
            Shape::new(vec![2, 2, 3, 3]),
        );
        let forward = layer.forward(&x, &DEV).unwrap();
        let delta = Tensor::new(
            vec![1.0; forward.activations.numel()],
            forward.activations.shape().clone(),
        );
        let back = layer.backward(&x, &forward, &delta, &DEV).unwrap();

        let eps = 1e-6;
        let count = layer.parameter_count();
        let mut packed = vec![0.0; count];
        layer.pack_parameters(&mut packed);
        for k in 0..count {
            let orig = packed[k];
            packed[k] = orig + eps;
            layer.unpack_parameters(&packed);
            let plus: Float = layer.forward(&x, &DEV).unwrap().activations.data().iter().sum();
            packed[k] = orig - eps;
            layer.unpack_parameters(&packed);
            let minus: Float = layer.forward(&x, &DEV).unwrap().activations.data().iter().sum();
            packed[k] = orig;
            layer.unpack_parameters(&packed);

            let numerical = (plus - minus) / (2.0 * eps);
            assert!(
                (numerical - back.gradient[k]).abs() < 1e-5,
                "parameter {k}: numerical {numerical} vs analytical {}",
                back.gradient[k]
            );
        }
    }

    #[test]
    fn input_delta_matches_central_differences() {
        let layer = fixed_layer();
        let x = Tensor::new(
            (0..9).map(|v| (v as Float) * 0.3 - 1.0).collect(),
            Shape::new(vec![1, 1, 3, 3]),
        );
        let forward = layer.forward(&x, &DEV).unwrap();
        let delta = Tensor::new(vec![1.0; 4], Shape::new(vec![1, 1, 2, 2]));
        let back = layer.backward(&x, &forward, &delta, &DEV).unwrap();

        let eps = 1e-6;
        for k in 0..9 {
            let mut xp = x.clone();
            xp.data_mut()[k] += eps;
            let plus: Float = layer.forward(&xp, &DEV).unwrap().activations.data().iter().sum();
            let mut xm = x.clone();
            xm.data_mut()[k] -= eps;
            let minus: Float = layer.forward(&xm, &DEV).unwrap().activations.data().iter().sum();
            let numerical = (plus - minus) / (2.0 * eps);
            assert!(
                (numerical - back.input_delta.data()[k]).abs() < 1e-6,
                "input {k}: numerical {numerical} vs analytical {}",
                back.input_delta.data()[k]
            );
        }
    }

    #[test]
    fn bad_kernel_rejected() {
        let mut rng = Rng::new(1);
        assert!(ConvolutionalLayer::new(
            (1, 2, 2),
            1,
            (3, 3),
            (1, 1),
            Activation::Linear,
            &mut rng
        )
        .is_err());
    }
}
