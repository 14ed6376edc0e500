use crate::layer::{LayerBackward, LayerForward};
use skein::{Device, Error, Float, Result};
use skein_la::DVec;
use skein_tensor::{Shape, Tensor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolingMethod {
    NoPooling,
    MaxPooling,
    AveragePooling,
}

impl PoolingMethod {
    pub fn name(self) -> &'static str {
        match self {
            Self::NoPooling => "NoPooling",
            Self::MaxPooling => "MaxPooling",
            Self::AveragePooling => "AveragePooling",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        Ok(match name {
            "NoPooling" => Self::NoPooling,
            "MaxPooling" => Self::MaxPooling,
            "AveragePooling" => Self::AveragePooling,
            other => {
                return Err(Error::InvalidConfiguration(format!(
                    "unknown pooling method {other:?}"
                )))
            }
        })
    }
}

/// Window pooling over 4-D [batch, channels, rows, cols] batches. No
/// trainable parameters; max pooling routes its gradient back to the
/// recorded argmax.
#[derive(Debug, Clone)]
pub struct PoolingLayer {
    input_shape: (usize, usize, usize),
    pool_size: (usize, usize),
    stride: (usize, usize),
    method: PoolingMethod,
}

impl PoolingLayer {
    pub fn new(
        input_shape: (usize, usize, usize),
        pool_size: (usize, usize),
        stride: (usize, usize),
        method: PoolingMethod,
    ) -> Result<Self> {
        let (_, rows, cols) = input_shape;
        if pool_size.0 == 0 || pool_size.1 == 0 || pool_size.0 > rows || pool_size.1 > cols {
            return Err(Error::shape("PoolingLayer::new", (rows, cols), pool_size));
        }
        if stride.0 == 0 || stride.1 == 0 {
            return Err(Error::InvalidConfiguration(
                "pooling stride must be positive".into(),
            ));
        }
        Ok(Self {
            input_shape,
            pool_size,
            stride,
            method,
        })
    }

    pub fn input_shape(&self) -> (usize, usize, usize) {
        self.input_shape
    }

    pub fn pool_size(&self) -> (usize, usize) {
        self.pool_size
    }

    pub fn stride(&self) -> (usize, usize) {
        self.stride
    }

    pub fn method(&self) -> PoolingMethod {
        self.method
    }

    pub fn output_shape(&self) -> (usize, usize, usize) {
        let (c, rows, cols) = self.input_shape;
        if self.method == PoolingMethod::NoPooling {
            return (c, rows, cols);
        }
        let (ph, pw) = self.pool_size;
        let (sh, sw) = self.stride;
        (c, (rows - ph) / sh + 1, (cols - pw) / sw + 1)
    }

    pub fn inputs_number(&self) -> usize {
        let (c, h, w) = self.input_shape;
        c * h * w
    }

    pub fn outputs_number(&self) -> usize {
        let (c, h, w) = self.output_shape();
        c * h * w
    }

    fn check_input(&self, inputs: &Tensor<Float>) -> Result<usize> {
        let (c, h, w) = self.input_shape;
        if inputs.ndim() != 4 || inputs.dims()[1..] != [c, h, w] {
            return Err(Error::shape(
                "PoolingLayer::forward",
                ("batch", c, h, w),
                inputs.dims(),
            ));
        }
        Ok(inputs.dims()[0])
    }

    pub fn forward(&self, inputs: &Tensor<Float>, _device: &Device) -> Result<LayerForward> {
        let batch = self.check_input(inputs)?;
        if self.method == PoolingMethod::NoPooling {
            return Ok(LayerForward {
                combinations: inputs.clone(),
                activations: inputs.clone(),
                aux: Vec::new(),
            });
        }

        let (c, h, w) = self.input_shape;
        let (_, oh, ow) = self.output_shape();
        let (ph, pw) = self.pool_size;
        let (sh, sw) = self.stride;
        let out_shape = Shape::new(vec![batch, c, oh, ow]);

        let mut out = Tensor::zeros(out_shape.clone());
        // Flat source index of each max, for the backward scatter.
        let mut argmax = Tensor::zeros(out_shape.clone());

        for b in 0..batch {
            for ci in 0..c {
                for oy in 0..oh {
                    for ox in 0..ow {
                        let out_idx = ((b * c + ci) * oh + oy) * ow + ox;
                        match self.method {
                            PoolingMethod::MaxPooling => {
                                let mut best = Float::NEG_INFINITY;
                                let mut best_idx = 0usize;
                                for i in 0..ph {
                                    for j in 0..pw {
                                        let idx =
                                            ((b * c + ci) * h + oy * sh + i) * w + ox * sw + j;
                                        let v = inputs.data()[idx];
                                        if v > best {
                                            best = v;
                                            best_idx = idx;
                                        }
                                    }
                                }
                                out.data_mut()[out_idx] = best;
                                argmax.data_mut()[out_idx] = best_idx as Float;
                            }
                            PoolingMethod::AveragePooling => {
                                let mut sum = 0.0;
                                for i in 0..ph {
                                    for j in 0..pw {
                                        sum += inputs.data()
                                            [((b * c + ci) * h + oy * sh + i) * w + ox * sw + j];
                                    }
                                }
                                out.data_mut()[out_idx] = sum / (ph * pw) as Float;
                            }
                            PoolingMethod::NoPooling => unreachable!(),
                        }
                    }
                }
            }
        }

        let aux = if self.method == PoolingMethod::MaxPooling {
            vec![argmax]
        } else {
            Vec::new()
        };
        Ok(LayerForward {
            combinations: out.clone(),
            activations: out,
            aux,
        })
    }

    pub fn backward(
        &self,
        inputs: &Tensor<Float>,
        forward: &LayerForward,
        delta: &Tensor<Float>,
        _device: &Device,
    ) -> Result<LayerBackward> {
        self.check_input(inputs)?;
        if delta.shape() != forward.activations.shape() {
            return Err(Error::shape(
                "PoolingLayer::backward",
                forward.activations.dims(),
                delta.dims(),
            ));
        }

        let input_delta = match self.method {
            PoolingMethod::NoPooling => delta.clone(),
            PoolingMethod::MaxPooling => {
                let argmax = &forward.aux[0];
                let mut out = Tensor::zeros(inputs.shape().clone());
                for (k, &d) in delta.data().iter().enumerate() {
                    let idx = argmax.data()[k] as usize;
                    out.data_mut()[idx] += d;
                }
                out
            }
            PoolingMethod::AveragePooling => {
                let (c, h, w) = self.input_shape;
                let (_, oh, ow) = self.output_shape();
                let (ph, pw) = self.pool_size;
                let (sh, sw) = self.stride;
                let weight = 1.0 / (ph * pw) as Float;
                let batch = inputs.dims()[0];
                let mut out = Tensor::zeros(inputs.shape().clone());
                for b in 0..batch {
                    for ci in 0..c {
                        for oy in 0..oh {
                            for ox in 0..ow {
                                let d = delta.data()[((b * c + ci) * oh + oy) * ow + ox] * weight;
                                for i in 0..ph {
                                    for j in 0..pw {
                                        out.data_mut()
                                            [((b * c + ci) * h + oy * sh + i) * w + ox * sw + j] +=
                                            d;
                                    }
                                }
                            }
                        }
                    }
                }
                out
            }
        };

        Ok(LayerBackward {
            input_delta,
            gradient: DVec::zeros(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEV: Device = Device::SingleThreaded;

    fn image() -> Tensor<Float> {
        Tensor::new(
            vec![
                1.0, 2.0, 3.0, 4.0, //
                5.0, 6.0, 7.0, 8.0, //
                9.0, 10.0, 11.0, 12.0, //
                13.0, 14.0, 15.0, 16.0,
            ],
            Shape::new(vec![1, 1, 4, 4]),
        )
    }

    #[test]
    fn max_pooling_known_values() {
        let layer =
            PoolingLayer::new((1, 4, 4), (2, 2), (2, 2), PoolingMethod::MaxPooling).unwrap();
        let out = layer.forward(&image(), &DEV).unwrap().activations;
        assert_eq!(out.dims(), &[1, 1, 2, 2]);
        assert_eq!(out.data(), &[6.0, 8.0, 14.0, 16.0]);
    }

    #[test]
    fn average_pooling_known_values() {
        let layer =
            PoolingLayer::new((1, 4, 4), (2, 2), (2, 2), PoolingMethod::AveragePooling).unwrap();
        let out = layer.forward(&image(), &DEV).unwrap().activations;
        assert_eq!(out.data(), &[3.5, 5.5, 11.5, 13.5]);
    }

    #[test]
    fn no_pooling_is_identity() {
        let layer =
            PoolingLayer::new((1, 4, 4), (2, 2), (2, 2), PoolingMethod::NoPooling).unwrap();
        let x = image();
        let out = layer.forward(&x, &DEV).unwrap().activations;
        assert_eq!(out, x);
    }

    #[test]
    fn max_backward_routes_to_argmax() {
        let layer =
            PoolingLayer::new((1, 4, 4), (2, 2), (2, 2), PoolingMethod::MaxPooling).unwrap();
        let x = image();
        let fwd = layer.forward(&x, &DEV).unwrap();
        let delta = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], Shape::new(vec![1, 1, 2, 2]));
        let back = layer.backward(&x, &fwd, &delta, &DEV).unwrap();
        // Maxima are at positions 5, 7, 13, 15 of the flattened image.
        let mut expected = vec![0.0; 16];
        expected[5] = 1.0;
        expected[7] = 2.0;
        expected[13] = 3.0;
        expected[15] = 4.0;
        assert_eq!(back.input_delta.data(), expected.as_slice());
    }

    #[test]
    fn average_backward_distributes_evenly() {
        let layer =
            PoolingLayer::new((1, 2, 2), (2, 2), (2, 2), PoolingMethod::AveragePooling).unwrap();
        let x = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], Shape::new(vec![1, 1, 2, 2]));
        let fwd = layer.forward(&x, &DEV).unwrap();
        let delta = Tensor::new(vec![4.0], Shape::new(vec![1, 1, 1, 1]));
        let back = layer.backward(&x, &fwd, &delta, &DEV).unwrap();
        assert_eq!(back.input_delta.data(), &[1.0, 1.0, 1.0, 1.0]);
    }
}
