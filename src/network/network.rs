use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::error::{Error, Result};
use crate::layers::conv2d::{Conv2d, ConvGradients};
use crate::layers::dense::{Dense, DenseGradients};
use crate::layers::high_pass::HighPass;
use crate::layers::max_pool::MaxPool2d;
use crate::math::matrix::Matrix;
use crate::math::tensor::Tensor4;
use crate::network::spec::{ImageShape, LayerSpec};

/// One built stage of the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NetLayer {
    Conv(Conv2d),
    MaxPool(MaxPool2d),
    Flatten,
    Dense(Dense),
}

/// Value flowing between layers: feature maps before `Flatten`, rows after.
#[derive(Debug, Clone)]
enum Activations {
    Maps(Tensor4),
    Rows(Matrix),
}

/// What each layer remembers from the forward pass for backprop.
#[derive(Debug)]
enum LayerCache {
    Conv { input: Tensor4, pre_activation: Tensor4 },
    MaxPool { input_shape: [usize; 4], argmax: Vec<usize> },
    Flatten { height: usize, width: usize, channels: usize },
    Dense { input: Matrix, pre_activation: Matrix },
}

/// Intermediates of a training forward pass.
#[derive(Debug)]
pub struct ForwardTrace {
    caches: Vec<LayerCache>,
    /// Pre-softmax output, `[batch, 2]`.
    pub logits: Matrix,
    /// Softmax of `logits`.
    pub probabilities: Matrix,
}

/// Parameter gradients of one layer; layers without parameters have none.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerGradients {
    Conv(ConvGradients),
    Dense(DenseGradients),
    None,
}

/// Gradients for every trainable parameter, in layer order.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradients {
    pub layers: Vec<LayerGradients>,
}

impl Gradients {
    /// Flat gradient buffers, ordered like `Network::parameters_mut`.
    pub fn slices(&self) -> Vec<&[f32]> {
        let mut out = Vec::new();
        for layer in &self.layers {
            match layer {
                LayerGradients::Conv(g) => {
                    out.push(&g.weights[..]);
                    out.push(&g.biases[..]);
                }
                LayerGradients::Dense(g) => {
                    out.push(&g.weights.data[..]);
                    out.push(&g.biases[..]);
                }
                LayerGradients::None => {}
            }
        }
        out
    }
}

/// The steganalysis CNN: fixed high-pass preprocessing followed by the
/// trainable layers, ending in a 2-way softmax (clean, stego).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub input: ImageShape,
    pub layers: Vec<NetLayer>,
    #[serde(skip)]
    preprocess: HighPass,
}

impl Network {
    /// Builds the steganalyzer for `input`-shaped images with fresh weights.
    pub fn new(input: ImageShape) -> Network {
        Network::with_rng(input, &mut rand::thread_rng())
    }

    pub fn with_rng<R: Rng + ?Sized>(input: ImageShape, rng: &mut R) -> Network {
        Network::from_specs(input, &LayerSpec::steganalyzer(), rng)
    }

    /// Builds layers from `specs`, threading the running shape through them.
    pub(crate) fn from_specs<R: Rng + ?Sized>(
        input: ImageShape,
        specs: &[LayerSpec],
        rng: &mut R,
    ) -> Network {
        let mut channels = input.channels;
        let mut features = 0;
        let mut layers = Vec::with_capacity(specs.len());

        for spec in specs {
            let layer = match *spec {
                LayerSpec::Conv { filters, kernel, activation } => {
                    let conv = Conv2d::new(rng, kernel, channels, filters, activation);
                    channels = filters;
                    NetLayer::Conv(conv)
                }
                LayerSpec::MaxPool { window } => NetLayer::MaxPool(MaxPool2d::new(window)),
                LayerSpec::Flatten => {
                    features = input.height * input.width * channels;
                    NetLayer::Flatten
                }
                LayerSpec::Dense { size, activation } => {
                    let dense = Dense::new(rng, size, features, activation);
                    features = size;
                    NetLayer::Dense(dense)
                }
            };
            layers.push(layer);
        }

        Network { input, layers, preprocess: HighPass }
    }

    /// Total number of trainable scalars.
    pub fn parameter_count(&self) -> usize {
        self.parameter_lens().iter().sum()
    }

    /// Length of every flat parameter buffer, ordered like `parameters_mut`.
    pub fn parameter_lens(&self) -> Vec<usize> {
        let mut out = Vec::new();
        for layer in &self.layers {
            match layer {
                NetLayer::Conv(c) => out.extend([c.weights.len(), c.biases.len()]),
                NetLayer::Dense(d) => out.extend([d.weights.data.len(), d.biases.len()]),
                _ => {}
            }
        }
        out
    }

    /// Checks that `layers` is `specs` built for `input`: same layer kinds in
    /// the same order, every buffer sized for the shape flowing into it.
    ///
    /// Returns a description of the first mismatch.
    pub fn check_layout(&self, specs: &[LayerSpec]) -> std::result::Result<(), String> {
        if self.layers.len() != specs.len() {
            return Err(format!("expected {} layers, found {}", specs.len(), self.layers.len()));
        }

        let mut channels = self.input.channels;
        let mut features = 0;
        for (i, (spec, layer)) in specs.iter().zip(&self.layers).enumerate() {
            let fits = match (*spec, layer) {
                (LayerSpec::Conv { filters, kernel, activation }, NetLayer::Conv(c)) => {
                    let ok = c.kernel == kernel
                        && c.in_channels == channels
                        && c.filters == filters
                        && c.activator == activation
                        && c.weights.len() == kernel * kernel * channels * filters
                        && c.biases.len() == filters;
                    channels = filters;
                    ok
                }
                (LayerSpec::MaxPool { window }, NetLayer::MaxPool(p)) => p.window == window,
                (LayerSpec::Flatten, NetLayer::Flatten) => {
                    features = self.input.height * self.input.width * channels;
                    true
                }
                (LayerSpec::Dense { size, activation }, NetLayer::Dense(d)) => {
                    let ok = d.size == size
                        && d.input_size == features
                        && d.activator == activation
                        && (d.weights.rows, d.weights.cols) == (features, size)
                        && d.weights.data.len() == features * size
                        && d.biases.len() == size;
                    features = size;
                    ok
                }
                _ => false,
            };
            if !fits {
                return Err(format!("layer {i} does not match `{spec}` for {} images", self.input));
            }
        }
        Ok(())
    }

    /// Mutable flat parameter buffers: weights then biases for each trainable
    /// layer, in layer order.
    pub fn parameters_mut(&mut self) -> Vec<&mut [f32]> {
        let mut out = Vec::new();
        for layer in &mut self.layers {
            match layer {
                NetLayer::Conv(c) => {
                    out.push(&mut c.weights[..]);
                    out.push(&mut c.biases[..]);
                }
                NetLayer::Dense(d) => {
                    out.push(&mut d.weights.data[..]);
                    out.push(&mut d.biases[..]);
                }
                _ => {}
            }
        }
        out
    }

    fn check_input(&self, images: &Tensor4) -> Result<()> {
        let [_, h, w, c] = images.shape();
        if (h, w, c) != (self.input.height, self.input.width, self.input.channels) {
            return Err(Error::shape(
                format!("images of {}", self.input),
                format!("{h}x{w}x{c}"),
            ));
        }
        Ok(())
    }

    /// Inference-only forward pass; returns `[batch, 2]` class probabilities.
    pub fn forward(&self, images: &Tensor4) -> Result<Matrix> {
        self.check_input(images)?;
        let mut current = Activations::Maps(self.preprocess.apply(images));

        for layer in &self.layers {
            current = match (layer, current) {
                (NetLayer::Conv(conv), Activations::Maps(x)) => Activations::Maps(conv.forward(&x)),
                (NetLayer::MaxPool(pool), Activations::Maps(x)) => {
                    Activations::Maps(pool.forward(&x).output)
                }
                (NetLayer::Flatten, Activations::Maps(x)) => Activations::Rows(x.flatten()),
                (NetLayer::Dense(dense), Activations::Rows(x)) => Activations::Rows(dense.forward(&x)),
                _ => unreachable!("layer order is fixed at construction"),
            };
        }

        match current {
            Activations::Rows(probabilities) => Ok(probabilities),
            Activations::Maps(_) => unreachable!("network ends in a dense layer"),
        }
    }

    /// Forward pass that keeps every intermediate needed by `backward`.
    pub fn forward_trace(&self, images: &Tensor4) -> Result<ForwardTrace> {
        self.check_input(images)?;
        let mut caches = Vec::with_capacity(self.layers.len());
        let mut current = Activations::Maps(self.preprocess.apply(images));
        let mut logits = Matrix::zeros(0, 0);

        for layer in &self.layers {
            current = match (layer, current) {
                (NetLayer::Conv(conv), Activations::Maps(x)) => {
                    let pre = conv.pre_activation(&x);
                    let out = conv.activate(&pre);
                    caches.push(LayerCache::Conv { input: x, pre_activation: pre });
                    Activations::Maps(out)
                }
                (NetLayer::MaxPool(pool), Activations::Maps(x)) => {
                    let pooled = pool.forward(&x);
                    caches.push(LayerCache::MaxPool { input_shape: x.shape(), argmax: pooled.argmax });
                    Activations::Maps(pooled.output)
                }
                (NetLayer::Flatten, Activations::Maps(x)) => {
                    caches.push(LayerCache::Flatten {
                        height: x.height,
                        width: x.width,
                        channels: x.channels,
                    });
                    Activations::Rows(x.flatten())
                }
                (NetLayer::Dense(dense), Activations::Rows(x)) => {
                    let pre = dense.pre_activation(&x);
                    let out = dense.activate(&pre);
                    logits = pre.clone();
                    caches.push(LayerCache::Dense { input: x, pre_activation: pre });
                    Activations::Rows(out)
                }
                _ => unreachable!("layer order is fixed at construction"),
            };
        }

        match current {
            Activations::Rows(probabilities) => Ok(ForwardTrace { caches, logits, probabilities }),
            Activations::Maps(_) => unreachable!("network ends in a dense layer"),
        }
    }

    /// Backpropagates dL/d logits through the traced pass.
    ///
    /// The output layer's softmax derivative is the identity here: the loss
    /// already returns the combined softmax + cross-entropy gradient.
    pub fn backward(&self, trace: ForwardTrace, grad_logits: Matrix) -> Gradients {
        let mut grads = vec![LayerGradients::None; self.layers.len()];
        let mut delta = Activations::Rows(grad_logits);

        for (i, (layer, cache)) in self.layers.iter().zip(trace.caches).enumerate().rev() {
            delta = match (layer, cache, delta) {
                (NetLayer::Dense(dense), LayerCache::Dense { input, pre_activation }, Activations::Rows(d)) => {
                    let (g, input_delta) = dense.compute_gradients(d, &pre_activation, &input);
                    grads[i] = LayerGradients::Dense(g);
                    Activations::Rows(input_delta)
                }
                (NetLayer::Flatten, LayerCache::Flatten { height, width, channels }, Activations::Rows(d)) => {
                    Activations::Maps(Tensor4::unflatten(d, height, width, channels))
                }
                (NetLayer::MaxPool(pool), LayerCache::MaxPool { input_shape, argmax }, Activations::Maps(d)) => {
                    Activations::Maps(pool.backward(input_shape, &argmax, &d))
                }
                (NetLayer::Conv(conv), LayerCache::Conv { input, pre_activation }, Activations::Maps(d)) => {
                    let (g, grad_input) = conv.backward(&input, &pre_activation, d);
                    grads[i] = LayerGradients::Conv(g);
                    Activations::Maps(grad_input)
                }
                _ => unreachable!("trace was produced by this network"),
            };
        }

        Gradients { layers: grads }
    }
}
