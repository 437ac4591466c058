use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::data::batch::Batch;
use crate::data::image_source::ImageSource;
use crate::data::sample::{Sample, STEGO};
use crate::error::{Error, Result};
use crate::loss::cross_entropy::CrossEntropyLoss;
use crate::math::matrix::Matrix;
use crate::math::tensor::Tensor4;
use crate::network::checkpoint::Checkpoint;
use crate::network::network::{Gradients, Network};
use crate::network::spec::ImageShape;
use crate::optim::adam::Adam;
use crate::train::train_config::TrainConfig;

/// The steganalysis model together with everything needed to train it.
///
/// Network, optimizer and image decoder are built once in `new`; the
/// training sample list is filled by `train`.
pub struct Steganalyzer {
    pub config: TrainConfig,
    pub network: Network,
    pub optimizer: Adam,
    /// Every training image, listed once when `train` starts and shuffled in
    /// place each epoch.
    pub data: Vec<Sample>,
    pub test_dir: PathBuf,
    pub(crate) source: ImageSource,
    pub(crate) rng: StdRng,
}

impl Steganalyzer {
    /// Validates `config` and builds a freshly initialized network. The
    /// training folder is listed when `train` starts.
    pub fn new(config: TrainConfig) -> Result<Steganalyzer> {
        config.validate()?;

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let shape = ImageShape::square_rgb(config.image_size);
        let network = Network::with_rng(shape, &mut rng);
        let optimizer = Adam::new(config.learning_rate, config.beta1);
        let source = ImageSource::new(config.image_size, config.resize);

        let test_dir = config.test_dir();

        log::debug!(
            "Built network for {} images: {} parameters",
            shape,
            network.parameter_count()
        );

        Ok(Steganalyzer {
            config,
            network,
            optimizer,
            data: Vec::new(),
            test_dir,
            source,
            rng,
        })
    }

    /// Replaces the parameters and optimizer state with the checkpoint saved
    /// at `step` in `checkpoint_dir`.
    ///
    /// The configured learning rate and `beta1` override the saved ones.
    pub fn load(&mut self, step: usize) -> Result<()> {
        let checkpoint = Checkpoint::load(&self.config.checkpoint_dir, step)?;
        if checkpoint.network.input != self.network.input {
            return Err(Error::shape(
                format!("checkpoint for {} images", self.network.input),
                format!("{} images", checkpoint.network.input),
            ));
        }

        self.network = checkpoint.network;
        self.optimizer = checkpoint.optimizer;
        self.optimizer.learning_rate = self.config.learning_rate;
        self.optimizer.beta1 = self.config.beta1;
        Ok(())
    }

    /// Saves the current parameters and optimizer state under `step`.
    pub fn save(&self, step: usize) -> Result<PathBuf> {
        let checkpoint = Checkpoint {
            step,
            network: self.network.clone(),
            optimizer: self.optimizer.clone(),
        };
        checkpoint.save(&self.config.checkpoint_dir)
    }

    /// Loss and parameter gradients of one batch; no parameter changes.
    pub fn compute_gradients(&self, batch: &Batch) -> Result<(f32, Gradients)> {
        let trace = self.network.forward_trace(&batch.images)?;
        let loss = CrossEntropyLoss::loss(&trace.logits, &batch.targets);
        let grad_logits = CrossEntropyLoss::derivative(&trace.logits, &batch.targets);
        let gradients = self.network.backward(trace, grad_logits);
        Ok((loss, gradients))
    }

    /// One optimizer step on `batch`. Returns the batch loss measured in the
    /// same forward pass, before the update.
    ///
    /// A non-finite loss or gradient aborts with `NonFiniteLoss` and leaves
    /// the parameters and optimizer state untouched.
    pub fn train_step(&mut self, batch: &Batch, step: usize) -> Result<f32> {
        let (loss, gradients) = self.compute_gradients(batch)?;
        let finite_gradients = gradients.slices().iter().all(|g| g.iter().all(|v| v.is_finite()));
        if !loss.is_finite() || !finite_gradients {
            return Err(Error::NonFiniteLoss { step });
        }
        self.optimizer.step(self.network.parameters_mut(), gradients.slices());
        Ok(loss)
    }

    /// Class probabilities for already-decoded images.
    pub fn predict(&self, images: &Tensor4) -> Result<Matrix> {
        self.network.forward(images)
    }

    /// Probability that each image file carries a payload.
    pub fn classify(&self, paths: &[PathBuf]) -> Result<Vec<f32>> {
        let samples: Vec<Sample> = paths.iter().map(Sample::new).collect();
        let mut out = Vec::with_capacity(samples.len());
        for chunk in samples.chunks(self.config.batch_size) {
            let batch = Batch::load(chunk, &self.source)?;
            let probs = self.predict(&batch.images)?;
            out.extend((0..probs.rows).map(|r| probs.get(r, STEGO)));
        }
        Ok(out)
    }
}
