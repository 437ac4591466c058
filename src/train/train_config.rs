use std::path::{Path, PathBuf};

use serde::{Serialize, Deserialize};

use crate::error::{Error, Result};

/// Configuration for a steganalyzer run.
///
/// Every field has a default, so a JSON file only needs the values it
/// changes. Unknown keys are rejected so typos do not pass silently.
///
/// # Fields
/// - `batch_size`       — samples per mini-batch, constant for the run
/// - `img_format`       — file extension of the images (`png`, `jpg`, ...)
/// - `image_size`       — side of the square RGB input images
/// - `train_size`       — cap on samples used per epoch; `None` = all
/// - `epoch`            — number of passes over the training data
/// - `learning_rate`    — Adam step size
/// - `beta1`            — Adam first-moment decay
/// - `need_to_load`     — resume from the checkpoint at the start step
/// - `checkpoint_dir`   — where checkpoints are read and written
/// - `data_dir`         — root holding the train/test folders
/// - `stego_name`       — selects `<name>_train` / `<name>_test` folders
/// - `eval_every`       — global steps between accuracy checks
/// - `save_checkpoints` — save at every accuracy check and at the end
/// - `prefetch_depth`   — batches decoded ahead on a worker thread; 0 = none
/// - `resize`           — resize off-size images instead of failing
/// - `seed`             — fixes the shuffle and weight initialization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainConfig {
    pub batch_size: usize,
    pub img_format: String,
    pub image_size: usize,
    pub train_size: Option<usize>,
    pub epoch: usize,
    pub learning_rate: f32,
    pub beta1: f32,
    pub need_to_load: bool,
    pub checkpoint_dir: PathBuf,
    pub data_dir: PathBuf,
    pub stego_name: Option<String>,
    pub eval_every: usize,
    pub save_checkpoints: bool,
    pub prefetch_depth: usize,
    pub resize: bool,
    pub seed: Option<u64>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            batch_size: 64,
            img_format: "png".into(),
            image_size: 64,
            train_size: None,
            epoch: 25,
            learning_rate: 0.0002,
            beta1: 0.5,
            need_to_load: false,
            checkpoint_dir: PathBuf::from("checkpoint"),
            data_dir: PathBuf::from("."),
            stego_name: None,
            eval_every: 300,
            save_checkpoints: false,
            prefetch_depth: 0,
            resize: false,
            seed: None,
        }
    }
}

impl TrainConfig {
    /// Reads and validates a JSON config file.
    pub fn load_json(path: &Path) -> Result<TrainConfig> {
        let file = std::fs::File::open(path).map_err(|e| Error::io(path, e))?;
        let reader = std::io::BufReader::new(file);
        let config: TrainConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the config to a pretty-printed JSON file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path).map_err(|e| Error::io(path, e))?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("batch_size", self.batch_size),
            ("image_size", self.image_size),
            ("epoch", self.epoch),
            ("eval_every", self.eval_every),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(Error::Config(format!("`{name}` must be at least 1")));
            }
        }
        if self.train_size == Some(0) {
            return Err(Error::Config("`train_size` must be at least 1".into()));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(Error::Config(format!(
                "`learning_rate` must be a positive number, got {}",
                self.learning_rate
            )));
        }
        if !(0.0..1.0).contains(&self.beta1) {
            return Err(Error::Config(format!("`beta1` must be in [0, 1), got {}", self.beta1)));
        }
        if self.img_format.is_empty() || !self.img_format.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::Config(format!(
                "`img_format` must be a bare file extension, got `{}`",
                self.img_format
            )));
        }
        Ok(())
    }

    /// Samples per epoch at most; unbounded when `train_size` is unset.
    pub fn train_size_cap(&self) -> usize {
        self.train_size.unwrap_or(usize::MAX)
    }

    /// `<data_dir>/<stego_name>_train` or `<data_dir>/train`.
    pub fn train_dir(&self) -> PathBuf {
        self.split_dir("train")
    }

    /// `<data_dir>/<stego_name>_test` or `<data_dir>/test`.
    pub fn test_dir(&self) -> PathBuf {
        self.split_dir("test")
    }

    /// Resolves a caller-supplied folder against `data_dir`; absolute paths
    /// are kept as they are.
    pub fn resolve_dir(&self, dir: &Path) -> PathBuf {
        self.data_dir.join(dir)
    }

    fn split_dir(&self, split: &str) -> PathBuf {
        match &self.stego_name {
            Some(name) => self.data_dir.join(format!("{name}_{split}")),
            None => self.data_dir.join(split),
        }
    }
}
