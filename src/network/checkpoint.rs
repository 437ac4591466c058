use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Serialize, Deserialize};

use crate::error::{Error, Result};
use crate::network::network::Network;
use crate::network::spec::LayerSpec;
use crate::optim::adam::Adam;

const FILE_PREFIX: &str = "ferrite-steg-";
const FILE_SUFFIX: &str = ".json";

/// Snapshot of everything trainable at a given global step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub step: usize,
    pub network: Network,
    pub optimizer: Adam,
}

/// `<dir>/ferrite-steg-<step>.json`
pub fn checkpoint_path(dir: &Path, step: usize) -> PathBuf {
    dir.join(format!("{FILE_PREFIX}{step}{FILE_SUFFIX}"))
}

impl Checkpoint {
    /// Writes the snapshot, creating `dir` if needed. Returns the file path.
    ///
    /// The file is written under a temporary name first and renamed into
    /// place, so an interrupted save never leaves a truncated checkpoint.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        let path = checkpoint_path(dir, self.step);
        let tmp = path.with_extension("json.tmp");

        let file = fs::File::create(&tmp).map_err(|e| Error::io(&tmp, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush().map_err(|e| Error::io(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| Error::io(&path, e))?;

        log::info!("Saved checkpoint {}", path.display());
        Ok(path)
    }

    /// Reads the snapshot saved at `step`. A missing or unreadable file is an
    /// error; there is no fallback to fresh parameters.
    ///
    /// The stored layers must be the steganalyzer stack for the stored input
    /// shape, and the optimizer moments must fit its parameters.
    pub fn load(dir: &Path, step: usize) -> Result<Checkpoint> {
        let path = checkpoint_path(dir, step);
        let file = fs::File::open(&path).map_err(|e| Error::Checkpoint {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let checkpoint: Checkpoint = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::Checkpoint { path: path.clone(), reason: e.to_string() })?;

        if checkpoint.step != step {
            return Err(Error::Checkpoint {
                path,
                reason: format!("file holds step {}, expected {step}", checkpoint.step),
            });
        }

        checkpoint
            .network
            .check_layout(&LayerSpec::steganalyzer())
            .and_then(|()| checkpoint.optimizer.check_moments(&checkpoint.network.parameter_lens()))
            .map_err(|reason| Error::Checkpoint { path: path.clone(), reason })?;

        log::info!("Loaded checkpoint {}", path.display());
        Ok(checkpoint)
    }
}

/// Highest step with a checkpoint in `dir`, or `None` if there is none.
pub fn latest_step(dir: &Path) -> Result<Option<usize>> {
    if !dir.exists() {
        return Ok(None);
    }

    let mut latest = None;
    for entry in fs::read_dir(dir).map_err(|e| Error::io(dir, e))? {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let name = entry.file_name();
        let step = name
            .to_str()
            .and_then(|n| n.strip_prefix(FILE_PREFIX))
            .and_then(|n| n.strip_suffix(FILE_SUFFIX))
            .and_then(|n| n.parse::<usize>().ok());
        if let Some(step) = step {
            latest = latest.max(Some(step));
        }
    }

    Ok(latest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::tensor::Tensor4;
    use crate::network::spec::ImageShape;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small_checkpoint(step: usize) -> Checkpoint {
        let network = Network::with_rng(ImageShape::square_rgb(4), &mut StdRng::seed_from_u64(step as u64));
        Checkpoint { step, network, optimizer: Adam::new(2e-4, 0.5) }
    }

    #[test]
    fn round_trip_restores_identical_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let original = small_checkpoint(300);
        original.save(dir.path()).unwrap();

        let restored = Checkpoint::load(dir.path(), 300).unwrap();
        assert_eq!(restored.step, 300);
        assert_eq!(restored.network.input, original.network.input);
        assert_eq!(restored.network.parameter_count(), original.network.parameter_count());
        assert_eq!(restored.optimizer.beta1, 0.5);

        let x = Tensor4::from_vec(1, 4, 4, 3, (0..48).map(|i| (i as f32 / 24.0) - 1.0).collect());
        let a = restored.network.forward(&x).unwrap();
        let b = original.network.forward(&x).unwrap();
        for (p, q) in a.data.iter().zip(&b.data) {
            assert!((p - q).abs() < 1e-6);
        }
    }

    #[test]
    fn missing_step_is_a_checkpoint_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Checkpoint::load(dir.path(), 7).unwrap_err();
        assert!(matches!(err, Error::Checkpoint { .. }));
    }

    #[test]
    fn layers_built_for_another_size_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut checkpoint = small_checkpoint(5);
        checkpoint.network = Network::with_rng(ImageShape::square_rgb(6), &mut StdRng::seed_from_u64(1));
        checkpoint.network.input = ImageShape::square_rgb(4);
        checkpoint.save(dir.path()).unwrap();

        let err = Checkpoint::load(dir.path(), 5).unwrap_err();
        assert!(matches!(err, Error::Checkpoint { .. }), "{err}");
    }

    #[test]
    fn reordered_layers_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut checkpoint = small_checkpoint(6);
        checkpoint.network.layers.swap(1, 2);
        checkpoint.save(dir.path()).unwrap();

        assert!(matches!(Checkpoint::load(dir.path(), 6), Err(Error::Checkpoint { .. })));
    }

    #[test]
    fn moments_for_other_parameters_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut checkpoint = small_checkpoint(8);
        let mut stray = vec![0.0f32; 3];
        checkpoint.optimizer.step(vec![&mut stray[..]], vec![&[1.0, 1.0, 1.0][..]]);
        checkpoint.save(dir.path()).unwrap();

        assert!(matches!(Checkpoint::load(dir.path(), 8), Err(Error::Checkpoint { .. })));
    }

    #[test]
    fn latest_step_picks_the_highest() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(latest_step(dir.path()).unwrap(), None);

        small_checkpoint(300).save(dir.path()).unwrap();
        small_checkpoint(1200).save(dir.path()).unwrap();
        small_checkpoint(900).save(dir.path()).unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        assert_eq!(latest_step(dir.path()).unwrap(), Some(1200));
    }
}
