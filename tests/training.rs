use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};

use ferrite_steg::data::{Batch, ImageSource, Sample};
use ferrite_steg::network::checkpoint::checkpoint_path;
use ferrite_steg::{Adam, Checkpoint, Error, ImageShape, Network, Steganalyzer, TrainConfig};

const SIZE: u32 = 8;

/// Writes a small image whose pixels depend on `seed`, so every file differs.
fn write_image(path: &Path, seed: u8) {
    let img = RgbImage::from_fn(SIZE, SIZE, |x, y| {
        let v = (x as u8).wrapping_mul(31) ^ (y as u8).wrapping_mul(17) ^ seed;
        Rgb([v, v.wrapping_add(seed), 255 - v])
    });
    img.save(path).unwrap();
}

/// `<root>/train` and `<root>/test`, each with two clean and two stego images,
/// plus `<root>/gen` with two generated stego images.
fn dataset(root: &Path) {
    for (split, offset) in [("train", 0u8), ("test", 40u8)] {
        let dir = root.join(split);
        std::fs::create_dir_all(&dir).unwrap();
        write_image(&dir.join("a.png"), offset + 1);
        write_image(&dir.join("b.png"), offset + 2);
        write_image(&dir.join("stego_a.png"), offset + 3);
        write_image(&dir.join("stego_b.png"), offset + 4);
    }
    let gen = root.join("gen");
    std::fs::create_dir_all(&gen).unwrap();
    write_image(&gen.join("stego_g1.png"), 90);
    write_image(&gen.join("stego_g2.png"), 91);
}

fn config(root: &Path) -> TrainConfig {
    TrainConfig {
        batch_size: 2,
        image_size: SIZE as usize,
        epoch: 1,
        eval_every: 1,
        data_dir: root.to_path_buf(),
        checkpoint_dir: root.join("checkpoint"),
        seed: Some(7),
        ..TrainConfig::default()
    }
}

fn train_samples(root: &Path) -> Vec<Sample> {
    ["a.png", "stego_a.png"].iter().map(|f| Sample::new(root.join("train").join(f))).collect()
}

#[test]
fn one_epoch_runs_every_complete_batch() {
    let dir = tempfile::tempdir().unwrap();
    dataset(dir.path());

    let mut model = Steganalyzer::new(config(dir.path())).unwrap();
    let report = model.train(1, &[PathBuf::from("gen")]).unwrap();

    assert_eq!(model.data.len(), 4);
    assert_eq!(report.final_step, 3);
    assert_eq!(report.epochs.len(), 1);
    assert_eq!(report.epochs[0].batches, 2);
    assert!(report.epochs[0].train_loss.unwrap().is_finite());

    // eval_every = 1: one check after each step.
    assert_eq!(report.snapshots.len(), 2);
    for snap in &report.snapshots {
        let acc = snap.test_accuracy.unwrap();
        assert!((0.0..=1.0).contains(&acc));
        assert_eq!(snap.generated.len(), 1);
        assert_eq!(snap.generated[0].0, dir.path().join("gen"));
        assert!(snap.generated[0].1.is_some());
    }
    assert!(report.best.is_some());
}

#[test]
fn train_size_caps_the_batches_per_epoch() {
    let dir = tempfile::tempdir().unwrap();
    dataset(dir.path());

    let config = TrainConfig { train_size: Some(3), epoch: 2, eval_every: 100, ..config(dir.path()) };
    let mut model = Steganalyzer::new(config).unwrap();
    let report = model.train(1, &[]).unwrap();

    assert_eq!(report.epochs.iter().map(|e| e.batches).collect::<Vec<_>>(), vec![1, 1]);
    assert_eq!(report.final_step, 3);
    assert!(report.snapshots.is_empty());
}

#[test]
fn shuffling_keeps_the_same_samples() {
    let dir = tempfile::tempdir().unwrap();
    dataset(dir.path());

    let config = TrainConfig { epoch: 3, eval_every: 100, ..config(dir.path()) };
    let mut model = Steganalyzer::new(config).unwrap();
    model.train(1, &[]).unwrap();

    let listed: BTreeSet<PathBuf> = ["a.png", "b.png", "stego_a.png", "stego_b.png"]
        .iter()
        .map(|f| dir.path().join("train").join(f))
        .collect();
    let shuffled: BTreeSet<PathBuf> = model.data.iter().map(|s| s.path.clone()).collect();
    assert_eq!(shuffled, listed);
}

#[test]
fn prefetching_gives_the_same_run() {
    let dir = tempfile::tempdir().unwrap();
    dataset(dir.path());

    let mut inline = Steganalyzer::new(config(dir.path())).unwrap();
    let mut prefetched = Steganalyzer::new(TrainConfig { prefetch_depth: 2, ..config(dir.path()) }).unwrap();
    inline.train(1, &[]).unwrap();
    prefetched.train(1, &[]).unwrap();

    assert_eq!(inline.network, prefetched.network);
}

#[test]
fn a_step_moves_the_parameters() {
    let dir = tempfile::tempdir().unwrap();
    dataset(dir.path());

    let mut model = Steganalyzer::new(config(dir.path())).unwrap();
    let batch = Batch::load(&train_samples(dir.path()), &ImageSource::new(SIZE as usize, false)).unwrap();

    assert_eq!(batch.targets.row(0), &[1.0, 0.0]);
    assert_eq!(batch.targets.row(1), &[0.0, 1.0]);

    let before = model.network.clone();
    let loss = model.train_step(&batch, 1).unwrap();
    assert!(loss.is_finite() && loss > 0.0);
    assert_ne!(model.network, before);
    assert_eq!(model.optimizer.time(), 1);
}

#[test]
fn a_non_finite_batch_aborts_before_the_update() {
    let dir = tempfile::tempdir().unwrap();
    dataset(dir.path());

    let mut model = Steganalyzer::new(config(dir.path())).unwrap();
    let mut batch = Batch::load(&train_samples(dir.path()), &ImageSource::new(SIZE as usize, false)).unwrap();
    batch.images.data[0] = f32::NAN;

    let before = model.network.clone();
    let err = model.train_step(&batch, 7).unwrap_err();
    assert!(matches!(err, Error::NonFiniteLoss { step: 7 }), "{err}");
    assert_eq!(model.network, before);
    assert_eq!(model.optimizer.time(), 0);
}

#[test]
fn training_resumes_from_a_saved_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    dataset(dir.path());

    let config = TrainConfig { save_checkpoints: true, eval_every: 100, ..config(dir.path()) };
    let mut first = Steganalyzer::new(config.clone()).unwrap();
    first.train(1, &[]).unwrap();
    assert!(checkpoint_path(&config.checkpoint_dir, 3).is_file());

    let mut resumed = Steganalyzer::new(TrainConfig { need_to_load: true, seed: Some(99), ..config }).unwrap();
    resumed.load(3).unwrap();
    assert_eq!(resumed.optimizer.time(), first.optimizer.time());

    let images = vec![dir.path().join("test/a.png"), dir.path().join("test/stego_b.png")];
    let expected = first.classify(&images).unwrap();
    let actual = resumed.classify(&images).unwrap();
    for (e, a) in expected.iter().zip(&actual) {
        assert!((e - a).abs() < 1e-6, "{e} vs {a}");
    }

    let report = resumed.train(3, &[]).unwrap();
    assert_eq!(report.final_step, 5);
    assert!(checkpoint_path(&resumed.config.checkpoint_dir, 5).is_file());
}

#[test]
fn loading_a_missing_checkpoint_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut model = Steganalyzer::new(config(dir.path())).unwrap();
    assert!(matches!(model.load(42), Err(Error::Checkpoint { .. })));
}

#[test]
fn loading_layers_built_for_another_size_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut model = Steganalyzer::new(config(dir.path())).unwrap();

    let mut network = Network::new(ImageShape::square_rgb(6));
    network.input = ImageShape::square_rgb(SIZE as usize);
    let checkpoint = Checkpoint { step: 5, network, optimizer: Adam::new(2e-4, 0.5) };
    checkpoint.save(&model.config.checkpoint_dir).unwrap();

    let before = model.network.clone();
    assert!(matches!(model.load(5), Err(Error::Checkpoint { .. })));
    assert_eq!(model.network, before);
}

#[test]
fn missing_train_folder_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut model = Steganalyzer::new(config(dir.path())).unwrap();
    assert!(matches!(model.train(1, &[]), Err(Error::Io { .. })));
}

#[test]
fn missing_evaluation_folders_fail_before_the_first_step() {
    let dir = tempfile::tempdir().unwrap();
    dataset(dir.path());
    let config = TrainConfig { eval_every: 100, ..config(dir.path()) };

    let mut model = Steganalyzer::new(config.clone()).unwrap();
    let err = model.train(1, &[PathBuf::from("gen"), PathBuf::from("gne")]).unwrap_err();
    assert!(matches!(err, Error::Io { ref path, .. } if path.ends_with("gne")), "{err}");
    assert_eq!(model.optimizer.time(), 0);

    std::fs::remove_dir_all(dir.path().join("test")).unwrap();
    let mut model = Steganalyzer::new(config).unwrap();
    assert!(matches!(model.train(1, &[]), Err(Error::Io { .. })));
    assert_eq!(model.optimizer.time(), 0);
}

#[test]
fn classify_returns_one_probability_per_image() {
    let dir = tempfile::tempdir().unwrap();
    dataset(dir.path());

    let model = Steganalyzer::new(config(dir.path())).unwrap();
    let images: Vec<PathBuf> = ["a.png", "b.png", "stego_a.png"]
        .iter()
        .map(|f| dir.path().join("test").join(f))
        .collect();
    let probs = model.classify(&images).unwrap();

    assert_eq!(probs.len(), 3);
    assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
}

#[test]
fn evaluation_on_a_folder_smaller_than_a_batch_is_none() {
    let dir = tempfile::tempdir().unwrap();
    dataset(dir.path());

    let model = Steganalyzer::new(TrainConfig { batch_size: 8, ..config(dir.path()) }).unwrap();
    assert_eq!(model.accuracy(&dir.path().join("test"), None, false).unwrap(), None);

    let model = Steganalyzer::new(config(dir.path())).unwrap();
    assert!(model.accuracy(&dir.path().join("test"), Some(2), true).unwrap().is_some());
}
