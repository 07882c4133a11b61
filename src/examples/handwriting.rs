use std::error::Error;

use tracing::{info, warn};

use crate::{
    config::TrainConfig,
    data::{mnist::{self, Split, HEIGHT, WIDTH}, Dataset},
    plot::{plot_training_log, save_digit_grid},
    training::{save_params, Trainer, TrainerConfig},
};

fn load_split(config: &TrainConfig, split: Split) -> Result<Dataset, Box<dyn Error>> {
    let mut dataset = mnist::load(&config.data_dir, split)?;
    if let Some(limit) = config.limit {
        dataset = dataset.truncate(limit);
    }
    dataset.standardize(config.normalize_mean, config.normalize_std);
    Ok(dataset)
}

/// Train the configured MLP on MNIST, printing one status line per epoch.
pub fn run_sample(config: &TrainConfig) -> Result<(), Box<dyn Error>> {
    // 28x28 pixels => 784 inputs (greyscale), 10 outputs
    if config.layer_sizes.first() != Some(&(WIDTH * HEIGHT)) {
        warn!(sizes = ?config.layer_sizes, "first layer does not match the 784 mnist pixels");
    }

    let train = load_split(config, Split::Train)?;
    let test = load_split(config, Split::Test)?;
    info!(train = train.len(), test = test.len(), "datasets ready");

    if let Some(path) = &config.samples_plot {
        save_digit_grid(path, &train.features, 64, WIDTH, HEIGHT, 8)?;
    }

    let trainer_config = TrainerConfig {
        layer_sizes: config.layer_sizes.clone(),
        param_scale: config.param_scale,
        num_epochs: config.num_epochs,
        batch_size: config.batch_size,
        eval_batch_size: config.test_batch_size,
        shuffle: config.shuffle,
        seed: config.seed,
    };
    let mut trainer = Trainer::new(trainer_config, config.adam());
    trainer.run(&train, &test, |report| println!("{report}"))?;

    if let Some(path) = &config.curves_plot {
        plot_training_log(path, trainer.log())?;
    }
    if let (Some(path), Some(params)) = (&config.checkpoint, trainer.params()) {
        save_params(path, params)?;
    }

    Ok(())
}
