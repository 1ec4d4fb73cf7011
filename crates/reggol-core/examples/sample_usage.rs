//! Example of logging a small experiment with reggol-core.

use std::thread;
use std::time::{Duration, Instant};

use reggol_core::{Logger, LoggerConfig, ParamValue};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Describe the run
    let config = LoggerConfig::new("custom_experiment")
        .with_exp_id(std::process::id())
        .with_base_log_dir("./sample_usage_log")
        .with_file_names("dict.json", "record.csv", "output.log")
        .with_param("algorithm", "baseline")
        .with_param("domain", "gridworld")
        .with_param("batch_size", 5)
        .with_param("learning_rate", 0.02);

    // 2. Create the run directory and open the outputs
    let mut logger = Logger::setup(config)?;
    logger.log("Starting Experiment")?;

    // 3. One tabular row per iteration
    for i in 0..5i64 {
        logger.log(&format!("Started iteration {i}"))?;
        let start = Instant::now();
        thread::sleep(Duration::from_millis(50));
        let elapsed = start.elapsed().as_secs_f64();

        logger.record_value("mse", 0.0001 * i as f64);
        logger.record_dict([("iteration", i), ("sample size", 10 * i)]);
        logger.record_value("training time", elapsed);
        logger.dump_tabular()?;

        let params = ParamValue::map([("iteration", ParamValue::from(i))]);
        logger.save_itr_params(i as u64, &params)?;
    }

    // 4. Orderly shutdown
    logger.log("Ending Experiment")?;
    logger.close()?;
    Ok(())
}
