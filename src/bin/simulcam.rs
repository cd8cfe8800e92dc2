//! Simulated Shack-Hartmann camera
//!
//! Runs the simulator in continuous acquisition and saves the last frame.
//!
//! Environment variables:
//!  * `AOSIM_CONFIG`  : simulator toml configuration, a synthetic phase screen is used if unset
//!  * `AOSIM_N_FRAME` : number of frames, defaults to 100
//!  * `AOSIM_OUTPUT`  : last frame PGM file, defaults to `simulcam.pgm`

use std::{env, error::Error, time::Duration};

use aosim::{Builder, Camera, CameraMode, FromBuilder, ImageData, Simulator, SimulatorBuilder};
use indicatif::{ProgressBar, ProgressStyle};

// Sum of incommensurate sinusoids, large enough for the wind to scroll
fn synthetic_screen(width: usize, height: usize) -> Result<ImageData, aosim::ImageError> {
    let samples = (0..height)
        .flat_map(|i| (0..width).map(move |j| (i as f64, j as f64)))
        .map(|(y, x)| {
            let phi = (x * 0.031).sin() + (y * 0.047).cos() + (0.013 * (x + 2. * y)).sin();
            (128. + 40. * phi) as u8
        })
        .collect();
    ImageData::new(samples, width, height)
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let builder = match env::var("AOSIM_CONFIG") {
        Ok(path) => SimulatorBuilder::load(path)?,
        Err(_) => {
            let builder = Simulator::builder();
            let (width, height) = builder.resolution;
            let screen = synthetic_screen(4 * width, 4 * height)?;
            builder.phase_screen(screen)
        }
    };
    let n_frame: u64 = env::var("AOSIM_N_FRAME")
        .ok()
        .map(|n| n.parse::<u64>())
        .transpose()?
        .unwrap_or(100);
    let output = env::var("AOSIM_OUTPUT").unwrap_or_else(|_| String::from("simulcam.pgm"));

    let sim = builder.build()?;
    let timeout = 10 * sim.interval() + Duration::from_secs(5);
    let camera = Camera::spawn(sim)?;

    let pb = ProgressBar::new(n_frame);
    pb.set_style(ProgressStyle::with_template(
        "{msg} [{eta_precise}] {bar:50.cyan/blue} {pos:>7}/{len:7}",
    )?);
    pb.set_message(format!("{} acquisition", camera.name()));

    camera.set_mode(CameraMode::Running)?;
    let mut last = None;
    let mut count = 0;
    while count < n_frame {
        match camera.wait_for_frame(count, timeout) {
            Some(frame) => {
                pb.set_position(frame.number.min(n_frame));
                count = frame.number;
                last = Some(frame);
            }
            None => {
                log::error!("no frame within {:?}", timeout);
                break;
            }
        }
    }
    camera.set_mode(CameraMode::Waiting)?;
    pb.finish();
    camera.stop()?;

    if let Some(frame) = last {
        println!("frame #{}: {:?}", frame.number, frame.stats);
        frame.save(&output)?;
        println!("last frame saved to {}", output);
    }
    Ok(())
}
