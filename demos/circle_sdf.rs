use linfa::prelude::*;
use lsegp::utils::grid_dataset_2d;
use lsegp::{ClassificationState, GpHyperParams, LevelSetSelector, LSEGP_LOG};
use ndarray::Array2;

/// Signed distance to a circle centered on a size x size grid
fn circle_sdf(size: usize, radius: f64) -> Array2<f64> {
    let c = (size as f64 + 1.) / 2.;
    Array2::from_shape_fn((size, size), |(i, j)| {
        let (x, y) = (i as f64 + 1. - c, j as f64 + 1. - c);
        (x * x + y * y).sqrt() - radius
    })
}

fn main() {
    let env = env_logger::Env::new().filter_or(LSEGP_LOG, "info");
    let mut builder = env_logger::Builder::from_env(env);
    let builder = builder.target(env_logger::Target::Stdout);
    builder.try_init().ok();

    let size = 40;
    let dataset = grid_dataset_2d(&circle_sdf(size, 12.));
    println!(
        "Select active points of the zero level set of a circle SDF sampled on a {size}x{size} grid"
    );

    let selection = LevelSetSelector::params()
        .hyper(GpHyperParams::new(9., 1., 1e-2))
        .tolerance(1e-2)
        .accuracy(0.1)
        .max_size(Some(150))
        .seed(Some(42))
        .fit(&dataset)
        .expect("Active set selection");

    println!("{selection}");
    println!(
        "{} active, {} above, {} below, {} undetermined in {:?}",
        selection.count(ClassificationState::Active),
        selection.count(ClassificationState::ClassifiedAbove),
        selection.count(ClassificationState::ClassifiedBelow),
        selection.count(ClassificationState::Undetermined),
        selection.elapsed()
    );
    if let Some(error) = selection.prediction_error() {
        println!("{error}");
    }

    let out_dir = "target/demos/circle_sdf";
    selection.export_npy(out_dir).expect("Records export");
    println!("Active set and trajectory records written in {out_dir}");
}
