use anyhow::{ensure, Context, Result};
use bbox::RoiBox;
use fcis::{
    config::Config, FcisInit, GroundTruth, Instance, RegionProposer, Report,
    SlidingWindowProposerInit,
};
use log::info;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::{env, fs, path::PathBuf};
use structopt::StructOpt;
use tch::{nn, vision, Kind};

#[derive(Debug, Clone, StructOpt)]
/// Run instance-aware segmentation on an image.
struct Args {
    #[structopt(long, default_value = "fcis.json5")]
    /// configuration file
    pub config_file: PathBuf,
    #[structopt(long)]
    /// input image file
    pub image: PathBuf,
    #[structopt(long)]
    /// JSON file with optional "rois", "class_map" and "instance_map" entries
    pub input: Option<PathBuf>,
    #[structopt(long)]
    /// model weights file
    pub weights: Option<PathBuf>,
    #[structopt(long)]
    /// write predicted label maps to this JSON file
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Input {
    #[serde(default)]
    rois: Option<Vec<[i64; 4]>>,
    #[serde(default)]
    class_map: Option<Vec<Vec<i32>>>,
    #[serde(default)]
    instance_map: Option<Vec<Vec<i32>>>,
}

#[derive(Debug, Serialize)]
struct Summary {
    num_rois: usize,
    num_scored_rois: usize,
    num_instances: usize,
    instances: Vec<Instance>,
    report: Option<Report>,
}

#[derive(Debug, Serialize)]
struct LabelMaps {
    class_map: Vec<Vec<i32>>,
    instance_map: Vec<Vec<i32>>,
}

fn main() -> Result<()> {
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    pretty_env_logger::init();

    let Args {
        config_file,
        image,
        input,
        weights,
        output,
    } = Args::from_args();
    let config = Config::open(&config_file)
        .with_context(|| format!("failed to load config file '{}'", config_file.display()))?;
    let input: Input = match input {
        Some(path) => serde_json::from_str(&fs::read_to_string(&path)?)
            .with_context(|| format!("failed to parse input file '{}'", path.display()))?,
        None => Input::default(),
    };

    // build model
    let mut vs = nn::VarStore::new(config.model.device);
    let model = FcisInit::from_config(&config).build(&vs.root())?;
    if let Some(weights) = &weights {
        info!("loading weights from '{}'", weights.display());
        vs.load(weights)?;
    }

    // load image
    let image = vision::image::load(&image)?
        .to_device(config.model.device)
        .to_kind(Kind::Float)
        / 255.0;
    let (_, height, width) = image.size3()?;

    let ground_truth = match (input.class_map, input.instance_map) {
        (Some(class_map), Some(instance_map)) => Some(GroundTruth::new(
            to_array(class_map)?,
            to_array(instance_map)?,
        )?),
        (None, None) => None,
        _ => anyhow::bail!("class_map and instance_map must be given together"),
    };

    let rois: Vec<RoiBox> = match input.rois {
        Some(rois) => rois
            .into_iter()
            .map(RoiBox::try_from_xyxy)
            .collect::<Result<_>>()?,
        None => {
            let proposer = SlidingWindowProposerInit::default().build()?;
            proposer.propose(&image)?
        }
    };
    info!("running on a {}x{} image with {} ROIs", height, width, rois.len());

    let output_maps = tch::no_grad(|| model.forward(&image, ground_truth.as_ref(), &rois, false))?;

    let summary = match &output_maps {
        Some(fcis_output) => {
            if let Some(report) = &fcis_output.report {
                report.log();
            }
            Summary {
                num_rois: rois.len(),
                num_scored_rois: fcis_output.predictions.len(),
                num_instances: fcis_output.maps.instances.len(),
                instances: fcis_output.maps.instances.clone(),
                report: fcis_output.report.clone(),
            }
        }
        None => Summary {
            num_rois: 0,
            num_scored_rois: 0,
            num_instances: 0,
            instances: vec![],
            report: None,
        },
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if let Some(path) = output {
        let maps = match output_maps {
            Some(fcis_output) => LabelMaps {
                class_map: to_rows(&fcis_output.maps.class_map),
                instance_map: to_rows(&fcis_output.maps.instance_map),
            },
            None => LabelMaps {
                class_map: vec![vec![0; width as usize]; height as usize],
                instance_map: vec![vec![-1; width as usize]; height as usize],
            },
        };
        fs::write(&path, serde_json::to_string(&maps)?)
            .with_context(|| format!("failed to write '{}'", path.display()))?;
        info!("label maps written to '{}'", path.display());
    }

    Ok(())
}

fn to_array(rows: Vec<Vec<i32>>) -> Result<Array2<i32>> {
    let height = rows.len();
    let width = rows.first().map(|row| row.len()).unwrap_or(0);
    ensure!(
        rows.iter().all(|row| row.len() == width),
        "label map rows must have the same length"
    );
    let values: Vec<i32> = rows.into_iter().flatten().collect();
    Ok(Array2::from_shape_vec((height, width), values)?)
}

fn to_rows(map: &Array2<i32>) -> Vec<Vec<i32>> {
    map.outer_iter().map(|row| row.to_vec()).collect()
}
