use anyhow::{Context, Result};
use approx::assert_abs_diff_eq;
use bbox::RoiBox;
use fcis::{
    report, ChannelLayout, FcisHead, FcisHeadInit, GroundTruth, PositiveNegativeSamplerInit,
    ScoreVolume,
};
use ndarray::{s, Array2};
use tch::{
    nn::{self, OptimizerConfig as _},
    Device, Kind, Tensor,
};

const STRIDE: i64 = 8;

fn head() -> Result<FcisHead> {
    FcisHeadInit::default().build()
}

/// A volume where every cell scores `value` for the inside channel of `class`.
fn constant_volume(
    kernel_size: usize,
    num_classes: usize,
    size: i64,
    class: usize,
    value: f32,
) -> Result<ScoreVolume> {
    let layout = ChannelLayout::InsideOutsideMajor;
    let channels = ScoreVolume::num_channels(kernel_size, num_classes);
    let mut values = vec![0f32; (channels * size * size) as usize];
    for cell in 0..kernel_size * kernel_size {
        let channel = layout.channel_index(1, cell, class, kernel_size, num_classes);
        let begin = channel * (size * size) as usize;
        values[begin..(begin + (size * size) as usize)]
            .iter_mut()
            .for_each(|v| *v = value);
    }
    let tensor = Tensor::of_slice(&values).view([channels, size, size]);
    ScoreVolume::new(tensor, kernel_size, num_classes, STRIDE, layout)
}

fn single_instance(height: usize, width: usize, class: i32) -> Result<GroundTruth> {
    let mut class_map = Array2::zeros((height, width));
    let mut instance_map = Array2::from_elem((height, width), -1);
    class_map.slice_mut(s![10..50, 10..50]).fill(class);
    instance_map.slice_mut(s![10..50, 10..50]).fill(0);
    GroundTruth::new(class_map, instance_map)
}

#[test]
fn training_converges_on_a_single_instance() -> Result<()> {
    let kernel_size = 3;
    let num_classes = 2;
    let channels = ScoreVolume::num_channels(kernel_size, num_classes);

    let vs = nn::VarStore::new(Device::Cpu);
    let param = vs.root().zeros("score_volume", &[channels, 8, 8]);
    let mut opt = nn::Adam::default().build(&vs, 0.05)?;

    let head = head()?;
    let ground_truth = single_instance(64, 64, 2)?;
    let rois = vec![RoiBox::try_from_xyxy([10, 10, 50, 50])?];

    let run = |head: &FcisHead| -> Result<_> {
        let volume = ScoreVolume::new(
            param.shallow_clone(),
            kernel_size,
            num_classes,
            STRIDE,
            ChannelLayout::default(),
        )?;
        head.forward(&volume, [64, 64], Some(&ground_truth), &rois)?
            .context("expect an output for a non-empty ROI set")
    };

    let initial = run(&head)?;
    let initial_loss = f64::from(&initial.loss.as_ref().context("missing loss")?.loss);
    assert!(initial_loss.is_finite() && initial_loss > 0.0);
    // zero scores: ln(3) for classification and ln(2) for segmentation
    assert_abs_diff_eq!(initial_loss, 3f64.ln() + 2f64.ln(), epsilon = 1e-4);

    let report = initial.report.as_ref().context("missing report")?;
    for key in report::REPORT_KEYS {
        assert!(report.get(key).is_some(), "missing report key {}", key);
    }

    for _ in 0..100 {
        let output = run(&head)?;
        let loss = output.loss.context("missing loss")?;
        opt.backward_step(&loss.loss);
    }

    let output = run(&head)?;
    let final_loss = f64::from(&output.loss.as_ref().context("missing loss")?.loss);
    assert!(final_loss < initial_loss);

    assert_eq!(output.predictions.len(), 1);
    assert_eq!(output.predictions[0].class, 2);

    let maps = &output.maps;
    assert_eq!(maps.instances.len(), 1);
    assert_eq!(maps.instances[0].class, 2);
    assert_eq!(maps.instances[0].num_pixels, 40 * 40);
    assert!(maps
        .class_map
        .slice(s![10..50, 10..50])
        .iter()
        .all(|&class| class == 2));
    assert_eq!(maps.class_map.iter().filter(|&&class| class != 0).count(), 40 * 40);

    let report = output.report.context("missing report")?;
    assert_abs_diff_eq!(report.get(report::ACCURACY).unwrap_or(0.0), 1.0);
    assert_abs_diff_eq!(report.get(report::INS_IU).unwrap_or(0.0), 1.0);
    Ok(())
}

#[test]
fn empty_roi_set_yields_nothing() -> Result<()> {
    let volume = constant_volume(3, 2, 8, 1, 5.0)?;
    let ground_truth = single_instance(64, 64, 1)?;

    assert!(head()?.forward(&volume, [64, 64], None, &[])?.is_none());
    assert!(head()?
        .forward(&volume, [64, 64], Some(&ground_truth), &[])?
        .is_none());
    Ok(())
}

#[test]
fn overlapping_rois_become_one_instance() -> Result<()> {
    let volume = constant_volume(3, 2, 8, 1, 5.0)?;
    let rois = vec![
        RoiBox::try_from_xyxy([0, 0, 40, 40])?,
        RoiBox::try_from_xyxy([8, 8, 48, 48])?,
    ];
    let output = head()?
        .forward(&volume, [64, 64], None, &rois)?
        .context("expect an output")?;

    assert!(output.loss.is_none());
    assert!(output.report.is_none());
    assert_eq!(output.predictions.len(), 2);
    assert!(output
        .predictions
        .iter()
        .all(|prediction| prediction.class == 1));

    let maps = &output.maps;
    assert_eq!(maps.instances.len(), 1);
    assert_eq!(maps.instances[0].id, 0);
    assert_eq!(maps.instances[0].num_pixels, 40 * 40 * 2 - 32 * 32);
    assert_eq!(maps.instance_map[[0, 0]], 0);
    assert_eq!(maps.instance_map[[47, 47]], 0);
    assert_eq!(maps.instance_map[[48, 48]], -1);
    assert_eq!(maps.class_map[[47, 47]], 1);
    assert_eq!(maps.class_map[[60, 0]], 0);
    Ok(())
}

#[test]
fn small_rois_are_skipped_not_zeroed() -> Result<()> {
    // 128x128 image, 16x16 volume, k = 7
    let volume = constant_volume(7, 1, 16, 1, 5.0)?;
    let rois = vec![
        RoiBox::try_from_xyxy([0, 0, 100, 24])?,
        RoiBox::try_from_xyxy([0, 0, 64, 64])?,
    ];
    let output = head()?
        .forward(&volume, [128, 128], None, &rois)?
        .context("expect an output")?;

    assert_eq!(output.predictions.len(), 1);
    assert_eq!(output.predictions[0].roi_index, 1);
    assert_eq!(output.maps.instances.len(), 1);
    // ids count scored non-background predictions
    assert_eq!(output.maps.instances[0].id, 0);
    assert_eq!(output.maps.class_map[[70, 10]], 0);

    // only the small ROI: a result with nothing scored
    let output = head()?
        .forward(&volume, [128, 128], None, &rois[..1])?
        .context("expect an output")?;
    assert!(output.predictions.is_empty());
    assert!(output.maps.instances.is_empty());
    assert!(output.maps.instance_map.iter().all(|&id| id == -1));
    Ok(())
}

#[test]
fn repeated_calls_are_identical() -> Result<()> {
    let volume = ScoreVolume::new(
        Tensor::randn(&[2 * 9 * 3, 8, 8], (Kind::Float, Device::Cpu)),
        3,
        2,
        STRIDE,
        ChannelLayout::CellMajor,
    )?;
    let ground_truth = single_instance(64, 64, 2)?;
    let rois = vec![
        RoiBox::try_from_xyxy([10, 10, 50, 50])?,
        RoiBox::try_from_xyxy([0, 0, 32, 32])?,
        RoiBox::try_from_xyxy([24, 16, 64, 64])?,
    ];
    let head = head()?;

    let lhs = head
        .forward(&volume, [64, 64], Some(&ground_truth), &rois)?
        .context("expect an output")?;
    let rhs = head
        .forward(&volume, [64, 64], Some(&ground_truth), &rois)?
        .context("expect an output")?;

    assert_eq!(lhs.maps, rhs.maps);
    assert_eq!(lhs.report, rhs.report);
    assert_eq!(lhs.supervision, rhs.supervision);
    assert_eq!(lhs.predictions.len(), rhs.predictions.len());
    Ok(())
}

#[test]
fn invalid_inputs_are_rejected() -> Result<()> {
    let channels = ScoreVolume::num_channels(3, 2);
    let mismatch = ScoreVolume::new(
        Tensor::zeros(&[channels - 1, 8, 8], (Kind::Float, Device::Cpu)),
        3,
        2,
        STRIDE,
        ChannelLayout::default(),
    );
    assert!(mismatch.is_err());

    let volume = constant_volume(3, 2, 8, 1, 5.0)?;
    let outside = vec![RoiBox::try_from_xyxy([32, 32, 72, 72])?];
    assert!(head()?.forward(&volume, [64, 64], None, &outside).is_err());

    let ground_truth = single_instance(64, 60, 1)?;
    let rois = vec![RoiBox::try_from_xyxy([0, 0, 40, 40])?];
    assert!(head()?
        .forward(&volume, [64, 64], Some(&ground_truth), &rois)
        .is_err());

    assert!(RoiBox::try_from_xyxy([10, 10, 10, 20]).is_err());
    Ok(())
}

#[test]
fn training_rois_are_balanced() -> Result<()> {
    let head = FcisHeadInit {
        sampler: PositiveNegativeSamplerInit {
            negative_ratio: noisy_float::prelude::r64(1.0),
            min_negatives: 1,
            seed: Some(3),
        },
        ..Default::default()
    }
    .build()?;
    let ground_truth = single_instance(64, 64, 1)?;
    let rois = vec![
        RoiBox::try_from_xyxy([0, 0, 8, 8])?,
        RoiBox::try_from_xyxy([10, 10, 50, 50])?,
        RoiBox::try_from_xyxy([56, 56, 64, 64])?,
        RoiBox::try_from_xyxy([12, 12, 50, 50])?,
        RoiBox::try_from_xyxy([0, 40, 20, 64])?,
    ];

    let sampled = head.sample_rois(&rois, &ground_truth)?;
    assert_eq!(sampled.len(), 4);
    assert_eq!(sampled[0], rois[1]);
    assert_eq!(sampled[1], rois[3]);
    assert!(sampled[2..].iter().all(|roi| [rois[0], rois[2], rois[4]].contains(roi)));
    assert_eq!(sampled, head.sample_rois(&rois, &ground_truth)?);
    Ok(())
}
