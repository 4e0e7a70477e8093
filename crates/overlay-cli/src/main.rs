mod config;

use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use overlay_proto::report::{AnnotationRecord, FrameReport, ReportKind};
use overlay_vision::canvas::ImageCanvas;
use overlay_vision::classify::{ThresholdClassifier, NO_CLASS};
use overlay_vision::colors::normalize_class_name;
use overlay_vision::raycast::FixedDepthRaycast;
use overlay_vision::tensor::decode_detections;
use overlay_vision::{Annotation, AnnotationProjector, ClassColorTable, FrameGeometry, Labels, Vec3, VisionError};

use config::{load_config, Config};

#[derive(Debug, Parser)]
#[command(name = "overlay", version, about = "Passthrough overlay - detection annotation and classification tools")]
struct Cli {
    #[arg(long)]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Doctor,
    /// Print the label table with class indices.
    Labels,
    /// Pick a class from a JSON array of scores.
    Classify {
        #[arg(long)]
        scores: PathBuf,
    },
    /// Project one frame of detections and report the annotations.
    Project {
        #[arg(long)]
        frame: PathBuf,
        /// Write the rendered overlay as PNG.
        #[arg(long)]
        render: Option<PathBuf>,
    },
}

/// One frame as dumped by the detector: raw tensors plus sizes.
#[derive(Debug, serde::Deserialize)]
struct FrameInput {
    image_w: f32,
    image_h: f32,
    boxes: Vec<[f32; 4]>,
    label_ids: Vec<i32>,
    #[serde(default)]
    camera_position: Option<Vec3>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.cmd {
        Command::Doctor => doctor(&cfg)?,
        Command::Labels => labels(&cfg)?,
        Command::Classify { scores } => classify(&cfg, &scores)?,
        Command::Project { frame, render } => project(&cfg, &frame, render.as_deref()).await?,
    }
    Ok(())
}

fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");
    cfg.check()?;

    let labels = Labels::load(&cfg.overlay.labels_path).context("load labels")?;
    anyhow::ensure!(!labels.is_empty(), "labels file {} has no entries", cfg.overlay.labels_path);

    for name in unused_class_colors(cfg, &labels) {
        warn!("doctor: class color '{}' matches no label", name);
    }

    info!("doctor: OK ({} labels, {} class colors)", labels.len(), cfg.overlay.class_colors.len());
    Ok(())
}

/// Configured class colors that no label would ever resolve to.
fn unused_class_colors<'a>(cfg: &'a Config, labels: &Labels) -> Vec<&'a str> {
    cfg.overlay
        .class_colors
        .iter()
        .filter(|entry| {
            let one = ClassColorTable::new(vec![(*entry).clone()], cfg.overlay.default_color);
            !labels.iter().any(|l| one.lookup(&normalize_class_name(l)).is_some())
        })
        .map(|entry| entry.class_name.as_str())
        .collect()
}

fn labels(cfg: &Config) -> Result<()> {
    let labels = Labels::load(&cfg.overlay.labels_path).context("load labels")?;
    for (i, name) in labels.iter().enumerate() {
        println!("{:>3} {}", i, name);
    }
    Ok(())
}

fn classify(cfg: &Config, path: &Path) -> Result<()> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read scores {}", path.display()))?;
    let scores: Vec<f32> = serde_json::from_str(&s).context("parse scores json")?;

    // labels only decorate the output here
    let labels = match Labels::load(&cfg.overlay.labels_path) {
        Ok(l) => Some(l),
        Err(e) => {
            warn!("classify: labels unavailable: {}", e);
            None
        }
    };

    let report = classification_report(cfg, &scores, labels.as_ref())?;
    match (report.class_index, report.score) {
        (Some(index), Some(score)) if index != NO_CLASS => {
            println!("class={} label={} score={:.3}", index, report.class_label.as_deref().unwrap_or("?"), score)
        }
        _ => println!("class=none"),
    }
    println!("{}", serde_json::to_string(&report).context("encode report")?);
    Ok(())
}

fn classification_report(cfg: &Config, scores: &[f32], labels: Option<&Labels>) -> Result<FrameReport> {
    let clf = ThresholdClassifier::new(cfg.classifier.threshold).with_softmax(cfg.classifier.softmax);
    let decision = clf.decide(scores)?;

    let mut report = FrameReport::new(now_ms(), ReportKind::Classification, scores.len());
    match decision {
        Some(c) => {
            let index = i32::try_from(c.index).context("class index overflows i32")?;
            report.class_index = Some(index);
            report.class_label = labels.and_then(|l| l.get(index)).map(str::to_string);
            report.score = Some(c.score);
            report.msg = "class selected".into();
        }
        None => {
            report.class_index = Some(NO_CLASS);
            report.msg = format!("no class above {}", cfg.classifier.threshold);
        }
    }
    Ok(report)
}

async fn project(cfg: &Config, path: &Path, render: Option<&Path>) -> Result<()> {
    cfg.check()?;
    let s = std::fs::read_to_string(path).with_context(|| format!("read frame {}", path.display()))?;
    let input: FrameInput = serde_json::from_str(&s).context("parse frame json")?;
    let labels = Labels::load(&cfg.overlay.labels_path).context("load labels")?;

    let out = project_frame(cfg, &input, labels).await;
    println!("{}", serde_json::to_string(&out.report).context("encode report")?);

    for a in &out.annotations {
        let world = match a.world_pos {
            Some(p) => format!("({:.3},{:.3},{:.3})", p.x, p.y, p.z),
            None => "miss".to_string(),
        };
        println!(
            "slot={} {} center=({:.1},{:.1}) size={:.1}x{:.1} world={}",
            a.slot, a.label, a.cx, a.cy, a.w, a.h, world
        );
    }

    if let Some(out_path) = render {
        let img = out.projector.pool().factory().render();
        img.save_with_format(out_path, image::ImageFormat::Png)
            .with_context(|| format!("write {}", out_path.display()))?;
        info!("project: rendered {}", out_path.display());
    }

    match out.failure {
        Some(e) => Err(anyhow::Error::new(e).context("project frame")),
        None => Ok(()),
    }
}

struct FrameOutcome {
    report: FrameReport,
    annotations: Vec<Annotation>,
    projector: AnnotationProjector<ImageCanvas>,
    failure: Option<VisionError>,
}

/// Runs one frame through a fresh projector. A structural failure clears the
/// overlay and still produces a report, of kind `Error`.
async fn project_frame(cfg: &Config, input: &FrameInput, labels: Labels) -> FrameOutcome {
    let processed = Rc::new(Cell::new(0usize));
    let seen = processed.clone();

    let o = &cfg.overlay;
    let canvas = ImageCanvas::new(o.display_w.round() as u32, o.display_h.round() as u32);
    let mut projector = AnnotationProjector::new(canvas, o.color_table())
        .with_max_annotations(o.max_annotations)
        .with_sink(move |n: usize| seen.set(n));
    projector.set_labels(labels);

    let frame = FrameGeometry {
        image_w: input.image_w,
        image_h: input.image_h,
        display_w: o.display_w,
        display_h: o.display_h,
        camera_res: (o.camera_res_w, o.camera_res_h),
        camera_position: input.camera_position,
    };
    let mut raycast = FixedDepthRaycast::new(frame.camera_res, cfg.raycast.depth_m);

    let flat: Vec<f32> = input.boxes.iter().flatten().copied().collect();
    let result = match decode_detections(&flat, &[input.boxes.len(), 4], &input.label_ids) {
        Ok(detections) => projector.project_async(&detections, &frame, &mut raycast).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(annotations) => {
            let mut report = FrameReport::new(now_ms(), ReportKind::Detections, processed.get());
            report.annotations = annotations.iter().map(record).collect();
            report.msg = format!("{} of {} detections annotated", annotations.len(), input.boxes.len());
            FrameOutcome { report, annotations, projector, failure: None }
        }
        Err(e) => {
            warn!("project: frame rejected: {}", e);
            projector.report_error();
            let mut report = FrameReport::new(now_ms(), ReportKind::Error, processed.get());
            report.msg = e.to_string();
            FrameOutcome { report, annotations: Vec::new(), projector, failure: Some(e) }
        }
    }
}

fn record(a: &Annotation) -> AnnotationRecord {
    AnnotationRecord {
        slot: a.slot,
        class_name: a.class_name.clone(),
        cx: a.cx,
        cy: a.cy,
        w: a.w,
        h: a.h,
        color: a.color.into(),
        world: a.world_pos.map(|p| [p.x, p.y, p.z]),
    }
}

fn now_ms() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
