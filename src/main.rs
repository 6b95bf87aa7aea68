use std::{fs, path::Path, path::PathBuf, process};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};

use t2a_pose::convert::{
    ConversionDirection, ConversionReport, PoseConverter, RoleMapping, SkeletonLocks,
    detect_bones, inspect_skeleton,
};
use t2a_pose::logging::{FileLogSink, JsonStderrSink, init_logging};
use t2a_pose::scene::{MemoryScene, SkeletonId};
use t2a_pose::settings::{DocumentSettings, load_document_settings, save_document_settings};

/// t2a-pose - T-pose / A-pose converter for rigged characters
#[derive(Parser)]
#[command(name = "t2a-pose")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Append log lines to <temp>/pose_converter_logs/pose_converter_log.txt
    #[arg(long, global = true)]
    log_file: bool,

    /// Write log records as JSON lines on stderr
    #[arg(long, global = true, conflicts_with = "log_file")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the skeleton's joints count and bound meshes
    Inspect {
        /// Scene document (JSON)
        scene: PathBuf,

        /// Skeleton name (default: first skeleton in the scene)
        #[arg(short, long)]
        skeleton: Option<String>,
    },

    /// Detect shoulder and upper arm joints
    Detect {
        /// Scene document (JSON)
        scene: PathBuf,

        #[arg(short, long)]
        skeleton: Option<String>,

        /// Store the detected mapping in this document settings file
        #[arg(long)]
        settings: Option<PathBuf>,
    },

    /// Rotate the arms and commit the result as the new rest pose
    Convert {
        /// Scene document (JSON)
        scene: PathBuf,

        /// Where to write the converted scene
        #[arg(short, long)]
        output: PathBuf,

        #[arg(short, long)]
        skeleton: Option<String>,

        /// Document settings providing direction, angles and mapping
        #[arg(long)]
        settings: Option<PathBuf>,

        #[arg(long, value_enum)]
        direction: Option<DirectionArg>,

        /// Shoulder rotation in degrees
        #[arg(long, allow_hyphen_values = true)]
        shoulder_angle: Option<f32>,

        /// Upper arm rotation in degrees
        #[arg(long, allow_hyphen_values = true)]
        upperarm_angle: Option<f32>,

        /// Fill unmapped roles by joint name detection
        #[arg(long)]
        detect: bool,

        #[arg(long)]
        shoulder_l: Option<String>,
        #[arg(long)]
        shoulder_r: Option<String>,
        #[arg(long)]
        upperarm_l: Option<String>,
        #[arg(long)]
        upperarm_r: Option<String>,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Commit the scene's current pose as the rest pose
    Rest {
        /// Scene document (JSON)
        scene: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        #[arg(short, long)]
        skeleton: Option<String>,

        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DirectionArg {
    TToA,
    AToT,
}

impl From<DirectionArg> for ConversionDirection {
    fn from(value: DirectionArg) -> Self {
        match value {
            DirectionArg::TToA => ConversionDirection::TToA,
            DirectionArg::AToT => ConversionDirection::AToT,
        }
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:#}");
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    if cli.log_file {
        let sink = FileLogSink::in_temp_dir().context("failed to prepare log directory")?;
        init_logging(Box::new(sink));
    } else if cli.log_json {
        init_logging(Box::new(JsonStderrSink));
    }

    match cli.command {
        Commands::Inspect { scene, skeleton } => {
            let scene_doc = load_scene(&scene)?;
            let skeleton = select_skeleton(&scene_doc, skeleton.as_deref())?;
            let summary = inspect_skeleton(&scene_doc, skeleton)?;
            println!(
                "Skeleton: {} ({} joints)",
                summary.skeleton_name, summary.joint_count
            );
            for mesh in &summary.meshes {
                println!("  {} - shape keys: {}", mesh.name, mesh.shape_key_count);
            }
        }
        Commands::Detect {
            scene,
            skeleton,
            settings,
        } => {
            let scene_doc = load_scene(&scene)?;
            let skeleton = select_skeleton(&scene_doc, skeleton.as_deref())?;
            let report = detect_bones(&scene_doc, skeleton);
            print_mapping(&report.mapping);
            println!("{}", report.message);
            if let Some(path) = settings {
                let mut document = load_or_default_settings(&path)?;
                document.set_role_mapping(&report.mapping);
                save_document_settings(&path, &document)?;
            }
        }
        Commands::Convert {
            scene,
            output,
            skeleton,
            settings,
            direction,
            shoulder_angle,
            upperarm_angle,
            detect,
            shoulder_l,
            shoulder_r,
            upperarm_l,
            upperarm_r,
            json,
        } => {
            let mut scene_doc = load_scene(&scene)?;
            let skeleton = select_skeleton(&scene_doc, skeleton.as_deref())?;

            let mut document = match &settings {
                Some(path) => load_document_settings(path)?,
                None => DocumentSettings::default(),
            };
            if let Some(direction) = direction {
                document.conversion_mode = direction.into();
            }
            if let Some(angle) = shoulder_angle {
                document.shoulder_rotation_angle = angle;
            }
            if let Some(angle) = upperarm_angle {
                document.upperarm_rotation_angle = angle;
            }

            let mut mapping = document.role_mapping();
            for (slot, value) in [
                (&mut mapping.shoulder_l, shoulder_l),
                (&mut mapping.shoulder_r, shoulder_r),
                (&mut mapping.upperarm_l, upperarm_l),
                (&mut mapping.upperarm_r, upperarm_r),
            ] {
                if let Some(value) = value {
                    *slot = value;
                }
            }
            if detect {
                let detected = detect_bones(&scene_doc, skeleton).mapping;
                for (role, joint) in detected.resolved() {
                    if mapping.get(role).is_empty() {
                        mapping.set(role, joint);
                    }
                }
            }

            let locks = SkeletonLocks::new();
            let report = PoseConverter::new(&mut scene_doc, &locks).convert_pose(
                skeleton,
                &mapping,
                document.convert_options(),
            )?;
            save_scene(&output, &scene_doc)?;
            print_report(&report, json)?;
        }
        Commands::Rest {
            scene,
            output,
            skeleton,
            json,
        } => {
            let mut scene_doc = load_scene(&scene)?;
            let skeleton = select_skeleton(&scene_doc, skeleton.as_deref())?;
            let locks = SkeletonLocks::new();
            let report = PoseConverter::new(&mut scene_doc, &locks).set_rest_pose(skeleton)?;
            save_scene(&output, &scene_doc)?;
            print_report(&report, json)?;
        }
    }

    Ok(())
}

fn load_scene(path: &Path) -> Result<MemoryScene> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read scene: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse scene JSON: {}", path.display()))
}

fn save_scene(path: &Path, scene: &MemoryScene) -> Result<()> {
    let content = serde_json::to_string_pretty(scene).context("failed to serialize scene")?;
    fs::write(path, content)
        .with_context(|| format!("failed to write scene: {}", path.display()))
}

fn load_or_default_settings(path: &Path) -> Result<DocumentSettings> {
    if path.exists() {
        load_document_settings(path)
    } else {
        Ok(DocumentSettings::default())
    }
}

fn select_skeleton(scene: &MemoryScene, name: Option<&str>) -> Result<SkeletonId> {
    match name {
        Some(name) => scene
            .find_skeleton(name)
            .ok_or_else(|| anyhow!("skeleton '{}' not found in scene", name)),
        None if !scene.skeletons.is_empty() => Ok(SkeletonId(0)),
        None => Err(anyhow!("scene contains no skeleton")),
    }
}

fn print_mapping(mapping: &RoleMapping) {
    println!("shoulder_l: {}", mapping.shoulder_l);
    println!("shoulder_r: {}", mapping.shoulder_r);
    println!("upperarm_l: {}", mapping.upperarm_l);
    println!("upperarm_r: {}", mapping.upperarm_r);
}

fn print_report(report: &ConversionReport, json: bool) -> Result<()> {
    if json {
        let content =
            serde_json::to_string_pretty(report).context("failed to serialize report")?;
        println!("{content}");
        return Ok(());
    }

    println!("Skeleton: {}", report.skeleton_name);
    for joint in &report.rotated_joints {
        println!("  {} ({}): {:+.1} deg", joint.joint, joint.role, joint.angle_deg);
    }
    for mesh in &report.meshes {
        match &mesh.error {
            None => println!("  {}: ok", mesh.mesh_name),
            Some(error) => println!("  {}: FAILED ({})", mesh.mesh_name, error),
        }
    }
    println!("{}", report.message);
    Ok(())
}
