use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use photomeasure_core::{
    Calibration, EngineConfig, GuideOrientation, ImageProcessor, ImageTransform, Measurement,
    MeasurementId, MeasurementKind, Point, ProjectCodec, ProjectSession, Shape, PROJECT_EXTENSION,
};
use photomeasure_imaging::ImageCrateProcessor;
use photomeasure_storage::Storage;
use serde::Serialize;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "photomeasure")]
#[command(about = "Measure photographs from the command line")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create a project from an image.
    New {
        #[arg(value_name = "IMAGE")]
        image: PathBuf,
        /// Project file to write; defaults to the image path with a .pmproj extension.
        #[arg(short, long, value_name = "PROJECT")]
        output: Option<PathBuf>,
    },
    /// Print machine-readable project metadata.
    Info {
        #[arg(value_name = "PROJECT")]
        project: PathBuf,
    },
    /// Set the pixel-to-real-world scale.
    Calibrate {
        #[arg(value_name = "PROJECT")]
        project: PathBuf,
        /// Real-world units per pixel.
        #[arg(long, conflicts_with = "reference", required_unless_present = "reference")]
        scale: Option<f64>,
        /// Reference segment of known length.
        #[arg(
            long,
            value_name = "X0,Y0,X1,Y1",
            value_parser = parse_segment,
            allow_hyphen_values = true,
            requires = "length"
        )]
        reference: Option<Segment>,
        /// Real length of the reference segment.
        #[arg(long)]
        length: Option<f64>,
        #[arg(long)]
        units: String,
    },
    /// Add a measurement.
    Add {
        #[arg(value_name = "PROJECT")]
        project: PathBuf,
        #[arg(
            value_name = "KIND",
            required_unless_present_any = ["horizontal", "vertical"],
            conflicts_with_all = ["horizontal", "vertical"]
        )]
        kind: Option<MeasurementKind>,
        #[arg(value_name = "X,Y", value_parser = parse_point, allow_hyphen_values = true)]
        points: Vec<Point>,
        /// Close a polygon after its last vertex.
        #[arg(long)]
        closed: bool,
        /// Add a horizontal guide line at this Y.
        #[arg(long, value_name = "Y", conflicts_with = "vertical", allow_hyphen_values = true)]
        horizontal: Option<f64>,
        /// Add a vertical guide line at this X.
        #[arg(long, value_name = "X", allow_hyphen_values = true)]
        vertical: Option<f64>,
    },
    /// List measurements with their calibrated values.
    List {
        #[arg(value_name = "PROJECT")]
        project: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Remove a measurement by id.
    Remove {
        #[arg(value_name = "PROJECT")]
        project: PathBuf,
        #[arg(value_name = "ID")]
        id: MeasurementId,
    },
    /// Rotate, flip or crop the project image.
    Transform {
        #[arg(value_name = "PROJECT")]
        project: PathBuf,
        /// rotate90, rotate180, rotate270, flip-horizontal, flip-vertical or crop=X,Y,W,H
        #[arg(value_name = "OP", value_parser = parse_transform)]
        op: ImageTransform,
    },
    /// Change the overlay grid spacing.
    Grid {
        #[arg(value_name = "PROJECT")]
        project: PathBuf,
        #[arg(value_name = "PIXELS")]
        spacing: f64,
    },
    /// List recently saved projects.
    Recent,
    /// Print CLI version.
    Version,
}

#[derive(Debug, Clone, Copy)]
struct Segment(Point, Point);

#[derive(Debug, Serialize)]
struct InfoOutput {
    calibration: CalibrationOutput,
    created_at: String,
    format_version: u32,
    grid_spacing_px: f64,
    image: ImageOutput,
    measurements: BTreeMap<&'static str, usize>,
    modified_at: String,
    name: String,
    original_size: SizeOutput,
    path: String,
    project_id: String,
}

#[derive(Debug, Serialize)]
struct CalibrationOutput {
    scale_factor: f64,
    units: String,
}

#[derive(Debug, Serialize)]
struct ImageOutput {
    file_name: Option<String>,
    height: u32,
    width: u32,
}

#[derive(Debug, Serialize)]
struct SizeOutput {
    height: u32,
    width: u32,
}

#[derive(Debug, Serialize)]
struct MeasurementOutput {
    display_text: String,
    id: String,
    kind: &'static str,
    points: Vec<Point>,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::New { image, output } => run_new(&image, output),
        Commands::Info { project } => run_info(&project),
        Commands::Calibrate { project, scale, reference, length, units } => {
            run_calibrate(&project, scale, reference.zip(length), &units)
        }
        Commands::Add { project, kind, points, closed, horizontal, vertical } => {
            let measurement = match (kind, horizontal, vertical) {
                (_, Some(y), _) => Measurement::guide_line(GuideOrientation::Horizontal, y),
                (_, _, Some(x)) => Measurement::guide_line(GuideOrientation::Vertical, x),
                (Some(kind), None, None) => build_measurement(kind, &points, closed)?,
                (None, None, None) => anyhow::bail!("a measurement kind is required"),
            };
            run_add(&project, measurement)
        }
        Commands::List { project, json } => run_list(&project, json),
        Commands::Remove { project, id } => run_remove(&project, id),
        Commands::Transform { project, op } => run_transform(&project, op),
        Commands::Grid { project, spacing } => run_grid(&project, spacing),
        Commands::Recent => run_recent(),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Per-invocation environment: user data plus a scratch directory that
/// holds images extracted from project files
struct Workspace {
    storage: Storage,
    config: EngineConfig,
    scratch: tempfile::TempDir,
}

impl Workspace {
    fn new() -> Result<Self> {
        let storage =
            Storage::from_default_project().context("failed to resolve data directory")?;
        let config = storage.load_settings().context("failed to load settings")?;
        let scratch = tempfile::tempdir().context("failed to create scratch directory")?;
        Ok(Self { storage, config, scratch })
    }

    fn codec(&self) -> ProjectCodec {
        ProjectCodec::new(self.scratch.path())
    }

    fn processor(&self) -> ImageCrateProcessor {
        ImageCrateProcessor::new(self.scratch.path())
    }

    fn open(&self, project: &Path) -> Result<ProjectSession> {
        ensure_file_exists(project)?;
        ProjectSession::open(
            project,
            self.config.clone(),
            self.codec(),
            Box::new(self.storage.recent_projects()),
        )
        .with_context(|| format!("failed to open project {}", project.display()))
    }

    fn save(&self, session: &mut ProjectSession, project: &Path) -> Result<()> {
        session
            .save(project)
            .with_context(|| format!("failed to save project {}", project.display()))?;
        tracing::info!(path = %project.display(), "project saved");
        Ok(())
    }
}

fn run_new(image: &Path, output: Option<PathBuf>) -> Result<()> {
    ensure_file_exists(image)?;
    let workspace = Workspace::new()?;

    let image_ref = workspace
        .processor()
        .load(image)
        .with_context(|| format!("failed to read image {}", image.display()))?;
    let output = output.unwrap_or_else(|| image.with_extension(PROJECT_EXTENSION));

    let mut session =
        ProjectSession::new_from_image(image_ref, workspace.config.clone(), workspace.codec())
            .with_recent_projects(Box::new(workspace.storage.recent_projects()));
    workspace.save(&mut session, &output)?;

    println!("{}", output.display());
    Ok(())
}

fn run_info(project: &Path) -> Result<()> {
    let workspace = Workspace::new()?;
    let session = workspace.open(project)?;

    let metadata = session.metadata();
    let calibration = session.calibration();
    let image = session.image();
    let measurements = MeasurementKind::ALL
        .into_iter()
        .map(|kind| (kind.name(), session.measurements().of_kind(kind).len()))
        .filter(|(_, count)| *count > 0)
        .collect();

    let payload = InfoOutput {
        calibration: CalibrationOutput {
            scale_factor: calibration.scale_factor(),
            units: calibration.units().to_string(),
        },
        created_at: metadata.created_at.to_rfc3339(),
        format_version: metadata.format_version,
        grid_spacing_px: session.grid().spacing_px(),
        image: ImageOutput {
            file_name: metadata.original_file_name.clone(),
            height: image.size.height,
            width: image.size.width,
        },
        measurements,
        modified_at: metadata.modified_at.to_rfc3339(),
        name: metadata.display_name(),
        original_size: SizeOutput {
            height: metadata.original_image_size.height,
            width: metadata.original_image_size.width,
        },
        path: project.display().to_string(),
        project_id: metadata.project_id.to_string(),
    };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");
    Ok(())
}

fn run_calibrate(
    project: &Path,
    scale: Option<f64>,
    reference: Option<(Segment, f64)>,
    units: &str,
) -> Result<()> {
    let workspace = Workspace::new()?;
    let mut session = workspace.open(project)?;

    let calibration = match (scale, reference) {
        (Some(scale), _) => Calibration::new(scale, units).context("invalid calibration")?,
        (None, Some((Segment(p0, p1), length))) => {
            Calibration::from_reference(p0, p1, length, units).context("invalid calibration")?
        }
        (None, None) => anyhow::bail!("either --scale or --reference with --length is required"),
    };
    let updated = session.set_calibration(calibration.clone());
    workspace.save(&mut session, project)?;

    println!(
        "{} {} per px, {updated} measurement(s) updated",
        calibration.scale_factor(),
        calibration.units()
    );
    Ok(())
}

fn build_measurement(kind: MeasurementKind, points: &[Point], closed: bool) -> Result<Measurement> {
    if kind == MeasurementKind::GuideLine {
        anyhow::bail!("guide lines are added with --horizontal or --vertical");
    }
    if closed {
        if kind != MeasurementKind::Polygon {
            anyhow::bail!("--closed only applies to polygons");
        }
        if points.len() < 3 {
            anyhow::bail!("a closed polygon needs at least 3 vertices, got {}", points.len());
        }
        return Ok(Measurement::from_shape(Shape::Polygon {
            vertices: points.to_vec(),
            is_closed: true,
        }));
    }
    Measurement::create(kind, points).context("failed to add measurement")
}

fn run_add(project: &Path, measurement: Measurement) -> Result<()> {
    let workspace = Workspace::new()?;
    let mut session = workspace.open(project)?;

    let measurement = measurement.with_style(session.config().default_style);
    let id = session.add_measurement(measurement).context("failed to add measurement")?;
    workspace.save(&mut session, project)?;

    println!("{id}");
    Ok(())
}

fn run_list(project: &Path, json: bool) -> Result<()> {
    let workspace = Workspace::new()?;
    let session = workspace.open(project)?;

    if json {
        let rows: Vec<_> = session
            .measurements()
            .iter()
            .map(|m| MeasurementOutput {
                display_text: m.display_text().to_string(),
                id: m.id().to_string(),
                kind: m.kind().name(),
                points: m.shape().points(),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for m in session.measurements().iter() {
        println!("{}  {}  {}", m.id(), m.kind(), m.display_text());
    }
    Ok(())
}

fn run_remove(project: &Path, id: MeasurementId) -> Result<()> {
    let workspace = Workspace::new()?;
    let mut session = workspace.open(project)?;

    let removed = session.remove_measurement(id).context("failed to remove measurement")?;
    workspace.save(&mut session, project)?;

    println!("removed {} {}", removed.kind(), removed.id());
    Ok(())
}

fn run_transform(project: &Path, op: ImageTransform) -> Result<()> {
    let workspace = Workspace::new()?;
    let mut session = workspace.open(project)?;

    session
        .transform_image(&workspace.processor(), op)
        .context("failed to transform image")?;
    workspace.save(&mut session, project)?;

    let size = session.image().size;
    println!("{}x{}", size.width, size.height);
    Ok(())
}

fn run_grid(project: &Path, spacing: f64) -> Result<()> {
    let workspace = Workspace::new()?;
    let mut session = workspace.open(project)?;

    session.resize_grid(spacing).context("failed to resize grid")?;
    workspace.save(&mut session, project)?;
    Ok(())
}

fn run_recent() -> Result<()> {
    let workspace = Workspace::new()?;
    for entry in workspace.storage.recent_projects().entries() {
        println!("{}  {}  {}", entry.last_opened.to_rfc3339(), entry.name, entry.path.display());
    }
    Ok(())
}

fn ensure_file_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}

fn parse_numbers<const N: usize>(value: &str) -> Result<[f64; N], String> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    if parts.len() != N {
        return Err(format!("expected {N} comma-separated numbers, got `{value}`"));
    }
    let mut numbers = [0.0; N];
    for (slot, part) in numbers.iter_mut().zip(parts) {
        *slot = part.parse::<f64>().map_err(|_| format!("`{part}` is not a number"))?;
        if !slot.is_finite() {
            return Err(format!("`{part}` is not a finite number"));
        }
    }
    Ok(numbers)
}

fn parse_point(value: &str) -> Result<Point, String> {
    let [x, y] = parse_numbers::<2>(value)?;
    Ok(Point::new(x, y))
}

fn parse_segment(value: &str) -> Result<Segment, String> {
    let [x0, y0, x1, y1] = parse_numbers::<4>(value)?;
    Ok(Segment(Point::new(x0, y0), Point::new(x1, y1)))
}

fn parse_transform(value: &str) -> Result<ImageTransform, String> {
    if let Some(rect) = value.strip_prefix("crop=") {
        let [x, y, width, height] = parse_numbers::<4>(rect)?;
        if [x, y, width, height].iter().any(|v| *v < 0.0 || v.fract() != 0.0) {
            return Err("crop values must be non-negative whole pixels".to_string());
        }
        return Ok(ImageTransform::Crop {
            x: x as u32,
            y: y as u32,
            width: width as u32,
            height: height as u32,
        });
    }
    match value {
        "rotate90" => Ok(ImageTransform::Rotate90),
        "rotate180" => Ok(ImageTransform::Rotate180),
        "rotate270" => Ok(ImageTransform::Rotate270),
        "flip-horizontal" => Ok(ImageTransform::FlipHorizontal),
        "flip-vertical" => Ok(ImageTransform::FlipVertical),
        other => Err(format!("unknown transform: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_point_accepts_negatives() {
        assert_eq!(parse_point("-3.5, 4").unwrap(), Point::new(-3.5, 4.0));
        assert!(parse_point("1").is_err());
        assert!(parse_point("1,x").is_err());
        assert!(parse_point("1,inf").is_err());
    }

    #[test]
    fn test_parse_transform() {
        assert_eq!(parse_transform("rotate270").unwrap(), ImageTransform::Rotate270);
        assert_eq!(
            parse_transform("crop=1,2,30,40").unwrap(),
            ImageTransform::Crop { x: 1, y: 2, width: 30, height: 40 }
        );
        assert!(parse_transform("crop=1.5,2,30,40").is_err());
        assert!(parse_transform("skew").is_err());
    }

    #[test]
    fn test_closed_polygon_needs_three_vertices() {
        let points = [Point::new(0.0, 0.0), Point::new(10.0, 0.0)];
        assert!(build_measurement(MeasurementKind::Polygon, &points, true).is_err());
        assert!(build_measurement(MeasurementKind::Distance, &points, true).is_err());
        assert!(build_measurement(MeasurementKind::GuideLine, &points, false).is_err());
        assert!(build_measurement(MeasurementKind::Distance, &points, false).is_ok());
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
