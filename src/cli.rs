// ============================================================================
// MockupFE CLI: headless mockup rendering via command-line arguments
// ============================================================================
//
// Usage examples:
//   mockupfe --base shirt.jpg --mark logo.png --output mockup.jpg
//   mockupfe -b shirt.jpg -m "logos/*.png" --scene layout.json -o out.png
//   mockupfe -b photo.png --scene cleanup.json -o clean.png --brush 30
//
// The scene file positions marks and replays removal strokes:
//   {
//     "container": { "width": 800, "height": 600 },
//     "marks":   [ { "x": 120, "y": 80, "scale_x": 0.5, "scale_y": 0.5, "rotation": 15 } ],
//     "strokes": [ { "points": [ { "x": 300, "y": 310 }, { "x": 340, "y": 318 } ], "brush": 25 } ]
//   }
// Coordinates are display-space relative to the container. Without a
// container the image is shown 1:1, so display and native pixels coincide.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use serde::Deserialize;

use crate::error::{EditError, EditResult};
use crate::io::{SaveFormat, load_image_file};
use crate::ops::transform::MarkTransform;
use crate::project::EditorSession;
use crate::settings::EngineSettings;
use crate::viewport::Point;
use crate::{log_err, log_warn};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// MockupFE headless mockup renderer.
#[derive(Parser, Debug)]
#[command(
    name = "mockupfe",
    about = "MockupFE headless mockup renderer",
    long_about = "Place overlay images on a base image, heal painted regions and export\n\
                  a flattened mockup without opening an editor.\n\n\
                  Example:\n  \
                  mockupfe --base shirt.jpg --mark logo.png --output mockup.jpg\n  \
                  mockupfe -b photo.png --scene cleanup.json -o clean.png"
)]
pub struct CliArgs {
    /// Base image the marks are placed on.
    #[arg(short, long, value_name = "FILE")]
    pub base: PathBuf,

    /// Overlay image(s). Glob patterns accepted (e.g. "logos/*.png").
    /// Each overlay has its uniform background keyed out.
    #[arg(short, long, num_args = 1..)]
    pub mark: Vec<String>,

    /// JSON scene with container size, mark transforms and removal strokes.
    #[arg(long, value_name = "SCENE.json")]
    pub scene: Option<PathBuf>,

    /// Output file path.
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,

    /// Output format: png, jpeg, bmp, tga.
    /// When omitted, the format is inferred from --output's extension, defaulting to png.
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// JPEG quality (1–100). Defaults to the settings file value (90).
    #[arg(short, long, value_name = "1-100")]
    pub quality: Option<u8>,

    /// Removal brush width in display px (5–50) for strokes without their own.
    #[arg(long, value_name = "PX")]
    pub brush: Option<u32>,

    /// Settings file to use instead of the per-user one.
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Print per-step information.
    #[arg(short, long)]
    pub verbose: bool,
}

// ============================================================================
// Scene file
// ============================================================================

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Scene {
    pub container: Option<SceneContainer>,
    /// Applied in order to the marks that loaded successfully.
    pub marks: Vec<MarkTransform>,
    pub strokes: Vec<SceneStroke>,
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct SceneContainer {
    pub width: f32,
    pub height: f32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SceneStroke {
    pub points: Vec<Point>,
    #[serde(default)]
    pub brush: Option<u32>,
}

impl Scene {
    pub fn load(path: &Path) -> EditResult<Scene> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the headless pipeline and return an OS exit code.
/// `0` = mockup written, `1` = failure.
pub fn run(args: CliArgs) -> ExitCode {
    let start = Instant::now();
    match run_pipeline(&args) {
        Ok(()) => {
            if args.verbose {
                println!(
                    "  → {} ({:.0}ms)",
                    args.output.display(),
                    start.elapsed().as_secs_f64() * 1000.0
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            log_err!("CLI run failed: {}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_pipeline(args: &CliArgs) -> EditResult<()> {
    // -- Step 1: Settings & scene ------------------------------------------
    let mut settings = match &args.settings {
        Some(path) => EngineSettings::load_from(path),
        None => EngineSettings::load(),
    };
    if let Some(brush) = args.brush {
        settings.brush_size = brush;
    }
    if let Some(q) = args.quality {
        settings.jpeg_quality = q.clamp(1, 100);
    }
    let scene = match &args.scene {
        Some(path) => Scene::load(path)?,
        None => Scene::default(),
    };

    // -- Step 2: Base image -----------------------------------------------
    let base = load_image_file(&args.base)?;
    let (cw, ch) = match scene.container {
        Some(c) => (c.width, c.height),
        None => (base.width() as f32, base.height() as f32),
    };
    let mut session = EditorSession::new(base, cw, ch, &settings)?;
    if args.verbose {
        let rect = session.display_rect();
        println!("[base] {} shown at {:.0}x{:.0}", args.base.display(), rect.width, rect.height);
    }

    // -- Step 3: Marks ------------------------------------------------------
    let mark_paths = resolve_inputs(&args.mark);
    if !args.mark.is_empty() && mark_paths.is_empty() {
        return Err(EditError::Io("no mark files matched the given pattern(s)".to_string()));
    }
    let mut overlays = Vec::with_capacity(mark_paths.len());
    for path in &mark_paths {
        overlays.push(std::fs::read(path)?);
    }
    let added: Vec<_> = session
        .add_overlays(overlays)
        .into_iter()
        .zip(&mark_paths)
        .filter_map(|(result, path)| match result {
            Ok(id) => Some(id),
            Err(e) => {
                eprintln!("warning: skipping mark '{}': {}", path.display(), e);
                None
            }
        })
        .collect();

    for (id, transform) in added.iter().zip(&scene.marks) {
        session.transform_mark(*id, *transform)?;
    }
    if scene.marks.len() > added.len() {
        log_warn!("Scene has {} mark transforms for {} marks", scene.marks.len(), added.len());
    }
    if args.verbose {
        println!("[marks] {} placed", added.len());
    }

    // -- Step 4: Strokes & healing ------------------------------------------
    for stroke in &scene.strokes {
        let Some((first, rest)) = stroke.points.split_first() else { continue };
        if let Some(brush) = stroke.brush {
            session.set_brush_size(brush);
        }
        session.pointer_down(*first);
        for p in rest {
            session.pointer_move(*p);
        }
        session.pointer_up();
    }

    if !session.strokes().is_empty() {
        if let Some(config) = settings.provider_config() {
            log_err!("Provider endpoint {} configured but this build has no network transport", config.endpoint);
            return Err(EditError::ProviderUnavailable("no network transport in this build".to_string()));
        }
        match session.heal() {
            Ok(summary) => {
                if args.verbose {
                    let r = summary.region;
                    println!("[heal] {}x{} at ({}, {}) via {:?}", r.width, r.height, r.left, r.top, summary.path);
                }
            }
            Err(EditError::EmptyRegion) => {
                eprintln!("warning: strokes do not touch the image, nothing healed");
            }
            Err(e) => return Err(e),
        }
    }

    // -- Step 5: Export -------------------------------------------------------
    let format = parse_format(args.format.as_deref(), &args.output);
    session.export_to(&args.output, format, settings.jpeg_quality)
}

// ============================================================================
// Helpers
// ============================================================================

/// Turn the `--mark` arguments into overlay files, in argument order.
///
/// Existing paths are taken as-is, anything else is expanded as a glob. An
/// overlay named twice is placed once, at its first position, so the stagger
/// index of every mark matches what the user listed.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut overlays: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let literal = Path::new(pattern);
        if literal.exists() {
            push_unique(&mut overlays, literal.to_path_buf());
            continue;
        }

        let entries = match glob::glob(pattern) {
            Ok(entries) => entries,
            Err(e) => {
                log_warn!("Mark pattern '{}' is not a valid glob: {}", pattern, e);
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
                continue;
            }
        };
        let before = overlays.len();
        for entry in entries.flatten() {
            push_unique(&mut overlays, entry);
        }
        if overlays.len() == before {
            log_warn!("Mark pattern '{}' matched no new files", pattern);
            eprintln!("warning: pattern '{}' matched no new files.", pattern);
        }
    }

    overlays
}

fn push_unique(list: &mut Vec<PathBuf>, path: PathBuf) {
    if !list.contains(&path) {
        list.push(path);
    }
}

/// `--format` wins; otherwise infer from the output extension (PNG default).
fn parse_format(format_arg: Option<&str>, output: &Path) -> SaveFormat {
    if let Some(name) = format_arg {
        match SaveFormat::from_name(name) {
            Some(f) => return f,
            None => eprintln!("warning: unknown format '{}', inferring from output path.", name),
        }
    }
    SaveFormat::from_path(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::PixelBuffer;
    use crate::io::{encode_and_write, encode_png};

    fn args(list: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(std::iter::once("mockupfe").chain(list.iter().copied())).unwrap()
    }

    #[test]
    fn format_flag_beats_extension() {
        assert_eq!(parse_format(Some("bmp"), Path::new("x.png")), SaveFormat::Bmp);
        assert_eq!(parse_format(Some("gif"), Path::new("x.jpg")), SaveFormat::Jpeg);
        assert_eq!(parse_format(None, Path::new("x")), SaveFormat::Png);
    }

    #[test]
    fn globs_expand_and_dedupe() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.png", "b.png", "c.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let literal = dir.path().join("a.png").to_string_lossy().into_owned();
        let pattern = dir.path().join("*.png").to_string_lossy().into_owned();

        let found = resolve_inputs(&[literal, pattern]);
        assert_eq!(found.len(), 2);
        assert!(found[0].ends_with("a.png"));
    }

    #[test]
    fn scene_defaults_fill_gaps() {
        let scene: Scene = serde_json::from_str(r#"{ "marks": [ { "x": 1, "y": 2 } ] }"#).unwrap();
        assert!(scene.container.is_none());
        assert_eq!(scene.marks[0].scale_x, 1.0);
        assert!(scene.strokes.is_empty());
    }

    #[test]
    fn end_to_end_render() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base.png");
        let mut photo = PixelBuffer::filled(64, 64, [0, 0, 255, 255]);
        photo.set_pixel(10, 10, [255, 255, 0, 255]);
        encode_and_write(&photo, &base, SaveFormat::Png, 90).unwrap();

        let logo = dir.path().join("logo.png");
        let mut art = PixelBuffer::filled(8, 8, [255, 255, 255, 255]);
        art.set_pixel(4, 4, [0, 0, 0, 255]);
        std::fs::write(&logo, encode_png(&art).unwrap()).unwrap();

        let scene = dir.path().join("scene.json");
        std::fs::write(
            &scene,
            r#"{ "marks": [ { "x": 40, "y": 40, "scale_x": 0.1, "scale_y": 0.1 } ],
                 "strokes": [ { "points": [ { "x": 10.5, "y": 10.5 } ], "brush": 6 } ] }"#,
        )
        .unwrap();

        let settings = dir.path().join("settings.cfg");
        let out = dir.path().join("out.png");
        let code = run(args(&[
            "--base", base.to_str().unwrap(),
            "--mark", logo.to_str().unwrap(),
            "--scene", scene.to_str().unwrap(),
            "--settings", settings.to_str().unwrap(),
            "--output", out.to_str().unwrap(),
        ]));

        assert_eq!(code, ExitCode::SUCCESS);
        let result = load_image_file(&out).unwrap();
        assert_eq!(result.pixel(10, 10), [0, 0, 255, 255]);
        assert_eq!(result.pixel(40, 40), [0, 0, 255, 255]); // keyed background
        assert_ne!(result.pixel(47, 47), [0, 0, 255, 255]);
    }

    #[test]
    fn configured_provider_is_not_replaced_by_local_healing() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base.png");
        let mut photo = PixelBuffer::filled(32, 32, [0, 0, 255, 255]);
        photo.set_pixel(10, 10, [255, 255, 0, 255]);
        encode_and_write(&photo, &base, SaveFormat::Png, 90).unwrap();

        let scene = dir.path().join("scene.json");
        std::fs::write(&scene, r#"{ "strokes": [ { "points": [ { "x": 10.5, "y": 10.5 } ], "brush": 6 } ] }"#)
            .unwrap();

        let settings = dir.path().join("settings.cfg");
        std::fs::write(
            &settings,
            "provider_endpoint=https://heal.invalid/inpaint\nprovider_api_key=ak\nprovider_secret_key=sk\n",
        )
        .unwrap();

        let out = dir.path().join("out.png");
        let code = run(args(&[
            "--base", base.to_str().unwrap(),
            "--scene", scene.to_str().unwrap(),
            "--settings", settings.to_str().unwrap(),
            "--output", out.to_str().unwrap(),
        ]));

        assert_eq!(code, ExitCode::FAILURE);
        assert!(!out.exists());
    }

    #[test]
    fn configured_provider_without_strokes_still_exports() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base.png");
        encode_and_write(&PixelBuffer::filled(8, 8, [0, 0, 255, 255]), &base, SaveFormat::Png, 90).unwrap();
        let settings = dir.path().join("settings.cfg");
        std::fs::write(&settings, "provider_endpoint=https://heal.invalid/inpaint\n").unwrap();

        let out = dir.path().join("out.png");
        let code = run(args(&[
            "--base", base.to_str().unwrap(),
            "--settings", settings.to_str().unwrap(),
            "--output", out.to_str().unwrap(),
        ]));

        assert_eq!(code, ExitCode::SUCCESS);
        assert!(out.exists());
    }

    #[test]
    fn missing_base_fails() {
        let dir = tempfile::tempdir().unwrap();
        let code = run(args(&[
            "--base", dir.path().join("nope.png").to_str().unwrap(),
            "--settings", dir.path().join("s.cfg").to_str().unwrap(),
            "--output", dir.path().join("o.png").to_str().unwrap(),
        ]));
        assert_eq!(code, ExitCode::FAILURE);
    }
}
