//! The drawing pipeline: program generation, validation, and rendering.
//!
//! A parsed intent goes to the provider registry first (the remote
//! generation endpoint when enabled, then the local template composer);
//! each candidate program is screened by the generator-boundary validator
//! and the first acceptable one wins. When every provider strikes out the
//! engine falls back to a minimal built-in program, so command processing
//! always produces something drawable. The renderer then parses the
//! program and interprets it frame by frame against an in-memory surface;
//! generated code never runs as code, it only reaches the whitelisted
//! drawing primitives below.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use image::{Rgba, RgbaImage};
use serde_json::Value;

use doodle_contracts::config::PipelineConfig;
use doodle_contracts::intent::{self, Animation, ParsedIntent, Shape};
use doodle_contracts::program::validate::{rejection_reason, render_rejection_reason};
use doodle_contracts::program::{Arg, Call, EvalEnv, SketchProgram};
use doodle_contracts::ratelimit::{FixedWindowLimiter, LimitDecision};
use doodle_contracts::style;
use doodle_contracts::trace::{TracePayload, TraceWriter};

// ---------------------------------------------------------------------------
// Generation providers

/// One generation request: the raw command plus its parsed intent and the
/// target canvas, serialized for the remote endpoint.
#[derive(Debug, Clone)]
pub struct SketchRequest {
    pub command: String,
    pub intent: ParsedIntent,
    pub canvas_width: u32,
    pub canvas_height: u32,
}

impl SketchRequest {
    pub fn payload(&self) -> Value {
        serde_json::json!({
            "command": self.command,
            "parsed": self.intent,
            "context": {
                "canvas": { "width": self.canvas_width, "height": self.canvas_height },
                "style": "modern",
                "complexity": "simple",
            }
        })
    }
}

pub trait SketchProvider {
    fn name(&self) -> &str;
    fn generate(&self, request: &SketchRequest) -> Result<String>;
}

/// Providers keyed by name; consulted in the fixed generation order.
#[derive(Default)]
pub struct SketchProviderRegistry {
    providers: BTreeMap<String, Box<dyn SketchProvider>>,
}

impl SketchProviderRegistry {
    pub fn register(&mut self, provider: Box<dyn SketchProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get(&self, name: &str) -> Option<&dyn SketchProvider> {
        self.providers.get(name).map(Box::as_ref)
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }
}

const GENERATION_ORDER: &[&str] = &["remote", "template"];

/// Talks to the external code-generation service over HTTP. The response
/// is either a JSON object carrying a `code` field or the raw program
/// text.
pub struct RemoteSketchProvider {
    endpoint: String,
    http: reqwest::blocking::Client,
}

impl RemoteSketchProvider {
    pub fn new(endpoint: impl Into<String>, timeout_ms: u64) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .context("building generation http client")?;
        Ok(Self {
            endpoint: endpoint.into(),
            http,
        })
    }
}

impl SketchProvider for RemoteSketchProvider {
    fn name(&self) -> &str {
        "remote"
    }

    fn generate(&self, request: &SketchRequest) -> Result<String> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&request.payload())
            .send()
            .with_context(|| format!("posting to {}", self.endpoint))?;
        let status = response.status();
        if !status.is_success() {
            bail!("generation endpoint returned {status}");
        }
        let body = response.text().context("reading generation response")?;
        if let Ok(value) = serde_json::from_str::<Value>(&body) {
            if let Some(code) = value.get("code").and_then(Value::as_str) {
                return Ok(code.to_string());
            }
        }
        if body.trim().is_empty() {
            bail!("generation endpoint returned an empty body");
        }
        Ok(body)
    }
}

/// Deterministic local composer; always available and never fails.
pub struct TemplateSketchProvider;

impl SketchProvider for TemplateSketchProvider {
    fn name(&self) -> &str {
        "template"
    }

    fn generate(&self, request: &SketchRequest) -> Result<String> {
        Ok(compose_program(&request.intent))
    }
}

// ---------------------------------------------------------------------------
// Program composition

fn num(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e9 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

fn shape_calls(shape: Shape, x: f64, y: f64, size: f64) -> String {
    let half = size / 2.0;
    match shape {
        Shape::Circle => format!(
            "  ellipse({}, {}, {}, {});\n",
            num(x),
            num(y),
            num(size),
            num(size)
        ),
        Shape::Square => format!(
            "  rectMode(CENTER);\n  rect({}, {}, {}, {});\n",
            num(x),
            num(y),
            num(size),
            num(size)
        ),
        Shape::Rectangle => format!(
            "  rectMode(CENTER);\n  rect({}, {}, {}, {});\n",
            num(x),
            num(y),
            num(size),
            num(size * 0.6)
        ),
        Shape::Triangle => format!(
            "  triangle({}, {}, {}, {}, {}, {});\n",
            num(x),
            num(y - half),
            num(x - half),
            num(y + half),
            num(x + half),
            num(y + half)
        ),
        Shape::Line => format!(
            "  strokeWeight(5);\n  line({}, {}, {}, {});\n",
            num(x - half),
            num(y),
            num(x + half),
            num(y)
        ),
    }
}

/// Compose a full program from an intent using the shared style tables.
///
/// A rotating shape is drawn once at the anchor inside a
/// translate/rotate transform; multiple shapes spread horizontally
/// around the anchor with a fixed 20px gap.
pub fn compose_program(intent: &ParsedIntent) -> String {
    let [r, g, b] = style::rgb(intent.color);
    let size = style::size_pixels(intent.size);
    let (x, y) = style::anchor_point(intent.position);

    let mut draw = String::new();
    draw.push_str("  background(240, 240, 240);\n");
    draw.push_str(&format!("  fill({r}, {g}, {b});\n"));
    draw.push_str("  stroke(0);\n");
    draw.push_str("  strokeWeight(2);\n");
    match intent.animation {
        Some(Animation::Rotate) => {
            draw.push_str("  \n  push();\n");
            draw.push_str(&format!("  translate({}, {});\n", num(x), num(y)));
            draw.push_str("  rotate(frameCount * 0.05);\n");
            draw.push_str(&shape_calls(intent.shape, 0.0, 0.0, size));
            draw.push_str("  pop();\n");
        }
        _ if intent.count > 1 => {
            for i in 0..intent.count {
                let offset =
                    (i as f64 - (intent.count as f64 - 1.0) / 2.0) * (size + 20.0);
                draw.push_str(&shape_calls(intent.shape, x + offset, y, size));
            }
        }
        _ => draw.push_str(&shape_calls(intent.shape, x, y, size)),
    }

    format!(
        "function setup() {{\n  createCanvas({}, {});\n}}\n\nfunction draw() {{\n{draw}}}\n",
        style::CANVAS_WIDTH,
        style::CANVAS_HEIGHT
    )
}

/// Minimal last-resort program; used when every provider fails or is
/// rejected by validation. Never fails and always validates.
pub fn fallback_program(intent: &ParsedIntent) -> String {
    let [r, g, b] = style::rgb(intent.color);
    let size = num(style::size_pixels(intent.size));
    if intent.shape == Shape::Circle && intent.animation != Some(Animation::Rotate) {
        return format!(
            "function setup() {{\n  createCanvas(800, 600);\n}}\n\n\
             function draw() {{\n  background(240, 240, 240);\n  fill({r}, {g}, {b});\n  ellipse(400, 300, {size}, {size});\n}}\n"
        );
    }
    if intent.animation == Some(Animation::Rotate) {
        return format!(
            "function setup() {{\n  createCanvas(800, 600);\n}}\n\n\
             function draw() {{\n  background(240, 240, 240);\n  fill({r}, {g}, {b});\n  push();\n  translate(400, 300);\n  rotate(frameCount * 0.05);\n  rectMode(CENTER);\n  rect(0, 0, {size}, {size});\n  pop();\n}}\n"
        );
    }
    format!(
        "function setup() {{\n  createCanvas(800, 600);\n}}\n\n\
         function draw() {{\n  background(240, 240, 240);\n  fill({r}, {g}, {b});\n  stroke(0);\n  strokeWeight(2);\n  ellipse(400, 300, {size}, {size});\n}}\n"
    )
}

// ---------------------------------------------------------------------------
// Drawing surface

/// Row-major affine matrix in canvas convention:
/// `x' = a*x + c*y + e`, `y' = b*x + d*y + f`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Transform([f64; 6]);

impl Transform {
    const IDENTITY: Transform = Transform([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn translate(&mut self, tx: f64, ty: f64) {
        let [a, b, c, d, e, f] = self.0;
        self.0 = [a, b, c, d, a * tx + c * ty + e, b * tx + d * ty + f];
    }

    fn rotate(&mut self, angle: f64) {
        let (sin, cos) = angle.sin_cos();
        let [a, b, c, d, e, f] = self.0;
        self.0 = [
            a * cos + c * sin,
            b * cos + d * sin,
            -a * sin + c * cos,
            -b * sin + d * cos,
            e,
            f,
        ];
    }

    fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let [a, b, c, d, e, f] = self.0;
        (a * x + c * y + e, b * x + d * y + f)
    }

    fn inverse(&self) -> Option<Transform> {
        let [a, b, c, d, e, f] = self.0;
        let det = a * d - b * c;
        if det.abs() < 1e-12 {
            return None;
        }
        Some(Transform([
            d / det,
            -b / det,
            -c / det,
            a / det,
            (c * f - d * e) / det,
            (b * e - a * f) / det,
        ]))
    }
}

#[derive(Debug, Clone, Copy)]
struct SurfaceState {
    transform: Transform,
    fill: Option<Rgba<u8>>,
    stroke: Option<Rgba<u8>>,
    stroke_weight: f64,
    rect_from_center: bool,
}

impl Default for SurfaceState {
    fn default() -> Self {
        Self {
            transform: Transform::IDENTITY,
            fill: Some(Rgba([255, 255, 255, 255])),
            stroke: Some(Rgba([0, 0, 0, 255])),
            stroke_weight: 1.0,
            rect_from_center: false,
        }
    }
}

/// Shapes in the local (pre-transform) coordinate frame. Transforms here
/// are rigid (translate and rotate only), so distances measured locally
/// hold in device space too.
enum LocalShape {
    Ellipse { cx: f64, cy: f64, rx: f64, ry: f64 },
    Rect { x0: f64, y0: f64, x1: f64, y1: f64 },
    Triangle { points: [(f64, f64); 3] },
    Line { a: (f64, f64), b: (f64, f64) },
    Point { at: (f64, f64) },
}

impl LocalShape {
    fn bbox(&self) -> (f64, f64, f64, f64) {
        match self {
            LocalShape::Ellipse { cx, cy, rx, ry } => (cx - rx, cy - ry, cx + rx, cy + ry),
            LocalShape::Rect { x0, y0, x1, y1 } => (*x0, *y0, *x1, *y1),
            LocalShape::Triangle { points } => {
                let xs = points.map(|p| p.0);
                let ys = points.map(|p| p.1);
                (
                    xs.iter().copied().fold(f64::INFINITY, f64::min),
                    ys.iter().copied().fold(f64::INFINITY, f64::min),
                    xs.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                    ys.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                )
            }
            LocalShape::Line { a, b } => (
                a.0.min(b.0),
                a.1.min(b.1),
                a.0.max(b.0),
                a.1.max(b.1),
            ),
            LocalShape::Point { at } => (at.0, at.1, at.0, at.1),
        }
    }

    /// Inside test plus distance to the shape boundary at `(x, y)`.
    fn classify(&self, x: f64, y: f64) -> (bool, f64) {
        match self {
            LocalShape::Ellipse { cx, cy, rx, ry } => {
                let rx = rx.max(1e-9);
                let ry = ry.max(1e-9);
                let nx = (x - cx) / rx;
                let ny = (y - cy) / ry;
                let radial = (nx * nx + ny * ny).sqrt();
                (radial <= 1.0, (radial - 1.0).abs() * rx.min(ry))
            }
            LocalShape::Rect { x0, y0, x1, y1 } => {
                let inside = x >= *x0 && x <= *x1 && y >= *y0 && y <= *y1;
                let dist = if inside {
                    (x - x0).min(x1 - x).min(y - y0).min(y1 - y)
                } else {
                    let dx = (x0 - x).max(x - x1).max(0.0);
                    let dy = (y0 - y).max(y - y1).max(0.0);
                    (dx * dx + dy * dy).sqrt()
                };
                (inside, dist)
            }
            LocalShape::Triangle { points } => {
                let [p0, p1, p2] = *points;
                let sign = |p: (f64, f64), a: (f64, f64), b: (f64, f64)| {
                    (p.0 - b.0) * (a.1 - b.1) - (a.0 - b.0) * (p.1 - b.1)
                };
                let d0 = sign((x, y), p0, p1);
                let d1 = sign((x, y), p1, p2);
                let d2 = sign((x, y), p2, p0);
                let has_neg = d0 < 0.0 || d1 < 0.0 || d2 < 0.0;
                let has_pos = d0 > 0.0 || d1 > 0.0 || d2 > 0.0;
                let inside = !(has_neg && has_pos);
                let dist = segment_distance((x, y), p0, p1)
                    .min(segment_distance((x, y), p1, p2))
                    .min(segment_distance((x, y), p2, p0));
                (inside, dist)
            }
            LocalShape::Line { a, b } => (false, segment_distance((x, y), *a, *b)),
            LocalShape::Point { at } => {
                let dx = x - at.0;
                let dy = y - at.1;
                (false, (dx * dx + dy * dy).sqrt())
            }
        }
    }

    fn stroke_only(&self) -> bool {
        matches!(self, LocalShape::Line { .. } | LocalShape::Point { .. })
    }
}

fn segment_distance(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    let (abx, aby) = (b.0 - a.0, b.1 - a.1);
    let (apx, apy) = (p.0 - a.0, p.1 - a.1);
    let len_sq = abx * abx + aby * aby;
    let t = if len_sq < 1e-12 {
        0.0
    } else {
        ((apx * abx + apy * aby) / len_sq).clamp(0.0, 1.0)
    };
    let (dx, dy) = (apx - t * abx, apy - t * aby);
    (dx * dx + dy * dy).sqrt()
}

/// The in-memory drawing target: an RGBA image plus the drawing state the
/// primitives consume.
struct Surface {
    image: RgbaImage,
    state: SurfaceState,
    stack: Vec<SurfaceState>,
}

impl Surface {
    fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255])),
            state: SurfaceState::default(),
            stack: Vec::new(),
        }
    }

    fn background(&mut self, color: Rgba<u8>) {
        for pixel in self.image.pixels_mut() {
            *pixel = color;
        }
    }

    fn push(&mut self) {
        self.stack.push(self.state);
    }

    fn pop(&mut self) {
        if let Some(saved) = self.stack.pop() {
            self.state = saved;
        }
    }

    fn paint(&mut self, shape: &LocalShape) {
        let fill = if shape.stroke_only() {
            None
        } else {
            self.state.fill
        };
        let stroke = self.state.stroke;
        if fill.is_none() && stroke.is_none() {
            return;
        }
        let half_weight = (self.state.stroke_weight / 2.0).max(0.0);
        let Some(inverse) = self.state.transform.inverse() else {
            return;
        };

        // Device bounding box of the padded local bbox.
        let (lx0, ly0, lx1, ly1) = shape.bbox();
        let pad = half_weight + 1.0;
        let corners = [
            self.state.transform.apply(lx0 - pad, ly0 - pad),
            self.state.transform.apply(lx1 + pad, ly0 - pad),
            self.state.transform.apply(lx0 - pad, ly1 + pad),
            self.state.transform.apply(lx1 + pad, ly1 + pad),
        ];
        let dev_x0 = corners.iter().map(|c| c.0).fold(f64::INFINITY, f64::min);
        let dev_y0 = corners.iter().map(|c| c.1).fold(f64::INFINITY, f64::min);
        let dev_x1 = corners
            .iter()
            .map(|c| c.0)
            .fold(f64::NEG_INFINITY, f64::max);
        let dev_y1 = corners
            .iter()
            .map(|c| c.1)
            .fold(f64::NEG_INFINITY, f64::max);

        let width = self.image.width() as i64;
        let height = self.image.height() as i64;
        let px0 = (dev_x0.floor() as i64).max(0);
        let py0 = (dev_y0.floor() as i64).max(0);
        let px1 = (dev_x1.ceil() as i64).min(width - 1);
        let py1 = (dev_y1.ceil() as i64).min(height - 1);

        for py in py0..=py1 {
            for px in px0..=px1 {
                let (lx, ly) = inverse.apply(px as f64 + 0.5, py as f64 + 0.5);
                let (inside, dist) = shape.classify(lx, ly);
                if let Some(color) = stroke {
                    if dist <= half_weight {
                        self.image.put_pixel(px as u32, py as u32, color);
                        continue;
                    }
                }
                if let Some(color) = fill {
                    if inside {
                        self.image.put_pixel(px as u32, py as u32, color);
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Statement interpretation

fn numeric_args(call: &Call, env: &EvalEnv) -> Result<Vec<f64>> {
    call.args
        .iter()
        .map(|arg| match arg {
            Arg::Value(expr) => Ok(expr.eval(env)),
            Arg::Mode(mode) => bail!("unexpected mode `{mode}` in `{}`", call.name),
        })
        .collect()
}

fn expect_args(call: &Call, values: &[f64], count: usize) -> Result<()> {
    if values.len() != count {
        bail!("`{}` takes {count} arguments, got {}", call.name, values.len());
    }
    Ok(())
}

fn color_from(call: &Call, values: &[f64]) -> Result<Rgba<u8>> {
    let channel = |v: f64| v.clamp(0.0, 255.0).round() as u8;
    match values {
        [gray] => Ok(Rgba([channel(*gray), channel(*gray), channel(*gray), 255])),
        [r, g, b] => Ok(Rgba([channel(*r), channel(*g), channel(*b), 255])),
        [r, g, b, a] => Ok(Rgba([channel(*r), channel(*g), channel(*b), channel(*a)])),
        _ => bail!("`{}` takes 1, 3, or 4 color arguments", call.name),
    }
}

/// Interpret one statement against the surface. Anything not in this
/// match is not a capability the program has.
fn execute_call(surface: &mut Surface, call: &Call, env: &EvalEnv) -> Result<()> {
    match call.name.as_str() {
        // The surface is allocated by the renderer at the configured
        // size; requested dimensions are ignored.
        "createCanvas" => Ok(()),
        "background" => {
            let values = numeric_args(call, env)?;
            let color = color_from(call, &values)?;
            surface.background(color);
            Ok(())
        }
        "fill" => {
            let values = numeric_args(call, env)?;
            surface.state.fill = Some(color_from(call, &values)?);
            Ok(())
        }
        "noFill" => {
            surface.state.fill = None;
            Ok(())
        }
        "stroke" => {
            let values = numeric_args(call, env)?;
            surface.state.stroke = Some(color_from(call, &values)?);
            Ok(())
        }
        "noStroke" => {
            surface.state.stroke = None;
            Ok(())
        }
        "strokeWeight" => {
            let values = numeric_args(call, env)?;
            expect_args(call, &values, 1)?;
            surface.state.stroke_weight = values[0].max(0.0);
            Ok(())
        }
        "rectMode" => match call.args.as_slice() {
            [Arg::Mode(mode)] if mode == "CENTER" => {
                surface.state.rect_from_center = true;
                Ok(())
            }
            [Arg::Mode(mode)] if mode == "CORNER" => {
                surface.state.rect_from_center = false;
                Ok(())
            }
            _ => bail!("`rectMode` takes CENTER or CORNER"),
        },
        "push" => {
            surface.push();
            Ok(())
        }
        "pop" => {
            surface.pop();
            Ok(())
        }
        "translate" => {
            let values = numeric_args(call, env)?;
            expect_args(call, &values, 2)?;
            surface.state.transform.translate(values[0], values[1]);
            Ok(())
        }
        "rotate" => {
            let values = numeric_args(call, env)?;
            expect_args(call, &values, 1)?;
            surface.state.transform.rotate(values[0]);
            Ok(())
        }
        "ellipse" => {
            let values = numeric_args(call, env)?;
            let (w, h) = match values.as_slice() {
                [_, _, w] => (*w, *w),
                [_, _, w, h] => (*w, *h),
                _ => bail!("`ellipse` takes 3 or 4 arguments"),
            };
            surface.paint(&LocalShape::Ellipse {
                cx: values[0],
                cy: values[1],
                rx: w.abs() / 2.0,
                ry: h.abs() / 2.0,
            });
            Ok(())
        }
        "circle" => {
            let values = numeric_args(call, env)?;
            expect_args(call, &values, 3)?;
            surface.paint(&LocalShape::Ellipse {
                cx: values[0],
                cy: values[1],
                rx: values[2].abs() / 2.0,
                ry: values[2].abs() / 2.0,
            });
            Ok(())
        }
        "rect" | "square" => {
            let values = numeric_args(call, env)?;
            let (x, y, w, h) = match (call.name.as_str(), values.as_slice()) {
                ("rect", [x, y, w, h]) => (*x, *y, *w, *h),
                ("square", [x, y, s]) => (*x, *y, *s, *s),
                _ => bail!("`{}` has the wrong arity", call.name),
            };
            let (x0, y0) = if surface.state.rect_from_center {
                (x - w / 2.0, y - h / 2.0)
            } else {
                (x, y)
            };
            surface.paint(&LocalShape::Rect {
                x0,
                y0,
                x1: x0 + w,
                y1: y0 + h,
            });
            Ok(())
        }
        "triangle" => {
            let values = numeric_args(call, env)?;
            expect_args(call, &values, 6)?;
            surface.paint(&LocalShape::Triangle {
                points: [
                    (values[0], values[1]),
                    (values[2], values[3]),
                    (values[4], values[5]),
                ],
            });
            Ok(())
        }
        "line" => {
            let values = numeric_args(call, env)?;
            expect_args(call, &values, 4)?;
            surface.paint(&LocalShape::Line {
                a: (values[0], values[1]),
                b: (values[2], values[3]),
            });
            Ok(())
        }
        "point" => {
            let values = numeric_args(call, env)?;
            expect_args(call, &values, 2)?;
            surface.paint(&LocalShape::Point {
                at: (values[0], values[1]),
            });
            Ok(())
        }
        other => bail!("drawing primitive not allowed: {other}"),
    }
}

// ---------------------------------------------------------------------------
// Renderer

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Loading,
    Rendering,
    Error(String),
}

struct RenderSession {
    id: String,
    draw: Vec<Call>,
    surface: Surface,
    frame_count: u64,
}

/// Owns at most one live render session. Starting a new session tears the
/// previous one down first; a runtime error ends the session and parks
/// the renderer in the error state until the next start.
pub struct Renderer {
    width: u32,
    height: u32,
    state: SessionState,
    session: Option<RenderSession>,
}

impl Renderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            state: SessionState::Idle,
            session: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|session| session.id.as_str())
    }

    pub fn frame_count(&self) -> u64 {
        self.session
            .as_ref()
            .map(|session| session.frame_count)
            .unwrap_or(0)
    }

    pub fn frame(&self) -> Option<&RgbaImage> {
        self.session.as_ref().map(|session| &session.surface.image)
    }

    pub fn teardown(&mut self) {
        self.session = None;
        self.state = SessionState::Idle;
    }

    /// Validate, parse, and set up a new session. Returns the session id.
    pub fn start_session(&mut self, code: &str) -> Result<String> {
        self.teardown();
        self.state = SessionState::Loading;

        if let Some(reason) = render_rejection_reason(code) {
            self.state = SessionState::Error(reason.clone());
            bail!(reason);
        }
        let program = match SketchProgram::parse(code) {
            Ok(program) => program,
            Err(err) => {
                self.state = SessionState::Error(format!("{err:#}"));
                return Err(err);
            }
        };

        // Missing blocks get defaults rather than a rejection.
        let setup = program.setup.unwrap_or_else(|| {
            vec![Call {
                name: "createCanvas".to_string(),
                args: Vec::new(),
            }]
        });
        let draw = program.draw.unwrap_or_default();

        let mut surface = Surface::new(self.width, self.height);
        let env = EvalEnv {
            frame_count: 0.0,
            width: self.width as f64,
            height: self.height as f64,
        };
        for call in &setup {
            if let Err(err) = execute_call(&mut surface, call, &env) {
                let message = format!("{err:#}");
                self.state = SessionState::Error(message.clone());
                bail!(message);
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        self.session = Some(RenderSession {
            id: id.clone(),
            draw,
            surface,
            frame_count: 0,
        });
        self.state = SessionState::Rendering;
        Ok(id)
    }

    /// Run the draw block once. Returns the number of completed frames.
    pub fn advance_frame(&mut self) -> Result<u64> {
        let outcome = {
            let Some(session) = self.session.as_mut() else {
                bail!("no active render session");
            };
            let env = EvalEnv {
                frame_count: session.frame_count as f64,
                width: self.width as f64,
                height: self.height as f64,
            };
            let mut result = Ok(());
            for call in &session.draw {
                if let Err(err) = execute_call(&mut session.surface, call, &env) {
                    result = Err(err);
                    break;
                }
            }
            match result {
                Ok(()) => {
                    session.frame_count += 1;
                    Ok(session.frame_count)
                }
                Err(err) => Err(err),
            }
        };
        match outcome {
            Ok(frames) => Ok(frames),
            Err(err) => {
                self.session = None;
                let message =
                    format!("{err:#}. Try a simpler command like \"draw a red circle\".");
                self.state = SessionState::Error(message.clone());
                bail!(message)
            }
        }
    }

    pub fn save_frame(&self, path: &Path) -> Result<()> {
        let session = self
            .session
            .as_ref()
            .context("no active render session")?;
        session
            .surface
            .image
            .save(path)
            .with_context(|| format!("saving frame to {}", path.display()))
    }
}

// ---------------------------------------------------------------------------
// Pipeline engine

#[derive(Debug, Clone)]
pub struct CommandReport {
    pub intent: ParsedIntent,
    pub program: String,
    pub provider: String,
    pub fallback_used: bool,
    pub session_id: String,
}

/// Ties the pipeline together: parse, generate, validate, render, and
/// trace every stage to the session's events file.
pub struct SketchEngine {
    out_dir: PathBuf,
    config: PipelineConfig,
    trace: TraceWriter,
    providers: SketchProviderRegistry,
    limiter: FixedWindowLimiter,
    renderer: Renderer,
}

impl SketchEngine {
    pub fn new(
        out_dir: impl Into<PathBuf>,
        events_path: impl Into<PathBuf>,
        config: PipelineConfig,
    ) -> Result<Self> {
        let out_dir = out_dir.into();
        std::fs::create_dir_all(&out_dir)
            .with_context(|| format!("creating output dir {}", out_dir.display()))?;

        let mut providers = SketchProviderRegistry::default();
        providers.register(Box::new(TemplateSketchProvider));
        if config.generator.remote_enabled {
            providers.register(Box::new(RemoteSketchProvider::new(
                config.generator.endpoint.clone(),
                config.generator.timeout_ms,
            )?));
        }

        let trace = TraceWriter::for_new_session(events_path);
        trace.record(
            "pipeline_started",
            trace_payload(&[
                ("canvas_width", Value::from(config.canvas.width)),
                ("canvas_height", Value::from(config.canvas.height)),
                (
                    "remote_enabled",
                    Value::from(config.generator.remote_enabled),
                ),
            ]),
        )?;

        let renderer = Renderer::new(config.canvas.width, config.canvas.height);
        Ok(Self {
            out_dir,
            config,
            trace,
            providers,
            limiter: FixedWindowLimiter::default(),
            renderer,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut Renderer {
        &mut self.renderer
    }

    pub fn emit(&self, event: &str, payload: TracePayload) -> Result<Value> {
        self.trace.record(event, payload)
    }

    /// Run one command through the whole pipeline and leave the renderer
    /// holding a live session for it.
    pub fn process_command(&mut self, text: &str) -> Result<CommandReport> {
        self.trace.record(
            "command_received",
            trace_payload(&[("command", Value::from(text))]),
        )?;

        let intent = intent::parse(text);
        self.trace.record(
            "intent_parsed",
            trace_payload(&[("intent", serde_json::to_value(&intent)?)]),
        )?;

        let (program, provider, fallback_used) = self.generate_program(&intent)?;
        if let Some(old) = self.renderer.session_id().map(str::to_string) {
            self.trace.record(
                "render_torn_down",
                trace_payload(&[("render_session", Value::from(old))]),
            )?;
        }
        self.trace.record(
            "render_started",
            trace_payload(&[("provider", Value::from(provider.as_str()))]),
        )?;

        let session_id = match self.renderer.start_session(&program) {
            Ok(id) => id,
            Err(err) => {
                self.trace.record(
                    "render_failed",
                    trace_payload(&[("error", Value::from(format!("{err:#}")))]),
                )?;
                return Err(err);
            }
        };
        self.trace.record(
            "session_started",
            trace_payload(&[("render_session", Value::from(session_id.as_str()))]),
        )?;

        Ok(CommandReport {
            intent,
            program,
            provider,
            fallback_used,
            session_id,
        })
    }

    /// Ask each provider in order for a valid program; fall back to the
    /// built-in template when none delivers one.
    fn generate_program(&mut self, intent: &ParsedIntent) -> Result<(String, String, bool)> {
        let request = SketchRequest {
            command: intent.original_command.clone(),
            intent: intent.clone(),
            canvas_width: self.config.canvas.width,
            canvas_height: self.config.canvas.height,
        };

        for name in GENERATION_ORDER {
            let Some(provider) = self.providers.get(name) else {
                continue;
            };
            // Only outbound calls are rate limited; local synthesis is free.
            if *name == "remote" {
                match self.limiter.check(name) {
                    LimitDecision::Allowed { .. } => {}
                    LimitDecision::Limited { retry_after } => {
                        self.trace.record(
                            "rate_limited",
                            trace_payload(&[
                                ("provider", Value::from(*name)),
                                (
                                    "retry_after_ms",
                                    Value::from(retry_after.as_millis() as u64),
                                ),
                            ]),
                        )?;
                        continue;
                    }
                }
            }
            self.trace.record(
                "generation_started",
                trace_payload(&[("provider", Value::from(*name))]),
            )?;
            let code = match provider.generate(&request) {
                Ok(code) => code,
                Err(err) => {
                    self.trace.record(
                        "generation_failed",
                        trace_payload(&[
                            ("provider", Value::from(*name)),
                            ("error", Value::from(format!("{err:#}"))),
                        ]),
                    )?;
                    continue;
                }
            };
            if let Some(reason) = rejection_reason(&code) {
                self.trace.record(
                    "validation_rejected",
                    trace_payload(&[
                        ("provider", Value::from(*name)),
                        ("reason", Value::from(reason)),
                    ]),
                )?;
                continue;
            }
            return Ok((code, (*name).to_string(), false));
        }

        self.trace.record("fallback_used", TracePayload::new())?;
        Ok((fallback_program(intent), "fallback".to_string(), true))
    }
}

fn trace_payload(entries: &[(&str, Value)]) -> TracePayload {
    let mut payload = TracePayload::new();
    for (key, value) in entries {
        payload.insert((*key).to_string(), value.clone());
    }
    payload
}

// ---------------------------------------------------------------------------
// Offline demo

/// Canned program for the offline demo path. Keyword matching and the
/// palette here are intentionally simpler than the generator's tables:
/// pure primaries, fixed sizes, no animation.
pub fn mock_program(command: &str) -> String {
    let lower = command.to_lowercase();
    let named = mock_rgb(&lower);
    let ([r, g, b], shape_call) = if lower.contains("circle") || lower.contains("round") {
        (named.unwrap_or([255, 0, 0]), "ellipse(400, 300, 150, 150)")
    } else if lower.contains("square") || lower.contains("rect") {
        (named.unwrap_or([0, 0, 255]), "rect(350, 250, 100, 100)")
    } else if lower.contains("triangle") {
        (
            named.unwrap_or([0, 255, 0]),
            "triangle(400, 200, 350, 350, 450, 350)",
        )
    } else {
        (
            named.unwrap_or([150, 150, 150]),
            "ellipse(400, 300, 100, 100)",
        )
    };
    format!(
        "function setup() {{\n  createCanvas(800, 600);\n}}\n\n\
         function draw() {{\n  background(240);\n  fill({r}, {g}, {b});\n  {shape_call};\n}}\n"
    )
}

fn mock_rgb(lower: &str) -> Option<[u8; 3]> {
    const TABLE: &[(&str, [u8; 3])] = &[
        ("red", [255, 0, 0]),
        ("blue", [0, 0, 255]),
        ("green", [0, 255, 0]),
        ("yellow", [255, 255, 0]),
        ("orange", [255, 165, 0]),
        ("purple", [128, 0, 128]),
        ("pink", [255, 192, 203]),
        ("black", [0, 0, 0]),
        ("white", [255, 255, 255]),
        ("gray", [128, 128, 128]),
    ];
    for (name, rgb) in TABLE {
        if lower.contains(name) {
            return Some(*rgb);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use doodle_contracts::config::PipelineConfig;
    use doodle_contracts::intent::{self, ParsedIntent};
    use doodle_contracts::program::validate::{precheck_render, validate_generated};

    use super::{
        compose_program, fallback_program, mock_program, Renderer, SessionState, SketchEngine,
    };

    fn engine() -> (SketchEngine, tempfile::TempDir) {
        let temp = tempfile::tempdir().unwrap();
        let engine = SketchEngine::new(
            temp.path().join("out"),
            temp.path().join("events.jsonl"),
            PipelineConfig::default(),
        )
        .unwrap();
        (engine, temp)
    }

    #[test]
    fn template_program_is_deterministic_and_valid() {
        let intent = intent::parse("draw a large purple triangle at the top");
        let first = compose_program(&intent);
        let second = compose_program(&intent);
        assert_eq!(first, second);
        assert!(validate_generated(&first));
        assert!(precheck_render(&first));
        assert!(first.contains("fill(200, 100, 255)"));
        assert!(first.contains("triangle(400, 25, 275, 275, 525, 275)"));
    }

    #[test]
    fn multi_count_spreads_shapes_horizontally() {
        let intent = intent::parse("draw three small circles");
        let program = compose_program(&intent);
        assert!(program.contains("ellipse(300, 300, 80, 80)"));
        assert!(program.contains("ellipse(400, 300, 80, 80)"));
        assert!(program.contains("ellipse(500, 300, 80, 80)"));
    }

    #[test]
    fn rotate_animation_wraps_shape_in_a_transform() {
        let intent = intent::parse("draw a spinning square");
        let program = compose_program(&intent);
        assert!(program.contains("push();"));
        assert!(program.contains("translate(400, 300);"));
        assert!(program.contains("rotate(frameCount * 0.05);"));
        assert!(program.contains("rect(0, 0, 150, 150)"));
        assert!(program.contains("pop();"));
        // Rotation draws one shape even with a count.
        let counted = intent::parse("draw five spinning squares");
        assert_eq!(compose_program(&counted).matches("rect(").count(), 1);
    }

    #[test]
    fn fallback_always_validates() {
        for command in [
            "draw a red circle",
            "draw a spinning square",
            "draw four big yellow triangles on the left",
            "",
        ] {
            let intent = intent::parse(command);
            let program = fallback_program(&intent);
            assert_eq!(program, fallback_program(&intent));
            assert!(validate_generated(&program), "fallback for `{command}`");
            assert!(precheck_render(&program), "fallback for `{command}`");
        }
    }

    #[test]
    fn engine_renders_a_red_circle_end_to_end() {
        let (mut engine, _temp) = engine();
        let report = engine.process_command("draw a red circle").unwrap();

        assert_eq!(report.provider, "template");
        assert!(!report.fallback_used);
        assert_eq!(report.intent, intent::parse("draw a red circle"));
        assert_eq!(
            report.program.matches("ellipse(400, 300, 150, 150)").count(),
            1
        );
        assert!(report.program.contains("fill(255, 80, 80)"));

        engine.renderer_mut().advance_frame().unwrap();
        let frame = engine.renderer().frame().unwrap();
        assert_eq!(frame.get_pixel(400, 300).0, [255, 80, 80, 255]);
        assert_eq!(frame.get_pixel(10, 10).0, [240, 240, 240, 255]);
        // Stroke ring at the circle's edge.
        assert_eq!(frame.get_pixel(475, 300).0, [0, 0, 0, 255]);
    }

    #[test]
    fn new_session_replaces_the_old_one() {
        let (mut engine, _temp) = engine();
        let first = engine.process_command("draw a red circle").unwrap();
        engine.renderer_mut().advance_frame().unwrap();
        assert_eq!(engine.renderer().frame_count(), 1);

        let second = engine.process_command("draw a blue square").unwrap();
        assert_ne!(first.session_id, second.session_id);
        assert_eq!(engine.renderer().frame_count(), 0);
        assert_eq!(engine.renderer().state(), &SessionState::Rendering);
    }

    #[test]
    fn rotating_program_advances_frames() {
        let (mut engine, _temp) = engine();
        engine.process_command("draw a spinning square").unwrap();
        for _ in 0..3 {
            engine.renderer_mut().advance_frame().unwrap();
        }
        assert_eq!(engine.renderer().frame_count(), 3);
        assert_eq!(engine.renderer().state(), &SessionState::Rendering);
        // The square's center stays put while it rotates.
        let frame = engine.renderer().frame().unwrap();
        assert_eq!(frame.get_pixel(400, 300).0, [80, 120, 255, 255]);
    }

    #[test]
    fn draw_only_program_gets_default_setup() {
        let mut renderer = Renderer::new(800, 600);
        renderer
            .start_session("function draw() { background(240); }")
            .unwrap();
        renderer.advance_frame().unwrap();
        let frame = renderer.frame().unwrap();
        assert_eq!(frame.get_pixel(0, 0).0, [240, 240, 240, 255]);
    }

    #[test]
    fn unknown_primitive_stops_the_session_with_a_hint() {
        let mut renderer = Renderer::new(800, 600);
        renderer
            .start_session("function draw() { arc(1, 2, 3, 4); }")
            .unwrap();
        let err = renderer.advance_frame().unwrap_err();
        assert!(err.to_string().contains("not allowed"));
        match renderer.state() {
            SessionState::Error(message) => {
                assert!(message.contains("arc"));
                assert!(message.contains("draw a red circle"));
            }
            other => panic!("expected error state, got {other:?}"),
        }
        assert!(renderer.frame().is_none());
    }

    #[test]
    fn denylisted_program_never_starts() {
        let mut renderer = Renderer::new(800, 600);
        let err = renderer
            .start_session("function draw() { eval('boom'); }")
            .unwrap_err();
        assert!(err.to_string().contains("denylisted"));
        assert!(matches!(renderer.state(), SessionState::Error(_)));
    }

    #[test]
    fn save_frame_writes_a_png() {
        let temp = tempfile::tempdir().unwrap();
        let mut renderer = Renderer::new(800, 600);
        renderer
            .start_session(&mock_program("draw a green triangle"))
            .unwrap();
        renderer.advance_frame().unwrap();
        let path = temp.path().join("sketch.png");
        renderer.save_frame(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn mock_program_uses_the_pure_palette() {
        let program = mock_program("draw a red circle");
        assert!(program.contains("fill(255, 0, 0)"));
        assert!(program.contains("ellipse(400, 300, 150, 150)"));

        // Shapes carry their own default colors when none is named.
        assert!(mock_program("draw a circle").contains("fill(255, 0, 0)"));
        assert!(mock_program("draw a square").contains("fill(0, 0, 255)"));
        assert!(mock_program("draw a triangle").contains("fill(0, 255, 0)"));

        let unknown = mock_program("do something");
        assert!(unknown.contains("fill(150, 150, 150)"));
        assert!(unknown.contains("ellipse(400, 300, 100, 100)"));
    }

    #[test]
    fn trace_records_the_pipeline_stages() {
        let temp = tempfile::tempdir().unwrap();
        let events = temp.path().join("events.jsonl");
        let mut engine = SketchEngine::new(
            temp.path().join("out"),
            &events,
            PipelineConfig::default(),
        )
        .unwrap();
        engine.process_command("draw a red circle").unwrap();
        engine.process_command("draw a blue square").unwrap();

        let content = std::fs::read_to_string(&events).unwrap();
        let events: Vec<String> = content
            .lines()
            .map(|line| {
                let value: serde_json::Value = serde_json::from_str(line).unwrap();
                value["event"].as_str().unwrap().to_string()
            })
            .collect();
        for expected in [
            "pipeline_started",
            "command_received",
            "intent_parsed",
            "generation_started",
            "render_started",
            "render_torn_down",
            "session_started",
        ] {
            assert!(events.iter().any(|e| e == expected), "missing {expected}");
        }
        // The old session is recorded as torn down before the new render
        // is recorded as started.
        let torn_down = events
            .iter()
            .position(|e| e == "render_torn_down")
            .unwrap();
        let second_start = events
            .iter()
            .rposition(|e| e == "render_started")
            .unwrap();
        assert!(torn_down < second_start);
    }

    #[test]
    fn fallback_intents_carry_the_color_table() {
        let intent = ParsedIntent::defaults_for("anything");
        let program = fallback_program(&intent);
        assert!(program.contains("fill(80, 120, 255)"));
        assert!(program.contains("ellipse(400, 300, 150, 150)"));
    }
}
