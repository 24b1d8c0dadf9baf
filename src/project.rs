use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rayon::prelude::*;
use uuid::Uuid;

use crate::canvas::{PixelBuffer, Region};
use crate::error::{EditError, EditResult};
use crate::io::{SaveFormat, encode_and_write};
use crate::ops::color_removal::{KEY_TOLERANCE, KeyedOverlay, key_overlay};
use crate::ops::compositor::flatten;
use crate::ops::healing::{HealPath, HealingOrchestrator, WorkingImage};
use crate::ops::mask::{Stroke, StrokeSession};
use crate::ops::transform::{Mark, MarkTransform};
use crate::settings::{BRUSH_STEP, EngineSettings, MAX_BRUSH_SIZE, MIN_BRUSH_SIZE};
use crate::viewport::{DisplayRect, Point, fit_rect};
use crate::{log_info, log_warn};

/// What a successful heal did.
#[derive(Clone, Debug, PartialEq)]
pub struct HealSummary {
    pub region: Region,
    pub path: HealPath,
}

/// Single editing session: one base image, its marks and removal strokes.
pub struct EditorSession {
    working: WorkingImage,
    marks: Vec<Mark>,
    selected: Option<Uuid>,

    strokes: Vec<Stroke>,
    /// Stroke being drawn right now; committed on pointer-up.
    drawing: Option<StrokeSession>,

    container: (f32, f32),
    rect: DisplayRect,

    brush_size: u32,
    mark_max_size: f32,
    decode_timeout: Duration,
    orchestrator: HealingOrchestrator,
}

impl EditorSession {
    /// New session healing locally. Use [`EditorSession::with_orchestrator`]
    /// to attach a remote provider.
    pub fn new(base: PixelBuffer, container_w: f32, container_h: f32, settings: &EngineSettings) -> EditResult<Self> {
        let rect = fit_rect(container_w, container_h, base.width(), base.height())?;
        log_info!(
            "Session opened: base {}x{}, container {}x{}",
            base.width(),
            base.height(),
            container_w,
            container_h
        );
        Ok(Self {
            working: WorkingImage::new(base),
            marks: Vec::new(),
            selected: None,
            strokes: Vec::new(),
            drawing: None,
            container: (container_w, container_h),
            rect,
            brush_size: settings.brush_size.clamp(MIN_BRUSH_SIZE, MAX_BRUSH_SIZE),
            mark_max_size: settings.mark_max_size as f32,
            decode_timeout: settings.decode_timeout(),
            orchestrator: HealingOrchestrator::local(),
        })
    }

    pub fn with_orchestrator(mut self, orchestrator: HealingOrchestrator) -> Self {
        self.orchestrator = orchestrator;
        self
    }

    // -- Working image & viewport ---------------------------------------------

    pub fn working_image(&self) -> Arc<PixelBuffer> {
        self.working.snapshot().image
    }

    /// Replace the base image. Strokes refer to the old image and are dropped.
    pub fn set_base_image(&mut self, base: PixelBuffer) -> EditResult<()> {
        let rect = fit_rect(self.container.0, self.container.1, base.width(), base.height())?;
        self.working.replace(base);
        self.rect = rect;
        self.clear_strokes();
        Ok(())
    }

    pub fn display_rect(&self) -> DisplayRect {
        self.rect
    }

    pub fn set_container(&mut self, width: f32, height: f32) -> EditResult<()> {
        let image = self.working_image();
        self.rect = fit_rect(width, height, image.width(), image.height())?;
        self.container = (width, height);
        Ok(())
    }

    // -- Marks ------------------------------------------------------------------

    pub fn add_overlay(&mut self, bytes: Vec<u8>) -> EditResult<Uuid> {
        let keyed = key_overlay(bytes, self.decode_timeout, KEY_TOLERANCE);
        self.push_keyed(keyed)
    }

    /// Key several overlays concurrently, then add them in input order.
    /// Each entry succeeds or fails on its own.
    pub fn add_overlays(&mut self, overlays: Vec<Vec<u8>>) -> Vec<EditResult<Uuid>> {
        let timeout = self.decode_timeout;
        let keyed: Vec<KeyedOverlay> = overlays
            .into_par_iter()
            .map(|bytes| key_overlay(bytes, timeout, KEY_TOLERANCE))
            .collect();
        keyed.into_iter().map(|k| self.push_keyed(k)).collect()
    }

    fn push_keyed(&mut self, keyed: KeyedOverlay) -> EditResult<Uuid> {
        let Some(pixels) = keyed.into_pixels() else {
            log_warn!("Overlay could not be decoded, no mark added");
            return Err(EditError::DecodeFailed("overlay is not a decodable image".to_string()));
        };
        let mark = Mark::fitted(pixels, self.marks.len(), self.mark_max_size)?;
        let id = mark.id;
        log_info!(
            "Mark {} added at ({}, {}) size {:.1}x{:.1}",
            id,
            mark.x,
            mark.y,
            mark.width,
            mark.height
        );
        self.marks.push(mark);
        Ok(id)
    }

    pub fn marks(&self) -> &[Mark] {
        &self.marks
    }

    pub fn mark(&self, id: Uuid) -> Option<&Mark> {
        self.marks.iter().find(|m| m.id == id)
    }

    fn mark_mut(&mut self, id: Uuid) -> EditResult<&mut Mark> {
        self.marks
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(EditError::UnknownMark(id))
    }

    pub fn selected(&self) -> Option<Uuid> {
        self.selected
    }

    pub fn select(&mut self, id: Option<Uuid>) -> EditResult<()> {
        if let Some(id) = id
            && self.mark(id).is_none()
        {
            return Err(EditError::UnknownMark(id));
        }
        self.selected = id;
        Ok(())
    }

    /// Select the topmost mark under `p`, or clear the selection.
    pub fn select_at(&mut self, p: Point) -> Option<Uuid> {
        self.selected = self.marks.iter().rev().find(|m| m.contains(p)).map(|m| m.id);
        self.selected
    }

    pub fn move_mark(&mut self, id: Uuid, dx: f32, dy: f32) -> EditResult<()> {
        self.mark_mut(id)?.translate(dx, dy);
        Ok(())
    }

    pub fn resize_mark(&mut self, id: Uuid, scale_x: f32, scale_y: f32) -> EditResult<()> {
        self.mark_mut(id)?.resize(scale_x, scale_y);
        Ok(())
    }

    pub fn rotate_mark(&mut self, id: Uuid, degrees: f32) -> EditResult<()> {
        self.mark_mut(id)?.rotate_by(degrees);
        Ok(())
    }

    pub fn transform_mark(&mut self, id: Uuid, transform: MarkTransform) -> EditResult<()> {
        self.mark_mut(id)?.apply_transform(transform);
        Ok(())
    }

    pub fn delete_mark(&mut self, id: Uuid) -> EditResult<()> {
        let idx = self
            .marks
            .iter()
            .position(|m| m.id == id)
            .ok_or(EditError::UnknownMark(id))?;
        self.marks.remove(idx);
        if self.selected == Some(id) {
            self.selected = None;
        }
        log_info!("Mark {} deleted", id);
        Ok(())
    }

    /// Delete the selected mark. Returns `false` when nothing was selected.
    pub fn delete_selected(&mut self) -> bool {
        match self.selected {
            Some(id) => self.delete_mark(id).is_ok(),
            None => false,
        }
    }

    // -- Brush & strokes ------------------------------------------------------

    pub fn brush_size(&self) -> u32 {
        self.brush_size
    }

    pub fn set_brush_size(&mut self, size: u32) {
        self.brush_size = size.clamp(MIN_BRUSH_SIZE, MAX_BRUSH_SIZE);
    }

    pub fn grow_brush(&mut self) {
        self.set_brush_size(self.brush_size + BRUSH_STEP);
    }

    pub fn shrink_brush(&mut self) {
        self.set_brush_size(self.brush_size.saturating_sub(BRUSH_STEP));
    }

    pub fn pointer_down(&mut self, p: Point) {
        self.pointer_up();
        self.drawing = Some(StrokeSession::begin(p, self.brush_size as f32));
    }

    pub fn pointer_move(&mut self, p: Point) {
        if let Some(active) = self.drawing.as_mut() {
            active.extend(p);
        }
    }

    pub fn pointer_up(&mut self) {
        if let Some(active) = self.drawing.take() {
            self.strokes.push(active.finish());
        }
    }

    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    pub fn active_stroke(&self) -> Option<&StrokeSession> {
        self.drawing.as_ref()
    }

    pub fn clear_strokes(&mut self) {
        self.strokes.clear();
        self.drawing = None;
    }

    // -- Healing & export -----------------------------------------------------

    /// Heal under the committed strokes. On success the working image is
    /// swapped and the strokes cleared; on failure neither changes.
    pub fn heal(&mut self) -> EditResult<HealSummary> {
        let snap = self.working.snapshot();
        let outcome = self.orchestrator.heal(&snap.image, &self.strokes, &self.rect)?;
        self.working.replace_if_current(snap.generation, outcome.image)?;
        self.strokes.clear();
        Ok(HealSummary { region: outcome.region, path: outcome.path })
    }

    /// Flatten the working image and all marks at native resolution.
    pub fn export(&self) -> EditResult<PixelBuffer> {
        let image = self.working_image();
        let flat = flatten(&image, &self.marks, &self.rect)?;
        log_info!("Exported {}x{} with {} marks", flat.width(), flat.height(), self.marks.len());
        Ok(flat)
    }

    pub fn export_to(&self, path: &Path, format: SaveFormat, quality: u8) -> EditResult<()> {
        let flat = self.export()?;
        encode_and_write(&flat, path, format, quality)?;
        log_info!("Wrote {} ({})", path.display(), format.extension());
        Ok(())
    }
}
