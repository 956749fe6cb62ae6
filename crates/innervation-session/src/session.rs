//! The per-image workflow over a batch.
//!
//! A [`Session`] walks a batch one image at a time. For each image the
//! caller adjusts the view, draws a polygon ROI, optionally switches the
//! threshold mode, calculates the index and then either saves the result
//! or skips the image. Saving and skipping both advance to the next
//! decodable file; undecodable files are recorded and passed over.
//!
//! Every command validates before it mutates, so a command that returns
//! an error leaves the session exactly as it was.

use std::collections::VecDeque;
use std::sync::Arc;

use innervation_export::{ResultRow, to_tsv};
use innervation_pipeline::diagnostics::timed;
use innervation_pipeline::{
    AdjustmentState, Clock, Decoder, Dimensions, GrayImage, ImageDecoder, ImageDiagnostics,
    ImageFrame, IndexResult, Point, RecomputeGeneration, RgbImage, RoiDraft, RoiMask, RoiPolygon,
    StageDiagnostics, StageMetrics, SystemClock, ThresholdMode, ThresholdResult, blur, index,
    normalize, overlay, threshold,
};

use crate::batch::{BatchFile, DecodeFailure};
use crate::config::SessionConfig;
use crate::job::{AdjustmentJob, AdjustmentOutput};
use crate::state::SessionState;
use crate::SessionError;

/// Outcome of [`Session::calculate`].
#[derive(Debug, Clone, PartialEq)]
pub struct Calculation {
    /// Cutoff used.
    pub threshold: ThresholdResult,
    /// Counts and percentage.
    pub index: IndexResult,
    /// Stage timings and metrics for this image.
    pub diagnostics: ImageDiagnostics,
}

/// A polygon frozen together with its rasterized mask.
#[derive(Debug, Clone)]
struct FrozenRoi {
    polygon: RoiPolygon,
    mask: RoiMask,
    diagnostics: StageDiagnostics,
}

/// Everything held for the image under analysis.
#[derive(Debug)]
struct CurrentImage {
    identifier: String,
    frame: ImageFrame,
    normalized: Arc<GrayImage>,
    normalize_diagnostics: StageDiagnostics,
    adjustment: AdjustmentState,
    adjust_diagnostics: Option<StageDiagnostics>,
    working: GrayImage,
    threshold_mode: ThresholdMode,
    draft: RoiDraft,
    roi: Option<FrozenRoi>,
    calculation: Option<Calculation>,
}

/// Batch workflow state machine.
///
/// Generic over the [`Decoder`] that turns batch files into frames and
/// the [`Clock`] used for stage timing.
#[derive(Debug)]
pub struct Session<D = ImageDecoder, C = SystemClock> {
    config: SessionConfig,
    decoder: D,
    clock: C,
    state: SessionState,
    pending: VecDeque<BatchFile>,
    batch_len: usize,
    position: usize,
    current: Option<CurrentImage>,
    results: Vec<ResultRow>,
    failures: Vec<DecodeFailure>,
    generation: RecomputeGeneration,
}

impl Session {
    /// Session with the default decoder and system clock.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Pipeline`] if `config` is invalid.
    pub fn new(config: SessionConfig) -> Result<Self, SessionError> {
        Self::with_parts(config, ImageDecoder, SystemClock)
    }
}

impl<D: Decoder, C: Clock> Session<D, C> {
    /// Session with a custom decoder and clock.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Pipeline`] if `config` is invalid.
    pub fn with_parts(config: SessionConfig, decoder: D, clock: C) -> Result<Self, SessionError> {
        config.validate()?;
        Ok(Self {
            config,
            decoder,
            clock,
            state: SessionState::Empty,
            pending: VecDeque::new(),
            batch_len: 0,
            position: 0,
            current: None,
            results: Vec::new(),
            failures: Vec::new(),
            generation: RecomputeGeneration::new(),
        })
    }

    // ───────────────────────────── commands ─────────────────────────────

    /// Start a new batch, discarding the previous one and its results.
    ///
    /// Lands on the first decodable file, or [`SessionState::BatchComplete`]
    /// if none decode.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::EmptyBatch`] if `files` is empty.
    pub fn load_batch(&mut self, files: Vec<BatchFile>) -> Result<SessionState, SessionError> {
        if files.is_empty() {
            return Err(SessionError::EmptyBatch);
        }
        log::info!("loading batch of {} files", files.len());
        self.batch_len = files.len();
        self.position = 0;
        self.pending = files.into();
        self.results.clear();
        self.failures.clear();
        self.advance();
        Ok(self.state)
    }

    /// Change contrast, brightness and blur radius, recomputing the
    /// working buffer synchronously.
    ///
    /// A frozen ROI survives; any calculation is invalidated.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidAdjustment`] for non-finite values
    /// or a radius outside `0..=AdjustmentState::MAX_BLUR_RADIUS`, [`SessionError::NoImage`] without an image,
    /// and [`SessionError::InvalidTransition`] while drawing the ROI.
    pub fn set_adjustment(
        &mut self,
        contrast: f32,
        brightness: f32,
        blur_radius: f32,
    ) -> Result<SessionState, SessionError> {
        let state = self.validate_adjustment("set adjustment", contrast, brightness, blur_radius)?;
        let job = self.make_job(state)?;
        self.install_adjustment(job.run());
        Ok(self.state)
    }

    /// Like [`set_adjustment`](Self::set_adjustment), but returns a job to
    /// run elsewhere. Feed its output to
    /// [`apply_adjustment`](Self::apply_adjustment).
    ///
    /// Issuing a request supersedes every earlier one.
    ///
    /// # Errors
    ///
    /// Same as [`set_adjustment`](Self::set_adjustment).
    pub fn request_adjustment(
        &mut self,
        contrast: f32,
        brightness: f32,
        blur_radius: f32,
    ) -> Result<AdjustmentJob, SessionError> {
        let state =
            self.validate_adjustment("request adjustment", contrast, brightness, blur_radius)?;
        self.make_job(state)
    }

    /// Install a finished job's working buffer.
    ///
    /// Returns `Ok(false)` and changes nothing when the output is stale:
    /// a newer request was issued or the image changed.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidTransition`] if the session moved
    /// into a state that does not accept adjustments (e.g. drawing).
    pub fn apply_adjustment(&mut self, output: AdjustmentOutput) -> Result<bool, SessionError> {
        if !self.generation.is_current(output.ticket) {
            log::debug!(
                "discarding stale adjustment (generation {})",
                output.ticket.generation()
            );
            return Ok(false);
        }
        self.require_adjustable("apply adjustment")?;
        self.install_adjustment(output);
        Ok(true)
    }

    /// Choose automatic or manual thresholding for the current image.
    ///
    /// Drops a calculated result back to [`SessionState::RoiReady`].
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoImage`] without an image and
    /// [`SessionError::Pipeline`] for a non-finite manual value.
    pub fn set_threshold(&mut self, mode: ThresholdMode) -> Result<SessionState, SessionError> {
        let current = self.current.as_mut().ok_or(SessionError::NoImage)?;
        if let ThresholdMode::Manual(value) = mode {
            threshold::clamp_manual(value)?;
        }
        current.threshold_mode = mode;
        if self.state == SessionState::Calculated {
            current.calculation = None;
            self.transition(SessionState::RoiReady);
        }
        Ok(self.state)
    }

    /// Begin drawing a new ROI, discarding any previous polygon, mask and
    /// result.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoImage`] without an image.
    pub fn start_roi(&mut self) -> Result<SessionState, SessionError> {
        let current = self.current.as_mut().ok_or(SessionError::NoImage)?;
        current.draft = RoiDraft::new();
        current.roi = None;
        current.calculation = None;
        self.transition(SessionState::DrawingRoi);
        Ok(self.state)
    }

    /// Append a vertex to the ROI being drawn.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidTransition`] unless drawing and
    /// [`SessionError::InvalidRoi`] for a non-finite coordinate.
    pub fn add_roi_vertex(&mut self, x: f64, y: f64) -> Result<usize, SessionError> {
        self.require_state("add ROI vertex", &[SessionState::DrawingRoi])?;
        let current = self.current.as_mut().ok_or(SessionError::NoImage)?;
        current
            .draft
            .add_vertex(Point::new(x, y))
            .map_err(SessionError::from_analysis)?;
        Ok(current.draft.vertices().len())
    }

    /// Close and freeze the ROI and rasterize its mask.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidRoi`] with fewer than three
    /// vertices (the session stays in [`SessionState::DrawingRoi`]), and
    /// [`SessionError::InvalidTransition`] unless drawing.
    pub fn finish_roi(&mut self) -> Result<SessionState, SessionError> {
        self.require_state("finish ROI", &[SessionState::DrawingRoi])?;
        let current = self.current.as_mut().ok_or(SessionError::NoImage)?;
        let polygon = current.draft.finish().map_err(SessionError::from_analysis)?;

        let dimensions = current.frame.dimensions();
        let (mask, duration) = timed(&self.clock, || polygon.rasterize(dimensions));
        let diagnostics = StageDiagnostics {
            duration,
            metrics: StageMetrics::Rasterize {
                vertex_count: polygon.vertices().len(),
                roi_pixel_count: mask.pixel_count(),
                total_pixel_count: dimensions.pixel_count() as u64,
            },
        };
        if mask.is_empty() {
            log::warn!("ROI for {} covers no pixels", current.identifier);
        }
        current.draft = RoiDraft::new();
        current.roi = Some(FrozenRoi {
            polygon,
            mask,
            diagnostics,
        });
        self.transition(SessionState::RoiReady);
        Ok(self.state)
    }

    /// Resolve the threshold and compute the index inside the frozen ROI.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoImage`] without an image,
    /// [`SessionError::InvalidRoi`] if no ROI is frozen, and
    /// [`SessionError::EmptyRoi`] if the ROI covers no pixels.
    pub fn calculate(&mut self) -> Result<&Calculation, SessionError> {
        if !self.state.has_image() {
            return Err(SessionError::NoImage);
        }
        let current = self.current.as_mut().ok_or(SessionError::NoImage)?;
        let roi = current
            .roi
            .as_ref()
            .ok_or_else(|| SessionError::InvalidRoi("no ROI has been finished".to_owned()))?;

        let (resolved, threshold_time) = timed(&self.clock, || {
            threshold::resolve(current.threshold_mode, &current.working, &roi.mask)
        });
        let resolved = resolved.map_err(SessionError::from_analysis)?;
        let (result, index_time) = timed(&self.clock, || {
            index::compute_index(&current.working, &roi.mask, resolved.value)
        });
        let result = result.map_err(SessionError::from_analysis)?;

        let diagnostics = ImageDiagnostics::new(
            current.identifier.clone(),
            current.frame.dimensions(),
            current.normalize_diagnostics.clone(),
            current.adjust_diagnostics.clone(),
            roi.diagnostics.clone(),
            StageDiagnostics {
                duration: threshold_time,
                metrics: StageMetrics::Threshold {
                    mode: resolved.mode,
                    value: resolved.value,
                },
            },
            StageDiagnostics {
                duration: index_time,
                metrics: StageMetrics::Index {
                    roi_pixel_count: result.roi_pixel_count,
                    above_threshold_count: result.above_threshold_count,
                    index_percent: result.index_percent,
                },
            },
        );
        log::info!(
            "{}: index {:.6}% (threshold {:.1})",
            current.identifier,
            result.index_percent,
            resolved.value
        );

        let calculation = current.calculation.insert(Calculation {
            threshold: resolved,
            index: result,
            diagnostics,
        });
        if self.state != SessionState::Calculated {
            log::debug!("session: {} -> {}", self.state, SessionState::Calculated);
            self.state = SessionState::Calculated;
        }
        Ok(calculation)
    }

    /// Record the calculated index and advance to the next image.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoImage`] without an image and
    /// [`SessionError::InvalidTransition`] unless calculated.
    pub fn save(&mut self) -> Result<ResultRow, SessionError> {
        self.require_state("save", &[SessionState::Calculated])?;
        let current = self.current.as_ref().ok_or(SessionError::NoImage)?;
        let calculation = current
            .calculation
            .as_ref()
            .ok_or(SessionError::InvalidTransition {
                command: "save",
                state: self.state,
            })?;
        let row = ResultRow {
            identifier: current.identifier.clone(),
            index_percent: calculation.index.index_percent,
            sequence: u32::try_from(self.results.len() + 1).unwrap_or(u32::MAX),
        };
        log::info!("saved {} as row {}", row.identifier, row.sequence);
        self.results.push(row.clone());
        self.advance();
        Ok(row)
    }

    /// Advance to the next image without recording a result.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoImage`] without an image and
    /// [`SessionError::InvalidTransition`] unless an ROI is frozen.
    pub fn skip(&mut self) -> Result<SessionState, SessionError> {
        self.require_state("skip", &[SessionState::RoiReady, SessionState::Calculated])?;
        if let Some(current) = &self.current {
            log::info!("skipped {}", current.identifier);
        }
        self.advance();
        Ok(self.state)
    }

    /// Saved results as results-file text.
    #[must_use]
    pub fn export_results(&self) -> String {
        to_tsv(&self.results, &self.config.export)
    }

    // ─────────────────────────── accessors ───────────────────────────

    /// Current workflow state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Session settings.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Saved rows in save order.
    #[must_use]
    pub fn results(&self) -> &[ResultRow] {
        &self.results
    }

    /// Files skipped because they failed to decode.
    #[must_use]
    pub fn decode_failures(&self) -> &[DecodeFailure] {
        &self.failures
    }

    /// `(files taken from the batch so far, batch size)`.
    #[must_use]
    pub const fn progress(&self) -> (usize, usize) {
        (self.position, self.batch_len)
    }

    /// Identifier of the current image.
    #[must_use]
    pub fn current_identifier(&self) -> Option<&str> {
        self.current.as_ref().map(|c| c.identifier.as_str())
    }

    /// Dimensions of the current image.
    #[must_use]
    pub fn dimensions(&self) -> Option<Dimensions> {
        self.current.as_ref().map(|c| c.frame.dimensions())
    }

    /// Normalized buffer of the current image.
    #[must_use]
    pub fn normalized_buffer(&self) -> Option<&GrayImage> {
        self.current.as_ref().map(|c| c.normalized.as_ref())
    }

    /// Working buffer (normalized plus adjustments).
    #[must_use]
    pub fn working_buffer(&self) -> Option<&GrayImage> {
        self.current.as_ref().map(|c| &c.working)
    }

    /// Adjustments applied to the working buffer.
    #[must_use]
    pub fn adjustment(&self) -> Option<AdjustmentState> {
        self.current.as_ref().map(|c| c.adjustment)
    }

    /// Threshold mode of the current image.
    #[must_use]
    pub fn threshold_mode(&self) -> Option<ThresholdMode> {
        self.current.as_ref().map(|c| c.threshold_mode)
    }

    /// Vertices of the ROI being drawn.
    #[must_use]
    pub fn draft_vertices(&self) -> &[Point] {
        self.current
            .as_ref()
            .map(|c| c.draft.vertices())
            .unwrap_or_default()
    }

    /// The frozen ROI polygon.
    #[must_use]
    pub fn roi_polygon(&self) -> Option<&RoiPolygon> {
        self.frozen_roi().map(|r| &r.polygon)
    }

    /// Mask of the frozen ROI.
    #[must_use]
    pub fn roi_mask(&self) -> Option<&RoiMask> {
        self.frozen_roi().map(|r| &r.mask)
    }

    /// Result of the last [`calculate`](Self::calculate) for the current
    /// settings.
    #[must_use]
    pub fn calculation(&self) -> Option<&Calculation> {
        self.current.as_ref().and_then(|c| c.calculation.as_ref())
    }

    /// Preview of the working buffer with counted pixels in red and the
    /// ROI outline drawn on top.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoImage`] without an image,
    /// [`SessionError::InvalidRoi`] if no ROI is frozen, and
    /// [`SessionError::EmptyRoi`] for an automatic threshold over an
    /// empty ROI.
    pub fn threshold_preview(&self) -> Result<RgbImage, SessionError> {
        let current = self.current.as_ref().ok_or(SessionError::NoImage)?;
        let roi = current
            .roi
            .as_ref()
            .ok_or_else(|| SessionError::InvalidRoi("no ROI has been finished".to_owned()))?;
        let resolved = threshold::resolve(current.threshold_mode, &current.working, &roi.mask)
            .map_err(SessionError::from_analysis)?;
        Ok(overlay::render_overlay(
            &current.working,
            &roi.mask,
            resolved.value,
            Some(&roi.polygon),
        )?)
    }

    // ─────────────────────────── internals ───────────────────────────

    fn frozen_roi(&self) -> Option<&FrozenRoi> {
        self.current.as_ref().and_then(|c| c.roi.as_ref())
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            log::debug!("session: {} -> {}", self.state, next);
            self.state = next;
        }
    }

    fn require_state(
        &self,
        command: &'static str,
        allowed: &[SessionState],
    ) -> Result<(), SessionError> {
        if !self.state.has_image() {
            return Err(SessionError::NoImage);
        }
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(SessionError::InvalidTransition {
                command,
                state: self.state,
            })
        }
    }

    fn require_adjustable(&self, command: &'static str) -> Result<(), SessionError> {
        if !self.state.has_image() {
            return Err(SessionError::NoImage);
        }
        if self.state.accepts_adjustment() {
            Ok(())
        } else {
            Err(SessionError::InvalidTransition {
                command,
                state: self.state,
            })
        }
    }

    fn validate_adjustment(
        &self,
        command: &'static str,
        contrast: f32,
        brightness: f32,
        blur_radius: f32,
    ) -> Result<AdjustmentState, SessionError> {
        self.require_adjustable(command)?;
        AdjustmentState::new(contrast, brightness, blur_radius)
            .map_err(|e| SessionError::InvalidAdjustment(e.to_string()))
    }

    fn make_job(&self, state: AdjustmentState) -> Result<AdjustmentJob, SessionError> {
        let current = self.current.as_ref().ok_or(SessionError::NoImage)?;
        Ok(AdjustmentJob {
            ticket: self.generation.next_ticket(),
            normalized: Arc::clone(&current.normalized),
            state,
        })
    }

    fn install_adjustment(&mut self, output: AdjustmentOutput) {
        let Some(current) = self.current.as_mut() else {
            return;
        };
        let AdjustmentOutput {
            state,
            working,
            duration,
            ..
        } = output;
        current.adjust_diagnostics = (!state.is_identity()).then(|| StageDiagnostics {
            duration,
            metrics: StageMetrics::Adjust {
                contrast: state.contrast,
                brightness: state.brightness,
                blur_radius: state.blur_radius,
                sigma: blur::sigma_for_radius(state.blur_radius),
            },
        });
        current.adjustment = state;
        current.working = working;
        current.calculation = None;
        let next = if current.roi.is_some() {
            SessionState::RoiReady
        } else {
            SessionState::Adjusting
        };
        self.transition(next);
    }

    /// Drop the current image and load the next decodable file.
    fn advance(&mut self) {
        self.generation.invalidate();
        self.current = None;
        while let Some(file) = self.pending.pop_front() {
            self.position += 1;
            match self.open(file) {
                Ok(image) => {
                    log::info!(
                        "image {}/{}: {}",
                        self.position,
                        self.batch_len,
                        image.identifier
                    );
                    self.current = Some(image);
                    self.transition(SessionState::ImageLoaded);
                    return;
                }
                Err(failure) => {
                    log::warn!("skipping {}: {}", failure.identifier, failure.message);
                    self.failures.push(failure);
                }
            }
        }
        self.transition(SessionState::BatchComplete);
    }

    fn open(&self, file: BatchFile) -> Result<CurrentImage, DecodeFailure> {
        let BatchFile {
            identifier,
            bytes,
            hint,
        } = file;
        let fail = |message: String| DecodeFailure {
            identifier: identifier.clone(),
            message,
        };

        let frame = self
            .decoder
            .decode(&bytes, hint)
            .map_err(|e| fail(e.to_string()))?;
        let (stretched, duration) = timed(&self.clock, || {
            normalize::percentile_stretch(&frame, &self.config.analysis.normalization)
        });
        let (normalized, bounds) = stretched.map_err(|e| fail(e.to_string()))?;

        let normalize_diagnostics = StageDiagnostics {
            duration,
            metrics: StageMetrics::Normalize {
                width: frame.width(),
                height: frame.height(),
                depth: frame.depth(),
                low_bound: bounds.low,
                high_bound: bounds.high,
            },
        };
        Ok(CurrentImage {
            identifier,
            working: normalized.clone(),
            normalized: Arc::new(normalized),
            normalize_diagnostics,
            adjustment: AdjustmentState::default(),
            adjust_diagnostics: None,
            frame,
            threshold_mode: self.config.analysis.threshold,
            draft: RoiDraft::new(),
            roi: None,
            calculation: None,
        })
    }
}
