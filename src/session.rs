//! Viewer state outside the GUI: what is loaded, what is shown, and which
//! background render is still wanted.

use crate::cache::{PixelCache, RenderError};
use crate::frame::{DisplayBuffer, RawFrame};
use crate::image_pipeline::{
    default_window, pixel_probe, ModalityLut, PixelProbe, TransformError, Window,
};
use crate::model::{Hierarchy, Instance, LoadReport};
use crate::overlay::{diffusion_info, metadata_lines};
use crate::roi::{RoiError, RoiResult, ValueMode};
use std::collections::HashMap;
use std::sync::Arc;

/// Loaded instances plus the cache their frames go through.
#[derive(Debug)]
pub struct Workspace {
    hierarchy: Hierarchy,
    cache: Arc<PixelCache>,
    labels: HashMap<String, String>,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new(Arc::new(PixelCache::default()))
    }
}

impl Workspace {
    pub fn new(cache: Arc<PixelCache>) -> Self {
        Self {
            hierarchy: Hierarchy::new(),
            cache,
            labels: HashMap::new(),
        }
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    pub fn cache(&self) -> &Arc<PixelCache> {
        &self.cache
    }

    pub fn instance(&self, sop_uid: &str) -> Option<&Arc<Instance>> {
        self.hierarchy.instance(sop_uid)
    }

    /// Label the instance was loaded from.
    pub fn label(&self, sop_uid: &str) -> Option<&str> {
        self.labels.get(sop_uid).map(String::as_str)
    }

    /// Adds every parsed instance of `report` and returns how many were added.
    /// An instance replacing one with the same SOP Instance UID drops the
    /// cached frames of the old one.
    pub fn ingest(&mut self, report: LoadReport) -> usize {
        let added = report.instances.len();
        for loaded in report.instances {
            let sop_uid = loaded.instance.sop_instance_uid().to_string();
            if let Some(replaced) = self.hierarchy.add(loaded.instance) {
                log::info!("Replaced instance {}", replaced.sop_instance_uid());
                self.cache.invalidate_instance(replaced.sop_instance_uid());
            }
            self.labels.insert(sop_uid, loaded.label);
        }
        log::info!(
            "Workspace holds {} instance(s) after adding {added}",
            self.hierarchy.len()
        );
        added
    }

    pub fn remove(&mut self, sop_uid: &str) -> Option<Arc<Instance>> {
        let removed = self.hierarchy.remove(sop_uid)?;
        self.labels.remove(sop_uid);
        self.cache.invalidate_instance(sop_uid);
        Some(removed)
    }

    pub fn clear(&mut self) {
        self.hierarchy.clear();
        self.labels.clear();
        self.cache.clear();
    }

    /// The instance `delta` steps away from `sop_uid` in navigation order,
    /// clamped to the first and last instance.
    pub fn neighbour(&self, sop_uid: &str, delta: isize) -> Option<Arc<Instance>> {
        let order = self.hierarchy.navigation_order();
        let position = order
            .iter()
            .position(|instance| instance.sop_instance_uid() == sop_uid)?;
        let target = position
            .saturating_add_signed(delta)
            .min(order.len().saturating_sub(1));
        order.get(target).cloned()
    }

    /// Instances by load label, for the flat file listing.
    pub fn files(&self) -> Vec<(&str, &Arc<Instance>)> {
        let mut files: Vec<(&str, &Arc<Instance>)> = self
            .labels
            .iter()
            .filter_map(|(sop_uid, label)| Some((label.as_str(), self.instance(sop_uid)?)))
            .collect();
        files.sort_by(|a, b| {
            a.0.cmp(b.0)
                .then_with(|| a.1.sop_instance_uid().cmp(b.1.sop_instance_uid()))
        });
        files
    }
}

/// One navigation step that needs a frame rendered in the background.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRequest {
    pub generation: u64,
    pub sop_uid: String,
    pub frame: u32,
    /// `None` asks for the frame's default window.
    pub window: Option<Window>,
}

/// A frame ready to paint, with everything the overlays read from it.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub request: FrameRequest,
    pub window: Window,
    pub raw: Arc<RawFrame>,
    pub display: Arc<DisplayBuffer>,
    pub lut: ModalityLut,
    pub diffusion: Option<String>,
    pub metadata: Vec<String>,
}

impl Rendered {
    pub fn probe(&self, x: u32, y: u32) -> Result<PixelProbe, TransformError> {
        pixel_probe(&self.raw, &self.lut, self.window, x, y)
    }
}

/// Decodes and renders the frame a request names. Runs off the GUI thread.
pub fn render(
    cache: &PixelCache,
    instance: &Instance,
    request: FrameRequest,
) -> Result<Rendered, RenderError> {
    let raw = cache.get_raw(instance, request.frame)?;
    let window = request
        .window
        .unwrap_or_else(|| default_window(instance, request.frame, &raw));
    let display = cache.get_display(instance, request.frame, window)?;

    Ok(Rendered {
        window,
        raw,
        display,
        lut: ModalityLut::for_frame(instance, request.frame),
        diffusion: diffusion_info(instance, request.frame).map(|info| info.overlay_text()),
        metadata: metadata_lines(instance, request.frame),
        request,
    })
}

/// What the viewer currently shows.
///
/// Every change that needs a new frame bumps the generation and hands out a
/// [`FrameRequest`]; only the newest request's result is applied.
#[derive(Debug, Default)]
pub struct ViewState {
    current: Option<String>,
    frame: u32,
    frame_count: u32,
    window: Option<Window>,
    roi: Option<RoiResult>,
    generation: u64,
}

impl ViewState {
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn frame(&self) -> u32 {
        self.frame
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    pub fn window(&self) -> Option<Window> {
        self.window
    }

    pub fn roi(&self) -> Option<&RoiResult> {
        self.roi.as_ref()
    }

    /// Shows the first frame of `instance` with its default window.
    pub fn select(&mut self, instance: &Instance) -> FrameRequest {
        self.current = Some(instance.sop_instance_uid().to_string());
        self.frame = 0;
        self.frame_count = instance.frames().max(1);
        self.window = None;
        self.roi = None;
        self.request()
    }

    /// Moves to `frame`, clamped to the instance's range. Leaving the frame
    /// drops its ROI.
    pub fn go_to_frame(&mut self, frame: u32) -> Option<FrameRequest> {
        self.current.as_ref()?;
        let frame = frame.min(self.frame_count.saturating_sub(1));
        if frame == self.frame {
            return None;
        }
        self.frame = frame;
        self.roi = None;
        Some(self.request())
    }

    pub fn step_frame(&mut self, delta: i64) -> Option<FrameRequest> {
        let target = (i64::from(self.frame) + delta).clamp(0, i64::from(u32::MAX));
        self.go_to_frame(u32::try_from(target).unwrap_or(u32::MAX))
    }

    pub fn set_window(&mut self, window: Window) -> Option<FrameRequest> {
        self.current.as_ref()?;
        if self.window == Some(window) {
            return None;
        }
        self.window = Some(window);
        Some(self.request())
    }

    /// Back to the frame's default window.
    pub fn reset_window(&mut self) -> Option<FrameRequest> {
        self.current.as_ref()?;
        self.window = None;
        Some(self.request())
    }

    /// Whether `request` is still the newest one.
    pub fn accept(&self, request: &FrameRequest) -> bool {
        request.generation == self.generation
            && self.current.as_deref() == Some(request.sop_uid.as_str())
            && request.frame == self.frame
    }

    /// Takes over the window of a current render. Stale renders are dropped.
    pub fn apply(&mut self, rendered: &Rendered) -> bool {
        if !self.accept(&rendered.request) {
            log::debug!(
                "Discarding stale render of {} frame {} (generation {}, current {})",
                rendered.request.sop_uid,
                rendered.request.frame,
                rendered.request.generation,
                self.generation
            );
            return false;
        }
        self.window = Some(rendered.window);
        true
    }

    /// Computes the ROI of the shown frame, replacing any previous one.
    pub fn finalize_roi(
        &mut self,
        rendered: &Rendered,
        vertices: Vec<(f64, f64)>,
        mode: ValueMode,
    ) -> Result<&RoiResult, RoiError> {
        self.roi = None;
        let roi = RoiResult::finalize(vertices, &rendered.raw, &rendered.lut, mode)?;
        Ok(self.roi.insert(roi))
    }

    pub fn clear_roi(&mut self) {
        self.roi = None;
    }

    /// Forgets the current instance, and with it any render in flight.
    pub fn clear(&mut self) {
        let generation = self.generation + 1;
        *self = Self {
            generation,
            ..Self::default()
        };
    }

    fn request(&mut self) -> FrameRequest {
        self.generation += 1;
        FrameRequest {
            generation: self.generation,
            sop_uid: self.current.clone().unwrap_or_default(),
            frame: self.frame,
            window: self.window,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::decode::DecodeError;
    use crate::model::{load_sources, Source};
    use crate::testutil::{file, identity, mono16, text, u16_pixels, EXPLICIT_LE};
    use dicom::dictionary_std::tags;

    fn source(label: &str, sop: &str, number: i32, frames: u32) -> Source {
        let mut nodes = identity("1", "1.1", sop, Some(number));
        nodes.extend(mono16(2, 2, false));
        nodes.push(text(tags::NUMBER_OF_FRAMES, "IS", &frames.to_string()));
        let values: Vec<u16> = (0..4 * frames as u16).map(|v| v * 10).collect();
        let pixels = u16_pixels(&values, false);
        Source::new(label, file(EXPLICIT_LE, &nodes, Some(&pixels)))
    }

    fn workspace(sources: Vec<Source>) -> Workspace {
        let mut workspace = Workspace::default();
        workspace.ingest(load_sources(sources));
        workspace
    }

    #[test]
    fn only_the_newest_request_is_accepted() {
        let workspace = workspace(vec![source("a.dcm", "1.1.1", 1, 3)]);
        let instance = workspace.instance("1.1.1").unwrap();
        let mut view = ViewState::default();

        let first = view.select(instance);
        let second = view.step_frame(1).unwrap();
        assert!(!view.accept(&first));
        assert!(view.accept(&second));

        let rendered = render(workspace.cache(), instance, first).unwrap();
        assert!(!view.apply(&rendered));
        assert_eq!(view.window(), None);

        let rendered = render(workspace.cache(), instance, second).unwrap();
        assert!(view.apply(&rendered));
        assert_eq!(view.window(), Some(rendered.window));
        assert_eq!(rendered.metadata[6], "Frame: 2/3");
    }

    #[test]
    fn frame_navigation_clamps_and_clears_roi() {
        let workspace = workspace(vec![source("a.dcm", "1.1.1", 1, 3)]);
        let instance = workspace.instance("1.1.1").unwrap();
        let mut view = ViewState::default();
        assert!(view.step_frame(1).is_none());

        let request = view.select(instance);
        let rendered = render(workspace.cache(), instance, request).unwrap();
        view.apply(&rendered);
        let square = vec![(0.0, 0.0), (2.0, 0.0), (2.0, 2.0), (0.0, 2.0)];
        let roi = view
            .finalize_roi(&rendered, square, ValueMode::Stored)
            .unwrap();
        assert_eq!(roi.stats.mean, 15.0);

        assert_eq!(view.go_to_frame(10).map(|r| r.frame), Some(2));
        assert!(view.roi().is_none());
        assert!(view.go_to_frame(2).is_none());
        assert_eq!(view.step_frame(-5).map(|r| r.frame), Some(0));
    }

    #[test]
    fn rendered_frames_answer_probes() {
        let workspace = workspace(vec![source("a.dcm", "1.1.1", 1, 1)]);
        let instance = workspace.instance("1.1.1").unwrap();
        let mut view = ViewState::default();
        let mut request = view.select(instance);
        request.window = Some(Window::new(15.0, 30.0).unwrap());

        let rendered = render(workspace.cache(), instance, request).unwrap();
        assert_eq!((rendered.display.width(), rendered.display.height()), (2, 2));
        let probe = rendered.probe(1, 1).unwrap();
        assert_eq!(probe.raw, vec![30]);
        assert!(rendered.probe(2, 0).is_err());
        assert!(rendered.diffusion.is_none());
    }

    #[test]
    fn replacing_an_instance_drops_its_cached_frames() {
        let mut workspace = workspace(vec![source("a.dcm", "1.1.1", 1, 1)]);
        let instance = Arc::clone(workspace.instance("1.1.1").unwrap());
        workspace.cache().get_raw(&instance, 0).unwrap();
        assert!(workspace.cache().contains_raw(&instance, 0));

        workspace.ingest(load_sources(vec![source("b.dcm", "1.1.1", 1, 1)]));
        assert!(!workspace.cache().contains_raw(&instance, 0));
        assert_eq!(workspace.hierarchy().len(), 1);
        assert_eq!(workspace.label("1.1.1"), Some("b.dcm"));
    }

    #[test]
    fn neighbours_follow_navigation_order() {
        let mut workspace = workspace(vec![
            source("c.dcm", "1.1.3", 3, 1),
            source("a.dcm", "1.1.1", 1, 1),
            source("b.dcm", "1.1.2", 2, 1),
        ]);
        let next = |ws: &Workspace, sop, delta| {
            ws.neighbour(sop, delta)
                .map(|instance| instance.sop_instance_uid().to_string())
        };
        assert_eq!(next(&workspace, "1.1.1", 1).as_deref(), Some("1.1.2"));
        assert_eq!(next(&workspace, "1.1.1", -1).as_deref(), Some("1.1.1"));
        assert_eq!(next(&workspace, "1.1.2", 5).as_deref(), Some("1.1.3"));

        let labels: Vec<&str> = workspace.files().iter().map(|(label, _)| *label).collect();
        assert_eq!(labels, ["a.dcm", "b.dcm", "c.dcm"]);

        assert!(workspace.remove("1.1.2").is_some());
        assert_eq!(next(&workspace, "1.1.1", 1).as_deref(), Some("1.1.3"));
        assert!(workspace.label("1.1.2").is_none());
    }

    #[test]
    fn decode_failures_surface_as_render_errors() {
        let cache = PixelCache::new(
            CacheConfig::default(),
            |_: &Instance, _: u32| -> Result<RawFrame, DecodeError> {
                Err(DecodeError::NoPixelData)
            },
        );
        let mut workspace = Workspace::new(Arc::new(cache));
        workspace.ingest(load_sources(vec![source("a.dcm", "1.1.1", 1, 1)]));
        let instance = workspace.instance("1.1.1").unwrap();
        let request = ViewState::default().select(instance);
        assert!(matches!(
            render(workspace.cache(), instance, request),
            Err(RenderError::Decode(DecodeError::NoPixelData))
        ));
    }
}
