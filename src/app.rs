use crate::message::Message;
use crate::views::{
    frame_handle, image_panel, metadata_panel, tree_panel, HeaderPanel, ImagePanel,
};
use iced::keyboard::{self, key::Named, Key};
use iced::widget::image::Handle;
use iced::widget::text::Wrapping;
use iced::widget::{button, column, container, row, scrollable, text};
use iced::{application, Alignment, Element, Length, Point, Subscription, Task, Theme};
use rfd::AsyncFileDialog;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use voxel::model::loader::is_dicom;
use voxel::model::{load_sources, HeaderScope, LoadReport, Source, TreeNodeKey, TreeViewMode};
use voxel::session::{render, FrameRequest, Rendered, ViewState, Workspace};
use voxel::{ValueMode, Window};

const APP_TITLE: &str = "Voxel";

pub fn run() -> iced::Result {
    let _ = env_logger::Builder::from_default_env()
        .format_timestamp_secs()
        .try_init();

    application(APP_TITLE, App::update, App::view)
        .subscription(App::subscription)
        .theme(App::theme)
        .run()
}

#[derive(Default)]
pub struct App {
    workspace: Workspace,
    view_state: ViewState,
    rendered: Option<Arc<Rendered>>,
    frame_image: Option<Handle>,
    collapsed_nodes: BTreeSet<TreeNodeKey>,
    tree_view_mode: TreeViewMode,
    header_scope: HeaderScope,
    header_filter: String,
    value_mode: ValueMode,
    cursor: Option<Point>,
    probe: Option<String>,
    roi_path: Option<Vec<(f64, f64)>>,
    roi_error: Option<String>,
    last_error: Option<String>,
}

impl App {
    pub fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::PickFiles => Task::perform(
                async {
                    let Some(handles) = AsyncFileDialog::new().pick_files().await else {
                        return LoadReport::default();
                    };
                    let mut sources = Vec::with_capacity(handles.len());
                    for handle in handles {
                        sources.push(Source::new(handle.file_name(), handle.read().await));
                    }
                    load_sources(sources)
                },
                Message::FilesLoaded,
            ),
            Message::PickFolder => Task::perform(
                async {
                    match AsyncFileDialog::new().pick_folder().await {
                        Some(folder) => load_sources(collect_folder(folder.path())),
                        None => LoadReport::default(),
                    }
                },
                Message::FilesLoaded,
            ),
            Message::FilesLoaded(report) => {
                self.last_error = report.failure_summary();
                let first = report
                    .instances
                    .first()
                    .map(|loaded| loaded.instance.sop_instance_uid().to_string());
                self.workspace.ingest(report);

                match first {
                    Some(sop_uid) if self.view_state.current().is_none() => self.select(&sop_uid),
                    _ => Task::none(),
                }
            }
            Message::SelectInstance(sop_uid) => self.select(&sop_uid),
            Message::StepInstance(delta) => {
                let next = self
                    .view_state
                    .current()
                    .and_then(|current| self.workspace.neighbour(current, delta));
                let current = self.view_state.current();
                match next.filter(|next| Some(next.sop_instance_uid()) != current) {
                    Some(instance) => self.select(instance.sop_instance_uid()),
                    None => Task::none(),
                }
            }
            Message::CloseInstance => {
                let Some(current) = self.view_state.current().map(str::to_string) else {
                    return Task::none();
                };
                let next = self
                    .workspace
                    .neighbour(&current, 1)
                    .filter(|next| next.sop_instance_uid() != current)
                    .or_else(|| self.workspace.neighbour(&current, -1))
                    .map(|next| next.sop_instance_uid().to_string())
                    .filter(|next| *next != current);
                self.workspace.remove(&current);
                self.clear_view();
                match next {
                    Some(sop_uid) => self.select(&sop_uid),
                    None => Task::none(),
                }
            }
            Message::CloseAll => {
                self.workspace.clear();
                self.clear_view();
                self.collapsed_nodes.clear();
                self.last_error = None;
                Task::none()
            }
            Message::ToggleNode(key) => {
                if !self.collapsed_nodes.remove(&key) {
                    self.collapsed_nodes.insert(key);
                }
                Task::none()
            }
            Message::SetTreeViewMode(mode) => {
                self.tree_view_mode = mode;
                Task::none()
            }
            Message::StepFrame(delta) => {
                let request = self.view_state.step_frame(delta);
                self.navigate(request)
            }
            Message::GoToFrame(frame) => {
                let request = self.view_state.go_to_frame(frame);
                self.navigate(request)
            }
            Message::FrameRendered(request, result) => {
                if !self.view_state.accept(&request) {
                    log::debug!(
                        "Dropping render of {} frame {} superseded by a newer request",
                        request.sop_uid,
                        request.frame
                    );
                    return Task::none();
                }
                match result {
                    Ok(rendered) => {
                        self.view_state.apply(&rendered);
                        self.rendered = Some(rendered);
                        self.repaint();
                    }
                    Err(err) => {
                        log::warn!(
                            "Frame {} of {} unavailable: {err}",
                            request.frame + 1,
                            request.sop_uid
                        );
                        self.rendered = None;
                        self.frame_image = None;
                        self.last_error = Some(format!("Frame {}: {err}", request.frame + 1));
                    }
                }
                Task::none()
            }
            Message::WindowCenterChanged(center) => {
                let width = self.current_window().width();
                self.change_window(center, width)
            }
            Message::WindowWidthChanged(width) => {
                let center = self.current_window().center();
                self.change_window(center, width)
            }
            Message::ResetWindow => {
                let request = self.view_state.reset_window();
                self.navigate(request)
            }
            Message::CursorMoved(point) => {
                self.cursor = Some(point);
                if let Some(path) = &mut self.roi_path {
                    path.push((f64::from(point.x), f64::from(point.y)));
                }
                self.probe = self.rendered.as_ref().and_then(|rendered| {
                    if point.x < 0.0 || point.y < 0.0 {
                        return None;
                    }
                    rendered
                        .probe(point.x as u32, point.y as u32)
                        .ok()
                        .map(|probe| probe.to_string())
                });
                Task::none()
            }
            Message::CursorLeft => {
                self.cursor = None;
                self.probe = None;
                Task::none()
            }
            Message::RoiStarted => {
                if self.rendered.is_some() {
                    self.view_state.clear_roi();
                    self.roi_error = None;
                    self.roi_path = Some(
                        self.cursor
                            .map(|point| vec![(f64::from(point.x), f64::from(point.y))])
                            .unwrap_or_default(),
                    );
                    self.repaint();
                }
                Task::none()
            }
            Message::RoiFinished => {
                if let Some(vertices) = self.roi_path.take() {
                    self.finalize_roi(vertices);
                }
                Task::none()
            }
            Message::ClearRoi => {
                self.roi_path = None;
                self.roi_error = None;
                self.view_state.clear_roi();
                self.repaint();
                Task::none()
            }
            Message::SetValueMode(mode) => {
                self.value_mode = mode;
                if let Some(vertices) = self.view_state.roi().map(|roi| roi.vertices.clone()) {
                    self.finalize_roi(vertices);
                }
                Task::none()
            }
            Message::SetHeaderScope(scope) => {
                self.header_scope = scope;
                Task::none()
            }
            Message::HeaderFilterChanged(filter) => {
                self.header_filter = filter;
                Task::none()
            }
        }
    }

    pub fn view(&self) -> Element<'_, Message> {
        let toolbar = row![
            button("Open Files").on_press(Message::PickFiles),
            button("Open Folder").on_press(Message::PickFolder),
            button("Close Instance").on_press(Message::CloseInstance),
            button("Close All").on_press(Message::CloseAll),
        ]
        .spacing(12);

        let selected = self.view_state.current();
        let tree_column = tree_panel(
            &self.workspace,
            self.tree_view_mode,
            &self.collapsed_nodes,
            selected,
        );
        let tree_panel = container(scrollable(tree_column))
            .padding(16)
            .width(Length::FillPortion(2));

        let instance = selected.and_then(|sop_uid| self.workspace.instance(sop_uid));
        let metadata_content = metadata_panel(HeaderPanel {
            instance: instance.map(Arc::as_ref),
            label: selected.and_then(|sop_uid| self.workspace.label(sop_uid)),
            scope: self.header_scope,
            frame: self.view_state.frame(),
            filter: &self.header_filter,
            has_entries: !self.workspace.hierarchy().is_empty(),
        });
        let metadata_panel = container(metadata_content)
            .padding(16)
            .width(Length::FillPortion(4));

        let roi_summary = match (&self.roi_error, self.view_state.roi()) {
            (Some(err), _) => Some(err.clone()),
            (None, Some(roi)) => Some(roi.stats.to_string()),
            (None, None) => None,
        };
        let image_content = image_panel(ImagePanel {
            image: self.frame_image.as_ref(),
            rendered: self.rendered.as_deref(),
            frame: self.view_state.frame(),
            frame_count: self.view_state.frame_count(),
            window: self.view_state.window(),
            probe: self.probe.as_deref(),
            roi: roi_summary,
            value_mode: self.value_mode,
        });
        let image_panel = container(scrollable(image_content))
            .padding(16)
            .width(Length::FillPortion(4))
            .height(Length::Fill)
            .align_x(Alignment::Center);

        let mut content = column![row![tree_panel, metadata_panel, image_panel]
            .spacing(16)
            .width(Length::Fill)
            .height(Length::Fill)]
        .spacing(16);

        if let Some(error) = &self.last_error {
            content = content.push(text(error).size(16).wrapping(Wrapping::Word));
        }

        column![toolbar, content]
            .padding(20)
            .spacing(20)
            .align_x(Alignment::Start)
            .into()
    }

    pub fn subscription(&self) -> Subscription<Message> {
        keyboard::on_key_press(|key, _modifiers| match key {
            Key::Named(Named::ArrowLeft) => Some(Message::StepFrame(-1)),
            Key::Named(Named::ArrowRight) => Some(Message::StepFrame(1)),
            Key::Named(Named::ArrowUp) => Some(Message::StepInstance(-1)),
            Key::Named(Named::ArrowDown) => Some(Message::StepInstance(1)),
            Key::Named(Named::Escape) => Some(Message::ClearRoi),
            _ => None,
        })
    }

    pub fn theme(&self) -> Theme {
        Theme::Dark
    }

    fn select(&mut self, sop_uid: &str) -> Task<Message> {
        let Some(instance) = self.workspace.instance(sop_uid).cloned() else {
            return Task::none();
        };
        self.roi_path = None;
        self.roi_error = None;
        self.probe = None;
        let request = self.view_state.select(&instance);
        self.request_frame(request)
    }

    fn navigate(&mut self, request: Option<FrameRequest>) -> Task<Message> {
        match request {
            Some(request) => {
                self.roi_path = None;
                self.roi_error = None;
                self.request_frame(request)
            }
            None => Task::none(),
        }
    }

    /// Renders off the update loop; the result is applied only if the
    /// request is still the newest when it arrives.
    fn request_frame(&self, request: FrameRequest) -> Task<Message> {
        let Some(instance) = self.workspace.instance(&request.sop_uid).cloned() else {
            return Task::none();
        };
        let cache = Arc::clone(self.workspace.cache());
        Task::perform(
            async move {
                let result = render(&cache, &instance, request.clone()).map(Arc::new);
                (request, result)
            },
            |(request, result)| Message::FrameRendered(request, result),
        )
    }

    fn current_window(&self) -> Window {
        self.view_state
            .window()
            .or(self.rendered.as_ref().map(|rendered| rendered.window))
            .unwrap_or_default()
    }

    fn change_window(&mut self, center: f64, width: f64) -> Task<Message> {
        match Window::new(center, width) {
            Ok(window) => {
                let request = self.view_state.set_window(window);
                self.navigate(request)
            }
            Err(err) => {
                self.last_error = Some(err.to_string());
                Task::none()
            }
        }
    }

    fn finalize_roi(&mut self, vertices: Vec<(f64, f64)>) {
        let Some(rendered) = self.rendered.clone() else {
            return;
        };
        if let Err(err) = self
            .view_state
            .finalize_roi(&rendered, vertices, self.value_mode)
        {
            log::debug!("ROI rejected: {err}");
            self.roi_error = Some(err.to_string());
        }
        self.repaint();
    }

    fn repaint(&mut self) {
        self.frame_image = self.rendered.as_ref().map(|rendered| {
            frame_handle(
                &rendered.display,
                self.view_state.roi().map(|roi| &roi.mask),
            )
        });
    }

    fn clear_view(&mut self) {
        self.view_state.clear();
        self.rendered = None;
        self.frame_image = None;
        self.probe = None;
        self.roi_path = None;
        self.roi_error = None;
    }
}

/// Every DICOM file below `root`. Files without the Part 10 preamble are skipped.
fn collect_folder(root: &Path) -> Vec<Source> {
    let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];
    let mut sources = Vec::new();

    while let Some(dir) = pending.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) => {
                log::warn!("Failed to read directory {}: {err}", dir.display());
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
                continue;
            }
            match std::fs::read(&path) {
                Ok(bytes) if is_dicom(&bytes) => {
                    let label = path
                        .strip_prefix(root)
                        .unwrap_or(&path)
                        .display()
                        .to_string();
                    sources.push(Source::new(label, bytes));
                }
                Ok(_) => log::debug!("Skipping non-DICOM file {}", path.display()),
                Err(err) => log::warn!("Failed to read {}: {err}", path.display()),
            }
        }
    }

    sources.sort_by(|a, b| a.label.cmp(&b.label));
    sources
}
