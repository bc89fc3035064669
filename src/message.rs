use iced::Point;
use std::sync::Arc;
use voxel::cache::RenderError;
use voxel::model::{HeaderScope, LoadReport, TreeNodeKey, TreeViewMode};
use voxel::session::{FrameRequest, Rendered};
use voxel::ValueMode;

#[derive(Debug, Clone)]
pub enum Message {
    PickFiles,
    PickFolder,
    FilesLoaded(LoadReport),
    SelectInstance(String),
    StepInstance(isize),
    CloseInstance,
    CloseAll,
    ToggleNode(TreeNodeKey),
    SetTreeViewMode(TreeViewMode),
    StepFrame(i64),
    GoToFrame(u32),
    FrameRendered(FrameRequest, Result<Arc<Rendered>, RenderError>),
    WindowCenterChanged(f64),
    WindowWidthChanged(f64),
    ResetWindow,
    CursorMoved(Point),
    CursorLeft,
    RoiStarted,
    RoiFinished,
    ClearRoi,
    SetValueMode(ValueMode),
    SetHeaderScope(HeaderScope),
    HeaderFilterChanged(String),
}
