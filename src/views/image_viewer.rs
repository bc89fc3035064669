use crate::components::segmented_toggle;
use crate::message::Message;
use iced::widget::image::Handle;
use iced::widget::text::Wrapping;
use iced::widget::{button, column, container, mouse_area, row, slider, text, Column, Image};
use iced::{Alignment, Element, Length};
use voxel::frame::DisplayBuffer;
use voxel::roi::Mask;
use voxel::session::Rendered;
use voxel::{ValueMode, Window};

const CENTER_RANGE: (f64, f64) = (-2048.0, 4096.0);
const WIDTH_RANGE: (f64, f64) = (1.0, 8192.0);

const VALUE_MODES: [(&str, ValueMode); 2] = [
    ("Stored values", ValueMode::Stored),
    ("Modality values", ValueMode::Mapped),
];

/// Paints a display buffer, tinting the pixels of an ROI mask.
pub fn frame_handle(display: &DisplayBuffer, mask: Option<&Mask>) -> Handle {
    let mut rgba = display.to_rgba();
    if let Some(mask) = mask {
        for index in mask.indices() {
            if let Some(pixel) = rgba.get_mut(index * 4..index * 4 + 3) {
                pixel[0] = pixel[0] / 2 + 128;
                pixel[1] /= 2;
                pixel[2] /= 2;
            }
        }
    }
    Handle::from_rgba(display.width(), display.height(), rgba)
}

pub struct ImagePanel<'a> {
    pub image: Option<&'a Handle>,
    pub rendered: Option<&'a Rendered>,
    pub frame: u32,
    pub frame_count: u32,
    pub window: Option<Window>,
    pub probe: Option<&'a str>,
    pub roi: Option<String>,
    pub value_mode: ValueMode,
}

pub fn image_panel(panel: ImagePanel<'_>) -> Element<'_, Message> {
    let (Some(handle), Some(rendered)) = (panel.image, panel.rendered) else {
        return text("Select an instance to view its frames").into();
    };

    let display = &rendered.display;
    let picture = mouse_area(
        Image::new(handle.clone())
            .width(Length::Fixed(display.width() as f32))
            .height(Length::Fixed(display.height() as f32)),
    )
    .on_move(Message::CursorMoved)
    .on_exit(Message::CursorLeft)
    .on_press(Message::RoiStarted)
    .on_release(Message::RoiFinished);

    let overlay = rendered
        .metadata
        .iter()
        .chain(&rendered.diffusion)
        .fold(Column::new().spacing(2), |column, line| {
            column.push(text(line.as_str()).size(13))
        });

    column![
        container(picture).center_x(Length::Fill),
        overlay,
        text(panel.probe.unwrap_or("Move over the image to probe a pixel")).size(13),
        frame_controls(panel.frame, panel.frame_count),
        window_controls(panel.window.unwrap_or(rendered.window)),
        roi_controls(panel.roi, panel.value_mode),
    ]
    .spacing(12)
    .into()
}

fn frame_controls<'a>(frame: u32, frame_count: u32) -> Column<'a, Message> {
    let stepper = row![
        button("◀").on_press(Message::StepFrame(-1)),
        text(format!("Frame {}/{}", frame + 1, frame_count)),
        button("▶").on_press(Message::StepFrame(1)),
    ]
    .spacing(8)
    .align_y(Alignment::Center);

    let controls = column![stepper].spacing(6);
    if frame_count > 1 {
        controls.push(slider(0..=frame_count - 1, frame, Message::GoToFrame))
    } else {
        controls
    }
}

fn window_controls<'a>(window: Window) -> Column<'a, Message> {
    let center = window.center().clamp(CENTER_RANGE.0, CENTER_RANGE.1);
    let width = window.width().clamp(WIDTH_RANGE.0, WIDTH_RANGE.1);
    column![
        row![
            text(window.to_string()),
            button("Reset").on_press(Message::ResetWindow),
        ]
        .spacing(12)
        .align_y(Alignment::Center),
        row![
            text("Center").width(Length::Fixed(56.0)),
            slider(
                CENTER_RANGE.0..=CENTER_RANGE.1,
                center,
                Message::WindowCenterChanged
            )
            .step(1.0),
        ]
        .spacing(8),
        row![
            text("Width").width(Length::Fixed(56.0)),
            slider(WIDTH_RANGE.0..=WIDTH_RANGE.1, width, Message::WindowWidthChanged).step(1.0),
        ]
        .spacing(8),
    ]
    .spacing(6)
}

fn roi_controls<'a>(roi: Option<String>, value_mode: ValueMode) -> Column<'a, Message> {
    let summary = roi.unwrap_or_else(|| String::from("Drag over the image to outline an ROI"));
    column![
        segmented_toggle(&VALUE_MODES, value_mode, Message::SetValueMode),
        row![
            text(summary).wrapping(Wrapping::Word).width(Length::Fill),
            button("Clear ROI").on_press(Message::ClearRoi),
        ]
        .spacing(12)
        .align_y(Alignment::Center),
    ]
    .spacing(6)
}
