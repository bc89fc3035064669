use crate::message::Message;
use iced::border::{Border, Radius};
use iced::widget::button::{self, Button, Status};
use iced::widget::text::Wrapping;
use iced::widget::{container, row, text, Container};
use iced::{Alignment, Background, Color, Element, Length, Shadow, Theme};

const PILL: f32 = 999.0;
const INNER: f32 = 10.0;

/// Pill-shaped row of mutually exclusive options.
pub fn segmented_toggle<T>(
    options: &[(&'static str, T)],
    current: T,
    on_select: fn(T) -> Message,
) -> Container<'static, Message>
where
    T: Copy + PartialEq,
{
    let last = options.len().saturating_sub(1);
    let segments = options.iter().enumerate().map(|(index, &(label, value))| {
        let position = match index {
            0 => SegmentPosition::First,
            index if index == last => SegmentPosition::Last,
            _ => SegmentPosition::Middle,
        };
        Element::from(
            segment(label, value == current, position, on_select(value))
                .width(Length::FillPortion(1)),
        )
    });

    container(row(segments).spacing(0))
        .padding(3)
        .width(Length::Fill)
        .style(segmented_container_style)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentPosition {
    First,
    Middle,
    Last,
}

fn segment(
    label: &'static str,
    is_active: bool,
    position: SegmentPosition,
    message: Message,
) -> Button<'static, Message> {
    let content = container(text(label).size(14).wrapping(Wrapping::None))
        .width(Length::Fill)
        .height(Length::Fixed(32.0))
        .align_x(Alignment::Center)
        .align_y(Alignment::Center)
        .padding([6, 16]);

    iced::widget::button(content)
        .padding(0)
        .on_press(message)
        .style(move |theme, status| segment_style(theme, status, is_active, position))
}

fn segmented_container_style(theme: &Theme) -> container::Style {
    let palette = theme.extended_palette();

    container::Style {
        background: Some(Background::Color(palette.background.strong.color)),
        border: Border {
            color: palette.background.strong.color.scale_alpha(0.6),
            width: 1.0,
            radius: Radius::new(PILL),
        },
        ..Default::default()
    }
}

fn segment_style(
    theme: &Theme,
    status: Status,
    is_active: bool,
    position: SegmentPosition,
) -> button::Style {
    let palette = theme.extended_palette();
    let (active, idle) = (palette.primary, palette.background);

    let background_color = match (status, is_active) {
        (Status::Hovered, true) => active.base.color,
        (Status::Hovered, false) => idle.base.color.scale_alpha(0.8),
        (Status::Pressed, true) => active.base.color.scale_alpha(0.9),
        (Status::Pressed, false) => idle.base.color.scale_alpha(0.9),
        (Status::Disabled, true) => active.strong.color.scale_alpha(0.5),
        (Status::Disabled, false) => idle.strong.color.scale_alpha(0.2),
        (Status::Active, true) => active.strong.color,
        (Status::Active, false) => idle.strong.color.scale_alpha(0.4),
    };

    let text_color = if is_active {
        active.strong.text
    } else {
        idle.base.text
    };

    let (left, right) = match position {
        SegmentPosition::First => (PILL, INNER),
        SegmentPosition::Middle => (INNER, INNER),
        SegmentPosition::Last => (INNER, PILL),
    };

    button::Style {
        background: Some(Background::Color(background_color)),
        text_color,
        border: Border {
            color: Color::TRANSPARENT,
            width: 0.0,
            radius: Radius {
                top_left: left,
                top_right: right,
                bottom_right: right,
                bottom_left: left,
            },
        },
        shadow: Shadow::default(),
    }
}
