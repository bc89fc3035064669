use crate::message::Message;
use iced::widget::text::Wrapping;
use iced::widget::{column, pick_list, row, scrollable, text, text_input, Space};
use iced::{Element, Length};
use voxel::model::{header_rows, HeaderScope};
use voxel::Instance;

const INDENT: f32 = 14.0;

pub struct HeaderPanel<'a> {
    pub instance: Option<&'a Instance>,
    pub label: Option<&'a str>,
    pub scope: HeaderScope,
    pub frame: u32,
    pub filter: &'a str,
    pub has_entries: bool,
}

pub fn metadata_panel(panel: HeaderPanel<'_>) -> Element<'_, Message> {
    let Some(instance) = panel.instance else {
        return if panel.has_entries {
            text("Select an instance from the tree to inspect its header").into()
        } else {
            text("Load DICOM files to inspect their headers").into()
        };
    };

    let controls = row![
        pick_list(HeaderScope::ALL, Some(panel.scope), Message::SetHeaderScope),
        text_input("Filter by keyword, tag or value", panel.filter)
            .on_input(Message::HeaderFilterChanged)
            .width(Length::Fill),
    ]
    .spacing(12);

    let mut table = column![row![
        text("Keyword").width(Length::FillPortion(3)),
        text("Tag").width(Length::FillPortion(1)),
        text("VR").width(Length::FillPortion(1)),
        text("Value").width(Length::FillPortion(4)),
    ]
    .spacing(12)]
    .spacing(6);

    let rows = header_rows(instance, panel.scope, panel.frame, panel.filter);
    if rows.is_empty() {
        table = table.push(text("No elements match the filter"));
    }
    for header_row in rows {
        table = table.push(
            row![
                Space::with_width(Length::Fixed(INDENT * header_row.depth as f32)),
                text(header_row.label)
                    .width(Length::FillPortion(3))
                    .wrapping(Wrapping::Word),
                text(header_row.tag).width(Length::FillPortion(1)),
                text(header_row.vr).width(Length::FillPortion(1)),
                text(header_row.value)
                    .width(Length::FillPortion(4))
                    .wrapping(Wrapping::Word),
            ]
            .spacing(12),
        );
    }

    let title = match panel.label {
        Some(label) => format!("File: {label}"),
        None => format!("SOP Instance: {}", instance.sop_instance_uid()),
    };

    column![
        text(title).size(16),
        text(format!(
            "Transfer syntax: {} ({})  |  {} frame(s)",
            instance.transfer_syntax().name(),
            instance.transfer_syntax().uid(),
            instance.frames()
        ))
        .size(13),
        controls,
        scrollable(table),
    ]
    .spacing(12)
    .into()
}
