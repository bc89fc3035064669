use crate::components::segmented_toggle;
use crate::message::Message;
use iced::widget::text::Wrapping;
use iced::widget::{button, column, row, text, Column, Space};
use iced::{Element, Length};
use std::collections::BTreeSet;
use voxel::model::{Series, Study, TreeNodeKey, TreeViewMode};
use voxel::session::Workspace;
use voxel::Instance;

const INDENT: f32 = 18.0;

const MODES: [(&str, TreeViewMode); 2] = [
    ("Studies", TreeViewMode::Hierarchy),
    ("Files", TreeViewMode::Files),
];

pub fn tree_panel<'a>(
    workspace: &'a Workspace,
    tree_view_mode: TreeViewMode,
    collapsed_nodes: &BTreeSet<TreeNodeKey>,
    selected: Option<&str>,
) -> Column<'a, Message> {
    let root = column![
        text("Loaded Instances").size(20),
        segmented_toggle(&MODES, tree_view_mode, Message::SetTreeViewMode),
    ];

    if workspace.hierarchy().is_empty() {
        return root.push(text("No files loaded")).spacing(6);
    }

    match tree_view_mode {
        TreeViewMode::Files => build_file_list(root, workspace, selected),
        TreeViewMode::Hierarchy => build_study_tree(root, workspace, collapsed_nodes, selected),
    }
    .spacing(6)
}

fn marked(label: String, is_selected: bool) -> String {
    if is_selected {
        format!("▶ {label}")
    } else {
        label
    }
}

fn instance_button<'a>(
    label: String,
    instance: &Instance,
    selected: Option<&str>,
) -> Element<'a, Message> {
    let sop_uid = instance.sop_instance_uid();
    button(
        text(marked(label, selected == Some(sop_uid)))
            .wrapping(Wrapping::Word)
            .width(Length::Fill),
    )
    .on_press(Message::SelectInstance(sop_uid.to_string()))
    .into()
}

fn build_file_list<'a>(
    base: Column<'a, Message>,
    workspace: &'a Workspace,
    selected: Option<&str>,
) -> Column<'a, Message> {
    workspace
        .files()
        .into_iter()
        .fold(base, |column, (label, instance)| {
            column.push(instance_button(label.to_string(), instance, selected))
        })
}

fn study_label(study: &Study, collapsed: bool) -> String {
    let arrow = if collapsed { "▶" } else { "▼" };
    let patient = study
        .patient_name()
        .or(study.patient_id())
        .unwrap_or("Unknown patient");
    let mut label = format!("{arrow} {patient}");
    if let Some(date) = study.date() {
        label.push_str(&format!(" | {date}"));
    }
    label.push_str(&format!(" | {}", study.description().unwrap_or(study.uid())));
    label
}

fn series_label(series: &Series, collapsed: bool) -> String {
    let arrow = if collapsed { "▶" } else { "▼" };
    let number = series
        .number()
        .map_or_else(|| String::from("?"), |number| number.to_string());
    format!(
        "{arrow} Series {number} {} {} ({})",
        series.modality().unwrap_or(""),
        series.description().unwrap_or(series.uid()),
        series.instances().len()
    )
}

fn build_study_tree<'a>(
    base: Column<'a, Message>,
    workspace: &'a Workspace,
    collapsed_nodes: &BTreeSet<TreeNodeKey>,
    selected: Option<&str>,
) -> Column<'a, Message> {
    workspace
        .hierarchy()
        .studies()
        .into_iter()
        .fold(base, |mut column, study| {
            let study_key = TreeNodeKey::study(study.uid());
            let study_collapsed = collapsed_nodes.contains(&study_key);
            column = column.push(
                button(text(study_label(study, study_collapsed)).wrapping(Wrapping::Word))
                    .on_press(Message::ToggleNode(study_key)),
            );
            if study_collapsed {
                return column;
            }

            for series in study.series() {
                let series_key = TreeNodeKey::series(study.uid(), series.uid());
                let series_collapsed = collapsed_nodes.contains(&series_key);
                column = column.push(row![
                    Space::with_width(Length::Fixed(INDENT)),
                    button(text(series_label(series, series_collapsed)).wrapping(Wrapping::Word))
                        .on_press(Message::ToggleNode(series_key)),
                ]);
                if series_collapsed {
                    continue;
                }

                for instance in series.instances() {
                    let number = instance
                        .instance_number()
                        .map_or_else(|| String::from("#?"), |number| format!("#{number}"));
                    let frames = match instance.frames() {
                        1 => String::new(),
                        frames => format!(" [{frames} frames]"),
                    };
                    let label = format!("{number}{frames}  {}", instance.sop_instance_uid());
                    column = column.push(row![
                        Space::with_width(Length::Fixed(INDENT * 2.0)),
                        instance_button(label, instance, selected),
                    ]);
                }
            }
            column
        })
}
