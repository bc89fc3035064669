/// Collapsible node of the study browser.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TreeNodeKey {
    Study(String),
    Series { study: String, series: String },
}

impl TreeNodeKey {
    pub fn study(study: &str) -> Self {
        Self::Study(study.to_string())
    }

    pub fn series(study: &str, series: &str) -> Self {
        Self::Series {
            study: study.to_string(),
            series: series.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TreeViewMode {
    /// Study, series and instance nesting.
    #[default]
    Hierarchy,
    /// Every loaded file by name, in navigation order.
    Files,
}
