use super::instance::Instance;
use super::parser::{has_dicom_magic, ParseError};
use std::sync::Arc;

/// One byte stream handed over by the file discovery side, with the label it
/// is reported under.
#[derive(Debug, Clone)]
pub struct Source {
    pub label: String,
    pub bytes: Vec<u8>,
}

impl Source {
    pub fn new(label: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            label: label.into(),
            bytes,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedInstance {
    pub label: String,
    pub instance: Arc<Instance>,
}

#[derive(Debug, Clone)]
pub struct LoadFailure {
    pub label: String,
    pub error: ParseError,
}

#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub instances: Vec<LoadedInstance>,
    pub failures: Vec<LoadFailure>,
}

impl LoadReport {
    /// One line per failed source, for display.
    pub fn failure_summary(&self) -> Option<String> {
        if self.failures.is_empty() {
            return None;
        }
        Some(
            self.failures
                .iter()
                .map(|failure| format!("{}: {}", failure.label, failure.error))
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }
}

/// Cheap check used to skip files that are not Part 10 streams.
pub fn is_dicom(bytes: &[u8]) -> bool {
    has_dicom_magic(bytes)
}

/// Parses every source. A failing source is recorded and never stops the rest.
pub fn load_sources(sources: Vec<Source>) -> LoadReport {
    let mut report = LoadReport::default();
    for Source { label, bytes } in sources {
        log::info!("Loading DICOM file: {label}");
        match Instance::parse(bytes) {
            Ok(instance) => report.instances.push(LoadedInstance {
                label,
                instance: Arc::new(instance),
            }),
            Err(error) => {
                log::warn!("{label}: failed to parse DICOM file ({error})");
                report.failures.push(LoadFailure { label, error });
            }
        }
    }
    report
}
