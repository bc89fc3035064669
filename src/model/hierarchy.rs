use super::instance::Instance;
use dicom::dictionary_std::tags;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Series {
    uid: String,
    number: Option<i64>,
    modality: Option<String>,
    description: Option<String>,
    /// Sorted by Instance Number, missing numbers last, then SOP Instance UID.
    instances: Vec<Arc<Instance>>,
}

impl Series {
    fn new(uid: &str, instance: &Instance) -> Self {
        Self {
            uid: uid.to_string(),
            number: instance.int(tags::SERIES_NUMBER),
            modality: instance.modality(),
            description: instance.text(tags::SERIES_DESCRIPTION),
            instances: Vec::new(),
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn number(&self) -> Option<i64> {
        self.number
    }

    pub fn modality(&self) -> Option<&str> {
        self.modality.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn instances(&self) -> &[Arc<Instance>] {
        &self.instances
    }

    fn insert(&mut self, instance: Arc<Instance>) {
        self.number = self.number.or_else(|| instance.int(tags::SERIES_NUMBER));
        self.modality = self.modality.take().or_else(|| instance.modality());
        self.description = self
            .description
            .take()
            .or_else(|| instance.text(tags::SERIES_DESCRIPTION));

        let position = self
            .instances
            .partition_point(|existing| instance_order(existing, &instance) == Ordering::Less);
        self.instances.insert(position, instance);
    }

    fn remove(&mut self, sop_uid: &str) -> Option<Arc<Instance>> {
        let position = self
            .instances
            .iter()
            .position(|instance| instance.sop_instance_uid() == sop_uid)?;
        Some(self.instances.remove(position))
    }
}

#[derive(Debug, Clone)]
pub struct Study {
    uid: String,
    date: Option<String>,
    description: Option<String>,
    patient_name: Option<String>,
    patient_id: Option<String>,
    series: BTreeMap<String, Series>,
}

impl Study {
    fn new(uid: &str, instance: &Instance) -> Self {
        Self {
            uid: uid.to_string(),
            date: instance.text(tags::STUDY_DATE),
            description: instance.text(tags::STUDY_DESCRIPTION),
            patient_name: instance.text(tags::PATIENT_NAME),
            patient_id: instance.text(tags::PATIENT_ID),
            series: BTreeMap::new(),
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn date(&self) -> Option<&str> {
        self.date.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn patient_name(&self) -> Option<&str> {
        self.patient_name.as_deref()
    }

    pub fn patient_id(&self) -> Option<&str> {
        self.patient_id.as_deref()
    }

    /// Series ordered by Series Number, missing numbers last, then UID.
    pub fn series(&self) -> Vec<&Series> {
        let mut series: Vec<&Series> = self.series.values().collect();
        series.sort_by(|a, b| {
            missing_last(a.number, b.number).then_with(|| a.uid.cmp(&b.uid))
        });
        series
    }
}

/// Study, series and instance index over every loaded object.
///
/// Each instance lives in exactly one series of exactly one study. Adding an
/// instance whose SOP Instance UID is already present replaces it, and
/// containers left empty by a move or a removal are pruned.
#[derive(Debug, Default)]
pub struct Hierarchy {
    studies: BTreeMap<String, Study>,
    /// SOP Instance UID to (study UID, series UID).
    locations: HashMap<String, (String, String)>,
}

impl Hierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `instance`, returning the instance it replaced.
    pub fn add(&mut self, instance: Arc<Instance>) -> Option<Arc<Instance>> {
        let sop_uid = instance.sop_instance_uid().to_string();
        let replaced = self.remove(&sop_uid);
        if replaced.is_some() {
            log::debug!("Replacing instance {sop_uid}");
        }

        let study_uid = instance.study_instance_uid().to_string();
        let series_uid = instance.series_instance_uid().to_string();

        let study = self
            .studies
            .entry(study_uid.clone())
            .or_insert_with(|| Study::new(&study_uid, &instance));
        study.date = study.date.take().or_else(|| instance.text(tags::STUDY_DATE));
        study
            .series
            .entry(series_uid.clone())
            .or_insert_with(|| Series::new(&series_uid, &instance))
            .insert(instance);

        self.locations.insert(sop_uid, (study_uid, series_uid));
        replaced
    }

    pub fn remove(&mut self, sop_uid: &str) -> Option<Arc<Instance>> {
        let (study_uid, series_uid) = self.locations.remove(sop_uid)?;
        let study = self.studies.get_mut(&study_uid)?;
        let series = study.series.get_mut(&series_uid)?;
        let removed = series.remove(sop_uid);

        if series.instances.is_empty() {
            study.series.remove(&series_uid);
        }
        if study.series.is_empty() {
            self.studies.remove(&study_uid);
        }
        removed
    }

    /// Studies ordered by Study Date, missing dates last, then UID.
    pub fn studies(&self) -> Vec<&Study> {
        let mut studies: Vec<&Study> = self.studies.values().collect();
        studies.sort_by(|a, b| {
            missing_last(a.date.as_deref(), b.date.as_deref()).then_with(|| a.uid.cmp(&b.uid))
        });
        studies
    }

    pub fn study(&self, study_uid: &str) -> Option<&Study> {
        self.studies.get(study_uid)
    }

    pub fn instance(&self, sop_uid: &str) -> Option<&Arc<Instance>> {
        let (study_uid, series_uid) = self.locations.get(sop_uid)?;
        self.studies
            .get(study_uid)?
            .series
            .get(series_uid)?
            .instances
            .iter()
            .find(|instance| instance.sop_instance_uid() == sop_uid)
    }

    /// Every instance in display order, used for next/previous navigation.
    pub fn navigation_order(&self) -> Vec<Arc<Instance>> {
        self.studies()
            .into_iter()
            .flat_map(Study::series)
            .flat_map(|series| series.instances.iter().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn clear(&mut self) {
        self.studies.clear();
        self.locations.clear();
    }
}

fn instance_order(a: &Instance, b: &Instance) -> Ordering {
    missing_last(a.instance_number(), b.instance_number())
        .then_with(|| a.sop_instance_uid().cmp(b.sop_instance_uid()))
}

fn missing_last<T: Ord>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
