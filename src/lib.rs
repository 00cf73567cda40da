#![crate_name = "mouse_allocation"]
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

pub mod prelude;

pub mod allocator;
pub mod chart;
pub mod design;
pub mod error;
pub mod export;
pub mod observable;
pub mod summary;

use crate::error::AllocationError;

pub type GroupId = u32;
pub type Baseline = f64;
/// Auxiliary columns carried through unchanged, as (column name, value).
pub type Meta = Vec<(String, String)>;
pub type Subjects = Vec<Subject>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Sex {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
}

impl Sex {
    pub const ALL: [Sex; 2] = [Sex::Male, Sex::Female];

    /// Normalizes a sex label. Accepts `M`, `F`, `Male` and `Female`.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim() {
            "M" | "Male" => Some(Sex::Male),
            "F" | "Female" => Some(Sex::Female),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Sex::Male => "M",
            Sex::Female => "F",
        }
    }

    /// Column of this sex in per-sex matrices.
    pub fn index(self) -> usize {
        match self {
            Sex::Male => 0,
            Sex::Female => 1,
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Genotype(String);

impl Genotype {
    pub fn new(name: &str) -> Self {
        Self(name.trim().into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Genotype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Treatment(String);

impl Treatment {
    pub fn new(name: &str) -> Self {
        Self(name.trim().into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Treatment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Processing-order key of a subject.
///
/// Numeric batches compare by value, then text batches compare lexically,
/// and an empty batch sorts after everything else. The raw text is kept
/// for export.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    raw: String,
}

enum BatchKey<'a> {
    Numeric(f64),
    Label(&'a str),
    Empty,
}

impl Batch {
    pub fn new(raw: &str) -> Self {
        Self {
            raw: raw.trim().into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    fn key(&self) -> BatchKey<'_> {
        if self.raw.is_empty() {
            return BatchKey::Empty;
        }
        match self.raw.parse::<f64>() {
            Ok(x) if x.is_finite() => BatchKey::Numeric(x),
            _ => BatchKey::Label(&self.raw),
        }
    }
}

impl Ord for Batch {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.key(), other.key()) {
            (BatchKey::Numeric(a), BatchKey::Numeric(b)) => a.total_cmp(&b),
            (BatchKey::Label(a), BatchKey::Label(b)) => a.cmp(b),
            (BatchKey::Empty, BatchKey::Empty) => Ordering::Equal,
            (BatchKey::Numeric(_), _) => Ordering::Less,
            (_, BatchKey::Numeric(_)) => Ordering::Greater,
            (BatchKey::Label(_), BatchKey::Empty) => Ordering::Less,
            (BatchKey::Empty, BatchKey::Label(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for Batch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Batch {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Batch {}

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// One experimental unit to be allocated.
#[derive(Debug, Clone, PartialEq)]
pub struct Subject {
    /// 1-based position of the record in the input.
    pub record: usize,
    pub id: String,
    pub sex: Sex,
    pub genotype: Genotype,
    pub baseline: Option<Baseline>,
    pub batch: Batch,
    pub meta: Meta,
}

impl Subject {
    pub fn new(record: usize, id: &str, sex: Sex, genotype: &str, baseline: Option<Baseline>) -> Self {
        Self {
            record,
            id: id.into(),
            sex,
            genotype: Genotype::new(genotype),
            baseline,
            batch: Batch::default(),
            meta: Meta::new(),
        }
    }

    pub fn with_batch(mut self, batch: &str) -> Self {
        self.batch = Batch::new(batch);
        self
    }

    pub fn with_meta(mut self, name: &str, value: &str) -> Self {
        self.meta.push((name.into(), value.into()));
        self
    }

    pub fn meta(&self, name: &str) -> Option<&str> {
        self.meta
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Terminal outcome of one subject. Never revised once written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignment {
    Assigned { group: GroupId, treatment: Treatment },
    /// Every candidate cell for the subject's genotype and sex was full.
    CapacityExhausted,
    /// The subject had no baseline and the design skips such subjects.
    MissingBaseline,
}

impl Assignment {
    pub fn group(&self) -> Option<GroupId> {
        match self {
            Assignment::Assigned { group, .. } => Some(*group),
            _ => None,
        }
    }

    pub fn treatment(&self) -> Option<&Treatment> {
        match self {
            Assignment::Assigned { treatment, .. } => Some(treatment),
            _ => None,
        }
    }

    pub fn is_assigned(&self) -> bool {
        matches!(self, Assignment::Assigned { .. })
    }
}

/// The loaded population of subjects, in input order.
#[derive(Debug, Clone, Default)]
pub struct Sample {
    subjects: Subjects,
}

impl Sample {
    /// Constructs a new empty `Sample`
    ///
    /// The `Sample` can be filled by calling `observe()` with any
    /// source of subjects, such as `observable::Csv`.
    pub fn new() -> Self {
        Self {
            subjects: Subjects::new(),
        }
    }

    /// Observe all the subjects in the argument.
    ///
    /// Either every subject is added or, on the first error, none are.
    pub fn observe<I>(&mut self, observable: I) -> Result<(), AllocationError>
    where
        I: Iterator<Item = Result<Subject, AllocationError>>,
    {
        let observed = observable.collect::<Result<Subjects, _>>()?;
        self.subjects.extend(observed);
        Ok(())
    }

    pub fn push(&mut self, subject: Subject) {
        self.subjects.push(subject);
    }

    pub fn subjects(&self) -> &[Subject] {
        &self.subjects
    }

    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    /// The identifiers of all subjects in a sample
    pub fn ids(&self) -> Vec<&str> {
        self.subjects.iter().map(|s| s.id.as_str()).collect()
    }
}

impl From<Subjects> for Sample {
    fn from(subjects: Subjects) -> Self {
        Self { subjects }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sex_aliases_normalize() {
        assert_eq!(Sex::parse("Male"), Some(Sex::Male));
        assert_eq!(Sex::parse(" F "), Some(Sex::Female));
        assert_eq!(Sex::parse("X"), None);
        assert_eq!(Sex::parse("male"), None);
    }

    #[test]
    fn test_batches_sort_numeric_then_text_then_empty() {
        let mut batches: Vec<Batch> = ["", "b", "10", "2", "a", "2.5"]
            .iter()
            .map(|raw| Batch::new(raw))
            .collect();
        batches.sort();
        let order: Vec<&str> = batches.iter().map(Batch::as_str).collect();
        assert_eq!(order, vec!["2", "2.5", "10", "a", "b", ""]);
    }

    #[test]
    fn test_numerically_equal_batches_are_one_batch() {
        assert_eq!(Batch::new("1"), Batch::new("1.0"));
        assert_eq!(Batch::new("1").as_str(), "1");
    }

    #[test]
    fn test_observe_is_all_or_nothing() {
        let mut sample = Sample::new();
        let observed: Vec<Result<Subject, AllocationError>> = vec![
            Ok(Subject::new(1, "a", Sex::Male, "Cre-", Some(1.0))),
            Err(AllocationError::MissingColumn("id")),
        ];
        assert!(sample.observe(observed.into_iter()).is_err());
        assert!(sample.is_empty());
    }
}
