//! Greedy balanced allocation.
//!
//! Subjects are visited once, in batch order. Each one goes to whichever of
//! its genotype's arms would leave that arm's (group, sex) cell mean closest
//! to the population mean of the subject's sex. Assignments are never
//! revisited, so earlier batches get first pick of scarce slots.

use crate::design::{Design, MissingBaseline};
use crate::error::{AllocationError, ValidationError};
use crate::{Assignment, Baseline, GroupId, Sample, Sex, Subject, Treatment};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

pub type Cells = BTreeMap<(GroupId, Sex), GroupCell>;

/// Running state of one (group, sex) bucket.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupCell {
    count: usize,
    sum: Baseline,
    values: Vec<Baseline>,
}

impl GroupCell {
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn sum(&self) -> Baseline {
        self.sum
    }

    /// Baselines in the order they were assigned.
    pub fn values(&self) -> &[Baseline] {
        &self.values
    }

    pub fn mean(&self) -> Option<Baseline> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as Baseline)
        }
    }

    /// Mean of the cell if `baseline` were added to it.
    pub fn mean_with(&self, baseline: Baseline) -> Baseline {
        (self.sum + baseline) / (self.count + 1) as Baseline
    }

    fn push(&mut self, baseline: Baseline) {
        self.count += 1;
        self.sum += baseline;
        self.values.push(baseline);
    }
}

/// Per-sex mean baseline over the whole input population.
///
/// Computed once before any assignment and never updated, so subjects that
/// end up unassigned still count toward the target.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SexMeans {
    means: [Option<Baseline>; 2],
}

impl SexMeans {
    pub fn from_subjects(subjects: &[Subject]) -> Self {
        let mut sums = [0.0; 2];
        let mut counts = [0usize; 2];
        for subject in subjects {
            if let Some(baseline) = subject.baseline {
                sums[subject.sex.index()] += baseline;
                counts[subject.sex.index()] += 1;
            }
        }
        let mut means = [None; 2];
        for sex in Sex::ALL {
            let i = sex.index();
            if counts[i] > 0 {
                means[i] = Some(sums[i] / counts[i] as Baseline);
            }
        }
        Self { means }
    }

    pub fn get(&self, sex: Sex) -> Option<Baseline> {
        self.means[sex.index()]
    }
}

/// One arm a subject could join, with the deviation it would produce.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub group: GroupId,
    pub treatment: Treatment,
    /// `None` when the cell is already at capacity.
    pub deviation: Option<Baseline>,
}

/// State of a single allocation run.
pub struct Allocator<'d> {
    design: &'d Design,
    means: SexMeans,
    cells: Cells,
}

impl<'d> Allocator<'d> {
    pub fn new(design: &'d Design, means: SexMeans) -> Self {
        let cells = design
            .arms
            .iter()
            .flat_map(|arm| Sex::ALL.into_iter().map(move |sex| ((arm.group, sex), GroupCell::default())))
            .collect();
        Self { design, means, cells }
    }

    pub fn means(&self) -> &SexMeans {
        &self.means
    }

    pub fn cells(&self) -> &Cells {
        &self.cells
    }

    pub fn cell(&self, group: GroupId, sex: Sex) -> Option<&GroupCell> {
        self.cells.get(&(group, sex))
    }

    /// Evaluates every arm of the subject's genotype against the current state.
    ///
    /// Returns an empty list for a subject without a baseline.
    pub fn candidates(&self, subject: &Subject) -> Vec<Candidate> {
        let Some(baseline) = subject.baseline else {
            return Vec::new();
        };
        // A sex absent from the population has this subject as its only member.
        let target = self.means.get(subject.sex).unwrap_or(baseline);
        self.design
            .candidates(&subject.genotype)
            .map(|arm| {
                let deviation = self
                    .cells
                    .get(&(arm.group, subject.sex))
                    .filter(|cell| cell.count < self.design.capacity)
                    .map(|cell| (cell.mean_with(baseline) - target).abs());
                Candidate {
                    group: arm.group,
                    treatment: arm.treatment.clone(),
                    deviation,
                }
            })
            .collect()
    }

    /// Assigns one subject and commits the result to the cell state.
    pub fn assign(&mut self, subject: &Subject) -> Assignment {
        let Some(baseline) = subject.baseline else {
            debug!(id = %subject.id, "no baseline, left unassigned");
            return Assignment::MissingBaseline;
        };

        let mut best: Option<(Baseline, Candidate)> = None;
        for candidate in self.candidates(subject) {
            let Some(deviation) = candidate.deviation else {
                continue;
            };
            // Strictly smaller: on a tie the earlier arm keeps the slot.
            if best.as_ref().map_or(true, |(min, _)| deviation < *min) {
                best = Some((deviation, candidate));
            }
        }

        match best {
            Some((deviation, candidate)) => {
                if let Some(cell) = self.cells.get_mut(&(candidate.group, subject.sex)) {
                    cell.push(baseline);
                }
                debug!(
                    id = %subject.id,
                    sex = %subject.sex,
                    group = candidate.group,
                    treatment = %candidate.treatment,
                    deviation,
                    "assigned"
                );
                Assignment::Assigned {
                    group: candidate.group,
                    treatment: candidate.treatment,
                }
            }
            None => {
                warn!(
                    id = %subject.id,
                    sex = %subject.sex,
                    genotype = %subject.genotype,
                    batch = %subject.batch,
                    "every candidate group is full, left unassigned"
                );
                Assignment::CapacityExhausted
            }
        }
    }

    pub fn into_cells(self) -> Cells {
        self.cells
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AllocatedSubject {
    pub subject: Subject,
    pub assignment: Assignment,
}

/// Output of one run: every subject in processing order with its outcome.
#[derive(Debug, Clone)]
pub struct Allocation {
    rows: Vec<AllocatedSubject>,
    means: SexMeans,
    cells: Cells,
    capacity: usize,
}

impl Allocation {
    pub fn rows(&self) -> &[AllocatedSubject] {
        &self.rows
    }

    pub fn means(&self) -> &SexMeans {
        &self.means
    }

    pub fn cells(&self) -> &Cells {
        &self.cells
    }

    pub fn cell(&self, group: GroupId, sex: Sex) -> Option<&GroupCell> {
        self.cells.get(&(group, sex))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn assignment(&self, id: &str) -> Option<&Assignment> {
        self.rows
            .iter()
            .find(|row| row.subject.id == id)
            .map(|row| &row.assignment)
    }

    pub fn assigned(&self) -> usize {
        self.rows.iter().filter(|row| row.assignment.is_assigned()).count()
    }

    pub fn unassigned(&self) -> usize {
        self.rows.len() - self.assigned()
    }
}

/// Checks every record before anything is assigned.
fn validate(subjects: &[Subject], design: &Design) -> Result<(), ValidationError> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for subject in subjects {
        if let Some(first) = seen.insert(subject.id.as_str(), subject.record) {
            return Err(ValidationError::DuplicateId {
                record: subject.record,
                id: subject.id.clone(),
                first,
            });
        }
        if !design.recognizes(&subject.genotype) {
            return Err(ValidationError::UnrecognizedGenotype {
                record: subject.record,
                id: subject.id.clone(),
                value: subject.genotype.to_string(),
            });
        }
        if subject.baseline.is_none() && design.missing_baseline == MissingBaseline::Reject {
            return Err(ValidationError::MissingBaseline {
                record: subject.record,
                id: subject.id.clone(),
            });
        }
    }
    Ok(())
}

/// Allocates `subjects` (in input order) to the arms of `design`.
///
/// Fails without assigning anything if the design or any record is invalid.
/// Rows come back stably sorted by batch.
pub fn allocate(subjects: &[Subject], design: &Design) -> Result<Allocation, AllocationError> {
    design.validate()?;
    validate(subjects, design)?;

    let means = SexMeans::from_subjects(subjects);
    let mut order: Vec<&Subject> = subjects.iter().collect();
    order.sort_by(|a, b| a.batch.cmp(&b.batch));

    let mut allocator = Allocator::new(design, means);
    let rows: Vec<AllocatedSubject> = order
        .into_iter()
        .map(|subject| AllocatedSubject {
            assignment: allocator.assign(subject),
            subject: subject.clone(),
        })
        .collect();

    let allocation = Allocation {
        rows,
        means,
        cells: allocator.into_cells(),
        capacity: design.capacity,
    };
    info!(
        subjects = allocation.rows.len(),
        assigned = allocation.assigned(),
        unassigned = allocation.unassigned(),
        "allocation complete"
    );
    Ok(allocation)
}

pub trait Allocate {
    fn allocate(&self, design: &Design) -> Result<Allocation, AllocationError>;
}

impl Allocate for Sample {
    fn allocate(&self, design: &Design) -> Result<Allocation, AllocationError> {
        allocate(self.subjects(), design)
    }
}
