use crate::allocator::AllocatedSubject;
use crate::{GroupId, Sex};
use ndarray::{Array2, Zip};
use tabled::Tabled;

#[derive(Debug, Clone, PartialEq, Tabled)]
pub struct SummaryRow {
    #[tabled(rename = "AssignedGroup")]
    pub group: GroupId,
    #[tabled(rename = "Sex")]
    pub sex: Sex,
    #[tabled(rename = "Count")]
    pub count: usize,
    #[tabled(rename = "MeanVonFrey", display = "display_mean")]
    pub mean: f64,
}

fn display_mean(mean: &f64) -> String {
    format!("{mean:.3}")
}

/// Count and mean baseline per (group, sex), built from assignment output
/// alone. Rows of the matrices are groups in ascending id order, columns
/// are sexes.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    groups: Vec<GroupId>,
    counts: Array2<usize>,
    sums: Array2<f64>,
}

impl Summary {
    pub fn from_rows(rows: &[AllocatedSubject]) -> Self {
        let mut groups: Vec<GroupId> = rows.iter().filter_map(|row| row.assignment.group()).collect();
        groups.sort_unstable();
        groups.dedup();

        let mut counts = Array2::<usize>::zeros((groups.len(), Sex::ALL.len()));
        let mut sums = Array2::<f64>::zeros((groups.len(), Sex::ALL.len()));
        for row in rows {
            let (Some(group), Some(baseline)) = (row.assignment.group(), row.subject.baseline) else {
                continue;
            };
            // `groups` holds every assigned group, so the search cannot miss.
            if let Ok(i) = groups.binary_search(&group) {
                let j = row.subject.sex.index();
                counts[[i, j]] += 1;
                sums[[i, j]] += baseline;
            }
        }
        Self { groups, counts, sums }
    }

    pub fn groups(&self) -> &[GroupId] {
        &self.groups
    }

    pub fn counts(&self) -> &Array2<usize> {
        &self.counts
    }

    /// Mean baseline matrix; `None` where a cell has no subjects.
    pub fn means(&self) -> Array2<Option<f64>> {
        Zip::from(&self.counts)
            .and(&self.sums)
            .map_collect(|&count, &sum| if count == 0 { None } else { Some(sum / count as f64) })
    }

    pub fn mean(&self, group: GroupId, sex: Sex) -> Option<f64> {
        let i = self.groups.binary_search(&group).ok()?;
        let count = self.counts[[i, sex.index()]];
        if count == 0 {
            None
        } else {
            Some(self.sums[[i, sex.index()]] / count as f64)
        }
    }

    pub fn count(&self, group: GroupId, sex: Sex) -> usize {
        self.groups
            .binary_search(&group)
            .map(|i| self.counts[[i, sex.index()]])
            .unwrap_or(0)
    }

    /// Non-empty cells, by group then sex.
    pub fn rows(&self) -> Vec<SummaryRow> {
        let means = self.means();
        let mut rows = Vec::new();
        for (i, group) in self.groups.iter().enumerate() {
            for sex in Sex::ALL {
                if let Some(mean) = means[[i, sex.index()]] {
                    rows.push(SummaryRow {
                        group: *group,
                        sex,
                        count: self.counts[[i, sex.index()]],
                        mean,
                    });
                }
            }
        }
        rows
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Smallest and largest cell mean.
    pub fn mean_range(&self) -> Option<(f64, f64)> {
        self.means().iter().flatten().fold(None, |range, &mean| match range {
            None => Some((mean, mean)),
            Some((lo, hi)) => Some((f64::min(lo, mean), f64::max(hi, mean))),
        })
    }
}
