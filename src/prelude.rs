pub use crate::allocator::{allocate, Allocate, AllocatedSubject, Allocation, Allocator, GroupCell, SexMeans};
pub use crate::design::{Arm, Design, MissingBaseline};
pub use crate::error::{AllocationError, DesignError, ValidationError};
pub use crate::observable::{is_spreadsheet, Csv, CsvBuilder, Spreadsheet, SpreadsheetBuilder};
pub use crate::summary::{Summary, SummaryRow};
pub use crate::{Assignment, Batch, Genotype, GroupId, Sample, Sex, Subject, Treatment};
