//! Assignment table as CSV.
//!
//! Columns are the canonical subject fields, the auxiliary columns in the
//! order they were first seen, `Batch`, then `AssignedGroup` and
//! `Treatment`. Unassigned subjects leave the last two empty.

use crate::allocator::{AllocatedSubject, Allocation};
use crate::error::{AllocationError, ValidationError};
use crate::observable::{header_fields, parse_subject, Field};
use crate::{GroupId, Subject, Treatment};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// Auxiliary column names across all rows, in first-seen order.
pub fn meta_fields(rows: &[AllocatedSubject]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for row in rows {
        for (name, _) in &row.subject.meta {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
    }
    names
}

/// Shortest text that parses back to the same value.
fn format_baseline(baseline: Option<f64>) -> String {
    baseline.map(|b| b.to_string()).unwrap_or_default()
}

/// Column names of the assignment table for the given auxiliary columns.
pub fn table_header(meta: &[String]) -> Vec<String> {
    let mut header: Vec<String> = [Field::Id, Field::Sex, Field::Genotype, Field::Baseline]
        .iter()
        .map(|f| f.name().to_string())
        .collect();
    header.extend(meta.iter().cloned());
    header.extend(
        [Field::Batch, Field::AssignedGroup, Field::Treatment]
            .iter()
            .map(|f| f.name().to_string()),
    );
    header
}

/// One row of the assignment table, aligned with `table_header(meta)`.
pub fn table_record(row: &AllocatedSubject, meta: &[String]) -> Vec<String> {
    let subject = &row.subject;
    let mut record: Vec<String> = vec![
        subject.id.clone(),
        subject.sex.to_string(),
        subject.genotype.to_string(),
        format_baseline(subject.baseline),
    ];
    record.extend(meta.iter().map(|name| subject.meta(name).unwrap_or("").to_string()));
    record.push(subject.batch.to_string());
    record.push(row.assignment.group().map(|g| g.to_string()).unwrap_or_default());
    record.push(row.assignment.treatment().map(Treatment::to_string).unwrap_or_default());
    record
}

pub fn write_csv<W: Write>(allocation: &Allocation, writer: W) -> Result<(), AllocationError> {
    let rows = allocation.rows();
    let meta = meta_fields(rows);
    let mut wtr = csv::Writer::from_writer(writer);

    wtr.write_record(table_header(&meta))?;
    for row in rows {
        wtr.write_record(table_record(row, &meta))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_path<P: AsRef<Path>>(allocation: &Allocation, path: P) -> Result<(), AllocationError> {
    write_csv(allocation, File::create(path)?)
}

/// One row of a previously exported table.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedRow {
    pub subject: Subject,
    pub group: Option<GroupId>,
    pub treatment: Option<Treatment>,
}

pub fn read_csv(reader: Box<dyn Read>) -> Result<Vec<ExportedRow>, AllocationError> {
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
    let fields = header_fields(rdr.headers()?)?;
    let group_col = fields.iter().position(|f| *f == Field::AssignedGroup);
    let treatment_col = fields.iter().position(|f| *f == Field::Treatment);

    let mut rows = Vec::new();
    for (idx, row) in rdr.records().enumerate() {
        let row = row?;
        let record = idx + 1;
        let subject = parse_subject(&fields, &row, record)?;
        let cell = |col: Option<usize>| col.and_then(|i| row.get(i)).map(str::trim).unwrap_or("");

        let group = match cell(group_col) {
            "" => None,
            raw => Some(raw.parse::<GroupId>().map_err(|_| ValidationError::InvalidGroup {
                record,
                id: subject.id.clone(),
                value: raw.into(),
            })?),
        };
        let treatment = match cell(treatment_col) {
            "" => None,
            raw => Some(Treatment::new(raw)),
        };
        rows.push(ExportedRow {
            subject,
            group,
            treatment,
        });
    }
    Ok(rows)
}
