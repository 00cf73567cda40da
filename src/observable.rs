use crate::error::{AllocationError, ValidationError};
use crate::{Batch, Baseline, Meta, Sex, Subject};
use calamine::{open_workbook_auto, Data, Range, Reader};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Cells read as a missing baseline.
const MISSING: [&str; 6] = ["", "NA", "N/A", "NaN", "nan", "null"];

/// Meaning of a column, resolved from its header.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Field {
    Id,
    Sex,
    Genotype,
    Baseline,
    Batch,
    AssignedGroup,
    Treatment,
    Meta(String),
}

impl Field {
    /// Headers are matched trimmed and case-insensitively.
    pub(crate) fn from_header(header: &str) -> Self {
        let trimmed = header.trim();
        match trimmed.to_lowercase().as_str() {
            "id" | "mouseid" => Field::Id,
            "sex" => Field::Sex,
            "genotype" => Field::Genotype,
            "vonfrey" => Field::Baseline,
            "batch" => Field::Batch,
            "assignedgroup" => Field::AssignedGroup,
            "treatment" => Field::Treatment,
            "grimace" => Field::Meta("Grimace".into()),
            "hotplate" => Field::Meta("Hotplate".into()),
            _ => Field::Meta(trimmed.into()),
        }
    }

    /// Name of the column in exported tables.
    pub(crate) fn name(&self) -> &str {
        match self {
            Field::Id => "MouseID",
            Field::Sex => "Sex",
            Field::Genotype => "Genotype",
            Field::Baseline => "VonFrey",
            Field::Batch => "Batch",
            Field::AssignedGroup => "AssignedGroup",
            Field::Treatment => "Treatment",
            Field::Meta(name) => name.as_str(),
        }
    }
}

/// Resolves a header row, checking that every required column is present once.
pub(crate) fn header_fields(headers: &csv::StringRecord) -> Result<Vec<Field>, AllocationError> {
    let fields: Vec<Field> = headers.iter().map(Field::from_header).collect();
    for (i, field) in fields.iter().enumerate() {
        if fields[..i].contains(field) {
            return Err(AllocationError::DuplicateColumn(field.name().into()));
        }
    }
    for (field, column) in [
        (Field::Id, "id"),
        (Field::Sex, "sex"),
        (Field::Genotype, "genotype"),
        (Field::Baseline, "vonfrey"),
    ] {
        if !fields.contains(&field) {
            return Err(AllocationError::MissingColumn(column));
        }
    }
    Ok(fields)
}

fn parse_baseline(raw: &str) -> Result<Option<Baseline>, ()> {
    let raw = raw.trim();
    if MISSING.contains(&raw) {
        return Ok(None);
    }
    match raw.parse::<Baseline>() {
        Ok(x) if x.is_finite() => Ok(Some(x)),
        _ => Err(()),
    }
}

/// Builds a `Subject` from one data row. `record` is 1-based.
///
/// Genotypes are only checked for presence here; whether they belong to the
/// design is decided at allocation time.
pub(crate) fn parse_subject(
    fields: &[Field],
    row: &csv::StringRecord,
    record: usize,
) -> Result<Subject, ValidationError> {
    let column = |wanted: &Field| {
        fields
            .iter()
            .position(|f| f == wanted)
            .and_then(|i| row.get(i))
            .map(str::trim)
            .unwrap_or("")
    };

    let id = column(&Field::Id);
    if id.is_empty() {
        return Err(ValidationError::MissingId { record });
    }

    let sex_raw = column(&Field::Sex);
    if sex_raw.is_empty() {
        return Err(ValidationError::MissingSex { record, id: id.into() });
    }
    let sex = Sex::parse(sex_raw).ok_or_else(|| ValidationError::UnrecognizedSex {
        record,
        id: id.into(),
        value: sex_raw.into(),
    })?;

    let genotype = column(&Field::Genotype);
    if genotype.is_empty() {
        return Err(ValidationError::MissingGenotype { record, id: id.into() });
    }

    let baseline_raw = column(&Field::Baseline);
    let baseline = parse_baseline(baseline_raw).map_err(|_| ValidationError::InvalidBaseline {
        record,
        id: id.into(),
        value: baseline_raw.into(),
    })?;

    let meta: Meta = fields
        .iter()
        .zip(row.iter())
        .filter_map(|(field, value)| match field {
            Field::Meta(name) => Some((name.clone(), value.trim().to_string())),
            _ => None,
        })
        .collect();

    let mut subject = Subject::new(record, id, sex, genotype, baseline);
    subject.batch = Batch::new(column(&Field::Batch));
    subject.meta = meta;
    Ok(subject)
}

/// Produces Subjects from u8 delimited data
///
/// `Csv` implements Iterator so it can be passed
/// directly to `Sample::observe()`. Iteration stops after
/// the first error.
pub struct Csv {
    records: std::iter::Enumerate<csv::StringRecordsIntoIter<Box<dyn Read>>>,
    fields: Vec<Field>,
    failed: bool,
}

impl Csv {
    fn new(records: csv::StringRecordsIntoIter<Box<dyn Read>>, fields: Vec<Field>) -> Self {
        Self {
            records: records.enumerate(),
            fields,
            failed: false,
        }
    }

    /// Auxiliary column names, in column order.
    pub fn meta_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter_map(|f| match f {
                Field::Meta(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl Iterator for Csv {
    type Item = Result<Subject, AllocationError>;

    fn next(&mut self) -> Option<Result<Subject, AllocationError>> {
        if self.failed {
            return None;
        }
        let result = match self.records.next()? {
            (idx, Ok(row)) => parse_subject(&self.fields, &row, idx + 1).map_err(AllocationError::from),
            (_, Err(err)) => Err(AllocationError::from(err)),
        };
        self.failed = result.is_err();
        Some(result)
    }
}

pub struct CsvBuilder {
    delimiter: u8,
}

impl CsvBuilder {
    /// Construct a new Csv builder
    pub fn new() -> Self {
        Self { delimiter: b',' }
    }

    pub fn delimiter(&mut self, delimiter: u8) -> &mut Self {
        self.delimiter = delimiter;
        self
    }

    pub fn from_reader(&self, reader: Box<dyn Read>) -> Result<Csv, AllocationError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(self.delimiter)
            .from_reader(reader);
        let fields = header_fields(rdr.headers()?)?;
        Ok(Csv::new(rdr.into_records(), fields))
    }

    pub fn from_path<P: AsRef<Path>>(&self, path: P) -> Result<Csv, AllocationError> {
        let file = File::open(path)?;
        self.from_reader(Box::new(file))
    }
}

impl Default for CsvBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Extensions read with `SpreadsheetBuilder` rather than `CsvBuilder`.
pub const SPREADSHEET_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

pub fn is_spreadsheet<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SPREADSHEET_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Text of a cell as it would appear in a CSV export of the sheet.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(x) => x.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Produces Subjects from one worksheet.
///
/// The first row is the header row; it is matched the same way as a
/// CSV header.
pub struct Spreadsheet {
    records: std::iter::Enumerate<std::vec::IntoIter<csv::StringRecord>>,
    fields: Vec<Field>,
    failed: bool,
}

impl Spreadsheet {
    pub fn from_range(range: &Range<Data>) -> Result<Self, AllocationError> {
        let mut rows = range
            .rows()
            .map(|row| row.iter().map(cell_text).collect::<csv::StringRecord>());
        let headers = rows.next().unwrap_or_default();
        let fields = header_fields(&headers)?;
        let records: Vec<csv::StringRecord> = rows
            .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
            .collect();
        Ok(Self {
            records: records.into_iter().enumerate(),
            fields,
            failed: false,
        })
    }
}

impl Iterator for Spreadsheet {
    type Item = Result<Subject, AllocationError>;

    fn next(&mut self) -> Option<Result<Subject, AllocationError>> {
        if self.failed {
            return None;
        }
        let (idx, row) = self.records.next()?;
        let result = parse_subject(&self.fields, &row, idx + 1).map_err(AllocationError::from);
        self.failed = result.is_err();
        Some(result)
    }
}

#[derive(Default)]
pub struct SpreadsheetBuilder {
    sheet: Option<String>,
}

impl SpreadsheetBuilder {
    /// Construct a new builder reading the first sheet
    pub fn new() -> Self {
        Self { sheet: None }
    }

    pub fn sheet(&mut self, name: &str) -> &mut Self {
        self.sheet = Some(name.to_owned());
        self
    }

    pub fn from_path<P: AsRef<Path>>(&self, path: P) -> Result<Spreadsheet, AllocationError> {
        let spreadsheet_error = |err: calamine::Error| AllocationError::Spreadsheet(err.to_string());
        let mut workbook = open_workbook_auto(path).map_err(spreadsheet_error)?;
        let range = match &self.sheet {
            Some(name) => {
                if !workbook.sheet_names().contains(name) {
                    return Err(AllocationError::MissingSheet(name.clone()));
                }
                workbook.worksheet_range(name).map_err(spreadsheet_error)?
            }
            None => workbook
                .worksheet_range_at(0)
                .ok_or_else(|| AllocationError::Spreadsheet("workbook has no sheets".into()))?
                .map_err(spreadsheet_error)?,
        };
        Spreadsheet::from_range(&range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::*;
    use std::error::Error;

    fn read(data: &'static str) -> Result<Sample, AllocationError> {
        let mut sample = Sample::new();
        sample.observe(CsvBuilder::new().from_reader(Box::new(data.as_bytes()))?)?;
        Ok(sample)
    }

    #[test]
    fn test_headers_are_trimmed_and_case_insensitive() -> Result<(), Box<dyn Error>> {
        let sample = read(
            " ID ,SEX,Genotype,VonFrey,Grimace,hotplate,Batch\n\
             m1,Male,Cre-,1.25,0.5,12,2\n\
             m2,F,Cre+,0.75,0.1,9,1\n",
        )?;
        assert_eq!(sample.ids(), vec!["m1", "m2"]);
        let first = &sample.subjects()[0];
        assert_eq!(first.sex, Sex::Male);
        assert_eq!(first.genotype.as_str(), "Cre-");
        assert_eq!(first.baseline, Some(1.25));
        assert_eq!(first.batch.as_str(), "2");
        assert_eq!(first.meta("Grimace"), Some("0.5"));
        assert_eq!(first.meta("Hotplate"), Some("12"));
        assert_eq!(first.record, 1);
        assert_eq!(sample.subjects()[1].record, 2);
        Ok(())
    }

    #[test]
    fn test_unknown_columns_are_kept_in_order() -> Result<(), Box<dyn Error>> {
        let csv = CsvBuilder::new().from_reader(Box::new("cage,id,sex,genotype,vonfrey,notes\n".as_bytes()))?;
        assert_eq!(csv.meta_fields(), vec!["cage", "notes"]);
        Ok(())
    }

    #[test]
    fn test_batch_column_is_optional() -> Result<(), Box<dyn Error>> {
        let sample = read("id,sex,genotype,vonfrey\nm1,M,Cre-,3\n")?;
        assert_eq!(sample.subjects()[0].batch.as_str(), "");
        Ok(())
    }

    #[test]
    fn test_missing_required_column() {
        let err = read("id,sex,vonfrey\nm1,M,3\n").unwrap_err();
        assert!(matches!(err, AllocationError::MissingColumn("genotype")));
    }

    #[test]
    fn test_duplicate_column() {
        let err = read("id,ID,sex,genotype,vonfrey\n").unwrap_err();
        assert!(matches!(err, AllocationError::DuplicateColumn(name) if name == "MouseID"));
    }

    #[test]
    fn test_unrecognized_sex_names_the_record() {
        let err = read("id,sex,genotype,vonfrey\nm1,M,Cre-,3\nm2,X,Cre-,4\n").unwrap_err();
        assert_eq!(
            err.as_validation(),
            Some(&ValidationError::UnrecognizedSex {
                record: 2,
                id: "m2".into(),
                value: "X".into(),
            })
        );
        assert!(err.to_string().contains("m2"));
    }

    #[test]
    fn test_missing_id_and_genotype() {
        let err = read("id,sex,genotype,vonfrey\n,M,Cre-,3\n").unwrap_err();
        assert_eq!(err.as_validation(), Some(&ValidationError::MissingId { record: 1 }));
        let err = read("id,sex,genotype,vonfrey\nm1,M, ,3\n").unwrap_err();
        assert!(matches!(
            err.as_validation(),
            Some(ValidationError::MissingGenotype { record: 1, .. })
        ));
    }

    #[test]
    fn test_baseline_missing_markers_and_garbage() -> Result<(), Box<dyn Error>> {
        let sample = read("id,sex,genotype,vonfrey\nm1,M,Cre-,NA\nm2,M,Cre-,\nm3,M,Cre-,nan\n")?;
        assert!(sample.subjects().iter().all(|s| s.baseline.is_none()));

        let err = read("id,sex,genotype,vonfrey\nm1,M,Cre-,abc\n").unwrap_err();
        assert!(matches!(
            err.as_validation(),
            Some(ValidationError::InvalidBaseline { record: 1, .. })
        ));
        let err = read("id,sex,genotype,vonfrey\nm1,M,Cre-,inf\n").unwrap_err();
        assert!(err.as_validation().is_some());
        Ok(())
    }

    #[test]
    fn test_ragged_row_is_a_csv_error() {
        let err = read("id,sex,genotype,vonfrey\nm1,M,Cre-\n").unwrap_err();
        assert!(matches!(err, AllocationError::Csv(_)));
    }

    #[test]
    fn test_exported_table_can_be_read_back_in() -> Result<(), Box<dyn Error>> {
        let sample = read("MouseID,Sex,Genotype,VonFrey,Batch,AssignedGroup,Treatment\nm1,M,Cre-,3,1,3,Drug A\n")?;
        let subject = &sample.subjects()[0];
        assert_eq!(subject.id, "m1");
        assert_eq!(subject.batch.as_str(), "1");
        // Stale assignments are not carried along.
        assert!(subject.meta.is_empty());
        Ok(())
    }

    #[test]
    fn test_semicolon_delimiter() -> Result<(), Box<dyn Error>> {
        let mut sample = Sample::new();
        sample.observe(
            CsvBuilder::new()
                .delimiter(b';')
                .from_reader(Box::new("id;sex;genotype;vonfrey\nm1;F;Cre+;2.5\n".as_bytes()))?,
        )?;
        assert_eq!(sample.subjects()[0].baseline, Some(2.5));
        Ok(())
    }

    #[test]
    fn test_meta_values_are_trimmed() -> Result<(), Box<dyn Error>> {
        let sample = read("id,sex,genotype,vonfrey,grimace\nm1,M,Cre-,3, 0.5 \n")?;
        assert_eq!(sample.subjects()[0].meta("Grimace"), Some("0.5"));
        Ok(())
    }

    fn text(s: &str) -> Data {
        Data::String(s.into())
    }

    #[test]
    fn test_spreadsheet_range_uses_csv_rules() -> Result<(), Box<dyn Error>> {
        let mut range = Range::new((0, 0), (3, 4));
        for (col, header) in ["Id", " Sex", "GENOTYPE", "VonFrey", "Batch"].iter().enumerate() {
            range.set_value((0, col as u32), text(header));
        }
        range.set_value((1, 0), Data::Int(101));
        range.set_value((1, 1), text("Female"));
        range.set_value((1, 2), text("Cre+"));
        range.set_value((1, 3), Data::Float(0.25));
        range.set_value((1, 4), Data::Float(2.0));
        // Row 2 is left blank and skipped.
        range.set_value((3, 0), text("m2"));
        range.set_value((3, 1), text("M"));
        range.set_value((3, 2), text("Cre-"));
        range.set_value((3, 4), Data::Float(1.0));

        let mut sample = Sample::new();
        sample.observe(Spreadsheet::from_range(&range)?)?;
        assert_eq!(sample.ids(), vec!["101", "m2"]);
        let first = &sample.subjects()[0];
        assert_eq!(first.sex, Sex::Female);
        assert_eq!(first.baseline, Some(0.25));
        assert_eq!(first.batch.as_str(), "2");
        assert_eq!(sample.subjects()[1].baseline, None);
        Ok(())
    }

    #[test]
    fn test_spreadsheet_bad_sex_names_the_record() {
        let mut range = Range::new((0, 0), (1, 3));
        for (col, header) in ["id", "sex", "genotype", "vonfrey"].iter().enumerate() {
            range.set_value((0, col as u32), text(header));
        }
        range.set_value((1, 0), text("m1"));
        range.set_value((1, 1), text("X"));
        range.set_value((1, 2), text("Cre-"));
        range.set_value((1, 3), Data::Float(1.0));

        let mut sample = Sample::new();
        let err = Spreadsheet::from_range(&range)
            .and_then(|sheet| sample.observe(sheet))
            .unwrap_err();
        assert!(matches!(
            err.as_validation(),
            Some(ValidationError::UnrecognizedSex { record: 1, .. })
        ));
    }

    #[test]
    fn test_xlsx_workbook_is_read() -> Result<(), Box<dyn Error>> {
        use rust_xlsxwriter::Workbook;

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("mice.xlsx");
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        for (col, header) in ["ID", "Sex", "Genotype", "VonFrey", "Grimace", "Batch"].iter().enumerate() {
            sheet.write_string(0, col as u16, *header)?;
        }
        sheet.write_string(1, 0, "m1")?;
        sheet.write_string(1, 1, "Male")?;
        sheet.write_string(1, 2, "Cre-")?;
        sheet.write_number(1, 3, 1.5)?;
        sheet.write_number(1, 4, 0.0)?;
        sheet.write_number(1, 5, 1.0)?;
        workbook.save(&path)?;

        assert!(is_spreadsheet(&path));
        let mut sample = Sample::new();
        sample.observe(SpreadsheetBuilder::new().from_path(&path)?)?;
        let subject = &sample.subjects()[0];
        assert_eq!(subject.id, "m1");
        assert_eq!(subject.sex, Sex::Male);
        assert_eq!(subject.baseline, Some(1.5));
        assert_eq!(subject.meta("Grimace"), Some("0"));

        let err = SpreadsheetBuilder::new().sheet("Cohort 2").from_path(&path).err();
        assert!(matches!(err, Some(AllocationError::MissingSheet(name)) if name == "Cohort 2"));
        Ok(())
    }

    #[test]
    fn test_spreadsheet_extensions() {
        assert!(is_spreadsheet("cohort.XLSX"));
        assert!(is_spreadsheet("cohort.ods"));
        assert!(!is_spreadsheet("cohort.csv"));
        assert!(!is_spreadsheet("cohort"));
    }
}
