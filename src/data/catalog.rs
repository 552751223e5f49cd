//! Course catalog: the record provider the optimizer resolves request ids against.
//! Loaded from CSV, XLSX (first sheet) or a JSON array of records.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use tracing::info;

use crate::data::course::{Course, CourseRow, GroupMapping, MAX_CREDIT_WEIGHT};
use crate::data::sheet::{read_first_sheet, SheetRows};
use crate::error::DataError;

#[derive(Debug, Clone, Default)]
pub struct CourseCatalog {
    courses: Vec<Course>,
    by_id: HashMap<u32, usize>,
}

impl CourseCatalog {
    /// Build from parsed courses. The first record wins for a repeated id; use
    /// [validate_catalog] beforehand to reject duplicates instead.
    pub fn new(courses: Vec<Course>) -> Self {
        let mut by_id = HashMap::with_capacity(courses.len());
        for (idx, course) in courses.iter().enumerate() {
            by_id.entry(course.id).or_insert(idx);
        }
        Self { courses, by_id }
    }

    /// Load by file extension (`csv`, `xlsx`/`xls`/`ods`, `json`) and validate, grouping
    /// courses with the built-in cross-list table.
    pub fn load(path: &Path) -> Result<Self, DataError> {
        Self::load_with(path, &GroupMapping::default())
    }

    pub fn load_with(path: &Path, groups: &GroupMapping) -> Result<Self, DataError> {
        let courses = match extension(path).as_deref() {
            Some("csv") => {
                let raw = read_file(path)?;
                parse_csv(raw.as_bytes(), groups)?
            }
            Some("xlsx" | "xlsm" | "xls" | "ods") => parse_workbook(path, groups)?,
            Some("json") => {
                let raw = read_file(path)?;
                parse_json(&raw, groups)?
            }
            _ => return Err(DataError::UnsupportedFormat(path.to_path_buf())),
        };

        let issues = validate_catalog(&courses);
        if !issues.is_empty() {
            return Err(DataError::InvalidCatalog(issues));
        }

        info!(path = %path.display(), courses = courses.len(), "loaded course catalog");
        Ok(Self::new(courses))
    }

    pub fn get(&self, id: u32) -> Option<&Course> {
        self.by_id.get(&id).map(|&idx| &self.courses[idx])
    }

    /// Resolve ids in order; the first unknown id is a [DataError::UnknownCourse].
    pub fn lookup(&self, ids: &[u32]) -> Result<Vec<&Course>, DataError> {
        ids.iter()
            .map(|&id| self.get(id).ok_or(DataError::UnknownCourse(id)))
            .collect()
    }

    pub fn courses(&self) -> &[Course] {
        &self.courses
    }

    pub fn len(&self) -> usize {
        self.courses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.courses.is_empty()
    }
}

pub fn parse_csv<R: std::io::Read>(
    reader: R,
    groups: &GroupMapping,
) -> Result<Vec<Course>, DataError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut courses = Vec::new();
    for (idx, record) in reader.deserialize::<CourseRow>().enumerate() {
        let row = record?;
        courses.push(course_from_row(row, idx + 2, groups)?);
    }
    Ok(courses)
}

pub fn parse_json(raw: &str, groups: &GroupMapping) -> Result<Vec<Course>, DataError> {
    let rows: Vec<CourseRow> = serde_json::from_str(raw)?;
    rows.into_iter()
        .enumerate()
        .map(|(idx, row)| course_from_row(row, idx + 1, groups))
        .collect()
}

fn parse_workbook(path: &Path, groups: &GroupMapping) -> Result<Vec<Course>, DataError> {
    let mut workbook =
        calamine::open_workbook_auto(path).map_err(|err| DataError::Xlsx(err.to_string()))?;
    let SheetRows { headers, rows } = read_first_sheet(&mut workbook)?;
    let headers = csv::StringRecord::from(headers);

    let mut courses = Vec::with_capacity(rows.len());
    for (idx, cells) in rows.into_iter().enumerate() {
        if cells.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let record = csv::StringRecord::from(cells);
        let row: CourseRow = record.deserialize(Some(&headers))?;
        courses.push(course_from_row(row, idx + 2, groups)?);
    }
    Ok(courses)
}

fn course_from_row(
    row: CourseRow,
    line: usize,
    groups: &GroupMapping,
) -> Result<Course, DataError> {
    Course::from_row(row, groups).map_err(|err| DataError::InvalidRecord {
        row: line,
        message: err.to_string(),
    })
}

/// Check a parsed catalog for records the optimizer cannot use. Returns one message per problem.
pub fn validate_catalog(courses: &[Course]) -> Vec<String> {
    let mut issues = Vec::new();
    let mut seen = HashSet::with_capacity(courses.len());

    for course in courses {
        let label = format!("course {}", course.id);
        if !seen.insert(course.id) {
            issues.push(format!("{label}: duplicate id"));
        }
        if course.section_id.is_empty() {
            issues.push(format!("{label}: empty primary_section_id"));
        }
        if !course.credit_weight.is_finite()
            || course.credit_weight <= 0.0
            || course.credit_weight > MAX_CREDIT_WEIGHT
        {
            issues.push(format!(
                "{label}: credit weight {} outside (0, {MAX_CREDIT_WEIGHT}]",
                course.credit_weight
            ));
        }
        let params = &course.price;
        if !params.predicted_price.is_finite() || params.predicted_price < 0.0 {
            issues.push(format!(
                "{label}: predicted price {} must be finite and non-negative",
                params.predicted_price
            ));
        }
        if !params.residual_mean.is_finite() {
            issues.push(format!("{label}: residual mean must be finite"));
        }
        if !params.residual_stdev.is_finite() || params.residual_stdev < 0.0 {
            issues.push(format!(
                "{label}: residual stdev {} must be finite and non-negative",
                params.residual_stdev
            ));
        }
    }

    issues
}

fn read_file(path: &Path) -> Result<String, DataError> {
    fs::read_to_string(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
uniqueid,primary_section_id,part_of_term,days_code,start_time_24hr,stop_time_24hr,credit_unit,price_predicted,resid_mean,resid_stdev,title
1,ACCT6110001,1,MW,08:30:00,10:00:00,0.5,1200,0,100,Core Accounting
2,ACCT6130002,2,TR,10:15,11:45,0.5,900,-5,80,
3,FNCE7310001,F,TBA,00:00,00:00,1.0,2500,12.5,300,Valuation
";

    #[test]
    fn csv_rows_become_courses() {
        let courses = parse_csv(CSV.as_bytes(), &GroupMapping::default()).unwrap();
        assert_eq!(courses.len(), 3);
        assert_eq!(courses[0].group_id, "FC_ACCT");
        assert_eq!(courses[1].group_id, "FC_ACCT");
        assert_eq!(courses[1].title, None);
        assert_eq!(courses[2].meeting.days_code, "TBA");
        assert!(validate_catalog(&courses).is_empty());
    }

    #[test]
    fn bad_time_reports_the_offending_line() {
        let csv = CSV.replace("10:15,11:45", "10h15,11:45");
        let err = parse_csv(csv.as_bytes(), &GroupMapping::default()).unwrap_err();
        match err {
            DataError::InvalidRecord { row, message } => {
                assert_eq!(row, 3);
                assert!(message.contains("10h15"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn lookup_rejects_unknown_ids() {
        let courses = parse_csv(CSV.as_bytes(), &GroupMapping::default()).unwrap();
        let catalog = CourseCatalog::new(courses);
        assert_eq!(catalog.lookup(&[3, 1]).unwrap()[0].id, 3);
        assert!(matches!(
            catalog.lookup(&[1, 99]),
            Err(DataError::UnknownCourse(99))
        ));
    }

    #[test]
    fn validation_flags_duplicates_and_bad_credits() {
        let mut courses = parse_csv(CSV.as_bytes(), &GroupMapping::default()).unwrap();
        courses[1].id = 1;
        courses[2].credit_weight = 0.0;
        let issues = validate_catalog(&courses);
        assert_eq!(issues.len(), 2);
        assert!(issues[0].contains("duplicate id"));
        assert!(issues[1].contains("credit weight"));
    }

    #[test]
    fn json_catalog_uses_the_same_field_names() {
        let json = r#"[{"id": 4, "primary_section_id": "MGMT6110003", "part_of_term": "S",
            "days_code": "F", "start_time": "12:00", "stop_time": "15:00", "credits": 1.0,
            "price_predicted": 10, "resid_mean": 0, "resid_stdev": 0}]"#;
        let courses = parse_json(json, &GroupMapping::default()).unwrap();
        assert_eq!(courses[0].id, 4);
        assert_eq!(courses[0].group_id, "FC_MGMT");
        assert_eq!(courses[0].meeting.duration_minutes(), 180);
    }
}
