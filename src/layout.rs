//! Merge layout: which column is the key, which columns date a row, which
//! columns travel together as a field group, and what the derived total sums.
//!
//! The built-in [`MergeLayout::default`] describes the MAESTRO commission
//! extracts. A layout can be dumped to YAML, edited, and loaded back with
//! `--layout`; every layout is validated once before a merge starts.

use std::{collections::HashMap, fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
    error::{MergeError, MergeResult},
    normalize::normalize_header,
};

pub const DEFAULT_KEY_COLUMN: &str = "LINEA";
pub const DEFAULT_TOTAL_COLUMN: &str = "INGRESO_TOTAL";
pub const PERIOD_COUNT: u8 = 7;

pub const DATE_PRIORITY_COLUMNS: &[&str] = &[
    "FECHA_PRIM_ING",
    "FECHA_CAPTURA",
    "FECHA_EXITOSO",
    "FECHA_PROC_EXITOSO",
    "FECHA_ACTIVACION",
    "FECHA_ALTA",
    "FECHA_PORTOUT",
];

/// A fixed set of columns that is always taken from one winning record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldGroup {
    pub name: String,
    pub columns: Vec<String>,
}

impl FieldGroup {
    pub fn new(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TotalSpec {
    pub column: String,
    pub summands: Vec<String>,
}

/// How the per-key seed row is picked before group overlays.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BaseSelection {
    /// Freshest record with content outside the key, date, and group
    /// columns; freshest record overall when no such record exists.
    #[default]
    Content,
    /// Freshest record overall.
    Latest,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MergeLayout {
    pub key_column: String,
    pub date_columns: Vec<String>,
    pub groups: Vec<FieldGroup>,
    pub total: TotalSpec,
    #[serde(default)]
    pub base_selection: BaseSelection,
}

fn period_amount_column(period: u8) -> String {
    if period == 1 {
        "MONTO_REC_PP1".to_string()
    } else {
        format!("MONTO_REC_ PP{period}")
    }
}

fn period_month_column(period: u8) -> String {
    if period <= 3 {
        format!("MES_REC_PP{period}")
    } else {
        format!("MES_PP{period}")
    }
}

fn period_group(period: u8) -> FieldGroup {
    FieldGroup {
        name: format!("PP{period}"),
        columns: vec![
            format!("ESTATUS_REC_PP{period}"),
            format!("MOTIVO_RECHAZO_PP{period}"),
            period_amount_column(period),
            format!("PCTJE_COM_REC_PP{period}"),
            // Legacy total column: counts for group membership, never summed.
            format!("REC_TOTAL_ PP{period}"),
            period_month_column(period),
        ],
    }
}

fn bonus_group(bonus: u8) -> FieldGroup {
    FieldGroup {
        name: format!("BP{bonus}"),
        columns: vec![
            format!("ESTATUS_BP{bonus}"),
            format!("MOTIVO_RECHAZO_BP{bonus}"),
            format!("MONTO_BP{bonus}"),
            format!("PP_BP{bonus}"),
            format!("MES_BP{bonus}"),
        ],
    }
}

impl Default for MergeLayout {
    fn default() -> Self {
        let mut groups = (1..=PERIOD_COUNT).map(period_group).collect::<Vec<_>>();
        groups.push(bonus_group(1));
        groups.push(bonus_group(2));

        let mut summands = vec!["MONTO_COM_INIC".to_string()];
        summands.extend((1..=PERIOD_COUNT).map(period_amount_column));
        summands.push("MONTO_BP1".to_string());
        summands.push("MONTO_BP2".to_string());

        Self {
            key_column: DEFAULT_KEY_COLUMN.to_string(),
            date_columns: DATE_PRIORITY_COLUMNS.iter().map(|c| c.to_string()).collect(),
            groups,
            total: TotalSpec {
                column: DEFAULT_TOTAL_COLUMN.to_string(),
                summands,
            },
            base_selection: BaseSelection::default(),
        }
    }
}

impl MergeLayout {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening layout file {path:?}"))?;
        let reader = BufReader::new(file);
        let layout: MergeLayout =
            serde_yaml::from_reader(reader).context("Parsing layout YAML")?;
        layout
            .validate()
            .with_context(|| format!("Validating layout {path:?}"))?;
        Ok(layout)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Creating layout file {path:?}"))?;
        serde_yaml::to_writer(file, self).context("Writing layout YAML")
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Serializing layout to YAML string")
    }

    pub fn validate(&self) -> MergeResult<()> {
        let key = normalize_header(&self.key_column);
        if key.is_empty() {
            return Err(MergeError::InvalidLayout(
                "key column name cannot be empty".to_string(),
            ));
        }
        if normalize_header(&self.total.column).is_empty() {
            return Err(MergeError::InvalidLayout(
                "total column name cannot be empty".to_string(),
            ));
        }

        let total = normalize_header(&self.total.column);
        if self
            .total
            .summands
            .iter()
            .any(|summand| normalize_header(summand) == total)
        {
            return Err(MergeError::InvalidLayout(format!(
                "total column '{}' cannot be one of its own summands",
                self.total.column
            )));
        }
        if let Some(repeated) = self
            .total
            .summands
            .iter()
            .map(|summand| normalize_header(summand))
            .duplicates()
            .next()
        {
            return Err(MergeError::InvalidLayout(format!(
                "summand '{repeated}' is listed more than once"
            )));
        }

        let mut group_names: HashMap<String, &str> = HashMap::new();
        let mut owners: HashMap<String, &str> = HashMap::new();
        for group in &self.groups {
            let group_key = normalize_header(&group.name);
            if group_key.is_empty() {
                return Err(MergeError::InvalidLayout(
                    "field group names cannot be empty".to_string(),
                ));
            }
            if group_names.insert(group_key, &group.name).is_some() {
                return Err(MergeError::InvalidLayout(format!(
                    "field group '{}' is defined more than once",
                    group.name
                )));
            }
            if group.columns.is_empty() {
                return Err(MergeError::InvalidLayout(format!(
                    "field group '{}' has no columns",
                    group.name
                )));
            }
            for column in &group.columns {
                let normalized = normalize_header(column);
                if normalized == key {
                    return Err(MergeError::InvalidLayout(format!(
                        "field group '{}' cannot contain the key column '{}'",
                        group.name, self.key_column
                    )));
                }
                if let Some(previous) = owners.insert(normalized, &group.name) {
                    return Err(MergeError::InvalidLayout(format!(
                        "column '{column}' appears in both '{previous}' and '{}'",
                        group.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Normalized names of every column owned by a named group.
    pub fn grouped_columns(&self) -> impl Iterator<Item = String> + '_ {
        self.groups
            .iter()
            .flat_map(|group| group.columns.iter().map(|c| normalize_header(c)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_is_valid_and_complete() {
        let layout = MergeLayout::default();
        layout.validate().expect("default layout validates");
        assert_eq!(layout.groups.len(), 9);
        assert_eq!(layout.total.summands.len(), 10);
        assert_eq!(layout.groups[1].columns[2], "MONTO_REC_ PP2");
        assert_eq!(layout.groups[3].columns[5], "MES_PP4");
        assert!(layout.groups[0].columns.contains(&"REC_TOTAL_ PP1".to_string()));
        assert!(
            !layout
                .total
                .summands
                .iter()
                .any(|column| column.starts_with("REC_TOTAL"))
        );
    }

    #[test]
    fn overlapping_groups_are_rejected_case_and_space_insensitively() {
        let mut layout = MergeLayout::default();
        layout
            .groups
            .push(FieldGroup::new("EXTRA", &["monto_rec_pp2"]));
        let err = layout.validate().unwrap_err();
        assert!(err.to_string().contains("appears in both 'PP2' and 'EXTRA'"));
    }

    #[test]
    fn group_with_key_column_is_rejected() {
        let mut layout = MergeLayout::default();
        layout.groups.push(FieldGroup::new("BAD", &[" linea "]));
        assert!(matches!(
            layout.validate(),
            Err(MergeError::InvalidLayout(_))
        ));
    }

    #[test]
    fn duplicate_and_empty_groups_are_rejected() {
        let mut layout = MergeLayout::default();
        layout.groups.push(FieldGroup::new("pp1", &["OTHER"]));
        assert!(layout.validate().is_err());

        let mut layout = MergeLayout::default();
        layout.groups.push(FieldGroup::new("EMPTY", &[]));
        assert!(layout.validate().is_err());
    }

    #[test]
    fn total_cannot_sum_itself_or_repeat_a_summand() {
        let mut layout = MergeLayout::default();
        layout.total.summands.push("ingreso_total".into());
        assert!(matches!(layout.validate(), Err(MergeError::InvalidLayout(_))));

        let mut layout = MergeLayout::default();
        layout.total.summands.push("MONTO_BP1 ".into());
        let err = layout.validate().unwrap_err().to_string();
        assert!(err.contains("MONTO_BP1"), "{err}");
    }

    #[test]
    fn layout_round_trips_through_yaml_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("layout.yaml");
        let mut layout = MergeLayout::default();
        layout.base_selection = BaseSelection::Latest;
        layout.save(&path).expect("save layout");
        let loaded = MergeLayout::load(&path).expect("load layout");
        assert_eq!(loaded, layout);
    }

    #[test]
    fn base_selection_defaults_when_omitted() {
        let yaml = "key_column: ID\ndate_columns: []\ngroups: []\ntotal:\n  column: T\n  summands: []\n";
        let layout: MergeLayout = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(layout.base_selection, BaseSelection::Content);
        layout.validate().expect("minimal layout validates");
    }
}
