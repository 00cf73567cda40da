//! The group table: which (genotype, treatment) arm maps to which group,
//! how many subjects of each sex a group holds, and what to do with
//! subjects that have no baseline.

use crate::error::{AllocationError, DesignError};
use crate::{Genotype, GroupId, Treatment};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Arm {
    pub genotype: Genotype,
    pub treatment: Treatment,
    pub group: GroupId,
}

impl Arm {
    pub fn new(genotype: &str, treatment: &str, group: GroupId) -> Self {
        Self {
            genotype: Genotype::new(genotype),
            treatment: Treatment::new(treatment),
            group,
        }
    }
}

/// Handling of subjects whose baseline is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MissingBaseline {
    /// Fail the run with a validation error.
    #[default]
    Reject,
    /// Leave the subject out of the sex means and unassigned.
    Skip,
}

impl FromStr for MissingBaseline {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "reject" => Ok(MissingBaseline::Reject),
            "skip" => Ok(MissingBaseline::Skip),
            other => Err(format!("unknown missing-baseline policy '{other}', expected reject or skip")),
        }
    }
}

impl fmt::Display for MissingBaseline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingBaseline::Reject => f.write_str("reject"),
            MissingBaseline::Skip => f.write_str("skip"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Design {
    /// Arms in candidate order. For a given genotype, the arm listed first
    /// wins a deviation tie.
    #[serde(default = "Design::default_arms")]
    pub arms: Vec<Arm>,
    /// Subjects per (group, sex) cell.
    #[serde(default = "Design::default_capacity")]
    pub capacity: usize,
    #[serde(default)]
    pub missing_baseline: MissingBaseline,
}

impl Design {
    fn default_arms() -> Vec<Arm> {
        vec![
            Arm::new("Cre-", "Vehicle", 1),
            Arm::new("Cre+", "Vehicle", 2),
            Arm::new("Cre-", "Drug A", 3),
            Arm::new("Cre+", "Drug A", 4),
        ]
    }

    fn default_capacity() -> usize {
        8
    }

    pub fn new(arms: Vec<Arm>, capacity: usize) -> Result<Self, DesignError> {
        let design = Self {
            arms,
            capacity,
            missing_baseline: MissingBaseline::default(),
        };
        design.validate()?;
        Ok(design)
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_missing_baseline(mut self, policy: MissingBaseline) -> Self {
        self.missing_baseline = policy;
        self
    }

    pub fn validate(&self) -> Result<(), DesignError> {
        if self.arms.is_empty() {
            return Err(DesignError::NoArms);
        }
        let mut groups = HashSet::new();
        let mut pairs = HashSet::new();
        for arm in &self.arms {
            if !groups.insert(arm.group) {
                return Err(DesignError::DuplicateGroup { group: arm.group });
            }
            if !pairs.insert((&arm.genotype, &arm.treatment)) {
                return Err(DesignError::DuplicateArm {
                    genotype: arm.genotype.to_string(),
                    treatment: arm.treatment.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Candidate arms for a genotype, in tie-break order.
    pub fn candidates<'a>(&'a self, genotype: &'a Genotype) -> impl Iterator<Item = &'a Arm> + 'a {
        self.arms.iter().filter(move |arm| &arm.genotype == genotype)
    }

    pub fn recognizes(&self, genotype: &Genotype) -> bool {
        self.arms.iter().any(|arm| &arm.genotype == genotype)
    }

    /// Group ids in the order their arms are listed.
    pub fn groups(&self) -> Vec<GroupId> {
        self.arms.iter().map(|arm| arm.group).collect()
    }

    pub fn arm(&self, group: GroupId) -> Option<&Arm> {
        self.arms.iter().find(|arm| arm.group == group)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, DesignError> {
        let design: Self = toml::from_str(contents).map_err(|err| DesignError::Parse(err.to_string()))?;
        design.validate()?;
        Ok(design)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, AllocationError> {
        let contents = fs::read_to_string(path)?;
        Ok(Self::from_toml_str(&contents)?)
    }
}

impl Default for Design {
    fn default() -> Self {
        Self {
            arms: Self::default_arms(),
            capacity: Self::default_capacity(),
            missing_baseline: MissingBaseline::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_default_design_is_the_four_group_table() {
        let design = Design::default();
        assert_eq!(design.capacity, 8);
        assert_eq!(design.groups(), vec![1, 2, 3, 4]);
        let cre_minus = Genotype::new("Cre-");
        let arms: Vec<(&str, GroupId)> = design
            .candidates(&cre_minus)
            .map(|arm| (arm.treatment.as_str(), arm.group))
            .collect();
        assert_eq!(arms, vec![("Vehicle", 1), ("Drug A", 3)]);
        assert!(design.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_is_default_design() -> Result<(), Box<dyn Error>> {
        assert_eq!(Design::from_toml_str("")?, Design::default());
        Ok(())
    }

    #[test]
    fn test_toml_design_with_three_arms() -> Result<(), Box<dyn Error>> {
        let design = Design::from_toml_str(
            r#"
            capacity = 4
            missing_baseline = "skip"

            [[arms]]
            genotype = "WT"
            treatment = "Saline"
            group = 10

            [[arms]]
            genotype = "WT"
            treatment = "Low"
            group = 11

            [[arms]]
            genotype = "WT"
            treatment = "High"
            group = 12
            "#,
        )?;
        assert_eq!(design.capacity, 4);
        assert_eq!(design.missing_baseline, MissingBaseline::Skip);
        assert_eq!(design.candidates(&Genotype::new("WT")).count(), 3);
        assert!(!design.recognizes(&Genotype::new("Cre+")));
        Ok(())
    }

    #[test]
    fn test_misspelled_keys_are_rejected() {
        let err = Design::from_toml_str("capcity = 4\n").unwrap_err();
        assert!(matches!(err, DesignError::Parse(_)));
        let err = Design::from_toml_str("missing-baseline = \"skip\"\n").unwrap_err();
        assert!(matches!(err, DesignError::Parse(_)));
        let err = Design::from_toml_str(
            "[[arms]]\ngenotype = \"WT\"\ntreatment = \"Saline\"\ngroup = 1\ncapacity = 2\n",
        )
        .unwrap_err();
        assert!(matches!(err, DesignError::Parse(_)));
    }

    #[test]
    fn test_duplicate_group_is_rejected() {
        let err = Design::new(vec![Arm::new("A", "x", 1), Arm::new("B", "x", 1)], 8).unwrap_err();
        assert_eq!(err, DesignError::DuplicateGroup { group: 1 });
    }

    #[test]
    fn test_duplicate_arm_is_rejected() {
        let err = Design::new(vec![Arm::new("A", "x", 1), Arm::new("A", "x", 2)], 8).unwrap_err();
        assert!(matches!(err, DesignError::DuplicateArm { .. }));
    }

    #[test]
    fn test_no_arms_is_rejected() {
        assert_eq!(Design::new(vec![], 8).unwrap_err(), DesignError::NoArms);
    }

    #[test]
    fn test_policy_parses_from_flag() {
        assert_eq!("skip".parse::<MissingBaseline>(), Ok(MissingBaseline::Skip));
        assert!("drop".parse::<MissingBaseline>().is_err());
    }
}
