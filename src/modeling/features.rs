use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::models::*;

/// One design-matrix column and the predictor it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub name: String,
    /// Index into `PREDICTOR_NAMES`.
    pub predictor: usize,
}

/// Treatment coding for the linear model. The lowest observed level of each
/// factor is the reference and gets no column; ward stays numeric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureEncoder {
    enforcement_levels: Vec<EnforcementProceedings>,
    property_type_levels: Vec<PropertyType>,
}

impl FeatureEncoder {
    pub fn fit(records: &[AnalysisRecord]) -> Result<Self> {
        if records.is_empty() {
            return Err(PipelineError::EmptyTrainingSet);
        }

        let enforcement: BTreeSet<EnforcementProceedings> =
            records.iter().map(|r| r.enforcement_proceedings).collect();
        let property_types: BTreeSet<PropertyType> = records.iter().map(|r| r.property_type).collect();

        Ok(FeatureEncoder {
            enforcement_levels: enforcement.into_iter().collect(),
            property_type_levels: property_types.into_iter().collect(),
        })
    }

    pub fn enforcement_levels(&self) -> &[EnforcementProceedings] {
        &self.enforcement_levels
    }

    pub fn property_type_levels(&self) -> &[PropertyType] {
        &self.property_type_levels
    }

    pub fn terms(&self) -> Vec<Term> {
        let mut terms = Vec::new();
        for level in self.enforcement_levels.iter().skip(1) {
            terms.push(Term {
                name: format!("{}{}", COL_ENFORCEMENT, level),
                predictor: 0,
            });
        }
        for level in self.property_type_levels.iter().skip(1) {
            terms.push(Term {
                name: format!("{}{}", COL_PROPERTY_TYPE, level),
                predictor: 1,
            });
        }
        terms.push(Term {
            name: COL_PROPERTY_WARD.to_string(),
            predictor: 2,
        });
        terms
    }

    pub fn n_terms(&self) -> usize {
        self.enforcement_levels.len().saturating_sub(1) + self.property_type_levels.len().saturating_sub(1) + 1
    }

    pub fn encode(&self, predictors: &Predictors) -> Result<Array1<f64>> {
        let mut row = Array1::zeros(self.n_terms());
        let mut offset = 0;

        let enforcement = level_index(
            &self.enforcement_levels,
            &predictors.enforcement_proceedings,
            COL_ENFORCEMENT,
        )?;
        if enforcement > 0 {
            row[offset + enforcement - 1] = 1.0;
        }
        offset += self.enforcement_levels.len() - 1;

        let property_type = level_index(
            &self.property_type_levels,
            &predictors.property_type,
            COL_PROPERTY_TYPE,
        )?;
        if property_type > 0 {
            row[offset + property_type - 1] = 1.0;
        }
        offset += self.property_type_levels.len() - 1;

        row[offset] = predictors.property_ward as f64;
        Ok(row)
    }

    pub fn design_matrix(&self, records: &[AnalysisRecord]) -> Result<Array2<f64>> {
        let mut x = Array2::zeros((records.len(), self.n_terms()));
        for (i, record) in records.iter().enumerate() {
            x.row_mut(i).assign(&self.encode(&record.predictors())?);
        }
        Ok(x)
    }
}

fn level_index<T: PartialEq + ToString>(levels: &[T], value: &T, column: &str) -> Result<usize> {
    levels
        .iter()
        .position(|l| l == value)
        .ok_or_else(|| PipelineError::UnseenCategory {
            column: column.to_string(),
            level: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::record;

    fn training() -> Vec<AnalysisRecord> {
        vec![
            record(1, PropertyType::LowRise, 3, EnforcementProceedings::Yes, "2020-01-01", "2020-01-09"),
            record(2, PropertyType::HighRise, 7, EnforcementProceedings::No, "2020-02-01", "2020-02-03"),
            record(3, PropertyType::Hospital, 12, EnforcementProceedings::No, "2020-03-01", "2020-03-30"),
        ]
    }

    #[test]
    fn test_reference_levels_have_no_column() {
        let encoder = FeatureEncoder::fit(&training()).unwrap();
        let names: Vec<String> = encoder.terms().into_iter().map(|t| t.name).collect();

        assert_eq!(
            names,
            vec![
                "enforcement_proceedingsyes",
                "property_typelow rise",
                "property_typehospital",
                "property_ward"
            ]
        );
        assert_eq!(encoder.n_terms(), 4);
    }

    #[test]
    fn test_encode_row() {
        let encoder = FeatureEncoder::fit(&training()).unwrap();
        let row = encoder.encode(&training()[2].predictors()).unwrap();
        assert_eq!(row.to_vec(), vec![0.0, 0.0, 1.0, 12.0]);

        let x = encoder.design_matrix(&training()).unwrap();
        assert_eq!(x.dim(), (3, 4));
        assert_eq!(x.row(0).to_vec(), vec![1.0, 1.0, 0.0, 3.0]);
    }

    #[test]
    fn test_unseen_level_is_an_error() {
        let encoder = FeatureEncoder::fit(&training()).unwrap();
        let predictors = Predictors {
            enforcement_proceedings: EnforcementProceedings::No,
            property_type: PropertyType::Detention,
            property_ward: 1,
        };

        match encoder.encode(&predictors) {
            Err(PipelineError::UnseenCategory { column, level }) => {
                assert_eq!(column, COL_PROPERTY_TYPE);
                assert_eq!(level, "detention");
            }
            other => panic!("expected UnseenCategory, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_training_set() {
        assert!(matches!(FeatureEncoder::fit(&[]), Err(PipelineError::EmptyTrainingSet)));
    }
}
