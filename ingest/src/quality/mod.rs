use crate::models::{PaymentType, RateCode};
use crate::schema::{CodeDomain, SchemaDescriptor};
use crate::utils::arrow::{encode_row, numeric_value, timestamp_micros};
use arrow::array::Array;
use arrow::record_batch::RecordBatch;
use common::config::QualityConfig;
use common::Result;
use serde::Serialize;
use std::collections::HashSet;

/// Rule classes, used to deduplicate score penalties: each class costs its
/// penalty once per batch no matter how many columns trip it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum IssueClass {
    MissingColumn,
    TypeMismatch,
    NullRate,
    NegativeValue,
    DictionaryCode,
    TimestampOrder,
    DuplicateRows,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub quality_score: f64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Scores a batch against the resolved schema before it is allowed anywhere
/// near the warehouse. Errors block the load; warnings only degrade the score.
pub struct QualityValidator {
    config: QualityConfig,
}

impl QualityValidator {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    pub fn validate(
        &self,
        batch: &RecordBatch,
        descriptor: &SchemaDescriptor,
    ) -> Result<ValidationResult> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut error_classes = HashSet::new();
        let mut warning_classes = HashSet::new();

        let num_rows = batch.num_rows();
        let batch_schema = batch.schema();

        // Required-column presence and declared-type compatibility
        for column in &descriptor.columns {
            match batch_schema.column_with_name(&column.name) {
                None => {
                    errors.push(format!("Required column {} is missing", column.name));
                    error_classes.insert(IssueClass::MissingColumn);
                }
                Some((_, field)) => {
                    if !column.column_type.matches_arrow(field.data_type()) {
                        warnings.push(format!(
                            "Column {} has type {:?}, expected {}",
                            column.name,
                            field.data_type(),
                            column.column_type.ddl_type()
                        ));
                        warning_classes.insert(IssueClass::TypeMismatch);
                    }
                }
            }
        }

        if num_rows > 0 {
            // Null-rate checks per required column
            for column in &descriptor.columns {
                let Some((col_idx, _)) = batch_schema.column_with_name(&column.name) else {
                    continue;
                };
                let array = batch.column(col_idx);
                let null_fraction = array.null_count() as f64 / num_rows as f64;
                let null_percentage = null_fraction * 100.0;
                let critical = descriptor.critical_columns.contains(&column.name);

                if null_fraction >= 1.0 {
                    errors.push(format!("Column {} is 100% null", column.name));
                    error_classes.insert(IssueClass::NullRate);
                } else if critical && null_fraction >= self.config.null_error_fraction {
                    errors.push(format!(
                        "Column {} has {:.1}% null values",
                        column.name, null_percentage
                    ));
                    error_classes.insert(IssueClass::NullRate);
                } else if null_fraction > self.config.null_warn_fraction {
                    warnings.push(format!(
                        "Column {} has {:.1}% null values",
                        column.name, null_percentage
                    ));
                    warning_classes.insert(IssueClass::NullRate);
                }
            }

            // Non-negative numeric fields
            for name in &descriptor.non_negative_columns {
                let Some((col_idx, _)) = batch_schema.column_with_name(name) else {
                    continue;
                };
                let array = batch.column(col_idx);
                let negative_count = (0..num_rows)
                    .filter(|&i| numeric_value(array, i).is_some_and(|v| v < 0.0))
                    .count();
                if negative_count > 0 {
                    let fraction = negative_count as f64 / num_rows as f64;
                    let message =
                        format!("{} records have negative {}", negative_count, name);
                    if fraction > self.config.range_error_fraction {
                        errors.push(message);
                        error_classes.insert(IssueClass::NegativeValue);
                    } else {
                        warnings.push(message);
                        warning_classes.insert(IssueClass::NegativeValue);
                    }
                }
            }

            // Dictionary-coded fields must hold known TLC codes
            for (name, domain) in &descriptor.code_columns {
                let Some((col_idx, _)) = batch_schema.column_with_name(name) else {
                    continue;
                };
                let array = batch.column(col_idx);
                let unknown_count = (0..num_rows)
                    .filter(|&i| {
                        numeric_value(array, i).is_some_and(|v| {
                            v.fract() != 0.0
                                || match domain {
                                    CodeDomain::Payment => {
                                        PaymentType::from_code(v as i64).is_none()
                                    }
                                    CodeDomain::Rate => RateCode::from_code(v as i64).is_none(),
                                }
                        })
                    })
                    .count();
                if unknown_count > 0 {
                    warnings.push(format!(
                        "{} records have {} codes outside the TLC dictionary",
                        unknown_count, name
                    ));
                    warning_classes.insert(IssueClass::DictionaryCode);
                }
            }

            // Pickup must not come after dropoff
            if let (Some(pickup), Some(dropoff)) =
                (&descriptor.pickup_column, &descriptor.dropoff_column)
            {
                if let (Some((pickup_idx, _)), Some((dropoff_idx, _))) = (
                    batch_schema.column_with_name(pickup),
                    batch_schema.column_with_name(dropoff),
                ) {
                    let pickup_array = batch.column(pickup_idx);
                    let dropoff_array = batch.column(dropoff_idx);
                    let inverted_count = (0..num_rows)
                        .filter(|&i| {
                            match (
                                timestamp_micros(pickup_array, i),
                                timestamp_micros(dropoff_array, i),
                            ) {
                                (Some(p), Some(d)) => p > d,
                                _ => false,
                            }
                        })
                        .count();
                    if inverted_count > 0 {
                        let fraction = inverted_count as f64 / num_rows as f64;
                        let message =
                            format!("{} trips have pickup after dropoff", inverted_count);
                        if fraction > self.config.range_error_fraction {
                            errors.push(message);
                            error_classes.insert(IssueClass::TimestampOrder);
                        } else {
                            warnings.push(message);
                            warning_classes.insert(IssueClass::TimestampOrder);
                        }
                    }
                }
            }

            // Exact duplicate rows are a warning, never a gate
            let duplicate_count = self.count_duplicate_rows(batch)?;
            if duplicate_count as f64 / num_rows as f64 > self.config.duplicate_warn_fraction {
                warnings.push(format!("{} exact duplicate rows detected", duplicate_count));
                warning_classes.insert(IssueClass::DuplicateRows);
            }
        }

        let quality_score = (100.0
            - error_classes.len() as f64 * self.config.error_penalty
            - warning_classes.len() as f64 * self.config.warning_penalty)
            .max(0.0);

        Ok(ValidationResult {
            is_valid: errors.is_empty(),
            quality_score,
            errors,
            warnings,
        })
    }

    fn count_duplicate_rows(&self, batch: &RecordBatch) -> Result<usize> {
        let mut seen = HashSet::new();
        let mut duplicates = 0usize;
        let mut row_buf = Vec::new();
        for row_idx in 0..batch.num_rows() {
            row_buf.clear();
            encode_row(batch, row_idx, &mut row_buf)?;
            if !seen.insert(row_buf.clone()) {
                duplicates += 1;
            }
        }
        Ok(duplicates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TripType;
    use crate::schema::SchemaResolver;
    use arrow::array::{
        ArrayRef, Float64Array, Int64Array, StringArray, TimestampMicrosecondArray,
    };
    use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
    use std::sync::Arc;

    fn default_config() -> QualityConfig {
        QualityConfig {
            null_warn_fraction: 0.05,
            null_error_fraction: 0.5,
            range_error_fraction: 0.01,
            duplicate_warn_fraction: 0.01,
            error_penalty: 20.0,
            warning_penalty: 5.0,
        }
    }

    fn timestamp_field(name: &str) -> Field {
        Field::new(name, DataType::Timestamp(TimeUnit::Microsecond, None), true)
    }

    /// A well-formed yellow batch with `n` rows and every required column.
    fn yellow_batch(n: usize) -> RecordBatch {
        let resolver = SchemaResolver::new();
        let descriptor = resolver.resolve(TripType::Yellow).unwrap();

        let fields: Vec<Field> = descriptor
            .columns
            .iter()
            .map(|c| match c.column_type {
                crate::schema::ColumnType::Integer => Field::new(c.name.as_str(), DataType::Int64, true),
                crate::schema::ColumnType::Float => Field::new(c.name.as_str(), DataType::Float64, true),
                crate::schema::ColumnType::Timestamp => timestamp_field(&c.name),
                crate::schema::ColumnType::Text => Field::new(c.name.as_str(), DataType::Utf8, true),
            })
            .collect();

        let columns: Vec<ArrayRef> = descriptor
            .columns
            .iter()
            .map(|c| -> ArrayRef {
                match c.column_type {
                    crate::schema::ColumnType::Integer => {
                        // integer fields double as dictionary codes, keep 1..=4
                        Arc::new(Int64Array::from_iter_values(
                            (0..n).map(|i| 1 + (i as i64 % 4)),
                        ))
                    }
                    crate::schema::ColumnType::Float if c.name == "RatecodeID" => {
                        Arc::new(Float64Array::from_iter_values(
                            (0..n).map(|i| (1 + i % 6) as f64),
                        ))
                    }
                    crate::schema::ColumnType::Float => Arc::new(Float64Array::from_iter_values(
                        (0..n).map(|i| 1.5 + i as f64),
                    )),
                    crate::schema::ColumnType::Timestamp => {
                        // dropoff 10 minutes after pickup
                        let base = if c.name.contains("dropoff") {
                            1_700_000_600_000_000i64
                        } else {
                            1_700_000_000_000_000i64
                        };
                        Arc::new(TimestampMicrosecondArray::from_iter_values(
                            (0..n).map(|i| base + i as i64),
                        ))
                    }
                    crate::schema::ColumnType::Text => Arc::new(StringArray::from_iter_values(
                        (0..n).map(|i| if i % 2 == 0 { "N" } else { "Y" }),
                    )),
                }
            })
            .collect();

        RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).unwrap()
    }

    fn replace_column(batch: &RecordBatch, name: &str, array: ArrayRef) -> RecordBatch {
        let schema = batch.schema();
        let (idx, _) = schema.column_with_name(name).unwrap();
        let mut columns = batch.columns().to_vec();
        columns[idx] = array;
        RecordBatch::try_new(schema, columns).unwrap()
    }

    #[test]
    fn test_clean_batch_scores_100() {
        let resolver = SchemaResolver::new();
        let descriptor = resolver.resolve(TripType::Yellow).unwrap();
        let validator = QualityValidator::new(default_config());

        let result = validator.validate(&yellow_batch(100), &descriptor).unwrap();
        assert!(result.is_valid, "unexpected errors: {:?}", result.errors);
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
        assert_eq!(result.quality_score, 100.0);
    }

    #[test]
    fn test_missing_required_column_is_error() {
        let resolver = SchemaResolver::new();
        let descriptor = resolver.resolve(TripType::Yellow).unwrap();
        let validator = QualityValidator::new(default_config());

        let batch = yellow_batch(10);
        let schema = batch.schema();
        let (idx, _) = schema.column_with_name("total_amount").unwrap();
        let mut fields: Vec<_> = schema.fields().iter().cloned().collect();
        fields.remove(idx);
        let mut columns = batch.columns().to_vec();
        columns.remove(idx);
        let truncated =
            RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).unwrap();

        let result = validator.validate(&truncated, &descriptor).unwrap();
        assert!(!result.is_valid);
        assert!(result.errors.iter().any(|e| e.contains("total_amount")));
        assert!(result.quality_score < 100.0);
    }

    #[test]
    fn test_fully_null_column_is_error() {
        let resolver = SchemaResolver::new();
        let descriptor = resolver.resolve(TripType::Yellow).unwrap();
        let validator = QualityValidator::new(default_config());

        let batch = replace_column(
            &yellow_batch(20),
            "trip_distance",
            Arc::new(Float64Array::from(vec![None::<f64>; 20])),
        );

        let result = validator.validate(&batch, &descriptor).unwrap();
        assert!(!result.is_valid);
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("trip_distance") && e.contains("100%")));
    }

    #[test]
    fn test_null_rate_above_error_threshold_blocks() {
        let resolver = SchemaResolver::new();
        let descriptor = resolver.resolve(TripType::Yellow).unwrap();
        let validator = QualityValidator::new(default_config());

        // 60% null fare_amount against a 50% error threshold
        let fares: Vec<Option<f64>> = (0..100)
            .map(|i| if i < 60 { None } else { Some(10.0) })
            .collect();
        let batch = replace_column(
            &yellow_batch(100),
            "fare_amount",
            Arc::new(Float64Array::from(fares)),
        );

        let result = validator.validate(&batch, &descriptor).unwrap();
        assert!(!result.is_valid);
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("fare_amount") && e.contains("60.0%")));
    }

    #[test]
    fn test_moderate_null_rate_is_warning_only() {
        let resolver = SchemaResolver::new();
        let descriptor = resolver.resolve(TripType::Yellow).unwrap();
        let validator = QualityValidator::new(default_config());

        // 10% null fare_amount: warn, do not block
        let fares: Vec<Option<f64>> = (0..100)
            .map(|i| if i < 10 { None } else { Some(10.0) })
            .collect();
        let batch = replace_column(
            &yellow_batch(100),
            "fare_amount",
            Arc::new(Float64Array::from(fares)),
        );

        let result = validator.validate(&batch, &descriptor).unwrap();
        assert!(result.is_valid);
        assert!(result.warnings.iter().any(|w| w.contains("fare_amount")));
        assert_eq!(result.quality_score, 95.0);
    }

    #[test]
    fn test_widespread_negative_amounts_are_error() {
        let resolver = SchemaResolver::new();
        let descriptor = resolver.resolve(TripType::Yellow).unwrap();
        let validator = QualityValidator::new(default_config());

        let amounts: Vec<Option<f64>> = (0..100)
            .map(|i| if i < 5 { Some(-20.0) } else { Some(20.0) })
            .collect();
        let batch = replace_column(
            &yellow_batch(100),
            "total_amount",
            Arc::new(Float64Array::from(amounts)),
        );

        let result = validator.validate(&batch, &descriptor).unwrap();
        assert!(!result.is_valid);
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("negative total_amount")));
    }

    #[test]
    fn test_isolated_negative_amount_is_warning() {
        let resolver = SchemaResolver::new();
        let descriptor = resolver.resolve(TripType::Yellow).unwrap();
        let validator = QualityValidator::new(default_config());

        let mut amounts: Vec<Option<f64>> = vec![Some(20.0); 200];
        amounts[7] = Some(-3.5);
        let batch = replace_column(
            &yellow_batch(200),
            "total_amount",
            Arc::new(Float64Array::from(amounts)),
        );

        let result = validator.validate(&batch, &descriptor).unwrap();
        assert!(result.is_valid);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("negative total_amount")));
    }

    #[test]
    fn test_unknown_payment_codes_warn() {
        let resolver = SchemaResolver::new();
        let descriptor = resolver.resolve(TripType::Yellow).unwrap();
        let validator = QualityValidator::new(default_config());

        // code 9 is not in the payment dictionary
        let codes: Vec<i64> = (0..50).map(|i| if i < 5 { 9 } else { 1 }).collect();
        let batch = replace_column(
            &yellow_batch(50),
            "payment_type",
            Arc::new(Int64Array::from(codes)),
        );

        let result = validator.validate(&batch, &descriptor).unwrap();
        assert!(result.is_valid);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("payment_type") && w.contains("dictionary")));
        assert_eq!(result.quality_score, 95.0);
    }

    #[test]
    fn test_fractional_rate_codes_warn() {
        let resolver = SchemaResolver::new();
        let descriptor = resolver.resolve(TripType::Yellow).unwrap();
        let validator = QualityValidator::new(default_config());

        // rate codes must be whole numbers inside the dictionary
        let batch = replace_column(
            &yellow_batch(20),
            "RatecodeID",
            Arc::new(Float64Array::from(vec![Some(2.5); 20])),
        );

        let result = validator.validate(&batch, &descriptor).unwrap();
        assert!(result.is_valid);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("RatecodeID") && w.contains("dictionary")));
    }

    #[test]
    fn test_pickup_after_dropoff_detected() {
        let resolver = SchemaResolver::new();
        let descriptor = resolver.resolve(TripType::Yellow).unwrap();
        let validator = QualityValidator::new(default_config());

        // every pickup after its dropoff
        let batch = replace_column(
            &yellow_batch(50),
            "tpep_pickup_datetime",
            Arc::new(TimestampMicrosecondArray::from_iter_values(
                (0..50).map(|i| 1_700_009_999_000_000i64 + i),
            )),
        );

        let result = validator.validate(&batch, &descriptor).unwrap();
        assert!(!result.is_valid);
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("pickup after dropoff")));
    }

    #[test]
    fn test_duplicate_rows_warn_but_do_not_block() {
        let resolver = SchemaResolver::new();
        let descriptor = resolver.resolve(TripType::Yellow).unwrap();
        let validator = QualityValidator::new(default_config());

        let one_row = yellow_batch(1);
        let schema = one_row.schema();
        let columns: Vec<ArrayRef> = (0..one_row.num_columns())
            .map(|i| {
                let single = one_row.column(i);
                arrow::compute::concat(&[single.as_ref(); 10]).unwrap()
            })
            .collect();
        let duplicated = RecordBatch::try_new(schema, columns).unwrap();

        let result = validator.validate(&duplicated, &descriptor).unwrap();
        assert!(result.is_valid);
        assert!(result.warnings.iter().any(|w| w.contains("duplicate")));
        assert!(result.quality_score < 100.0);
    }

    #[test]
    fn test_empty_batch_is_valid() {
        let resolver = SchemaResolver::new();
        let descriptor = resolver.resolve(TripType::Yellow).unwrap();
        let validator = QualityValidator::new(default_config());

        let result = validator.validate(&yellow_batch(0), &descriptor).unwrap();
        assert!(result.is_valid);
        assert_eq!(result.quality_score, 100.0);
    }

    #[test]
    fn test_score_never_goes_below_zero() {
        let config = QualityConfig {
            error_penalty: 60.0,
            warning_penalty: 50.0,
            ..default_config()
        };
        let resolver = SchemaResolver::new();
        let descriptor = resolver.resolve(TripType::Yellow).unwrap();
        let validator = QualityValidator::new(config);

        let batch = replace_column(
            &yellow_batch(20),
            "fare_amount",
            Arc::new(Float64Array::from(vec![None::<f64>; 20])),
        );
        let batch = replace_column(
            &batch,
            "total_amount",
            Arc::new(Float64Array::from(vec![Some(-10.0); 20])),
        );

        let result = validator.validate(&batch, &descriptor).unwrap();
        assert!(!result.is_valid);
        assert_eq!(result.quality_score, 0.0);
    }
}
