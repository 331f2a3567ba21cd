use crate::models::TripType;
use arrow::datatypes::DataType;
use common::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Semantic column types for the landing tables, mapped both to warehouse
/// DDL and to the arrow types we accept in source files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Float,
    Timestamp,
    Text,
}

impl ColumnType {
    pub fn ddl_type(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Float => "FLOAT",
            ColumnType::Timestamp => "TIMESTAMP",
            ColumnType::Text => "VARCHAR(255)",
        }
    }

    pub fn matches_arrow(&self, data_type: &DataType) -> bool {
        match self {
            ColumnType::Integer => matches!(
                data_type,
                DataType::Int8
                    | DataType::Int16
                    | DataType::Int32
                    | DataType::Int64
                    | DataType::UInt8
                    | DataType::UInt16
                    | DataType::UInt32
                    | DataType::UInt64
            ),
            // TLC files store several integer-ish fields as floats once nulls
            // appear, so Float accepts integer arrays too.
            ColumnType::Float => matches!(
                data_type,
                DataType::Float16
                    | DataType::Float32
                    | DataType::Float64
                    | DataType::Int32
                    | DataType::Int64
            ),
            ColumnType::Timestamp => matches!(data_type, DataType::Timestamp(_, _)),
            ColumnType::Text => matches!(data_type, DataType::Utf8 | DataType::LargeUtf8),
        }
    }
}

/// Which TLC code table a dictionary-coded column is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeDomain {
    Payment,
    Rate,
}

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
}

impl Column {
    fn new(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            column_type,
        }
    }
}

/// Expected shape of one trip type's landing table, plus the column roles
/// the quality validator needs (critical, non-negative, pickup/dropoff).
#[derive(Debug, Clone)]
pub struct SchemaDescriptor {
    pub trip_type: TripType,
    pub columns: Vec<Column>,
    pub critical_columns: Vec<String>,
    pub non_negative_columns: Vec<String>,
    pub code_columns: Vec<(String, CodeDomain)>,
    pub pickup_column: Option<String>,
    pub dropoff_column: Option<String>,
}

impl SchemaDescriptor {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Resolves trip types to their landing-table schemas. All four trip types
/// are registered at construction; an unknown trip type is a configuration
/// error, never a runtime data error.
pub struct SchemaResolver {
    schemas: HashMap<TripType, Arc<SchemaDescriptor>>,
}

impl SchemaResolver {
    pub fn new() -> Self {
        let mut schemas = HashMap::new();
        for trip_type in TripType::ALL {
            schemas.insert(trip_type, Arc::new(build_descriptor(trip_type)));
        }
        Self { schemas }
    }

    pub fn resolve(&self, trip_type: TripType) -> Result<Arc<SchemaDescriptor>> {
        self.schemas
            .get(&trip_type)
            .cloned()
            .ok_or_else(|| Error::UnsupportedTripType(trip_type.to_string()))
    }

    /// Generate the landing-table DDL for a trip type. Pure and idempotent:
    /// repeated calls yield byte-identical statements, and the statement
    /// itself is CREATE TABLE IF NOT EXISTS so re-running it is a no-op.
    pub fn build_ddl(&self, table_name: &str, trip_type: TripType) -> Result<String> {
        let descriptor = self.resolve(trip_type)?;

        let mut ddl = format!("CREATE TABLE IF NOT EXISTS {} (\n", table_name);
        for column in &descriptor.columns {
            ddl.push_str(&format!(
                "    {} {},\n",
                column.name,
                column.column_type.ddl_type()
            ));
        }
        ddl.push_str("    -- Metadata columns for data lineage\n");
        ddl.push_str("    _file_name VARCHAR(255),\n");
        ddl.push_str("    _load_timestamp TIMESTAMP DEFAULT CURRENT_TIMESTAMP(),\n");
        ddl.push_str("    _record_hash VARCHAR(64)\n");
        ddl.push_str(")");

        Ok(ddl)
    }
}

impl Default for SchemaResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-trip-type estimated file sizes, injected from configuration rather
/// than looked up from ambient state.
#[derive(Debug, Clone)]
pub struct FileSizeEstimator {
    estimates_mb: HashMap<String, u64>,
}

impl FileSizeEstimator {
    pub fn new(estimates_mb: HashMap<String, u64>) -> Self {
        Self { estimates_mb }
    }

    pub fn estimate_mb(&self, trip_type: TripType) -> Option<u64> {
        self.estimates_mb.get(trip_type.as_str()).copied()
    }
}

fn build_descriptor(trip_type: TripType) -> SchemaDescriptor {
    use ColumnType::*;

    match trip_type {
        TripType::Yellow => SchemaDescriptor {
            trip_type,
            columns: vec![
                Column::new("VendorID", Integer),
                Column::new("tpep_pickup_datetime", Timestamp),
                Column::new("tpep_dropoff_datetime", Timestamp),
                Column::new("passenger_count", Float),
                Column::new("trip_distance", Float),
                Column::new("RatecodeID", Float),
                Column::new("store_and_fwd_flag", Text),
                Column::new("PULocationID", Integer),
                Column::new("DOLocationID", Integer),
                Column::new("payment_type", Integer),
                Column::new("fare_amount", Float),
                Column::new("extra", Float),
                Column::new("mta_tax", Float),
                Column::new("tip_amount", Float),
                Column::new("tolls_amount", Float),
                Column::new("improvement_surcharge", Float),
                Column::new("total_amount", Float),
                Column::new("congestion_surcharge", Float),
            ],
            critical_columns: vec![
                "tpep_pickup_datetime".to_string(),
                "tpep_dropoff_datetime".to_string(),
                "fare_amount".to_string(),
                "total_amount".to_string(),
            ],
            non_negative_columns: vec![
                "trip_distance".to_string(),
                "total_amount".to_string(),
            ],
            code_columns: vec![
                ("payment_type".to_string(), CodeDomain::Payment),
                ("RatecodeID".to_string(), CodeDomain::Rate),
            ],
            pickup_column: Some("tpep_pickup_datetime".to_string()),
            dropoff_column: Some("tpep_dropoff_datetime".to_string()),
        },
        TripType::Green => SchemaDescriptor {
            trip_type,
            columns: vec![
                Column::new("VendorID", Integer),
                Column::new("lpep_pickup_datetime", Timestamp),
                Column::new("lpep_dropoff_datetime", Timestamp),
                Column::new("store_and_fwd_flag", Text),
                Column::new("RatecodeID", Float),
                Column::new("PULocationID", Integer),
                Column::new("DOLocationID", Integer),
                Column::new("passenger_count", Float),
                Column::new("trip_distance", Float),
                Column::new("fare_amount", Float),
                Column::new("extra", Float),
                Column::new("mta_tax", Float),
                Column::new("tip_amount", Float),
                Column::new("tolls_amount", Float),
                Column::new("ehail_fee", Float),
                Column::new("improvement_surcharge", Float),
                Column::new("total_amount", Float),
                Column::new("payment_type", Integer),
                Column::new("trip_type", Integer),
                Column::new("congestion_surcharge", Float),
            ],
            critical_columns: vec![
                "lpep_pickup_datetime".to_string(),
                "lpep_dropoff_datetime".to_string(),
                "fare_amount".to_string(),
                "total_amount".to_string(),
            ],
            non_negative_columns: vec![
                "trip_distance".to_string(),
                "total_amount".to_string(),
            ],
            code_columns: vec![
                ("payment_type".to_string(), CodeDomain::Payment),
                ("RatecodeID".to_string(), CodeDomain::Rate),
            ],
            pickup_column: Some("lpep_pickup_datetime".to_string()),
            dropoff_column: Some("lpep_dropoff_datetime".to_string()),
        },
        TripType::Fhv => SchemaDescriptor {
            trip_type,
            columns: vec![
                Column::new("dispatching_base_num", Text),
                Column::new("pickup_datetime", Timestamp),
                Column::new("dropOff_datetime", Timestamp),
                Column::new("PUlocationID", Float),
                Column::new("DOlocationID", Float),
                Column::new("SR_Flag", Float),
                Column::new("Affiliated_base_number", Text),
            ],
            critical_columns: vec![
                "pickup_datetime".to_string(),
                "dropOff_datetime".to_string(),
            ],
            non_negative_columns: vec![],
            code_columns: vec![],
            pickup_column: Some("pickup_datetime".to_string()),
            dropoff_column: Some("dropOff_datetime".to_string()),
        },
        TripType::Fhvhv => SchemaDescriptor {
            trip_type,
            columns: vec![
                Column::new("hvfhs_license_num", Text),
                Column::new("dispatching_base_num", Text),
                Column::new("originating_base_num", Text),
                Column::new("request_datetime", Timestamp),
                Column::new("on_scene_datetime", Timestamp),
                Column::new("pickup_datetime", Timestamp),
                Column::new("dropoff_datetime", Timestamp),
                Column::new("PULocationID", Integer),
                Column::new("DOLocationID", Integer),
                Column::new("trip_miles", Float),
                Column::new("trip_time", Integer),
                Column::new("base_passenger_fare", Float),
                Column::new("tolls", Float),
                Column::new("bcf", Float),
                Column::new("sales_tax", Float),
                Column::new("congestion_surcharge", Float),
                Column::new("airport_fee", Float),
                Column::new("tips", Float),
                Column::new("driver_pay", Float),
                Column::new("shared_request_flag", Text),
                Column::new("shared_match_flag", Text),
                Column::new("access_a_ride_flag", Text),
                Column::new("wav_request_flag", Text),
                Column::new("wav_match_flag", Text),
            ],
            critical_columns: vec![
                "pickup_datetime".to_string(),
                "dropoff_datetime".to_string(),
                "base_passenger_fare".to_string(),
            ],
            non_negative_columns: vec![
                "trip_miles".to_string(),
                "base_passenger_fare".to_string(),
            ],
            code_columns: vec![],
            pickup_column: Some("pickup_datetime".to_string()),
            dropoff_column: Some("dropoff_datetime".to_string()),
        },
    }
}
