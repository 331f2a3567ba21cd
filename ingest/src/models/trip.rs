use common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The four TLC trip record categories. Each one maps to exactly one
/// target-table schema, resolved by the `SchemaResolver`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TripType {
    Yellow,
    Green,
    Fhv,
    Fhvhv,
}

impl TripType {
    pub const ALL: [TripType; 4] = [
        TripType::Yellow,
        TripType::Green,
        TripType::Fhv,
        TripType::Fhvhv,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TripType::Yellow => "yellow_tripdata",
            TripType::Green => "green_tripdata",
            TripType::Fhv => "fhv_tripdata",
            TripType::Fhvhv => "fhvhv_tripdata",
        }
    }

    /// Landing table name used by the orchestrator's naming convention.
    pub fn raw_table_name(&self) -> String {
        format!("raw_{}", self.as_str())
    }
}

impl fmt::Display for TripType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TripType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "yellow" | "yellow_tripdata" => Ok(TripType::Yellow),
            "green" | "green_tripdata" => Ok(TripType::Green),
            "fhv" | "fhv_tripdata" => Ok(TripType::Fhv),
            "fhvhv" | "fhvhv_tripdata" => Ok(TripType::Fhvhv),
            other => Err(Error::UnsupportedTripType(other.to_string())),
        }
    }
}

/// Payment types from the TLC data dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentType {
    CreditCard = 1,
    Cash = 2,
    NoCharge = 3,
    Dispute = 4,
    Unknown = 5,
    VoidedTrip = 6,
}

impl PaymentType {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(PaymentType::CreditCard),
            2 => Some(PaymentType::Cash),
            3 => Some(PaymentType::NoCharge),
            4 => Some(PaymentType::Dispute),
            5 => Some(PaymentType::Unknown),
            6 => Some(PaymentType::VoidedTrip),
            _ => None,
        }
    }
}

/// Rate codes from the TLC data dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateCode {
    StandardRate = 1,
    Jfk = 2,
    Newark = 3,
    NassauWestchester = 4,
    NegotiatedFare = 5,
    GroupRide = 6,
}

impl RateCode {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(RateCode::StandardRate),
            2 => Some(RateCode::Jfk),
            3 => Some(RateCode::Newark),
            4 => Some(RateCode::NassauWestchester),
            5 => Some(RateCode::NegotiatedFare),
            6 => Some(RateCode::GroupRide),
            _ => None,
        }
    }
}

/// Immutable description of one monthly source file. Constructed by the
/// download/extraction collaborator and handed to the loader as-is.
/// Deserialization goes through `new`, so the month invariant holds for
/// descriptors read back from JSON too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTripFileDescriptor")]
pub struct TripFileDescriptor {
    pub trip_type: TripType,
    pub year: i32,
    pub month: u32,
    pub filename: String,
    pub estimated_size_mb: Option<u64>,
}

#[derive(Deserialize)]
struct RawTripFileDescriptor {
    trip_type: TripType,
    year: i32,
    month: u32,
    #[serde(default)]
    estimated_size_mb: Option<u64>,
}

impl TryFrom<RawTripFileDescriptor> for TripFileDescriptor {
    type Error = Error;

    fn try_from(raw: RawTripFileDescriptor) -> Result<Self> {
        Self::new(raw.trip_type, raw.year, raw.month, raw.estimated_size_mb)
    }
}

impl TripFileDescriptor {
    pub fn new(
        trip_type: TripType,
        year: i32,
        month: u32,
        estimated_size_mb: Option<u64>,
    ) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(Error::InvalidInput(format!(
                "Month must be between 1 and 12, got {}",
                month
            )));
        }
        let filename = format!("{}_{}-{:02}.parquet", trip_type.as_str(), year, month);
        Ok(Self {
            trip_type,
            year,
            month,
            filename,
            estimated_size_mb,
        })
    }

    /// Parse "<trip_type>_YYYY-MM.parquet" into its parts, for descriptor
    /// construction from a directory listing.
    pub fn parse_filename(filename: &str) -> Result<(TripType, i32, u32)> {
        let stem = filename
            .strip_suffix(".parquet")
            .ok_or_else(|| Error::InvalidInput(format!("Not a parquet file: {}", filename)))?;
        let (prefix, date) = stem
            .rsplit_once('_')
            .ok_or_else(|| Error::InvalidInput(format!("Unrecognized filename: {}", filename)))?;
        let trip_type = prefix.parse::<TripType>()?;
        let (year, month) = date
            .split_once('-')
            .ok_or_else(|| Error::InvalidInput(format!("Unrecognized filename: {}", filename)))?;
        let year = year
            .parse::<i32>()
            .map_err(|_| Error::InvalidInput(format!("Invalid year in filename: {}", filename)))?;
        let month = month
            .parse::<u32>()
            .map_err(|_| Error::InvalidInput(format!("Invalid month in filename: {}", filename)))?;
        Ok((trip_type, year, month))
    }

    pub fn month_name(&self) -> &'static str {
        match self.month {
            1 => "January",
            2 => "February",
            3 => "March",
            4 => "April",
            5 => "May",
            6 => "June",
            7 => "July",
            8 => "August",
            9 => "September",
            10 => "October",
            11 => "November",
            12 => "December",
            _ => unreachable!("month is validated at construction"),
        }
    }

    /// "YYYY-MM" partition string.
    pub fn date_string(&self) -> String {
        format!("{}-{:02}", self.year, self.month)
    }
}
