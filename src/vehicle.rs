//! Vehicle eligibility lookups against the vehicle table

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::database::{quote_literal, DatabaseConnection};
use crate::error::ConversionError;

const TBM_SUBTYPE: &str = "CVP_TBM";
const VP4R_SUBTYPE: &str = "CVP_SXM";

/// Vehicle subtypes routed to a factory feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VehicleType {
    #[serde(rename = "TBM")]
    Tbm,
    #[serde(rename = "VP4R")]
    Vp4r,
}

impl VehicleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleType::Tbm => "TBM",
            VehicleType::Vp4r => "VP4R",
        }
    }
}

impl std::fmt::Display for VehicleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of looking a VIN up in the vehicle table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VehicleLookup {
    NotFound,
    Found {
        subtype: String,
        vehicle_type: Option<VehicleType>,
    },
}

impl VehicleLookup {
    fn from_subtype(subtype: &str) -> Self {
        let vehicle_type = match subtype {
            TBM_SUBTYPE => Some(VehicleType::Tbm),
            VP4R_SUBTYPE => Some(VehicleType::Vp4r),
            _ => None,
        };
        VehicleLookup::Found {
            subtype: subtype.to_string(),
            vehicle_type,
        }
    }

    pub fn found(&self) -> bool {
        matches!(self, VehicleLookup::Found { .. })
    }

    pub fn vehicle_type(&self) -> Option<VehicleType> {
        match self {
            VehicleLookup::Found { vehicle_type, .. } => *vehicle_type,
            VehicleLookup::NotFound => None,
        }
    }

    pub fn is_tbm(&self) -> bool {
        self.vehicle_type() == Some(VehicleType::Tbm)
    }

    pub fn is_vp4r(&self) -> bool {
        self.vehicle_type() == Some(VehicleType::Vp4r)
    }
}

/// Destination country recorded for a vehicle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DestinationCountry {
    Us,
    Ca,
    Other(String),
}

impl DestinationCountry {
    fn parse(raw: &str) -> Self {
        match raw {
            "US" => DestinationCountry::Us,
            "CA" => DestinationCountry::Ca,
            other => DestinationCountry::Other(other.to_string()),
        }
    }
}

/// Classification queries keyed by VIN.
///
/// The subtype and country columns are fixed-width CHAR. They are trimmed in
/// SQL so that every driver hands them back as text.
#[derive(Debug, Clone)]
pub struct VehicleEligibilityCheck {
    table: String,
}

impl VehicleEligibilityCheck {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    /// Look the VIN up and classify its subtype
    pub async fn lookup_vehicle(
        &self,
        connection: &mut dyn DatabaseConnection,
        vin: &str,
    ) -> Result<VehicleLookup, ConversionError> {
        info!("Checking VIN {} in vehicle table...", vin);
        let sql = format!(
            "SELECT TRIM(C_VHCL_TYP) AS C_VHCL_TYP FROM {} WHERE I_VIN = {}",
            self.table,
            quote_literal(vin)
        );

        let lookup = match connection.query_one(&sql).await? {
            Some(row) => {
                let subtype = first_column(row);
                VehicleLookup::from_subtype(subtype.trim())
            }
            None => VehicleLookup::NotFound,
        };

        match &lookup {
            VehicleLookup::NotFound => info!("VIN {} not found in vehicle table", vin),
            VehicleLookup::Found {
                subtype,
                vehicle_type: Some(vehicle_type),
            } => info!("VIN {} found in vehicle table as {} ({})", vin, vehicle_type, subtype),
            VehicleLookup::Found { subtype, .. } => {
                info!("VIN {} found in vehicle table and is neither TBM nor VP4R ({})", vin, subtype)
            }
        }
        Ok(lookup)
    }

    /// Read the destination country of a VIN already known to exist
    pub async fn destination_country(
        &self,
        connection: &mut dyn DatabaseConnection,
        vin: &str,
    ) -> Result<DestinationCountry, ConversionError> {
        info!("Checking the destination country for VIN {}", vin);
        let sql = format!(
            "SELECT TRIM(N_DEST_CNTRY) AS N_DEST_CNTRY FROM {} WHERE I_VIN = {}",
            self.table,
            quote_literal(vin)
        );

        let row = connection
            .query_one(&sql)
            .await?
            .ok_or_else(|| ConversionError::Verification {
                vin: vin.to_string(),
                message: "no vehicle row returned for destination country check".to_string(),
            })?;

        let country = DestinationCountry::parse(first_column(row).trim());
        info!("The destination country is: {:?}", country);
        Ok(country)
    }

    /// True when the destination is US, false when CA. Any other value is an error.
    pub async fn current_destination_is_us(
        &self,
        connection: &mut dyn DatabaseConnection,
        vin: &str,
    ) -> Result<bool, ConversionError> {
        match self.destination_country(connection, vin).await? {
            DestinationCountry::Us => Ok(true),
            DestinationCountry::Ca => Ok(false),
            DestinationCountry::Other(value) => Err(ConversionError::Verification {
                vin: vin.to_string(),
                message: format!("unexpected destination country '{value}'"),
            }),
        }
    }
}

fn first_column(row: Vec<Option<String>>) -> String {
    row.into_iter().next().flatten().unwrap_or_default()
}
