//! Output fields of an eGK read

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Where the value of a field comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldSource {
    /// Patient data container (EF.PD)
    Patient,
    /// Insurance data container (EF.VD)
    Insurance,
    /// Card metadata gathered by the read sequence itself
    Card,
}

/// A named field of the read result
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CardField {
    // Patient data
    InsuredId,
    FirstName,
    LastName,
    BirthDate,
    Sex,
    Title,
    NamePrefix,
    NameSuffix,
    Street,
    HouseNumber,
    PostalCode,
    City,
    CountryCode,
    AddressSupplement,

    // Insurance data
    InsurerId,
    InsurerName,
    InsurerCountryCode,
    CoverageStart,
    PolicyExpiry,
    InsuranceType,
    StatusSupplement,

    // Card metadata
    Atr,
    CardGeneration,
    SchemaVersion,
    MaxBufferSize,
    PatientXml,
    InsuranceXml,
}

impl CardField {
    /// Every field, in output order
    pub const ALL: [CardField; 27] = [
        CardField::InsuredId,
        CardField::FirstName,
        CardField::LastName,
        CardField::BirthDate,
        CardField::Sex,
        CardField::Title,
        CardField::NamePrefix,
        CardField::NameSuffix,
        CardField::Street,
        CardField::HouseNumber,
        CardField::PostalCode,
        CardField::City,
        CardField::CountryCode,
        CardField::AddressSupplement,
        CardField::InsurerId,
        CardField::InsurerName,
        CardField::InsurerCountryCode,
        CardField::CoverageStart,
        CardField::PolicyExpiry,
        CardField::InsuranceType,
        CardField::StatusSupplement,
        CardField::Atr,
        CardField::CardGeneration,
        CardField::SchemaVersion,
        CardField::MaxBufferSize,
        CardField::PatientXml,
        CardField::InsuranceXml,
    ];

    /// Key used in configuration files and JSON output
    pub fn name(self) -> &'static str {
        match self {
            CardField::InsuredId => "insuredId",
            CardField::FirstName => "firstName",
            CardField::LastName => "lastName",
            CardField::BirthDate => "birthDate",
            CardField::Sex => "sex",
            CardField::Title => "title",
            CardField::NamePrefix => "namePrefix",
            CardField::NameSuffix => "nameSuffix",
            CardField::Street => "street",
            CardField::HouseNumber => "houseNumber",
            CardField::PostalCode => "postalCode",
            CardField::City => "city",
            CardField::CountryCode => "countryCode",
            CardField::AddressSupplement => "addressSupplement",
            CardField::InsurerId => "insurerId",
            CardField::InsurerName => "insurerName",
            CardField::InsurerCountryCode => "insurerCountryCode",
            CardField::CoverageStart => "coverageStart",
            CardField::PolicyExpiry => "policyExpiry",
            CardField::InsuranceType => "insuranceType",
            CardField::StatusSupplement => "statusSupplement",
            CardField::Atr => "atr",
            CardField::CardGeneration => "cardGeneration",
            CardField::SchemaVersion => "schemaVersion",
            CardField::MaxBufferSize => "maxBufferSize",
            CardField::PatientXml => "patientXml",
            CardField::InsuranceXml => "insuranceXml",
        }
    }

    /// Human-readable label
    pub fn label(self) -> &'static str {
        match self {
            CardField::InsuredId => "Insured ID",
            CardField::FirstName => "First Name",
            CardField::LastName => "Last Name",
            CardField::BirthDate => "Date of Birth",
            CardField::Sex => "Sex",
            CardField::Title => "Title",
            CardField::NamePrefix => "Name Prefix",
            CardField::NameSuffix => "Name Suffix",
            CardField::Street => "Street",
            CardField::HouseNumber => "House Number",
            CardField::PostalCode => "Postal Code",
            CardField::City => "City",
            CardField::CountryCode => "Country Code",
            CardField::AddressSupplement => "Address Supplement",
            CardField::InsurerId => "Insurer ID",
            CardField::InsurerName => "Insurer Name",
            CardField::InsurerCountryCode => "Insurer Country Code",
            CardField::CoverageStart => "Coverage Start",
            CardField::PolicyExpiry => "Policy Expiry",
            CardField::InsuranceType => "Insurance Type",
            CardField::StatusSupplement => "Status Supplement",
            CardField::Atr => "ATR",
            CardField::CardGeneration => "Card Generation",
            CardField::SchemaVersion => "Schema Version",
            CardField::MaxBufferSize => "Max Buffer Size",
            CardField::PatientXml => "Patient Data XML",
            CardField::InsuranceXml => "Insurance Data XML",
        }
    }

    /// Container (or card step) the value is taken from
    pub fn source(self) -> FieldSource {
        match self {
            CardField::InsuredId
            | CardField::FirstName
            | CardField::LastName
            | CardField::BirthDate
            | CardField::Sex
            | CardField::Title
            | CardField::NamePrefix
            | CardField::NameSuffix
            | CardField::Street
            | CardField::HouseNumber
            | CardField::PostalCode
            | CardField::City
            | CardField::CountryCode
            | CardField::AddressSupplement => FieldSource::Patient,

            CardField::InsurerId
            | CardField::InsurerName
            | CardField::InsurerCountryCode
            | CardField::CoverageStart
            | CardField::PolicyExpiry
            | CardField::InsuranceType
            | CardField::StatusSupplement => FieldSource::Insurance,

            CardField::Atr
            | CardField::CardGeneration
            | CardField::SchemaVersion
            | CardField::MaxBufferSize
            | CardField::PatientXml
            | CardField::InsuranceXml => FieldSource::Card,
        }
    }

    /// Fields extracted from a given container
    pub fn from_source(source: FieldSource) -> impl Iterator<Item = CardField> {
        CardField::ALL
            .into_iter()
            .filter(move |field| field.source() == source)
    }
}

impl fmt::Display for CardField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unknown field name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown card field: {0}")]
pub struct UnknownField(pub String);

impl FromStr for CardField {
    type Err = UnknownField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CardField::ALL
            .into_iter()
            .find(|field| field.name() == s)
            .ok_or_else(|| UnknownField(s.to_string()))
    }
}
