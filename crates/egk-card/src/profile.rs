//! Card profiles
//!
//! A profile carries the card-family specific parameters of the read
//! sequence: the root select command, the HCA application identifier, and
//! the mapping from output fields to container tag paths. Profiles are picked
//! by matching the card's ATR; cards that match none are read with the
//! default profile.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use egk_common::{find_path, CardField, FieldSource};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::apdu::{parse_apdu, ApduCommand, EncodingError};

/// Profile file compiled into the crate
pub const BUILTIN_PROFILES: &str = include_str!("../profiles.toml");

/// Errors while loading card profiles
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("failed to read profile file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse profiles: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid hex in {what}: {value:?}")]
    InvalidHex { what: String, value: String },

    #[error("invalid root select in profile {profile}: {source}")]
    RootSelect {
        profile: String,
        #[source]
        source: EncodingError,
    },

    #[error("invalid profile {profile}: {reason}")]
    Invalid { profile: String, reason: String },
}

/// Source of the profile table, read once at startup
pub trait ProfileSource {
    fn load_profiles(&self) -> Result<ProfileTable, ProfileError>;
}

/// Profiles compiled into the crate
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinProfiles;

impl ProfileSource for BuiltinProfiles {
    fn load_profiles(&self) -> Result<ProfileTable, ProfileError> {
        ProfileTable::from_toml_str(BUILTIN_PROFILES)
    }
}

/// Profiles read from a TOML file
#[derive(Debug, Clone)]
pub struct ProfileFile(pub PathBuf);

impl ProfileSource for ProfileFile {
    fn load_profiles(&self) -> Result<ProfileTable, ProfileError> {
        ProfileTable::load(&self.0)
    }
}

/// Parameters of one card family
#[derive(Debug, Clone)]
pub struct CardProfile {
    pub name: String,
    /// ATR prefixes identifying the family
    pub atr_patterns: Vec<Vec<u8>>,
    /// Root select command, `None` skips the step
    pub root_select: Option<ApduCommand>,
    /// Health Care Application identifier
    pub hca_aid: Vec<u8>,
    /// Namespace prefixes tried for every tag, in order
    pub tag_prefixes: Vec<String>,
    /// Output field to candidate tag paths, first non-empty value wins
    pub fields: BTreeMap<CardField, Vec<String>>,
}

impl CardProfile {
    /// Exact or prefix match of the ATR against this profile's patterns
    pub fn matches(&self, atr: &[u8]) -> bool {
        self.atr_patterns
            .iter()
            .any(|pattern| !pattern.is_empty() && atr.starts_with(pattern))
    }

    /// Candidate tag paths of a field
    pub fn tags(&self, field: CardField) -> &[String] {
        self.fields.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Extract the value of one field from container text
    pub fn extract(&self, text: &str, field: CardField) -> Option<String> {
        let prefixes: Vec<&str> = self.tag_prefixes.iter().map(String::as_str).collect();
        self.tags(field)
            .iter()
            .filter_map(|path| find_path(text, path, &prefixes))
            .find(|value| !value.is_empty())
            .map(str::to_string)
    }

    /// Extract every field of a container, absent fields are left out
    pub fn extract_all(&self, text: &str, source: FieldSource) -> BTreeMap<CardField, String> {
        CardField::from_source(source)
            .filter_map(|field| self.extract(text, field).map(|value| (field, value)))
            .collect()
    }
}

/// Mapping from EF.VERSION code to card generation name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationTable(BTreeMap<String, String>);

impl GenerationTable {
    pub fn new(entries: BTreeMap<String, String>) -> Self {
        Self(
            entries
                .into_iter()
                .map(|(code, name)| (code.to_ascii_uppercase(), name))
                .collect(),
        )
    }

    /// Generation name for the three version bytes, `Unknown(code)` otherwise
    pub fn resolve(&self, code: [u8; 3]) -> String {
        let code = hex::encode_upper(code);
        match self.0.get(&code) {
            Some(name) => name.clone(),
            None => format!("Unknown({})", code),
        }
    }
}

/// All configured profiles plus the default
#[derive(Debug, Clone)]
pub struct ProfileTable {
    pub generations: GenerationTable,
    pub default: CardProfile,
    pub profiles: Vec<CardProfile>,
}

impl ProfileTable {
    /// Load a profile table from a TOML file
    pub fn load(path: &Path) -> Result<Self, ProfileError> {
        let text = std::fs::read_to_string(path).map_err(|source| ProfileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse a profile table from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ProfileError> {
        let doc: ProfileFileDoc = toml::from_str(text)?;

        let default = doc.default.into_profile("default", None)?;
        let profiles = doc
            .profiles
            .into_iter()
            .enumerate()
            .map(|(index, profile)| {
                let fallback_name = format!("profile {}", index + 1);
                profile.into_profile(&fallback_name, Some(&default))
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(count = profiles.len(), "Card profiles loaded");

        Ok(Self {
            generations: GenerationTable::new(doc.generations),
            default,
            profiles,
        })
    }

    /// First profile whose ATR patterns match, in registration order
    pub fn find(&self, atr: &[u8]) -> Option<&CardProfile> {
        self.profiles.iter().find(|profile| profile.matches(atr))
    }

    /// Matching profile, or the default profile
    pub fn select(&self, atr: &[u8]) -> &CardProfile {
        self.find(atr).unwrap_or(&self.default)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProfileFileDoc {
    #[serde(default)]
    generations: BTreeMap<String, String>,
    default: ProfileDoc,
    #[serde(default, rename = "profile")]
    profiles: Vec<ProfileDoc>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProfileDoc {
    name: Option<String>,
    #[serde(default)]
    atr: Vec<String>,
    root_select: Option<String>,
    hca_aid: Option<String>,
    tag_prefixes: Option<Vec<String>>,
    #[serde(default)]
    fields: BTreeMap<String, Vec<String>>,
}

impl ProfileDoc {
    fn into_profile(self, fallback_name: &str, base: Option<&CardProfile>) -> Result<CardProfile, ProfileError> {
        let name = self.name.unwrap_or_else(|| fallback_name.to_string());
        let invalid = |reason: String| ProfileError::Invalid {
            profile: name.clone(),
            reason,
        };

        let atr_patterns = self
            .atr
            .iter()
            .map(|pattern| parse_hex(&format!("ATR of {}", name), pattern))
            .collect::<Result<Vec<_>, _>>()?;

        let root_select = match (self.root_select, base) {
            (Some(template), _) if template.trim().is_empty() => None,
            (Some(template), _) => {
                let bytes = parse_hex(&format!("root select of {}", name), &template)?;
                let command = parse_apdu(&bytes).map_err(|source| ProfileError::RootSelect {
                    profile: name.clone(),
                    source,
                })?;
                Some(command)
            }
            (None, Some(base)) => base.root_select.clone(),
            (None, None) => None,
        };

        let hca_aid = match (self.hca_aid, base) {
            (Some(aid), _) => parse_hex(&format!("HCA AID of {}", name), &aid)?,
            (None, Some(base)) => base.hca_aid.clone(),
            (None, None) => return Err(invalid("hca_aid is required".to_string())),
        };
        if hca_aid.is_empty() || hca_aid.len() > 16 {
            return Err(invalid(format!("HCA AID must be 1 to 16 bytes, got {}", hca_aid.len())));
        }

        let tag_prefixes = match (self.tag_prefixes, base) {
            (Some(prefixes), _) => prefixes,
            (None, Some(base)) => base.tag_prefixes.clone(),
            (None, None) => vec![String::new()],
        };

        let mut fields = base.map(|b| b.fields.clone()).unwrap_or_default();
        for (key, tags) in self.fields {
            let field: CardField = key.parse().map_err(|e| invalid(format!("{}", e)))?;
            if field.source() == FieldSource::Card {
                return Err(invalid(format!("{} is not read from a container", field)));
            }
            fields.insert(field, tags);
        }

        Ok(CardProfile {
            name,
            atr_patterns,
            root_select,
            hca_aid,
            tag_prefixes,
            fields,
        })
    }
}

/// Decode hex with optional space, dash or colon separators
fn parse_hex(what: &str, value: &str) -> Result<Vec<u8>, ProfileError> {
    let compact: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != ':')
        .collect();
    hex::decode(&compact).map_err(|_| ProfileError::InvalidHex {
        what: what.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const EGK_G2_ATR: [u8; 14] = [
        0x3B, 0xD3, 0x96, 0xFF, 0x81, 0xB1, 0xFE, 0x45, 0x1F, 0x07, 0x80, 0x81, 0x05, 0x2D,
    ];

    #[test]
    fn test_builtin_profiles_load() {
        let table = BuiltinProfiles.load_profiles().unwrap();
        assert_eq!(table.default.hca_aid, vec![0xD2, 0x76, 0x00, 0x00, 0x01, 0x02]);
        assert_eq!(
            table.default.root_select.as_ref().unwrap().build().unwrap(),
            vec![0x00, 0xA4, 0x04, 0x0C, 0x07, 0xD2, 0x76, 0x00, 0x01, 0x44, 0x80, 0x00, 0x00]
        );
        assert_eq!(table.profiles.len(), 1);
        assert_eq!(table.profiles[0].hca_aid, table.default.hca_aid);
        assert!(!table.default.tags(CardField::FirstName).is_empty());
    }

    #[test]
    fn test_select_by_atr_prefix() {
        let table = BuiltinProfiles.load_profiles().unwrap();
        assert_eq!(table.select(&EGK_G2_ATR).name, "DE");
        assert_eq!(table.select(&[0x3B, 0x00]).name, "default");
        assert!(table.find(&[]).is_none());
    }

    #[test]
    fn test_first_registered_profile_wins() {
        let table = ProfileTable::from_toml_str(
            r#"
            [default]
            hca_aid = "D2760000010 2"

            [[profile]]
            name = "first"
            atr = ["3B D3"]

            [[profile]]
            name = "second"
            atr = ["3B-D3-96"]
            "#,
        )
        .unwrap();
        assert_eq!(table.select(&EGK_G2_ATR).name, "first");
    }

    #[test]
    fn test_profile_overrides_and_inherits() {
        let table = ProfileTable::from_toml_str(
            r#"
            [default]
            root_select = "00 A4 04 0C 07 D2 76 00 01 44 80 00 00"
            hca_aid = "D2 76 00 00 01 02"

            [default.fields]
            firstName = ["Vorname"]
            lastName = ["Nachname"]

            [[profile]]
            name = "no-root"
            atr = ["3B:D3:96"]
            root_select = ""

            [profile.fields]
            firstName = ["Rufname"]
            "#,
        )
        .unwrap();

        let profile = &table.profiles[0];
        assert!(profile.root_select.is_none());
        assert_eq!(profile.hca_aid, table.default.hca_aid);
        assert_eq!(profile.tags(CardField::FirstName), ["Rufname".to_string()]);
        assert_eq!(profile.tags(CardField::LastName), ["Nachname".to_string()]);
        assert_eq!(profile.tag_prefixes, vec![String::new()]);
    }

    #[test]
    fn test_invalid_profiles_rejected() {
        assert!(matches!(
            ProfileTable::from_toml_str("[default]\nhca_aid = \"ZZ\""),
            Err(ProfileError::InvalidHex { .. })
        ));
        assert!(matches!(
            ProfileTable::from_toml_str("[default]\nname = \"x\""),
            Err(ProfileError::Invalid { .. })
        ));
        assert!(matches!(
            ProfileTable::from_toml_str("[default]\nhca_aid = \"D2\"\n[default.fields]\nnickname = [\"x\"]"),
            Err(ProfileError::Invalid { .. })
        ));
        assert!(matches!(
            ProfileTable::from_toml_str("[default]\nhca_aid = \"D2\"\n[default.fields]\natr = [\"x\"]"),
            Err(ProfileError::Invalid { .. })
        ));
        assert!(matches!(
            ProfileTable::from_toml_str("[default]\nhca_aid = \"D2\"\nroot_select = \"00 A4\""),
            Err(ProfileError::RootSelect { .. })
        ));
        assert!(matches!(
            ProfileTable::from_toml_str("not toml ["),
            Err(ProfileError::Parse(_))
        ));
    }

    #[test]
    fn test_generation_table() {
        let table = BuiltinProfiles.load_profiles().unwrap();
        assert_eq!(table.generations.resolve([0x40, 0x00, 0x00]), "G2");
        assert_eq!(table.generations.resolve([0x30, 0x00, 0x01]), "G1Plus");
        assert_eq!(table.generations.resolve([0x30, 0x00, 0x03]), "G1Plus");
        assert_eq!(table.generations.resolve([0x30, 0x00, 0x02]), "G1");
        assert_eq!(table.generations.resolve([0x30, 0x00, 0x00]), "G1Plus/G1");
        assert_eq!(table.generations.resolve([0x41, 0x02, 0x00]), "Unknown(410200)");
    }

    #[test]
    fn test_extract_with_fallback_paths() {
        let table = BuiltinProfiles.load_profiles().unwrap();
        let vd = "<vsd:Versicherungsschutz><vsd:Beginn>20200101</vsd:Beginn>\
                  <vsd:Kostentraeger><vsd:Kostentraegerkennung>101575519</vsd:Kostentraegerkennung>\
                  <vsd:Name>Test BKK</vsd:Name>\
                  <vsd:AbrechnenderKostentraeger><vsd:Kostentraegerkennung>109500969</vsd:Kostentraegerkennung>\
                  <vsd:Name>Test AOK</vsd:Name></vsd:AbrechnenderKostentraeger>\
                  </vsd:Kostentraeger></vsd:Versicherungsschutz>";
        let fields = table.default.extract_all(vd, FieldSource::Insurance);
        assert_eq!(fields.get(&CardField::InsurerId).map(String::as_str), Some("109500969"));
        assert_eq!(fields.get(&CardField::InsurerName).map(String::as_str), Some("Test AOK"));
        assert_eq!(fields.get(&CardField::CoverageStart).map(String::as_str), Some("20200101"));
        assert!(!fields.contains_key(&CardField::PolicyExpiry));
    }
}
