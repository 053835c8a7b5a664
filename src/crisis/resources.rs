// Crisis resource table
//
// Maps a two-letter region code to localized hotline information. An
// unmapped code always resolves to the default region's resource.

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::errors::SafetyError;

/// ISO-style two-letter region code, stored uppercase
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RegionCode(String);

impl RegionCode {
    pub fn parse(code: &str) -> Result<Self, SafetyError> {
        let code = code.trim();
        if code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(Self(code.to_ascii_uppercase()))
        } else {
            Err(SafetyError::UnsupportedRegion(code.to_string()))
        }
    }

    /// United States, the fallback region
    pub fn us() -> Self {
        Self("US".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RegionCode {
    fn default() -> Self {
        Self::us()
    }
}

impl fmt::Display for RegionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RegionCode {
    type Error = SafetyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RegionCode> for String {
    fn from(code: RegionCode) -> Self {
        code.0
    }
}

/// How the user wants to reach a crisis resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactChannel {
    Call,
    Text,
    Chat,
}

/// Something the host UI can open to contact a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactAction {
    pub channel: ContactChannel,
    /// `tel:`, `sms:` or `https:` URI
    pub uri: String,
    /// Text shown alongside the action
    pub label: String,
}

/// Localized crisis hotline record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrisisResource {
    pub region_code: RegionCode,
    pub display_name: String,
    pub hotline_number: String,
    pub text_instruction: String,
    pub chat_url: String,
    pub description: String,
}

impl CrisisResource {
    /// Build the contact action for a channel
    pub fn contact(&self, channel: ContactChannel) -> ContactAction {
        let dial: String = self
            .hotline_number
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '+')
            .collect();

        match channel {
            ContactChannel::Call => ContactAction {
                channel,
                uri: format!("tel:{}", dial),
                label: format!("{} {}", self.display_name, self.hotline_number),
            },
            ContactChannel::Text => ContactAction {
                channel,
                uri: format!("sms:{}", dial),
                label: self.text_instruction.clone(),
            },
            ContactChannel::Chat => ContactAction {
                channel,
                uri: self.chat_url.clone(),
                label: self.display_name.clone(),
            },
        }
    }
}

/// Entry in the JSON resource table file
#[derive(Debug, Deserialize)]
struct ResourceEntry {
    display_name: String,
    hotline_number: String,
    text_instruction: String,
    chat_url: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ResourceFile {
    default_region: String,
    regions: BTreeMap<String, ResourceEntry>,
}

fn entry(
    code: &str,
    display_name: &str,
    hotline_number: &str,
    text_instruction: &str,
    chat_url: &str,
    description: &str,
) -> (RegionCode, CrisisResource) {
    let region_code = RegionCode(code.to_string());
    (
        region_code.clone(),
        CrisisResource {
            region_code,
            display_name: display_name.to_string(),
            hotline_number: hotline_number.to_string(),
            text_instruction: text_instruction.to_string(),
            chat_url: chat_url.to_string(),
            description: description.to_string(),
        },
    )
}

static BUILTIN: Lazy<ResourceTable> = Lazy::new(|| ResourceTable {
    regions: BTreeMap::from([
        entry(
            "US",
            "988 Suicide & Crisis Lifeline",
            "988",
            "Text 988 to reach a crisis counselor",
            "https://988lifeline.org/chat/",
            "Free, confidential support 24/7 for people in distress.",
        ),
        entry(
            "JP",
            "こころの健康相談統一ダイヤル / TELL Lifeline",
            "0570-783-556",
            "LINEで「あなたのいばしょ」に相談できます",
            "https://talkme.jp/",
            "24時間、匿名で相談できる窓口です。",
        ),
        entry(
            "GB",
            "Samaritans",
            "116 123",
            "Text SHOUT to 85258",
            "https://www.samaritans.org/how-we-can-help/contact-samaritan/",
            "Whatever you're going through, a Samaritan will face it with you, 24 hours a day.",
        ),
        entry(
            "CA",
            "9-8-8 Suicide Crisis Helpline",
            "988",
            "Text 988 to reach a responder",
            "https://988.ca/",
            "Trained responders available 24/7 in English and French.",
        ),
        entry(
            "AU",
            "Lifeline Australia",
            "13 11 14",
            "Text 0477 13 11 14",
            "https://www.lifeline.org.au/crisis-chat/",
            "24-hour crisis support and suicide prevention.",
        ),
    ]),
    default_region: RegionCode::us(),
});

/// Immutable region -> resource mapping with a designated default
#[derive(Debug, Clone)]
pub struct ResourceTable {
    regions: BTreeMap<RegionCode, CrisisResource>,
    default_region: RegionCode,
}

impl ResourceTable {
    pub fn builtin() -> Self {
        BUILTIN.clone()
    }

    /// Load a table from JSON; the default region must be present
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read resource table: {}", path.display()))?;

        let file: ResourceFile =
            serde_json::from_str(&contents).context("Failed to parse resource table JSON")?;

        let mut regions = BTreeMap::new();
        for (code, e) in file.regions {
            let region_code = RegionCode::parse(&code)?;
            regions.insert(
                region_code.clone(),
                CrisisResource {
                    region_code,
                    display_name: e.display_name,
                    hotline_number: e.hotline_number,
                    text_instruction: e.text_instruction,
                    chat_url: e.chat_url,
                    description: e.description,
                },
            );
        }

        let default_region = RegionCode::parse(&file.default_region)?;
        if !regions.contains_key(&default_region) {
            bail!(
                "Default region {} has no entry in {}",
                default_region,
                path.display()
            );
        }

        tracing::info!(regions = regions.len(), default = %default_region, "Loaded crisis resource table");

        Ok(Self {
            regions,
            default_region,
        })
    }

    pub fn default_region(&self) -> &RegionCode {
        &self.default_region
    }

    pub fn default_resource(&self) -> &CrisisResource {
        self.regions
            .get(&self.default_region)
            .unwrap_or_else(|| BUILTIN.default_resource())
    }

    /// Resource for a region code; never fails
    pub fn resolve(&self, code: &str) -> &CrisisResource {
        let resolved = RegionCode::parse(code).and_then(|region| {
            self.regions
                .get(&region)
                .ok_or(SafetyError::UnsupportedRegion(region.0))
        });

        match resolved {
            Ok(resource) => resource,
            Err(e) => {
                tracing::debug!(error = %e, fallback = %self.default_region, "Using default crisis resource");
                self.default_resource()
            }
        }
    }

    pub fn contains(&self, code: &str) -> bool {
        RegionCode::parse(code)
            .map(|region| self.regions.contains_key(&region))
            .unwrap_or(false)
    }

    pub fn regions(&self) -> impl Iterator<Item = &CrisisResource> {
        self.regions.values()
    }
}

impl Default for ResourceTable {
    fn default() -> Self {
        Self::builtin()
    }
}
