//! Game domains and target languages.
//! Every behavior that differs per game is keyed on `GameDomain`, so adding a game
//! forces every match below to be revisited.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The game a localisation corpus belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GameDomain {
    #[default]
    Stellaris,
    #[serde(alias = "hoi4")]
    HeartsOfIron4,
    #[serde(alias = "ck3")]
    CrusaderKings3,
    #[serde(alias = "vic3")]
    Victoria3,
    #[serde(alias = "eu4")]
    EuropaUniversalis4,
}

impl GameDomain {
    pub const ALL: [GameDomain; 5] = [
        GameDomain::Stellaris,
        GameDomain::HeartsOfIron4,
        GameDomain::CrusaderKings3,
        GameDomain::Victoria3,
        GameDomain::EuropaUniversalis4,
    ];

    /// Stable identifier used in cache keys and reports.
    pub fn as_str(self) -> &'static str {
        match self {
            GameDomain::Stellaris => "stellaris",
            GameDomain::HeartsOfIron4 => "hoi4",
            GameDomain::CrusaderKings3 => "ck3",
            GameDomain::Victoria3 => "vic3",
            GameDomain::EuropaUniversalis4 => "eu4",
        }
    }
}

impl fmt::Display for GameDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown game domain: {0}")]
pub struct UnknownDomain(pub String);

impl FromStr for GameDomain {
    type Err = UnknownDomain;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stellaris" => Ok(GameDomain::Stellaris),
            "hoi4" | "hearts_of_iron4" | "hearts_of_iron_4" => Ok(GameDomain::HeartsOfIron4),
            "ck3" | "crusader_kings3" | "crusader_kings_3" => Ok(GameDomain::CrusaderKings3),
            "vic3" | "victoria3" | "victoria_3" => Ok(GameDomain::Victoria3),
            "eu4" | "europa_universalis4" | "europa_universalis_4" => {
                Ok(GameDomain::EuropaUniversalis4)
            }
            other => Err(UnknownDomain(other.to_string())),
        }
    }
}

/// Language the corpus is translated into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TargetLanguage {
    #[default]
    Korean,
    Japanese,
    SimplifiedChinese,
    Russian,
}

impl TargetLanguage {
    /// Language id as used in `l_<id>:` headers and `_l_<id>.yml` file names.
    pub fn locale_id(self) -> &'static str {
        match self {
            TargetLanguage::Korean => "korean",
            TargetLanguage::Japanese => "japanese",
            TargetLanguage::SimplifiedChinese => "simp_chinese",
            TargetLanguage::Russian => "russian",
        }
    }

    /// True if `c` belongs to the writing system of this language.
    /// Used to detect template syntax that was translated when it should not have been.
    pub fn is_script_char(self, c: char) -> bool {
        let cp = c as u32;
        match self {
            TargetLanguage::Korean => {
                (0xAC00..=0xD7A3).contains(&cp)
                    || (0x1100..=0x11FF).contains(&cp)
                    || (0x3130..=0x318F).contains(&cp)
            }
            TargetLanguage::Japanese => {
                (0x3040..=0x30FF).contains(&cp) || (0x4E00..=0x9FFF).contains(&cp)
            }
            TargetLanguage::SimplifiedChinese => {
                (0x4E00..=0x9FFF).contains(&cp) || (0x3400..=0x4DBF).contains(&cp)
            }
            TargetLanguage::Russian => (0x0400..=0x04FF).contains(&cp),
        }
    }

    pub fn contains_script(self, text: &str) -> bool {
        text.chars().any(|c| self.is_script_char(c))
    }
}

impl fmt::Display for TargetLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.locale_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_round_trips_through_str() {
        for domain in GameDomain::ALL {
            assert_eq!(domain.as_str().parse::<GameDomain>(), Ok(domain));
        }
    }

    #[test]
    fn test_domain_parse_rejects_unknown() {
        assert!("minecraft".parse::<GameDomain>().is_err());
    }

    #[test]
    fn test_domain_deserializes_snake_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            domain: GameDomain,
        }
        let w: Wrapper = toml::from_str("domain = \"victoria3\"").unwrap();
        assert_eq!(w.domain, GameDomain::Victoria3);
    }

    #[test]
    fn test_korean_script_detection() {
        assert!(TargetLanguage::Korean.contains_script("다른Function"));
        assert!(!TargetLanguage::Korean.contains_script("GetName"));
        assert!(TargetLanguage::Russian.contains_script("Привет"));
    }
}
