//! YAML signature files.
//!
//! A signature file carries the four pattern tables a [`Matcher`] is built
//! from, the scan limits, and per-matcher tuning. Patterns are written in hex;
//! whitespace between bytes is ignored and frames accept `??` for "any byte".
//!
//! ## Example YAML Signature File
//!
//! ```yaml
//! version: "1.0"
//! name: "archives and documents"
//! max_bof: 4096
//! max_eof: -1
//!
//! scan:
//!   channel_capacity: 1
//!
//! bof_sequences:
//!   - node: 0
//!     subsequences:
//!       - max_offset: 0
//!         choices: ["50 4B 03 04"]
//!
//! eof_sequences:
//!   - node: 1
//!     subsequences:
//!       - max_offset: -1
//!         choices: ["25 25 45 4F 46", "25 25 45 4F 46 0A"]
//!
//! bof_frames:
//!   - node: 2
//!     min_offset: 0
//!     max_offset: 8
//!     pattern: "47 49 46 38 ?? 61"
//!
//! eof_frames: []
//! ```

use std::fs;
use std::path::Path;

use frames::Frame;
use matcher::{MatchError, Matcher, ScanConfig, SignatureSet};
use sequence::Seq;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when loading signature files
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read signature file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported signature file version: {0}")]
    UnsupportedVersion(String),

    #[error("invalid hex in {location}: {reason}")]
    InvalidHex { location: String, reason: String },

    #[error(transparent)]
    Match(#[from] MatchError),
}

/// Top-level YAML signature file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignatureFile {
    /// Signature file format version
    pub version: String,

    #[serde(default)]
    pub name: Option<String>,

    /// `>0` limit, `0` skip, `<0` whole stream
    #[serde(default = "default_max_bof")]
    pub max_bof: i64,

    #[serde(default)]
    pub max_eof: i64,

    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub bof_sequences: Vec<SequenceEntry>,

    #[serde(default)]
    pub eof_sequences: Vec<SequenceEntry>,

    #[serde(default)]
    pub bof_frames: Vec<FrameEntry>,

    #[serde(default)]
    pub eof_frames: Vec<FrameEntry>,
}

/// One sequence and the test-tree node it resolves to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SequenceEntry {
    pub node: usize,
    pub subsequences: Vec<SubsequenceEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubsequenceEntry {
    /// Start bound for the first subsequence, gap bound for later ones
    #[serde(default = "unbounded")]
    pub max_offset: i64,
    /// Hex alternatives
    pub choices: Vec<String>,
}

/// One frame and the test-tree node it resolves to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FrameEntry {
    pub node: usize,
    #[serde(default)]
    pub min_offset: u64,
    /// Defaults to `min_offset`
    #[serde(default)]
    pub max_offset: Option<u64>,
    /// Hex with `??` wildcards
    pub pattern: String,
}

impl SignatureFile {
    /// Load a YAML signature file from the given path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a YAML signature file from a string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let file: SignatureFile = serde_yaml::from_str(yaml)?;
        file.validate()?;
        Ok(file)
    }

    /// Check everything that can be checked without compiling patterns.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => Ok(()),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }?;

        if self.scan.channel_capacity == 0 {
            return Err(ConfigLoadError::Validation(
                "scan.channel_capacity must be >= 1".into(),
            ));
        }

        let tables = [
            ("bof_sequences", self.bof_sequences.len()),
            ("eof_sequences", self.eof_sequences.len()),
            ("bof_frames", self.bof_frames.len()),
            ("eof_frames", self.eof_frames.len()),
        ];
        if tables.iter().all(|(_, len)| *len == 0) {
            return Err(ConfigLoadError::Validation(
                "signature file defines no patterns".into(),
            ));
        }

        for (idx, entry) in self.bof_sequences.iter().enumerate() {
            entry.check(&format!("bof_sequences[{idx}]"))?;
        }
        for (idx, entry) in self.eof_sequences.iter().enumerate() {
            entry.check(&format!("eof_sequences[{idx}]"))?;
        }
        for (idx, entry) in self.bof_frames.iter().enumerate() {
            entry.check(&format!("bof_frames[{idx}]"))?;
        }
        for (idx, entry) in self.eof_frames.iter().enumerate() {
            entry.check(&format!("eof_frames[{idx}]"))?;
        }
        Ok(())
    }

    /// Decode every pattern into a [`SignatureSet`].
    pub fn signature_set(&self) -> Result<SignatureSet, ConfigLoadError> {
        let mut set = SignatureSet {
            max_bof: self.max_bof,
            max_eof: self.max_eof,
            ..Default::default()
        };
        for (idx, entry) in self.bof_sequences.iter().enumerate() {
            let seq = entry.to_seq(&format!("bof_sequences[{idx}]"))?;
            set.bof_sequences.push(entry.node, seq);
        }
        for (idx, entry) in self.eof_sequences.iter().enumerate() {
            let seq = entry.to_seq(&format!("eof_sequences[{idx}]"))?;
            set.eof_sequences.push(entry.node, seq);
        }
        for (idx, entry) in self.bof_frames.iter().enumerate() {
            let frame = entry.to_frame(&format!("bof_frames[{idx}]"))?;
            set.bof_frames.push(entry.node, frame);
        }
        for (idx, entry) in self.eof_frames.iter().enumerate() {
            let frame = entry.to_frame(&format!("eof_frames[{idx}]"))?;
            set.eof_frames.push(entry.node, frame);
        }
        Ok(set)
    }

    /// Build a [`Matcher`] for this file.
    pub fn into_matcher(self) -> Result<Matcher, ConfigLoadError> {
        let set = self.signature_set()?;
        Ok(Matcher::with_config(set, self.scan)?)
    }
}

impl SequenceEntry {
    fn check(&self, location: &str) -> Result<(), ConfigLoadError> {
        if self.subsequences.is_empty() {
            return Err(ConfigLoadError::Validation(format!(
                "{location} has no subsequences"
            )));
        }
        for (sub, subsequence) in self.subsequences.iter().enumerate() {
            if subsequence.choices.is_empty() {
                return Err(ConfigLoadError::Validation(format!(
                    "{location}.subsequences[{sub}] has no choices"
                )));
            }
        }
        Ok(())
    }

    fn to_seq(&self, location: &str) -> Result<Seq, ConfigLoadError> {
        let mut max_offsets = Vec::with_capacity(self.subsequences.len());
        let mut choices = Vec::with_capacity(self.subsequences.len());
        for (sub, subsequence) in self.subsequences.iter().enumerate() {
            let alternatives = subsequence
                .choices
                .iter()
                .enumerate()
                .map(|(alt, hex)| {
                    parse_hex(hex, &format!("{location}.subsequences[{sub}].choices[{alt}]"))
                })
                .collect::<Result<Vec<_>, _>>()?;
            max_offsets.push(subsequence.max_offset);
            choices.push(alternatives);
        }
        Ok(Seq {
            max_offsets,
            choices,
        })
    }
}

impl FrameEntry {
    fn check(&self, location: &str) -> Result<(), ConfigLoadError> {
        if let Some(max) = self.max_offset {
            if max < self.min_offset {
                return Err(ConfigLoadError::Validation(format!(
                    "{location}: max_offset {max} is below min_offset {}",
                    self.min_offset
                )));
            }
        }
        Ok(())
    }

    fn to_frame(&self, location: &str) -> Result<Frame, ConfigLoadError> {
        let pattern = parse_frame_hex(&self.pattern, &format!("{location}.pattern"))?;
        let max_offset = self.max_offset.unwrap_or(self.min_offset);
        Ok(Frame::window(self.min_offset, max_offset, pattern))
    }
}

/// Decode hex, ignoring whitespace between digits.
pub fn parse_hex(hex: &str, location: &str) -> Result<Vec<u8>, ConfigLoadError> {
    parse_frame_hex(hex, location)?
        .into_iter()
        .map(|byte| {
            byte.ok_or_else(|| ConfigLoadError::InvalidHex {
                location: location.to_string(),
                reason: "wildcards are only allowed in frames".into(),
            })
        })
        .collect()
}

/// Decode hex where `??` stands for any byte.
pub fn parse_frame_hex(hex: &str, location: &str) -> Result<Vec<Option<u8>>, ConfigLoadError> {
    let invalid = |reason: String| ConfigLoadError::InvalidHex {
        location: location.to_string(),
        reason,
    };
    let digits: Vec<char> = hex.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.is_empty() {
        return Err(invalid("pattern is empty".into()));
    }
    if digits.len() % 2 != 0 {
        return Err(invalid(format!("odd number of digits ({})", digits.len())));
    }
    digits
        .chunks(2)
        .map(|pair| match (pair[0], pair[1]) {
            ('?', '?') => Ok(None),
            (hi, lo) => match (hi.to_digit(16), lo.to_digit(16)) {
                (Some(hi), Some(lo)) => Ok(Some((hi * 16 + lo) as u8)),
                _ => Err(invalid(format!("`{hi}{lo}` is not a hex byte"))),
            },
        })
        .collect()
}

fn default_max_bof() -> i64 {
    -1
}

fn unbounded() -> i64 {
    -1
}
